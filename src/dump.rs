//! Format records for display: one attribute per line, parent part first.

use crate::value::{Record, Value};

/// Raw scalar string.
pub fn format_scalar_raw(v: &Value) -> String {
    match v {
        Value::U8(x) => format!("{}", x),
        Value::U16(x) => format!("{}", x),
        Value::U32(x) => format!("{}", x),
        Value::U64(x) => format!("{}", x),
        Value::I8(x) => format!("{}", x),
        Value::I16(x) => format!("{}", x),
        Value::I32(x) => format!("{}", x),
        Value::I64(x) => format!("{}", x),
        Value::Float(x) => format!("{}", x),
        Value::Double(x) => format!("{}", x),
        _ => format!("{:?}", v),
    }
}

pub fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Multi-line dump of a record. The parent part is listed before own attributes.
pub fn record_to_dump(record: &Record) -> String {
    let mut lines = Vec::new();
    push_record(&mut lines, record, 0);
    lines.join("\n")
}

fn push_record(lines: &mut Vec<String>, record: &Record, indent: usize) {
    let pad = "  ".repeat(indent);
    lines.push(format!("{}{}", pad, record.class));
    if let Some(parent) = record.parent.as_deref() {
        push_record(lines, parent, indent + 1);
    }
    for (name, v) in &record.fields {
        let sub = value_to_dump(v, indent + 1);
        lines.push(format!("{}  {}: {}", pad, name, sub.trim_start()));
    }
}

/// Format a value (one line for scalars and buffers, multi-line for records and lists).
pub fn value_to_dump(v: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match v {
        Value::Bytes(b) => format!("{}hex({})", pad, hex_string(b)),
        Value::Record(r) => {
            let mut lines = Vec::new();
            push_record(&mut lines, r, indent);
            lines.join("\n")
        }
        Value::List(lst) if lst.is_empty() => format!("{}[]", pad),
        Value::List(lst) => {
            let mut lines: Vec<String> = vec![format!("{}[", pad)];
            for (i, item) in lst.iter().enumerate() {
                let sub = value_to_dump(item, indent + 1);
                lines.push(format!("{}  [{}] {}", pad, i, sub.trim_start()));
            }
            lines.push(format!("{}]", pad));
            lines.join("\n")
        }
        scalar => format!("{}{}", pad, format_scalar_raw(scalar)),
    }
}
