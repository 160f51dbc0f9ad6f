//! Runtime values for marshal/unmarshal (codec representation).

use crate::types::{parse_integer_literal, WireType};

/// A single field value (scalar, buffer, list or nested record).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f32),
    Double(f64),
    /// Byte-blob fast path.
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Record(Box<Record>),
}

impl Value {
    /// Zero of the given wire type.
    pub fn zero(wire: WireType) -> Value {
        Value::from_bits(wire, 0)
    }

    /// Build a scalar from its raw wire bits (low `wire.bits()` bits are used).
    pub fn from_bits(wire: WireType, bits: u64) -> Value {
        match wire {
            WireType::U8 => Value::U8(bits as u8),
            WireType::U16 => Value::U16(bits as u16),
            WireType::U32 => Value::U32(bits as u32),
            WireType::U64 => Value::U64(bits),
            WireType::I8 => Value::I8(bits as u8 as i8),
            WireType::I16 => Value::I16(bits as u16 as i16),
            WireType::I32 => Value::I32(bits as u32 as i32),
            WireType::I64 => Value::I64(bits as i64),
            WireType::F32 => Value::Float(f32::from_bits(bits as u32)),
            WireType::F64 => Value::Double(f64::from_bits(bits)),
        }
    }

    /// Raw wire bits of a scalar, zero-extended. `None` for buffers, lists and records.
    pub fn to_bits(&self) -> Option<u64> {
        Some(match self {
            Value::U8(x) => *x as u64,
            Value::U16(x) => *x as u64,
            Value::U32(x) => *x as u64,
            Value::U64(x) => *x,
            Value::I8(x) => *x as u8 as u64,
            Value::I16(x) => *x as u16 as u64,
            Value::I32(x) => *x as u32 as u64,
            Value::I64(x) => *x as u64,
            Value::Float(x) => x.to_bits() as u64,
            Value::Double(x) => x.to_bits(),
            _ => return None,
        })
    }

    pub fn wire_type(&self) -> Option<WireType> {
        Some(match self {
            Value::U8(_) => WireType::U8,
            Value::U16(_) => WireType::U16,
            Value::U32(_) => WireType::U32,
            Value::U64(_) => WireType::U64,
            Value::I8(_) => WireType::I8,
            Value::I16(_) => WireType::I16,
            Value::I32(_) => WireType::I32,
            Value::I64(_) => WireType::I64,
            Value::Float(_) => WireType::F32,
            Value::Double(_) => WireType::F64,
            _ => return None,
        })
    }

    /// Parse a schema literal for `wire`. `None` when it does not fit.
    pub fn parse_literal(wire: WireType, text: &str) -> Option<Value> {
        if !wire.accepts_literal(text) {
            return None;
        }
        if wire.is_integer() {
            parse_integer_literal(text).map(|n| Value::from_bits(wire, n as u64))
        } else {
            let x = text.trim().parse::<f64>().ok()?;
            Some(match wire {
                WireType::F32 => Value::Float(x as f32),
                _ => Value::Double(x),
            })
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Runtime element count of a list or buffer.
    pub fn runtime_len(&self) -> Option<usize> {
        match self {
            Value::List(v) => Some(v.len()),
            Value::Bytes(b) => Some(b.len()),
            _ => None,
        }
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(Box::new(r))
    }
}

/// Instance of one record type. The parent part is a nested record, so every parent operation
/// is delegated to it rather than re-derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub class: String,
    pub parent: Option<Box<Record>>,
    /// Own attributes in declared order.
    pub fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new(class: impl Into<String>) -> Self {
        Record {
            class: class.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Own attribute only.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.iter_mut().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Own attribute, else the nearest ancestor's.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.field(name)
            .or_else(|| self.parent.as_deref().and_then(|p| p.get(name)))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        if self.field(name).is_some() {
            return self.field_mut(name);
        }
        self.parent.as_deref_mut().and_then(|p| p.get_mut(name))
    }

    /// Replace an existing attribute anywhere in the chain. Returns false if no such attribute.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// The part of this record that belongs to `class` (itself or an ancestor).
    pub fn part(&self, class: &str) -> Option<&Record> {
        if self.class.eq_ignore_ascii_case(class) {
            return Some(self);
        }
        self.parent.as_deref().and_then(|p| p.part(class))
    }

    pub fn part_mut(&mut self, class: &str) -> Option<&mut Record> {
        if self.class.eq_ignore_ascii_case(class) {
            return Some(self);
        }
        self.parent.as_deref_mut().and_then(|p| p.part_mut(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child() -> Record {
        let mut parent = Record::new("Parent");
        parent.fields.push(("id".into(), Value::U32(0)));
        let mut child = Record::new("Child");
        child.parent = Some(Box::new(parent));
        child.fields.push(("kind".into(), Value::U16(0)));
        child
    }

    #[test]
    fn set_walks_parent_chain() {
        let mut c = child();
        assert!(c.set("id", Value::U32(7)));
        assert!(c.set("kind", Value::U16(3)));
        assert!(!c.set("missing", Value::U8(1)));
        assert_eq!(c.get("id"), Some(&Value::U32(7)));
        assert_eq!(c.field("id"), None);
        assert_eq!(c.part("parent").map(|p| p.class.as_str()), Some("Parent"));
    }

    #[test]
    fn bits_round_trip_signed_and_float() {
        let v = Value::I16(-2);
        assert_eq!(v.to_bits(), Some(0xFFFE));
        assert_eq!(Value::from_bits(WireType::I16, 0xFFFE), v);
        let f = Value::Float(1.5);
        assert_eq!(Value::from_bits(WireType::F32, f.to_bits().unwrap()), f);
    }

    #[test]
    fn literals_follow_wire_type() {
        assert_eq!(Value::parse_literal(WireType::U8, "0x10"), Some(Value::U8(16)));
        assert_eq!(Value::parse_literal(WireType::I32, "-5"), Some(Value::I32(-5)));
        assert_eq!(Value::parse_literal(WireType::F64, "2.5"), Some(Value::Double(2.5)));
        assert_eq!(Value::parse_literal(WireType::U8, "300"), None);
    }
}
