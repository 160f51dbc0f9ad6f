//! Primitive wire types and the per-backend type mapping table.

use std::collections::HashMap;

/// Backend-independent primitive encoding on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl WireType {
    pub fn size(self) -> usize {
        match self {
            WireType::U8 | WireType::I8 => 1,
            WireType::U16 | WireType::I16 => 2,
            WireType::U32 | WireType::I32 | WireType::F32 => 4,
            WireType::U64 | WireType::I64 | WireType::F64 => 8,
        }
    }

    pub fn bits(self) -> u32 {
        self.size() as u32 * 8
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, WireType::F32 | WireType::F64)
    }

    /// Whether `text` is a literal this type can hold (decimal or `0x` hex for integers).
    pub fn accepts_literal(self, text: &str) -> bool {
        if self.is_integer() {
            let Some(n) = parse_integer_literal(text) else {
                return false;
            };
            let bits = self.bits();
            if self.is_signed() {
                let max = (1i128 << (bits - 1)) - 1;
                n >= -max - 1 && n <= max
            } else {
                n >= 0 && n < (1i128 << bits)
            }
        } else {
            text.trim().parse::<f64>().is_ok()
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            WireType::I8 | WireType::I16 | WireType::I32 | WireType::I64 | WireType::F32 | WireType::F64
        )
    }
}

/// Parse a decimal or `0x`-prefixed hex integer literal, optionally negative.
pub fn parse_integer_literal(text: &str) -> Option<i128> {
    let t = text.trim();
    let (neg, digits) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t),
    };
    let n = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if neg { -n } else { n })
}

/// What a backend needs to know about one schema primitive type.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveMapping {
    pub schema_name: String,
    pub wire: WireType,
    /// Type spelled in the target language.
    pub target_type: String,
    pub encode_op: String,
    pub decode_op: String,
    pub wire_size: usize,
    pub default_literal: String,
}

/// Immutable table of primitive types for one backend, constructed once and passed explicitly.
#[derive(Debug, Clone)]
pub struct TypeMappingTable {
    backend: String,
    entries: HashMap<String, PrimitiveMapping>,
}

impl TypeMappingTable {
    pub fn new(backend: impl Into<String>) -> Self {
        TypeMappingTable {
            backend: backend.into(),
            entries: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Add or replace the entry for `schema_name`; wire size follows `wire`.
    #[must_use]
    pub fn with(
        mut self,
        schema_name: &str,
        wire: WireType,
        target_type: &str,
        encode_op: &str,
        decode_op: &str,
        default_literal: &str,
    ) -> Self {
        self.entries.insert(
            schema_name.to_ascii_lowercase(),
            PrimitiveMapping {
                schema_name: schema_name.to_string(),
                wire,
                target_type: target_type.to_string(),
                encode_op: encode_op.to_string(),
                decode_op: decode_op.to_string(),
                wire_size: wire.size(),
                default_literal: default_literal.to_string(),
            },
        );
        self
    }

    pub fn resolve(&self, schema_name: &str) -> Option<&PrimitiveMapping> {
        self.entries.get(&schema_name.trim().to_ascii_lowercase())
    }

    pub fn contains(&self, schema_name: &str) -> bool {
        self.resolve(schema_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rust backend: `byteorder` big-endian stream operations.
    pub fn rust() -> Self {
        use WireType::*;
        TypeMappingTable::new("rust")
            .with("unsigned byte", U8, "u8", "write_u8", "read_u8", "0")
            .with("unsigned short", U16, "u16", "write_u16::<BigEndian>", "read_u16::<BigEndian>", "0")
            .with("unsigned int", U32, "u32", "write_u32::<BigEndian>", "read_u32::<BigEndian>", "0")
            .with("unsigned long", U64, "u64", "write_u64::<BigEndian>", "read_u64::<BigEndian>", "0")
            .with("byte", I8, "i8", "write_i8", "read_i8", "0")
            .with("short", I16, "i16", "write_i16::<BigEndian>", "read_i16::<BigEndian>", "0")
            .with("int", I32, "i32", "write_i32::<BigEndian>", "read_i32::<BigEndian>", "0")
            .with("long", I64, "i64", "write_i64::<BigEndian>", "read_i64::<BigEndian>", "0")
            .with("float", F32, "f32", "write_f32::<BigEndian>", "read_f32::<BigEndian>", "0")
            .with("double", F64, "f64", "write_f64::<BigEndian>", "read_f64::<BigEndian>", "0")
    }

    /// C# backend: `DataOutputStream` / `DataInputStream` operations.
    pub fn csharp() -> Self {
        use WireType::*;
        TypeMappingTable::new("csharp")
            .with("unsigned byte", U8, "byte", "WriteUnsignedByte", "ReadUnsignedByte", "0")
            .with("unsigned short", U16, "ushort", "WriteUnsignedShort", "ReadUnsignedShort", "0")
            .with("unsigned int", U32, "uint", "WriteUnsignedInt", "ReadUnsignedInt", "0")
            .with("unsigned long", U64, "ulong", "WriteUnsignedLong", "ReadUnsignedLong", "0")
            .with("byte", I8, "sbyte", "WriteByte", "ReadByte", "0")
            .with("short", I16, "short", "WriteShort", "ReadShort", "0")
            .with("int", I32, "int", "WriteInt", "ReadInt", "0")
            .with("long", I64, "long", "WriteLong", "ReadLong", "0")
            .with("float", F32, "float", "WriteFloat", "ReadFloat", "0")
            .with("double", F64, "double", "WriteDouble", "ReadDouble", "0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_and_unsigned_have_distinct_entries() {
        let t = TypeMappingTable::rust();
        let u = t.resolve("unsigned short").unwrap();
        let s = t.resolve("short").unwrap();
        assert_eq!(u.wire_size, 2);
        assert_eq!(s.wire_size, 2);
        assert_ne!(u.decode_op, s.decode_op);
        assert!(!u.wire.is_signed());
        assert!(s.wire.is_signed());
    }

    #[test]
    fn literals_are_range_checked() {
        assert!(WireType::U8.accepts_literal("255"));
        assert!(!WireType::U8.accepts_literal("256"));
        assert!(WireType::I8.accepts_literal("-128"));
        assert!(WireType::U16.accepts_literal("0xFFFF"));
        assert!(!WireType::U32.accepts_literal("-1"));
        assert!(WireType::F32.accepts_literal("1.5"));
        assert!(!WireType::I32.accepts_literal("seven"));
    }

    #[test]
    fn lookup_ignores_case_and_padding() {
        let t = TypeMappingTable::csharp();
        assert_eq!(t.resolve(" Unsigned Int ").map(|m| m.target_type.as_str()), Some("uint"));
        assert!(t.resolve("EntityID").is_none());
    }

    #[test]
    fn both_tables_cover_the_same_names() {
        let rust = TypeMappingTable::rust();
        let cs = TypeMappingTable::csharp();
        assert_eq!(rust.len(), cs.len());
        for m in rust.entries.values() {
            let other = cs.resolve(&m.schema_name).expect("same key set");
            assert_eq!(other.wire, m.wire);
        }
    }
}
