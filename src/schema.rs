//! In-memory schema model: record types, their ordered attributes, bit-fields and initial values.
//!
//! The model is built once by a loader (see [`crate::parser`]), registered into an
//! [`InheritanceIndex`](crate::index::InheritanceIndex) and is read-only from then on.

use std::fmt;
use std::str::FromStr;

/// Parent name used by record types at the top of a hierarchy.
pub const ROOT: &str = "root";

/// Element type of the raw byte buffer fast path.
pub const BYTE_BLOB_TYPE: &str = "OneByteChunk";

/// True when `name` is the raw byte buffer element type (case-insensitive).
pub fn is_byte_blob(name: &str) -> bool {
    name.eq_ignore_ascii_case(BYTE_BLOB_TYPE)
}

/// One schema-defined record type (a PDU or an embedded record).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    /// Parent type name, or [`ROOT`].
    pub parent: String,
    /// Wire order. Never reordered.
    pub attributes: Vec<Attribute>,
    pub initial_values: Vec<InitialValue>,
    pub comment: Option<String>,
    pub is_abstract: bool,
    pub alias_for: Option<String>,
    pub special_case: Option<String>,
}

impl RecordType {
    pub fn new(name: impl Into<String>) -> Self {
        RecordType {
            name: name.into(),
            parent: ROOT.to_string(),
            attributes: Vec::new(),
            initial_values: Vec::new(),
            comment: None,
            is_abstract: false,
            alias_for: None,
            special_case: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn with_initial_value(mut self, attribute: impl Into<String>, literal: impl Into<String>) -> Self {
        self.initial_values.push(InitialValue {
            attribute: attribute.into(),
            literal: literal.into(),
        });
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent.eq_ignore_ascii_case(ROOT)
    }

    /// Own attribute by exact name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }
}

/// How an attribute is stored and laid out on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    /// Scalar wire value.
    Primitive,
    /// Embedded instance of another record type.
    ClassRef,
    /// Fixed-length array, length known at schema time.
    PrimitiveList { length: usize },
    /// Variable-length list; runtime length is carried by `count_field`.
    ObjectList { count_field: String },
    /// Primitive whose layout follows a named strategy instead of the generic rules.
    Custom(LayoutStrategy),
}

impl AttributeKind {
    pub fn label(&self) -> &'static str {
        match self {
            AttributeKind::Primitive => "primitive",
            AttributeKind::ClassRef => "classref",
            AttributeKind::PrimitiveList { .. } => "primitive list",
            AttributeKind::ObjectList { .. } => "object list",
            AttributeKind::Custom(_) => "custom",
        }
    }

    /// Primitive-valued kinds (plain or custom layout).
    pub fn is_scalar(&self) -> bool {
        matches!(self, AttributeKind::Primitive | AttributeKind::Custom(_))
    }
}

/// Named layout strategies for protocol-version quirks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStrategy {
    /// Length counter measures bits instead of elements. On wire: the stored value when
    /// non-zero, else `len * bits_per_element`. On read: `ceil(counter / bits_per_element)` elements.
    BitCount { bits_per_element: u32 },
}

impl fmt::Display for LayoutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutStrategy::BitCount { bits_per_element } => {
                write!(f, "bit-count({})", bits_per_element)
            }
        }
    }
}

/// One attribute (instance variable) of a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    /// TypeMappingTable key or record type name. For list kinds: the element type.
    pub type_name: String,
    pub kind: AttributeKind,
    pub comment: Option<String>,
    pub default: Option<String>,
    /// When false the attribute is kept in memory and in equality/hash but never on wire.
    pub serialize: bool,
    pub element_is_primitive: bool,
    /// Set on the hidden counter of a variable list: names that list.
    pub length_counter_for: Option<String>,
    pub bit_fields: Vec<BitField>,
}

impl Attribute {
    fn with_kind(name: impl Into<String>, type_name: impl Into<String>, kind: AttributeKind, element_is_primitive: bool) -> Self {
        Attribute {
            name: name.into(),
            type_name: type_name.into(),
            kind,
            comment: None,
            default: None,
            serialize: true,
            element_is_primitive,
            length_counter_for: None,
            bit_fields: Vec::new(),
        }
    }

    pub fn primitive(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::with_kind(name, type_name, AttributeKind::Primitive, true)
    }

    pub fn class_ref(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self::with_kind(name, class, AttributeKind::ClassRef, false)
    }

    pub fn fixed_list(name: impl Into<String>, element: impl Into<String>, length: usize, element_is_primitive: bool) -> Self {
        Self::with_kind(name, element, AttributeKind::PrimitiveList { length }, element_is_primitive)
    }

    pub fn object_list(
        name: impl Into<String>,
        element: impl Into<String>,
        count_field: impl Into<String>,
        element_is_primitive: bool,
    ) -> Self {
        let kind = AttributeKind::ObjectList { count_field: count_field.into() };
        Self::with_kind(name, element, kind, element_is_primitive)
    }

    /// Marks this attribute as the length counter of `list`.
    #[must_use]
    pub fn counter_for(mut self, list: impl Into<String>) -> Self {
        self.length_counter_for = Some(list.into());
        self
    }

    #[must_use]
    pub fn transient(mut self) -> Self {
        self.serialize = false;
        self
    }

    #[must_use]
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    #[must_use]
    pub fn with_bit_field(mut self, name: impl Into<String>, mask: u64) -> Self {
        let owner = self.name.clone();
        self.bit_fields.push(BitField {
            name: name.into(),
            mask,
            comment: None,
            owner,
        });
        self
    }

    /// Element type is the raw byte buffer (only meaningful for variable lists).
    pub fn is_byte_blob(&self) -> bool {
        matches!(self.kind, AttributeKind::ObjectList { .. }) && is_byte_blob(&self.type_name)
    }
}

/// A named sub-range of bits inside an integer attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct BitField {
    pub name: String,
    pub mask: u64,
    pub comment: Option<String>,
    /// Name of the owning attribute.
    pub owner: String,
}

impl BitField {
    /// Position of the mask's lowest set bit.
    pub fn shift(&self) -> u32 {
        self.mask.trailing_zeros()
    }

    /// Number of value bits the field can hold.
    pub fn width(&self) -> u32 {
        if self.mask == 0 {
            0
        } else {
            64 - self.mask.leading_zeros() - self.shift()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitialValue {
    pub attribute: String,
    pub literal: String,
}

/// DIS protocol version the generated code targets; selects version-scoped layout rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    Dis1995,
    Dis1998,
    #[default]
    Dis2012,
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1995" | "5" => Ok(ProtocolVersion::Dis1995),
            "1998" | "6" => Ok(ProtocolVersion::Dis1998),
            "2012" | "7" => Ok(ProtocolVersion::Dis2012),
            other => Err(format!("unknown protocol version: {}", other)),
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = match self {
            ProtocolVersion::Dis1995 => "1995",
            ProtocolVersion::Dis1998 => "1998",
            ProtocolVersion::Dis2012 => "2012",
        };
        f.write_str(year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_field_shift_and_width() {
        let a = Attribute::primitive("flags", "unsigned byte").with_bit_field("mode", 0b0011_1000);
        let b = &a.bit_fields[0];
        assert_eq!(b.shift(), 3);
        assert_eq!(b.width(), 3);
        assert_eq!(b.owner, "flags");
    }

    #[test]
    fn root_sentinel_is_case_insensitive() {
        assert!(RecordType::new("A").with_parent("Root").is_root());
        assert!(!RecordType::new("B").with_parent("A").is_root());
    }

    #[test]
    fn byte_blob_only_for_variable_lists() {
        let list = Attribute::object_list("data", "onebytechunk", "dataLength", false);
        assert!(list.is_byte_blob());
        let fixed = Attribute::fixed_list("data", "OneByteChunk", 4, false);
        assert!(!fixed.is_byte_blob());
    }

    #[test]
    fn protocol_version_parses_years_and_majors() {
        assert_eq!("1998".parse::<ProtocolVersion>(), Ok(ProtocolVersion::Dis1998));
        assert_eq!("7".parse::<ProtocolVersion>(), Ok(ProtocolVersion::Dis2012));
        assert!("2001".parse::<ProtocolVersion>().is_err());
    }
}
