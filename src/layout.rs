//! Marshalled-size rules per attribute kind, parent first.

use crate::error::SchemaError;
use crate::index::{ClassId, ResolvedSchema};
use crate::schema::{Attribute, AttributeKind, RecordType};
use crate::types::{PrimitiveMapping, TypeMappingTable};

/// One contribution to a record's marshalled size.
#[derive(Debug, Clone, PartialEq)]
pub enum SizeTerm {
    /// The parent's own size operation.
    Parent { class: String },
    /// Scalar of known width (plain primitive or custom-layout counter).
    Fixed { attribute: String, bytes: usize },
    /// Embedded record; asks the child, which may be a subtype.
    Nested { attribute: String },
    /// `length * element_bytes`.
    FixedPrimitiveArray {
        attribute: String,
        length: usize,
        element_bytes: usize,
    },
    /// Sum of each slot's size over `length` slots.
    FixedClassArray { attribute: String, length: usize },
    /// Current buffer length.
    ByteBlob { attribute: String },
    /// `runtime count * element_bytes`.
    PrimitiveList { attribute: String, element_bytes: usize },
    /// Sum of each element's size over the runtime count.
    ClassList { attribute: String },
}

impl SizeTerm {
    /// Byte count when it is known at schema time.
    pub fn constant(&self) -> Option<usize> {
        match self {
            SizeTerm::Fixed { bytes, .. } => Some(*bytes),
            SizeTerm::FixedPrimitiveArray { length, element_bytes, .. } => Some(length * element_bytes),
            _ => None,
        }
    }

    pub fn attribute(&self) -> Option<&str> {
        match self {
            SizeTerm::Parent { .. } => None,
            SizeTerm::Fixed { attribute, .. }
            | SizeTerm::Nested { attribute }
            | SizeTerm::FixedPrimitiveArray { attribute, .. }
            | SizeTerm::FixedClassArray { attribute, .. }
            | SizeTerm::ByteBlob { attribute }
            | SizeTerm::PrimitiveList { attribute, .. }
            | SizeTerm::ClassList { attribute } => Some(attribute),
        }
    }
}

/// Ordered size terms for one record type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SizePlan {
    pub terms: Vec<SizeTerm>,
}

pub struct LayoutCalculator<'a> {
    schema: &'a ResolvedSchema,
    types: &'a TypeMappingTable,
}

impl<'a> LayoutCalculator<'a> {
    pub fn new(schema: &'a ResolvedSchema, types: &'a TypeMappingTable) -> Self {
        LayoutCalculator { schema, types }
    }

    pub fn size_plan(&self, id: ClassId) -> Result<SizePlan, SchemaError> {
        let class = self.schema.get(id);
        let mut terms = Vec::with_capacity(class.attributes.len() + 1);
        if let Some(parent) = self.schema.parent(id) {
            terms.push(SizeTerm::Parent {
                class: self.schema.get(parent).name.clone(),
            });
        }
        for attr in &class.attributes {
            if let Some(term) = self.term(class, attr)? {
                terms.push(term);
            }
        }
        Ok(SizePlan { terms })
    }

    /// Size contribution of one attribute; `None` for attributes kept off the wire.
    pub fn term(&self, class: &RecordType, attr: &Attribute) -> Result<Option<SizeTerm>, SchemaError> {
        if !attr.serialize {
            return Ok(None);
        }
        let attribute = attr.name.clone();
        let term = match &attr.kind {
            AttributeKind::Primitive | AttributeKind::Custom(_) => SizeTerm::Fixed {
                attribute,
                bytes: self.primitive(class, attr)?.wire_size,
            },
            AttributeKind::ClassRef => {
                self.class_target(class, attr)?;
                SizeTerm::Nested { attribute }
            }
            AttributeKind::PrimitiveList { length } => {
                if *length == 0 {
                    return Err(SchemaError::EmptyArray {
                        class: class.name.clone(),
                        attribute,
                    });
                }
                if attr.element_is_primitive {
                    SizeTerm::FixedPrimitiveArray {
                        attribute,
                        length: *length,
                        element_bytes: self.primitive(class, attr)?.wire_size,
                    }
                } else {
                    self.class_target(class, attr)?;
                    SizeTerm::FixedClassArray {
                        attribute,
                        length: *length,
                    }
                }
            }
            AttributeKind::ObjectList { .. } => {
                if attr.is_byte_blob() {
                    SizeTerm::ByteBlob { attribute }
                } else if attr.element_is_primitive {
                    SizeTerm::PrimitiveList {
                        attribute,
                        element_bytes: self.primitive(class, attr)?.wire_size,
                    }
                } else {
                    self.class_target(class, attr)?;
                    SizeTerm::ClassList { attribute }
                }
            }
        };
        Ok(Some(term))
    }

    pub(crate) fn primitive(&self, class: &RecordType, attr: &Attribute) -> Result<&'a PrimitiveMapping, SchemaError> {
        self.types
            .resolve(&attr.type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                class: class.name.clone(),
                attribute: attr.name.clone(),
                type_name: attr.type_name.clone(),
            })
    }

    pub(crate) fn class_target(&self, class: &RecordType, attr: &Attribute) -> Result<ClassId, SchemaError> {
        self.schema
            .find(&attr.type_name)
            .ok_or_else(|| SchemaError::UnresolvedClass {
                class: class.name.clone(),
                attribute: attr.name.clone(),
                target: attr.type_name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InheritanceIndex;
    use crate::schema::RecordType;

    fn schema() -> ResolvedSchema {
        let mut index = InheritanceIndex::new();
        index
            .register(
                RecordType::new("Vector3Float")
                    .with_attribute(Attribute::primitive("x", "float"))
                    .with_attribute(Attribute::primitive("y", "float"))
                    .with_attribute(Attribute::primitive("z", "float")),
            )
            .unwrap();
        index
            .register(
                RecordType::new("Sample")
                    .with_attribute(Attribute::primitive("id", "unsigned int"))
                    .with_attribute(Attribute::class_ref("location", "Vector3Float"))
                    .with_attribute(Attribute::fixed_list("marking", "unsigned byte", 11, true))
                    .with_attribute(Attribute::primitive("scratch", "double").transient())
                    .with_attribute(Attribute::primitive("count", "unsigned short").counter_for("data"))
                    .with_attribute(Attribute::object_list("data", "OneByteChunk", "count", false)),
            )
            .unwrap();
        index.freeze().unwrap()
    }

    #[test]
    fn terms_follow_kind_and_skip_transient() {
        let s = schema();
        let types = TypeMappingTable::rust();
        let calc = LayoutCalculator::new(&s, &types);
        let plan = calc.size_plan(1).unwrap();
        let attrs: Vec<_> = plan.terms.iter().filter_map(SizeTerm::attribute).collect();
        assert_eq!(attrs, vec!["id", "location", "marking", "count", "data"]);
        assert!(matches!(plan.terms[4], SizeTerm::ByteBlob { .. }));
    }

    #[test]
    fn unknown_primitive_is_fatal() {
        let mut index = InheritanceIndex::new();
        index
            .register(RecordType::new("Bad").with_attribute(Attribute::primitive("x", "quad")))
            .unwrap();
        let s = index.freeze().unwrap();
        let types = TypeMappingTable::rust();
        let err = LayoutCalculator::new(&s, &types).size_plan(0).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownType {
                class: "Bad".into(),
                attribute: "x".into(),
                type_name: "quad".into()
            }
        );
    }
}
