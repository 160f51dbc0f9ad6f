//! Backend-independent emission: decides which code units a record type needs and the order in
//! which its bytes are written and read.
//!
//! [`CodeEmitter::emit`] is a pure function of (record type, [`ResolvedSchema`],
//! [`TypeMappingTable`]). Its [`ClassPlan`] lists, in output order: fields, constructor, size,
//! accessors, bit-field accessors, marshal/unmarshal steps, and equality/hash members. Backends
//! only spell these decisions; they never change them.
//!
//! Marshal and unmarshal share a single step list ([`ClassPlan::wire`]), so their traversal
//! order cannot diverge.

use crate::error::SchemaError;
use crate::index::{ClassId, ResolvedSchema};
use crate::layout::{LayoutCalculator, SizePlan};
use crate::schema::{Attribute, AttributeKind, LayoutStrategy, RecordType};
use crate::types::{PrimitiveMapping, TypeMappingTable};
use std::collections::HashMap;

/// Element of a fixed array or variable list.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Primitive(PrimitiveMapping),
    Class(String),
}

/// Kind-appropriate storage for one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Scalar(PrimitiveMapping),
    /// Eagerly default-constructed record.
    Embedded(String),
    FixedArray { element: Element, length: usize },
    List(Element),
    /// Raw byte buffer fast path.
    ByteBlob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldPlan {
    pub name: String,
    pub storage: Storage,
    pub comment: Option<String>,
    /// Attribute default literal (scalars only).
    pub initial: Option<String>,
    pub serialized: bool,
}

/// An `InitialValue` resolved against the type or one of its ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct InitBinding {
    pub attribute: String,
    /// Type that declares the attribute.
    pub owner: String,
    pub literal: String,
    pub mapping: PrimitiveMapping,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstructorPlan {
    pub bindings: Vec<InitBinding>,
    /// Fixed class arrays whose slots are filled at construction: (attribute, element class).
    pub eager_arrays: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessorPlan {
    pub attribute: String,
    /// Set when the attribute is a length counter: the list whose live size goes on wire.
    /// Its setter is kept but never affects marshalled bytes.
    pub counts: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitFieldPlan {
    pub name: String,
    pub host: String,
    pub host_type: PrimitiveMapping,
    pub mask: u64,
    pub shift: u32,
    pub width: u32,
    pub comment: Option<String>,
}

/// How a length counter relates to its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    /// Counter equals the number of elements (bytes for a blob).
    Elements,
    /// Counter holds bits; see [`LayoutStrategy::BitCount`].
    Bits { bits_per_element: u32 },
}

impl CountSource {
    /// Elements to read for a counter value.
    pub fn elements_for(self, counter: u64) -> u64 {
        match self {
            CountSource::Elements => counter,
            CountSource::Bits { bits_per_element } => {
                let b = u64::from(bits_per_element.max(1));
                counter / b + u64::from(counter % b > 0)
            }
        }
    }

    /// Counter value to write for a list of `len` elements and a stored counter.
    pub fn wire_value(self, len: usize, stored: u64) -> u64 {
        match self {
            CountSource::Elements => len as u64,
            CountSource::Bits { bits_per_element } => {
                if stored != 0 {
                    stored
                } else {
                    len as u64 * u64::from(bits_per_element)
                }
            }
        }
    }
}

/// One step of the marshal (write) and unmarshal (read) traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum WireStep {
    Parent { class: String },
    Primitive { attribute: String, mapping: PrimitiveMapping },
    /// Written from the live list, never from the stored value.
    Counter {
        attribute: String,
        mapping: PrimitiveMapping,
        list: String,
        source: CountSource,
    },
    Embedded { attribute: String, class: String },
    FixedArray { attribute: String, element: Element, length: usize },
    ByteBlob { attribute: String, counter: String, source: CountSource },
    List {
        attribute: String,
        element: Element,
        counter: String,
        source: CountSource,
    },
}

/// One member visited by structural equality and hashing.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberStep {
    Parent,
    Scalar { attribute: String },
    Delegate { attribute: String },
    FixedArray { attribute: String, length: usize },
    /// Variable list or byte blob.
    List { attribute: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassPlan {
    pub name: String,
    pub parent: Option<String>,
    pub comment: Option<String>,
    pub is_abstract: bool,
    pub alias_for: Option<String>,
    pub special_case: Option<String>,
    /// Other units this one refers to: parent, embedded and element types.
    pub references: Vec<String>,
    pub fields: Vec<FieldPlan>,
    pub constructor: ConstructorPlan,
    pub size: SizePlan,
    pub accessors: Vec<AccessorPlan>,
    pub bit_fields: Vec<BitFieldPlan>,
    pub wire: Vec<WireStep>,
    pub members: Vec<MemberStep>,
    /// Inherited length attribute refreshed from `size()` before an auto-length marshal.
    pub auto_length: Option<AutoLengthField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoLengthField {
    pub attribute: String,
    pub mapping: PrimitiveMapping,
    /// The parent plan carries the same operation, so this one overrides it.
    pub inherited: bool,
}

impl ClassPlan {
    fn empty(class: &RecordType) -> Self {
        ClassPlan {
            name: class.name.clone(),
            parent: None,
            comment: class.comment.clone(),
            is_abstract: class.is_abstract,
            alias_for: None,
            special_case: class.special_case.clone(),
            references: Vec::new(),
            fields: Vec::new(),
            constructor: ConstructorPlan::default(),
            size: SizePlan::default(),
            accessors: Vec::new(),
            bit_fields: Vec::new(),
            wire: Vec::new(),
            members: Vec::new(),
            auto_length: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn marshal_steps(&self) -> &[WireStep] {
        &self.wire
    }

    /// Same sequence as [`ClassPlan::marshal_steps`].
    pub fn unmarshal_steps(&self) -> &[WireStep] {
        &self.wire
    }

    pub fn field(&self, name: &str) -> Option<&FieldPlan> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticRule {
    UnresolvedInitialValue,
    InitialValueNotPrimitive,
    InitialValueLiteral,
    BitFieldOnNonPrimitive,
}

/// Non-fatal finding; the affected piece of generation is omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub class: String,
    pub attribute: String,
    pub rule: DiagnosticRule,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub plan: ClassPlan,
    pub diagnostics: Vec<Diagnostic>,
}

/// Which inherited attribute carries the total PDU length.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoLength {
    pub root: String,
    pub attribute: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmitOptions {
    pub auto_length: Option<AutoLength>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            auto_length: Some(AutoLength {
                root: "Pdu".to_string(),
                attribute: "length".to_string(),
            }),
        }
    }
}

pub struct CodeEmitter<'a> {
    schema: &'a ResolvedSchema,
    layout: LayoutCalculator<'a>,
    options: &'a EmitOptions,
}

impl<'a> CodeEmitter<'a> {
    pub fn new(schema: &'a ResolvedSchema, types: &'a TypeMappingTable, options: &'a EmitOptions) -> Self {
        CodeEmitter {
            schema,
            layout: LayoutCalculator::new(schema, types),
            options,
        }
    }

    pub fn emit(&self, id: ClassId) -> Result<Emission, SchemaError> {
        let class = self.schema.get(id);
        tracing::debug!(class = %class.name, "emitting");
        let mut plan = ClassPlan::empty(class);
        let mut diagnostics = Vec::new();

        if let Some(target) = &class.alias_for {
            let tid = self.schema.find(target).ok_or_else(|| SchemaError::UnresolvedClass {
                class: class.name.clone(),
                attribute: "(alias)".to_string(),
                target: target.clone(),
            })?;
            let canonical = self.schema.get(tid).name.clone();
            plan.references.push(canonical.clone());
            plan.alias_for = Some(canonical);
            return Ok(Emission { plan, diagnostics });
        }

        let counters = self.check_counters(class)?;
        let hosts = self.check_bit_fields(class, &mut diagnostics)?;

        if let Some(pid) = self.schema.parent(id) {
            let parent = self.schema.get(pid).name.clone();
            plan.references.push(parent.clone());
            plan.parent = Some(parent);
        }

        for attr in &class.attributes {
            let storage = self.storage(class, attr)?;
            if let Some(r) = referenced_class(&storage) {
                if !plan.references.iter().any(|x| x == r) {
                    plan.references.push(r.to_string());
                }
            }
            plan.fields.push(FieldPlan {
                name: attr.name.clone(),
                initial: if attr.kind.is_scalar() { attr.default.clone() } else { None },
                comment: attr.comment.clone(),
                serialized: attr.serialize,
                storage,
            });
        }

        plan.size = self.layout.size_plan(id)?;
        plan.constructor = self.constructor(id, &plan.fields, &mut diagnostics)?;

        plan.accessors = class
            .attributes
            .iter()
            .map(|a| AccessorPlan {
                attribute: a.name.clone(),
                counts: counters.get(a.name.as_str()).map(|(list, _)| list.clone()),
            })
            .collect();

        for (attr, mapping) in hosts {
            for b in &attr.bit_fields {
                plan.bit_fields.push(BitFieldPlan {
                    name: b.name.clone(),
                    host: attr.name.clone(),
                    host_type: mapping.clone(),
                    mask: b.mask,
                    shift: b.shift(),
                    width: b.width(),
                    comment: b.comment.clone(),
                });
            }
        }

        plan.wire = self.wire_steps(&plan, class, &counters)?;
        plan.members = members(&plan, class);
        plan.auto_length = self.auto_length(id);

        for d in &diagnostics {
            tracing::warn!(class = %d.class, attribute = %d.attribute, "{}", d.message);
        }
        Ok(Emission { plan, diagnostics })
    }

    /// Counter name -> (list name, source). Enforces the counter invariants.
    fn check_counters(&self, class: &RecordType) -> Result<HashMap<String, (String, CountSource)>, SchemaError> {
        let mut lists_by_counter: HashMap<&str, Vec<&str>> = HashMap::new();
        for (i, attr) in class.attributes.iter().enumerate() {
            let AttributeKind::ObjectList { count_field } = &attr.kind else {
                continue;
            };
            let ci = class.attribute_index(count_field).ok_or_else(|| SchemaError::UnknownCountField {
                class: class.name.clone(),
                attribute: attr.name.clone(),
                count_field: count_field.clone(),
            })?;
            if ci > i {
                return Err(SchemaError::CounterAfterList {
                    class: class.name.clone(),
                    attribute: attr.name.clone(),
                    count_field: count_field.clone(),
                });
            }
            let counter = &class.attributes[ci];
            if !counter.kind.is_scalar() {
                return Err(SchemaError::CounterNotPrimitive {
                    class: class.name.clone(),
                    counter: counter.name.clone(),
                });
            }
            if attr.serialize && !counter.serialize {
                return Err(SchemaError::CounterNotSerialized {
                    class: class.name.clone(),
                    counter: counter.name.clone(),
                });
            }
            lists_by_counter.entry(counter.name.as_str()).or_default().push(attr.name.as_str());
        }

        let mut out = HashMap::new();
        for attr in &class.attributes {
            let lists = lists_by_counter.get(attr.name.as_str());
            if let Some(lists) = lists {
                if lists.len() > 1 {
                    return Err(SchemaError::CounterShared {
                        class: class.name.clone(),
                        counter: attr.name.clone(),
                        lists: lists.iter().map(|s| s.to_string()).collect(),
                    });
                }
            }
            if let Some(marked) = &attr.length_counter_for {
                if !lists.is_some_and(|l| l[0] == marked.as_str()) {
                    return Err(SchemaError::CounterMismatch {
                        class: class.name.clone(),
                        counter: attr.name.clone(),
                        list: marked.clone(),
                    });
                }
            }
            let source = match &attr.kind {
                AttributeKind::Custom(strategy @ LayoutStrategy::BitCount { bits_per_element }) => {
                    if lists.is_none() || *bits_per_element == 0 {
                        return Err(SchemaError::InvalidCustomLayout {
                            class: class.name.clone(),
                            attribute: attr.name.clone(),
                            strategy: strategy.to_string(),
                            reason: "requires a length counter with a non-zero element width".to_string(),
                        });
                    }
                    CountSource::Bits {
                        bits_per_element: *bits_per_element,
                    }
                }
                _ => CountSource::Elements,
            };
            if let Some(lists) = lists {
                out.insert(attr.name.clone(), (lists[0].to_string(), source));
            }
        }
        Ok(out)
    }

    /// Validates bit-field masks. Returns hosts whose accessors should be generated.
    fn check_bit_fields<'c>(
        &self,
        class: &'c RecordType,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<(&'c Attribute, &'a PrimitiveMapping)>, SchemaError> {
        let mut hosts = Vec::new();
        for attr in class.attributes.iter().filter(|a| !a.bit_fields.is_empty()) {
            if attr.kind != AttributeKind::Primitive {
                diagnostics.push(Diagnostic {
                    class: class.name.clone(),
                    attribute: attr.name.clone(),
                    rule: DiagnosticRule::BitFieldOnNonPrimitive,
                    message: format!(
                        "bit-fields declared on {} attribute {}; accessors skipped",
                        attr.kind.label(),
                        attr.name
                    ),
                });
                continue;
            }
            let mapping = self.layout.primitive(class, attr)?;
            let bits = mapping.wire.bits();
            let mask_error = |b: &str, reason: String| SchemaError::BitFieldMask {
                class: class.name.clone(),
                attribute: attr.name.clone(),
                bit_field: b.to_string(),
                reason,
            };
            for (i, b) in attr.bit_fields.iter().enumerate() {
                if !mapping.wire.is_integer() {
                    return Err(mask_error(&b.name, format!("host type {} is not an integer", attr.type_name)));
                }
                if b.mask == 0 {
                    return Err(mask_error(&b.name, "empty mask".to_string()));
                }
                if bits < 64 && b.mask >> bits != 0 {
                    return Err(mask_error(&b.name, format!("mask {:#x} exceeds {}-bit host", b.mask, bits)));
                }
                if let Some(other) = attr.bit_fields[..i].iter().find(|o| o.mask & b.mask != 0) {
                    return Err(SchemaError::BitFieldOverlap {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        first: other.name.clone(),
                        second: b.name.clone(),
                    });
                }
            }
            hosts.push((attr, mapping));
        }
        Ok(hosts)
    }

    fn element(&self, class: &RecordType, attr: &Attribute) -> Result<Element, SchemaError> {
        if attr.element_is_primitive {
            Ok(Element::Primitive(self.layout.primitive(class, attr)?.clone()))
        } else {
            let id = self.layout.class_target(class, attr)?;
            Ok(Element::Class(self.schema.get(id).name.clone()))
        }
    }

    fn storage(&self, class: &RecordType, attr: &Attribute) -> Result<Storage, SchemaError> {
        Ok(match &attr.kind {
            AttributeKind::Primitive | AttributeKind::Custom(_) => {
                Storage::Scalar(self.layout.primitive(class, attr)?.clone())
            }
            AttributeKind::ClassRef => {
                let id = self.layout.class_target(class, attr)?;
                Storage::Embedded(self.schema.get(id).name.clone())
            }
            AttributeKind::PrimitiveList { length } => {
                if *length == 0 {
                    return Err(SchemaError::EmptyArray {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                    });
                }
                Storage::FixedArray {
                    element: self.element(class, attr)?,
                    length: *length,
                }
            }
            AttributeKind::ObjectList { .. } if attr.is_byte_blob() => Storage::ByteBlob,
            AttributeKind::ObjectList { .. } => Storage::List(self.element(class, attr)?),
        })
    }

    fn constructor(
        &self,
        id: ClassId,
        fields: &[FieldPlan],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<ConstructorPlan, SchemaError> {
        let class = self.schema.get(id);
        let mut ctor = ConstructorPlan::default();
        for init in &class.initial_values {
            let mut diag = |rule, message| {
                diagnostics.push(Diagnostic {
                    class: class.name.clone(),
                    attribute: init.attribute.clone(),
                    rule,
                    message,
                })
            };
            let Some((owner_id, attr)) = self.schema.find_attribute(id, &init.attribute) else {
                diag(
                    DiagnosticRule::UnresolvedInitialValue,
                    format!(
                        "initial value for {} matches no attribute of {} or its ancestors",
                        init.attribute, class.name
                    ),
                );
                continue;
            };
            if !attr.kind.is_scalar() {
                diag(
                    DiagnosticRule::InitialValueNotPrimitive,
                    format!("initial value targets {} attribute {}", attr.kind.label(), attr.name),
                );
                continue;
            }
            let owner = self.schema.get(owner_id);
            let mapping = self.layout.primitive(owner, attr)?;
            if !mapping.wire.accepts_literal(&init.literal) {
                diag(
                    DiagnosticRule::InitialValueLiteral,
                    format!("literal {:?} does not fit {}", init.literal, attr.type_name),
                );
                continue;
            }
            if init.literal.trim() == mapping.default_literal {
                continue;
            }
            ctor.bindings.push(InitBinding {
                attribute: attr.name.clone(),
                owner: owner.name.clone(),
                literal: init.literal.trim().to_string(),
                mapping: mapping.clone(),
            });
        }
        for f in fields {
            if let Storage::FixedArray {
                element: Element::Class(c),
                ..
            } = &f.storage
            {
                ctor.eager_arrays.push((f.name.clone(), c.clone()));
            }
        }
        Ok(ctor)
    }

    fn wire_steps(
        &self,
        plan: &ClassPlan,
        class: &RecordType,
        counters: &HashMap<String, (String, CountSource)>,
    ) -> Result<Vec<WireStep>, SchemaError> {
        let mut steps = Vec::with_capacity(class.attributes.len() + 1);
        if let Some(parent) = &plan.parent {
            steps.push(WireStep::Parent { class: parent.clone() });
        }
        for (attr, field) in class.attributes.iter().zip(&plan.fields) {
            if !attr.serialize {
                continue;
            }
            let attribute = attr.name.clone();
            let step = match (&field.storage, &attr.kind) {
                (Storage::Scalar(mapping), _) => match counters.get(attr.name.as_str()) {
                    Some((list, source)) => WireStep::Counter {
                        attribute,
                        mapping: mapping.clone(),
                        list: list.clone(),
                        source: *source,
                    },
                    None => WireStep::Primitive {
                        attribute,
                        mapping: mapping.clone(),
                    },
                },
                (Storage::Embedded(c), _) => WireStep::Embedded {
                    attribute,
                    class: c.clone(),
                },
                (Storage::FixedArray { element, length }, _) => WireStep::FixedArray {
                    attribute,
                    element: element.clone(),
                    length: *length,
                },
                (Storage::ByteBlob, AttributeKind::ObjectList { count_field }) => WireStep::ByteBlob {
                    attribute,
                    source: counter_source(counters, count_field),
                    counter: count_field.clone(),
                },
                (Storage::List(element), AttributeKind::ObjectList { count_field }) => WireStep::List {
                    attribute,
                    element: element.clone(),
                    source: counter_source(counters, count_field),
                    counter: count_field.clone(),
                },
                (Storage::ByteBlob | Storage::List(_), _) => unreachable!("list storage comes from an object list"),
            };
            steps.push(step);
        }
        Ok(steps)
    }

    fn auto_length(&self, id: ClassId) -> Option<AutoLengthField> {
        let auto = self.options.auto_length.as_ref()?;
        if !self.schema.descends_from(id, &auto.root) {
            return None;
        }
        let (owner, attr) = self.schema.find_attribute(id, &auto.attribute)?;
        if !attr.kind.is_scalar() {
            return None;
        }
        let mapping = self.layout.primitive(self.schema.get(owner), attr).ok()?;
        Some(AutoLengthField {
            attribute: attr.name.clone(),
            mapping: mapping.clone(),
            inherited: self.schema.parent(id).is_some_and(|p| self.auto_length(p).is_some()),
        })
    }
}

fn counter_source(counters: &HashMap<String, (String, CountSource)>, counter: &str) -> CountSource {
    counters.get(counter).map(|(_, s)| *s).unwrap_or(CountSource::Elements)
}

fn referenced_class(storage: &Storage) -> Option<&str> {
    match storage {
        Storage::Embedded(c)
        | Storage::FixedArray {
            element: Element::Class(c),
            ..
        }
        | Storage::List(Element::Class(c)) => Some(c),
        _ => None,
    }
}

fn members(plan: &ClassPlan, class: &RecordType) -> Vec<MemberStep> {
    let mut out = Vec::with_capacity(class.attributes.len() + 1);
    if !plan.is_root() {
        out.push(MemberStep::Parent);
    }
    for f in &plan.fields {
        let attribute = f.name.clone();
        out.push(match &f.storage {
            Storage::Scalar(_) => MemberStep::Scalar { attribute },
            Storage::Embedded(_) => MemberStep::Delegate { attribute },
            Storage::FixedArray { length, .. } => MemberStep::FixedArray {
                attribute,
                length: *length,
            },
            Storage::List(_) | Storage::ByteBlob => MemberStep::List { attribute },
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InheritanceIndex;

    fn resolved(classes: Vec<RecordType>) -> ResolvedSchema {
        let mut index = InheritanceIndex::new();
        for c in classes {
            index.register(c).unwrap();
        }
        index.freeze().unwrap()
    }

    fn emit_one(classes: Vec<RecordType>, name: &str) -> Result<Emission, SchemaError> {
        let schema = resolved(classes);
        let types = TypeMappingTable::rust();
        let options = EmitOptions::default();
        let emitter = CodeEmitter::new(&schema, &types, &options);
        emitter.emit(schema.find(name).expect("registered"))
    }

    fn parent_child() -> Vec<RecordType> {
        vec![
            RecordType::new("Parent").with_attribute(Attribute::primitive("id", "unsigned int")),
            RecordType::new("Child")
                .with_parent("Parent")
                .with_attribute(Attribute::primitive("kind", "unsigned short"))
                .with_attribute(Attribute::primitive("tagCount", "unsigned short").counter_for("tags"))
                .with_attribute(Attribute::object_list("tags", "unsigned byte", "tagCount", true))
                .with_initial_value("id", "7")
                .with_initial_value("kind", "0"),
        ]
    }

    #[test]
    fn counter_step_is_decoupled_from_stored_value() {
        let e = emit_one(parent_child(), "Child").unwrap();
        assert_eq!(e.plan.wire[0], WireStep::Parent { class: "Parent".into() });
        assert!(matches!(
            &e.plan.wire[2],
            WireStep::Counter { list, source: CountSource::Elements, .. } if list == "tags"
        ));
        assert!(matches!(&e.plan.wire[3], WireStep::List { counter, .. } if counter == "tagCount"));
        assert_eq!(e.plan.accessors[1].counts.as_deref(), Some("tags"));
        assert_eq!(e.plan.marshal_steps(), e.plan.unmarshal_steps());
    }

    #[test]
    fn initial_values_resolve_through_ancestors_and_skip_defaults() {
        let e = emit_one(parent_child(), "Child").unwrap();
        assert_eq!(e.plan.constructor.bindings.len(), 1);
        let b = &e.plan.constructor.bindings[0];
        assert_eq!((b.attribute.as_str(), b.owner.as_str(), b.literal.as_str()), ("id", "Parent", "7"));
        assert!(e.diagnostics.is_empty());
    }

    #[test]
    fn unresolved_initial_value_is_a_diagnostic() {
        let mut classes = parent_child();
        classes[1] = classes[1].clone().with_initial_value("ghost", "1");
        let e = emit_one(classes, "Child").unwrap();
        assert_eq!(e.diagnostics.len(), 1);
        assert_eq!(e.diagnostics[0].rule, DiagnosticRule::UnresolvedInitialValue);
        assert_eq!(e.plan.constructor.bindings.len(), 1);
    }

    #[test]
    fn transient_attributes_are_off_wire_but_compared() {
        let e = emit_one(
            vec![RecordType::new("T")
                .with_attribute(Attribute::primitive("a", "int"))
                .with_attribute(Attribute::primitive("b", "int").transient())],
            "T",
        )
        .unwrap();
        assert_eq!(e.plan.wire.len(), 1);
        assert_eq!(e.plan.members.len(), 2);
        assert!(!e.plan.field("b").unwrap().serialized);
    }

    #[test]
    fn counter_shared_by_two_lists_is_fatal() {
        let err = emit_one(
            vec![RecordType::new("T")
                .with_attribute(Attribute::primitive("n", "unsigned byte"))
                .with_attribute(Attribute::object_list("a", "unsigned byte", "n", true))
                .with_attribute(Attribute::object_list("b", "unsigned byte", "n", true))],
            "T",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::CounterShared { ref lists, .. } if lists.len() == 2));
    }

    #[test]
    fn counter_declared_after_list_is_fatal() {
        let err = emit_one(
            vec![RecordType::new("T")
                .with_attribute(Attribute::object_list("a", "unsigned byte", "n", true))
                .with_attribute(Attribute::primitive("n", "unsigned byte"))],
            "T",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::CounterAfterList { .. }));
    }

    #[test]
    fn overlapping_and_oversized_masks_are_fatal() {
        let overlap = emit_one(
            vec![RecordType::new("T").with_attribute(
                Attribute::primitive("f", "unsigned byte")
                    .with_bit_field("a", 0b0000_0110)
                    .with_bit_field("b", 0b0000_0100),
            )],
            "T",
        )
        .unwrap_err();
        assert!(matches!(overlap, SchemaError::BitFieldOverlap { .. }));
        let wide = emit_one(
            vec![RecordType::new("T")
                .with_attribute(Attribute::primitive("f", "unsigned byte").with_bit_field("a", 0x100))],
            "T",
        )
        .unwrap_err();
        assert!(matches!(wide, SchemaError::BitFieldMask { .. }));
    }

    #[test]
    fn bit_fields_on_class_ref_are_skipped_with_diagnostic() {
        let e = emit_one(
            vec![
                RecordType::new("Inner").with_attribute(Attribute::primitive("x", "int")),
                RecordType::new("Outer").with_attribute(Attribute::class_ref("inner", "inner").with_bit_field("b", 1)),
            ],
            "Outer",
        )
        .unwrap();
        assert!(e.plan.bit_fields.is_empty());
        assert_eq!(e.diagnostics[0].rule, DiagnosticRule::BitFieldOnNonPrimitive);
        assert_eq!(e.plan.references, vec!["Inner".to_string()]);
    }

    #[test]
    fn unresolved_class_reference_names_type_and_attribute() {
        let err = emit_one(
            vec![RecordType::new("Outer").with_attribute(Attribute::class_ref("inner", "Missing"))],
            "Outer",
        )
        .unwrap_err();
        assert_eq!(err.class(), "Outer");
        assert!(err.to_string().contains("Outer.inner"));
    }

    #[test]
    fn auto_length_only_below_pdu_root() {
        let classes = vec![
            RecordType::new("Pdu").with_attribute(Attribute::primitive("length", "unsigned short")),
            RecordType::new("FirePdu").with_parent("Pdu"),
        ];
        assert_eq!(emit_one(classes.clone(), "Pdu").unwrap().plan.auto_length, None);
        assert_eq!(
            emit_one(classes, "FirePdu")
                .unwrap()
                .plan
                .auto_length
                .map(|a| a.attribute),
            Some("length".to_string())
        );
    }

    #[test]
    fn auto_length_overrides_below_the_first_level() {
        let classes = vec![
            RecordType::new("Pdu").with_attribute(Attribute::primitive("length", "unsigned short")),
            RecordType::new("FamilyPdu").with_parent("Pdu"),
            RecordType::new("FirePdu").with_parent("FamilyPdu"),
        ];
        let inherited = |name: &str| emit_one(classes.clone(), name).unwrap().plan.auto_length.map(|a| a.inherited);
        assert_eq!(inherited("FamilyPdu"), Some(false));
        assert_eq!(inherited("FirePdu"), Some(true));
    }

    #[test]
    fn bit_count_source_rounds_up() {
        let s = CountSource::Bits { bits_per_element: 8 };
        assert_eq!(s.elements_for(17), 3);
        assert_eq!(s.wire_value(3, 0), 24);
        assert_eq!(s.wire_value(3, 20), 20);
        assert_eq!(CountSource::Elements.wire_value(3, 99), 3);
    }
}
