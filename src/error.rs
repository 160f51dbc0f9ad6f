//! Fatal schema errors. Each one names the owning type and, where relevant, the attribute.

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate record type: {0}")]
    DuplicateClass(String),
    #[error("{class}: unknown parent type {parent}")]
    UnknownParent { class: String, parent: String },
    #[error("{class}: inheritance cycle")]
    InheritanceCycle { class: String },
    #[error("{class}.{attribute}: no type mapping for primitive type {type_name:?}")]
    UnknownType {
        class: String,
        attribute: String,
        type_name: String,
    },
    #[error("{class}.{attribute}: unresolved class reference {target}")]
    UnresolvedClass {
        class: String,
        attribute: String,
        target: String,
    },
    #[error("{class}.{attribute}: fixed list must have a positive length")]
    EmptyArray { class: String, attribute: String },
    #[error("{class}.{attribute}: count field {count_field} is not an attribute of {class}")]
    UnknownCountField {
        class: String,
        attribute: String,
        count_field: String,
    },
    #[error("{class}.{attribute}: count field {count_field} must be declared before the list")]
    CounterAfterList {
        class: String,
        attribute: String,
        count_field: String,
    },
    #[error("{class}.{counter}: length counter must be a primitive")]
    CounterNotPrimitive { class: String, counter: String },
    #[error("{class}.{counter}: length counter of a serialized list must itself be serialized")]
    CounterNotSerialized { class: String, counter: String },
    #[error("{class}.{counter}: length counter is referenced by more than one list: {lists:?}")]
    CounterShared {
        class: String,
        counter: String,
        lists: Vec<String>,
    },
    #[error("{class}.{counter}: marked as counter for {list}, which does not count with it")]
    CounterMismatch {
        class: String,
        counter: String,
        list: String,
    },
    #[error("{class}.{attribute}: bit-field {bit_field}: {reason}")]
    BitFieldMask {
        class: String,
        attribute: String,
        bit_field: String,
        reason: String,
    },
    #[error("{class}.{attribute}: bit-fields {first} and {second} overlap")]
    BitFieldOverlap {
        class: String,
        attribute: String,
        first: String,
        second: String,
    },
    #[error("{class}.{attribute}: custom layout {strategy}: {reason}")]
    InvalidCustomLayout {
        class: String,
        attribute: String,
        strategy: String,
        reason: String,
    },
}

impl SchemaError {
    /// Record type the error belongs to.
    pub fn class(&self) -> &str {
        match self {
            SchemaError::DuplicateClass(class) => class,
            SchemaError::UnknownParent { class, .. }
            | SchemaError::InheritanceCycle { class }
            | SchemaError::UnknownType { class, .. }
            | SchemaError::UnresolvedClass { class, .. }
            | SchemaError::EmptyArray { class, .. }
            | SchemaError::UnknownCountField { class, .. }
            | SchemaError::CounterAfterList { class, .. }
            | SchemaError::CounterNotPrimitive { class, .. }
            | SchemaError::CounterNotSerialized { class, .. }
            | SchemaError::CounterShared { class, .. }
            | SchemaError::CounterMismatch { class, .. }
            | SchemaError::BitFieldMask { class, .. }
            | SchemaError::BitFieldOverlap { class, .. }
            | SchemaError::InvalidCustomLayout { class, .. } => class,
        }
    }

    /// Attribute the error belongs to, when it concerns one.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            SchemaError::DuplicateClass(_)
            | SchemaError::UnknownParent { .. }
            | SchemaError::InheritanceCycle { .. } => None,
            SchemaError::UnknownType { attribute, .. }
            | SchemaError::UnresolvedClass { attribute, .. }
            | SchemaError::EmptyArray { attribute, .. }
            | SchemaError::UnknownCountField { attribute, .. }
            | SchemaError::CounterAfterList { attribute, .. }
            | SchemaError::BitFieldMask { attribute, .. }
            | SchemaError::BitFieldOverlap { attribute, .. }
            | SchemaError::InvalidCustomLayout { attribute, .. } => Some(attribute),
            SchemaError::CounterNotPrimitive { counter, .. }
            | SchemaError::CounterNotSerialized { counter, .. }
            | SchemaError::CounterShared { counter, .. }
            | SchemaError::CounterMismatch { counter, .. } => Some(counter),
        }
    }
}
