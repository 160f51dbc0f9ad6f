//! Marshal/unmarshal records by interpreting emitted class plans.
//!
//! The codec runs the same [`ClassPlan`]s the backends render, so it is the executable
//! reference for what generated code does: parent first, declared order, counters written from
//! the live list, equality without short-circuit and the rotate-left-5 hash combiner.
//! Primitive I/O uses `byteorder` with configurable endianness (DIS is big-endian).
//!
//! `marshal` and `unmarshal` never return errors: failures are reported to the failure hook and
//! whatever was produced so far is returned. `try_marshal` / `try_unmarshal` expose the error.

use crate::emit::{
    BitFieldPlan, ClassPlan, CodeEmitter, CountSource, Element, EmitOptions, MemberStep, Storage, WireStep,
};
use crate::error::SchemaError;
use crate::index::ResolvedSchema;
use crate::layout::SizeTerm;
use crate::types::{TypeMappingTable, WireType};
use crate::value::{Record, Value};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("Unknown class: {0}")]
    UnknownClass(String),
    #[error("Unknown field: {class}.{field}")]
    UnknownField { class: String, field: String },
    #[error("Type mismatch: {class}.{field}: expected {expected}")]
    TypeMismatch {
        class: String,
        field: String,
        expected: String,
    },
    #[error("Length/count mismatch: {0}")]
    LengthMismatch(String),
    #[error("Missing parent part in {0}")]
    MissingParent(String),
}

/// Receives marshal/unmarshal failures: (record type, error).
pub type FailureHook = Box<dyn Fn(&str, &CodecError) + Send + Sync>;

fn log_failure(class: &str, err: &CodecError) {
    tracing::error!(class = %class, error = %err, "marshal/unmarshal failed");
}

pub struct Codec {
    pub endianness: Endianness,
    plans: Vec<ClassPlan>,
    by_name: HashMap<String, usize>,
    on_failure: FailureHook,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("endianness", &self.endianness)
            .field("classes", &self.plans.len())
            .finish()
    }
}

impl Codec {
    pub fn new(schema: &ResolvedSchema, types: &TypeMappingTable, endianness: Endianness) -> Result<Self, SchemaError> {
        Self::with_options(schema, types, &EmitOptions::default(), endianness)
    }

    /// Emit a plan for every registered type. The first fatal error aborts.
    pub fn with_options(
        schema: &ResolvedSchema,
        types: &TypeMappingTable,
        options: &EmitOptions,
        endianness: Endianness,
    ) -> Result<Self, SchemaError> {
        let emitter = CodeEmitter::new(schema, types, options);
        let mut plans = Vec::with_capacity(schema.len());
        let mut by_name = HashMap::with_capacity(schema.len());
        for id in schema.ids() {
            let plan = emitter.emit(id)?.plan;
            by_name.insert(plan.name.to_ascii_lowercase(), plans.len());
            plans.push(plan);
        }
        Ok(Codec {
            endianness,
            plans,
            by_name,
            on_failure: Box::new(log_failure),
        })
    }

    #[must_use]
    pub fn with_failure_hook(mut self, hook: impl Fn(&str, &CodecError) + Send + Sync + 'static) -> Self {
        self.on_failure = Box::new(hook);
        self
    }

    pub fn plan(&self, class: &str) -> Option<&ClassPlan> {
        self.by_name.get(&class.to_ascii_lowercase()).map(|&i| &self.plans[i])
    }

    fn plan_for(&self, class: &str) -> Result<&ClassPlan, CodecError> {
        self.plan(class).ok_or_else(|| CodecError::UnknownClass(class.to_string()))
    }

    /// Default-constructed record: eager embedded records and fixed class arrays, default
    /// literals, then initial-value bindings. Aliases instantiate as their target.
    pub fn instantiate(&self, class: &str) -> Result<Record, CodecError> {
        let plan = self.plan_for(class)?;
        if let Some(target) = &plan.alias_for {
            return self.instantiate(target);
        }
        let mut record = Record::new(plan.name.clone());
        if let Some(parent) = &plan.parent {
            record.parent = Some(Box::new(self.instantiate(parent)?));
        }
        for f in &plan.fields {
            let value = match &f.storage {
                Storage::Scalar(m) => f
                    .initial
                    .as_deref()
                    .and_then(|lit| Value::parse_literal(m.wire, lit))
                    .unwrap_or_else(|| Value::zero(m.wire)),
                Storage::Embedded(c) => self.instantiate(c)?.into(),
                Storage::FixedArray { element, length } => {
                    let mut items = Vec::with_capacity(*length);
                    for _ in 0..*length {
                        items.push(self.default_element(element)?);
                    }
                    Value::List(items)
                }
                Storage::List(_) => Value::List(Vec::new()),
                Storage::ByteBlob => Value::Bytes(Vec::new()),
            };
            record.fields.push((f.name.clone(), value));
        }
        for b in &plan.constructor.bindings {
            if let Some(v) = Value::parse_literal(b.mapping.wire, &b.literal) {
                record.set(&b.attribute, v);
            }
        }
        Ok(record)
    }

    fn default_element(&self, element: &Element) -> Result<Value, CodecError> {
        Ok(match element {
            Element::Primitive(m) => Value::zero(m.wire),
            Element::Class(c) => self.instantiate(c)?.into(),
        })
    }

    /// Marshalled size: parent part first, then each own term.
    pub fn size(&self, record: &Record) -> Result<usize, CodecError> {
        let plan = self.plan_for(&record.class)?;
        let mut total = 0;
        for term in &plan.size.terms {
            if let Some(bytes) = term.constant() {
                total += bytes;
                continue;
            }
            total += match term {
                SizeTerm::Parent { .. } => self.size(parent_of(record)?)?,
                SizeTerm::Fixed { .. } | SizeTerm::FixedPrimitiveArray { .. } => 0,
                SizeTerm::Nested { attribute } => self.size(record_field(record, attribute)?)?,
                SizeTerm::FixedClassArray { attribute, .. } | SizeTerm::ClassList { attribute } => {
                    let mut sum = 0;
                    for item in list_field(record, attribute)? {
                        sum += self.size(element_record(record, attribute, item)?)?;
                    }
                    sum
                }
                SizeTerm::ByteBlob { attribute } => bytes_field(record, attribute)?.len(),
                SizeTerm::PrimitiveList { attribute, element_bytes } => {
                    list_field(record, attribute)?.len() * element_bytes
                }
            };
        }
        Ok(total)
    }

    /// Marshal, reporting failures to the hook. Returns the bytes written before any failure.
    pub fn marshal(&self, record: &Record) -> Vec<u8> {
        let mut out = Vec::new();
        if let Err(e) = self.write_record(&mut out, record) {
            (self.on_failure)(&record.class, &e);
        }
        out
    }

    pub fn try_marshal(&self, record: &Record) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.write_record(&mut out, record)?;
        Ok(out)
    }

    /// Store `size()` into the inherited PDU length attribute, then marshal.
    pub fn marshal_auto_length(&self, record: &mut Record) -> Vec<u8> {
        if let Err(e) = self.refresh_length(record) {
            (self.on_failure)(&record.class, &e);
        }
        self.marshal(record)
    }

    fn refresh_length(&self, record: &mut Record) -> Result<(), CodecError> {
        let plan = self.plan_for(&record.class)?;
        let Some(attribute) = plan.auto_length.as_ref().map(|a| a.attribute.clone()) else {
            return Ok(());
        };
        let size = self.size(record)? as u64;
        let class = record.class.clone();
        let slot = record.get_mut(&attribute).ok_or_else(|| CodecError::UnknownField {
            class: class.clone(),
            field: attribute.clone(),
        })?;
        let wire = slot.wire_type().ok_or(CodecError::TypeMismatch {
            class,
            field: attribute,
            expected: "scalar".to_string(),
        })?;
        *slot = Value::from_bits(wire, size);
        Ok(())
    }

    fn write_record(&self, w: &mut Vec<u8>, record: &Record) -> Result<(), CodecError> {
        let plan = self.plan_for(&record.class)?;
        for step in plan.marshal_steps() {
            match step {
                WireStep::Parent { .. } => self.write_record(w, parent_of(record)?)?,
                WireStep::Primitive { attribute, mapping } => {
                    let v = own_field(record, attribute)?;
                    self.write_scalar(w, record, attribute, mapping.wire, v)?;
                }
                WireStep::Counter {
                    attribute,
                    mapping,
                    list,
                    source,
                } => {
                    let stored = own_field(record, attribute)?.to_bits().unwrap_or(0);
                    let len = own_field(record, list)?.runtime_len().ok_or_else(|| mismatch(record, list, "list"))?;
                    let value = source.wire_value(len, stored);
                    let bits = mapping.wire.bits();
                    if bits < 64 && value >> bits != 0 {
                        return Err(CodecError::LengthMismatch(format!(
                            "{}.{}: {} does not fit a {}-bit counter ({} elements in {})",
                            record.class, attribute, value, bits, len, list
                        )));
                    }
                    self.write_word(w, mapping.wire.size(), value)?;
                }
                WireStep::Embedded { attribute, .. } => self.write_record(w, record_field(record, attribute)?)?,
                WireStep::FixedArray {
                    attribute,
                    element,
                    length,
                } => {
                    let items = list_field(record, attribute)?;
                    if items.len() != *length {
                        return Err(CodecError::LengthMismatch(format!(
                            "{}.{}: fixed array holds {} elements, declared {}",
                            record.class,
                            attribute,
                            items.len(),
                            length
                        )));
                    }
                    for item in items {
                        self.write_element(w, record, attribute, element, item)?;
                    }
                }
                WireStep::ByteBlob { attribute, .. } => w.write_all(bytes_field(record, attribute)?)?,
                WireStep::List { attribute, element, .. } => {
                    for item in list_field(record, attribute)? {
                        self.write_element(w, record, attribute, element, item)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_element(
        &self,
        w: &mut Vec<u8>,
        owner: &Record,
        attribute: &str,
        element: &Element,
        item: &Value,
    ) -> Result<(), CodecError> {
        match element {
            Element::Primitive(m) => self.write_scalar(w, owner, attribute, m.wire, item),
            Element::Class(_) => self.write_record(w, element_record(owner, attribute, item)?),
        }
    }

    fn write_scalar(
        &self,
        w: &mut Vec<u8>,
        owner: &Record,
        attribute: &str,
        wire: WireType,
        v: &Value,
    ) -> Result<(), CodecError> {
        if v.wire_type() != Some(wire) {
            return Err(mismatch(owner, attribute, &format!("{:?}", wire)));
        }
        self.write_word(w, wire.size(), v.to_bits().unwrap_or(0))
    }

    /// Unmarshal a fresh instance of `class`, reporting failures to the hook.
    /// Returns `None` only when the type cannot be instantiated.
    pub fn unmarshal(&self, class: &str, bytes: &[u8]) -> Option<Record> {
        match self.instantiate(class) {
            Ok(mut record) => {
                self.unmarshal_into(&mut record, bytes);
                Some(record)
            }
            Err(e) => {
                (self.on_failure)(class, &e);
                None
            }
        }
    }

    /// Read into an existing record. Returns the number of bytes consumed.
    pub fn unmarshal_into(&self, record: &mut Record, bytes: &[u8]) -> usize {
        let mut cursor = Cursor::new(bytes);
        if let Err(e) = self.read_record(&mut cursor, record) {
            (self.on_failure)(&record.class, &e);
        }
        cursor.position() as usize
    }

    pub fn try_unmarshal(&self, class: &str, bytes: &[u8]) -> Result<Record, CodecError> {
        let mut record = self.instantiate(class)?;
        let mut cursor = Cursor::new(bytes);
        self.read_record(&mut cursor, &mut record)?;
        Ok(record)
    }

    fn read_record(&self, r: &mut Cursor<&[u8]>, record: &mut Record) -> Result<(), CodecError> {
        let plan = self.plan_for(&record.class)?;
        for step in plan.unmarshal_steps() {
            match step {
                WireStep::Parent { .. } => {
                    let class = record.class.clone();
                    let parent = record.parent.as_deref_mut().ok_or(CodecError::MissingParent(class))?;
                    self.read_record(r, parent)?;
                }
                WireStep::Primitive { attribute, mapping } | WireStep::Counter { attribute, mapping, .. } => {
                    let v = Value::from_bits(mapping.wire, self.read_word(r, mapping.wire.size())?);
                    *own_field_mut(record, attribute)? = v;
                }
                WireStep::Embedded { attribute, .. } => {
                    let class = record.class.clone();
                    let nested = own_field_mut(record, attribute)?
                        .as_record_mut()
                        .ok_or_else(|| CodecError::TypeMismatch {
                            class,
                            field: attribute.clone(),
                            expected: "record".to_string(),
                        })?;
                    self.read_record(r, nested)?;
                }
                WireStep::FixedArray {
                    attribute,
                    element,
                    length,
                } => {
                    let mut items = Vec::with_capacity(*length);
                    for _ in 0..*length {
                        items.push(self.read_element(r, element)?);
                    }
                    *own_field_mut(record, attribute)? = Value::List(items);
                }
                WireStep::ByteBlob {
                    attribute,
                    counter,
                    source,
                } => {
                    let n = self.runtime_count(r, record, counter, *source)?;
                    let mut buf = vec![0u8; n];
                    r.read_exact(&mut buf)?;
                    *own_field_mut(record, attribute)? = Value::Bytes(buf);
                }
                WireStep::List {
                    attribute,
                    element,
                    counter,
                    source,
                } => {
                    let n = self.runtime_count(r, record, counter, *source)?;
                    let mut items = Vec::new();
                    for _ in 0..n {
                        items.push(self.read_element(r, element)?);
                    }
                    *own_field_mut(record, attribute)? = Value::List(items);
                }
            }
        }
        Ok(())
    }

    /// Element count from the already-read counter, bounded by the bytes left.
    fn runtime_count(
        &self,
        r: &Cursor<&[u8]>,
        record: &Record,
        counter: &str,
        source: CountSource,
    ) -> Result<usize, CodecError> {
        let stored = own_field(record, counter)?
            .to_bits()
            .ok_or_else(|| mismatch(record, counter, "scalar"))?;
        let n = source.elements_for(stored);
        let remaining = (r.get_ref().len() as u64).saturating_sub(r.position());
        if n > remaining {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{}.{} counts {} elements, {} bytes left", record.class, counter, n, remaining),
            )
            .into());
        }
        Ok(n as usize)
    }

    fn read_element(&self, r: &mut Cursor<&[u8]>, element: &Element) -> Result<Value, CodecError> {
        match element {
            Element::Primitive(m) => Ok(Value::from_bits(m.wire, self.read_word(r, m.wire.size())?)),
            Element::Class(c) => {
                let mut item = self.instantiate(c)?;
                self.read_record(r, &mut item)?;
                Ok(item.into())
            }
        }
    }

    /// Structural equality. Every member is compared even after a mismatch.
    pub fn equals(&self, a: &Record, b: &Record) -> bool {
        if !a.class.eq_ignore_ascii_case(&b.class) {
            return false;
        }
        let Ok(plan) = self.plan_for(&a.class) else {
            return false;
        };
        let mut equal = true;
        for m in &plan.members {
            equal &= match m {
                MemberStep::Parent => match (a.parent.as_deref(), b.parent.as_deref()) {
                    (Some(pa), Some(pb)) => self.equals(pa, pb),
                    (None, None) => true,
                    _ => false,
                },
                MemberStep::Scalar { attribute } => a.field(attribute) == b.field(attribute),
                MemberStep::Delegate { attribute } => match (a.field(attribute), b.field(attribute)) {
                    (Some(Value::Record(x)), Some(Value::Record(y))) => self.equals(x, y),
                    _ => false,
                },
                MemberStep::FixedArray { attribute, length } => {
                    let (xs, ys) = (a.field(attribute), b.field(attribute));
                    let mut same = true;
                    for idx in 0..*length {
                        same &= self.element_equals(
                            xs.and_then(|v| v.as_list()).and_then(|l| l.get(idx)),
                            ys.and_then(|v| v.as_list()).and_then(|l| l.get(idx)),
                        );
                    }
                    same
                }
                MemberStep::List { attribute } => match (a.field(attribute), b.field(attribute)) {
                    (Some(Value::Bytes(x)), Some(Value::Bytes(y))) => x == y,
                    (Some(Value::List(x)), Some(Value::List(y))) if x.len() == y.len() => {
                        let mut same = true;
                        for (p, q) in x.iter().zip(y) {
                            same &= self.element_equals(Some(p), Some(q));
                        }
                        same
                    }
                    _ => false,
                },
            };
        }
        equal
    }

    fn element_equals(&self, a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (Some(Value::Record(x)), Some(Value::Record(y))) => self.equals(x, y),
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Parent hash first, then every member in declared order (element-wise for lists).
    pub fn hash_code(&self, record: &Record) -> u64 {
        let Ok(plan) = self.plan_for(&record.class) else {
            return 0;
        };
        let mut acc = 0u64;
        for m in &plan.members {
            match m {
                MemberStep::Parent => {
                    if let Some(p) = record.parent.as_deref() {
                        acc = combine(acc, self.hash_code(p));
                    }
                }
                MemberStep::Scalar { attribute } | MemberStep::Delegate { attribute } => {
                    if let Some(v) = record.field(attribute) {
                        acc = combine(acc, self.value_hash(v));
                    }
                }
                MemberStep::FixedArray { attribute, .. } | MemberStep::List { attribute } => {
                    match record.field(attribute) {
                        Some(Value::List(items)) => {
                            for item in items {
                                acc = combine(acc, self.value_hash(item));
                            }
                        }
                        Some(Value::Bytes(bytes)) => {
                            for b in bytes {
                                acc = combine(acc, u64::from(*b));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        acc
    }

    fn value_hash(&self, v: &Value) -> u64 {
        match v {
            Value::Record(r) => self.hash_code(r),
            other => other.to_bits().unwrap_or(0),
        }
    }

    /// `(host & mask) >> shift` for a bit-field declared on the record's type or an ancestor.
    pub fn bit_field(&self, record: &Record, name: &str) -> Result<u64, CodecError> {
        let (part, b) = self.find_bit_field(record, name)?;
        let host = own_field(part, &b.host)?
            .to_bits()
            .ok_or_else(|| mismatch(part, &b.host, "scalar"))?;
        Ok((host & b.mask) >> b.shift)
    }

    /// Replace only the bits under the mask; sibling bit-fields are untouched.
    pub fn set_bit_field(&self, record: &mut Record, name: &str, value: u64) -> Result<(), CodecError> {
        let (class, b) = {
            let (part, b) = self.find_bit_field(record, name)?;
            (part.class.clone(), b.clone())
        };
        let part = record
            .part_mut(&class)
            .ok_or_else(|| CodecError::UnknownClass(class.clone()))?;
        let slot = own_field_mut(part, &b.host)?;
        let host = slot.to_bits().unwrap_or(0);
        let new_bits = value.checked_shl(b.shift).unwrap_or(0) & b.mask;
        *slot = Value::from_bits(b.host_type.wire, (host & !b.mask) | new_bits);
        Ok(())
    }

    fn find_bit_field<'r>(&self, record: &'r Record, name: &str) -> Result<(&'r Record, &BitFieldPlan), CodecError> {
        let mut part = Some(record);
        while let Some(r) = part {
            let plan = self.plan_for(&r.class)?;
            if let Some(b) = plan.bit_fields.iter().find(|b| b.name == name) {
                return Ok((r, b));
            }
            part = r.parent.as_deref();
        }
        Err(CodecError::UnknownField {
            class: record.class.clone(),
            field: name.to_string(),
        })
    }

    fn read_word(&self, r: &mut Cursor<&[u8]>, size: usize) -> Result<u64, CodecError> {
        Ok(match (size, self.endianness) {
            (1, _) => r.read_u8()? as u64,
            (2, Endianness::Big) => r.read_u16::<BigEndian>()? as u64,
            (2, Endianness::Little) => r.read_u16::<LittleEndian>()? as u64,
            (4, Endianness::Big) => r.read_u32::<BigEndian>()? as u64,
            (4, Endianness::Little) => r.read_u32::<LittleEndian>()? as u64,
            (_, Endianness::Big) => r.read_u64::<BigEndian>()?,
            (_, Endianness::Little) => r.read_u64::<LittleEndian>()?,
        })
    }

    fn write_word(&self, w: &mut Vec<u8>, size: usize, v: u64) -> Result<(), CodecError> {
        match (size, self.endianness) {
            (1, _) => w.write_u8(v as u8)?,
            (2, Endianness::Big) => w.write_u16::<BigEndian>(v as u16)?,
            (2, Endianness::Little) => w.write_u16::<LittleEndian>(v as u16)?,
            (4, Endianness::Big) => w.write_u32::<BigEndian>(v as u32)?,
            (4, Endianness::Little) => w.write_u32::<LittleEndian>(v as u32)?,
            (_, Endianness::Big) => w.write_u64::<BigEndian>(v)?,
            (_, Endianness::Little) => w.write_u64::<LittleEndian>(v)?,
        }
        Ok(())
    }
}

/// Hash combiner: rotate the accumulator left by 5, then XOR.
pub fn combine(acc: u64, h: u64) -> u64 {
    acc.rotate_left(5) ^ h
}

fn mismatch(record: &Record, field: &str, expected: &str) -> CodecError {
    CodecError::TypeMismatch {
        class: record.class.clone(),
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

fn parent_of(record: &Record) -> Result<&Record, CodecError> {
    record
        .parent
        .as_deref()
        .ok_or_else(|| CodecError::MissingParent(record.class.clone()))
}

fn own_field<'r>(record: &'r Record, name: &str) -> Result<&'r Value, CodecError> {
    record.field(name).ok_or_else(|| CodecError::UnknownField {
        class: record.class.clone(),
        field: name.to_string(),
    })
}

fn own_field_mut<'r>(record: &'r mut Record, name: &str) -> Result<&'r mut Value, CodecError> {
    let class = record.class.clone();
    record.field_mut(name).ok_or_else(|| CodecError::UnknownField {
        class,
        field: name.to_string(),
    })
}

fn record_field<'r>(record: &'r Record, name: &str) -> Result<&'r Record, CodecError> {
    own_field(record, name)?
        .as_record()
        .ok_or_else(|| mismatch(record, name, "record"))
}

fn list_field<'r>(record: &'r Record, name: &str) -> Result<&'r [Value], CodecError> {
    own_field(record, name)?
        .as_list()
        .ok_or_else(|| mismatch(record, name, "list"))
}

fn bytes_field<'r>(record: &'r Record, name: &str) -> Result<&'r [u8], CodecError> {
    own_field(record, name)?
        .as_bytes()
        .ok_or_else(|| mismatch(record, name, "bytes"))
}

fn element_record<'r>(owner: &Record, attribute: &str, item: &'r Value) -> Result<&'r Record, CodecError> {
    item.as_record().ok_or_else(|| mismatch(owner, attribute, "record element"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InheritanceIndex;
    use crate::schema::{Attribute, RecordType};
    use std::sync::{Arc, Mutex};

    fn codec() -> Codec {
        let mut index = InheritanceIndex::new();
        index
            .register(
                RecordType::new("Flags").with_attribute(
                    Attribute::primitive("bits", "unsigned byte")
                        .with_bit_field("low", 0b0000_0111)
                        .with_bit_field("high", 0b1111_0000),
                ),
            )
            .unwrap();
        index
            .register(
                RecordType::new("Blob")
                    .with_attribute(Attribute::primitive("n", "unsigned short"))
                    .with_attribute(Attribute::object_list("data", "OneByteChunk", "n", false)),
            )
            .unwrap();
        let schema = index.freeze().unwrap();
        Codec::new(&schema, &TypeMappingTable::rust(), Endianness::Big).unwrap()
    }

    #[test]
    fn bit_field_set_keeps_siblings() {
        let c = codec();
        let mut r = c.instantiate("Flags").unwrap();
        c.set_bit_field(&mut r, "high", 0xA).unwrap();
        c.set_bit_field(&mut r, "low", 5).unwrap();
        assert_eq!(c.bit_field(&r, "high").unwrap(), 0xA);
        assert_eq!(c.bit_field(&r, "low").unwrap(), 5);
        assert_eq!(r.field("bits"), Some(&Value::U8(0xA5)));
    }

    #[test]
    fn truncated_input_notifies_hook_instead_of_failing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let c = codec().with_failure_hook(move |class, e| sink.lock().unwrap().push(format!("{class}: {e}")));
        let r = c.unmarshal("Blob", &[0x00, 0x05, 0x01]).expect("instantiable");
        assert_eq!(r.field("n"), Some(&Value::U16(5)));
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(c.try_unmarshal("Blob", &[0x00, 0x05, 0x01]).is_err());
    }

    #[test]
    fn hash_combiner_rotates_then_xors() {
        assert_eq!(combine(0, 7), 7);
        assert_eq!(combine(1, 0), 32);
        let c = codec();
        let a = c.instantiate("Blob").unwrap();
        let mut b = a.clone();
        assert_eq!(c.hash_code(&a), c.hash_code(&b));
        b.set("data", Value::Bytes(vec![1]));
        assert!(!c.equals(&a, &b));
    }

    #[test]
    fn counter_too_narrow_for_list_is_an_error() {
        let mut index = InheritanceIndex::new();
        index
            .register(
                RecordType::new("Tally")
                    .with_attribute(Attribute::primitive("n", "unsigned byte").counter_for("xs"))
                    .with_attribute(Attribute::object_list("xs", "unsigned byte", "n", true)),
            )
            .unwrap();
        let c = Codec::new(&index.freeze().unwrap(), &TypeMappingTable::rust(), Endianness::Big).unwrap();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let c = c.with_failure_hook(move |_, _| *sink.lock().unwrap() += 1);

        let mut r = c.instantiate("Tally").unwrap();
        r.set("xs", Value::List(vec![Value::U8(1); 255]));
        assert_eq!(c.try_marshal(&r).unwrap()[0], 255);

        r.set("xs", Value::List(vec![Value::U8(1); 256]));
        let err = c.try_marshal(&r).unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch(ref m) if m.contains("Tally.n")), "{err}");
        c.marshal(&r);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
