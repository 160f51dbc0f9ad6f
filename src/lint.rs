//! Whole-schema consistency report.
//!
//! Unlike [`crate::generate`], which aborts on the first fatal error, the linter keeps going:
//! it reports every duplicate name, applies the version-scoped patch rules, drops types whose inheritance cannot be resolved (and,
//! silently, their descendants), then runs the emitter over every remaining type. Each type
//! contributes at most one fatal finding plus all of its non-fatal diagnostics.

use crate::emit::{CodeEmitter, DiagnosticRule, EmitOptions};
use crate::error::SchemaError;
use crate::index::InheritanceIndex;
use crate::patch::{PatchOutcome, Patcher};
use crate::schema::{ProtocolVersion, RecordType};
use crate::types::TypeMappingTable;
use std::collections::HashSet;

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Identifies which rule produced the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintRule {
    /// Two types share a name (case-insensitive).
    DuplicateType,
    /// Unknown parent or inheritance cycle.
    Inheritance,
    /// Primitive type name missing from the backend's mapping table.
    TypeMapping,
    /// Class reference, element type or alias target that names no type.
    ClassReference,
    /// Fixed list with zero length.
    ArrayLength,
    /// Variable list and its length counter disagree.
    ListCounter,
    /// Bad mask, overlap, or host that cannot carry bits.
    BitField,
    CustomLayout,
    /// Initial value dropped.
    InitialValue,
}

impl From<&SchemaError> for LintRule {
    fn from(e: &SchemaError) -> Self {
        match e {
            SchemaError::DuplicateClass(_) => LintRule::DuplicateType,
            SchemaError::UnknownParent { .. } | SchemaError::InheritanceCycle { .. } => LintRule::Inheritance,
            SchemaError::UnknownType { .. } => LintRule::TypeMapping,
            SchemaError::UnresolvedClass { .. } => LintRule::ClassReference,
            SchemaError::EmptyArray { .. } => LintRule::ArrayLength,
            SchemaError::UnknownCountField { .. }
            | SchemaError::CounterAfterList { .. }
            | SchemaError::CounterNotPrimitive { .. }
            | SchemaError::CounterNotSerialized { .. }
            | SchemaError::CounterShared { .. }
            | SchemaError::CounterMismatch { .. } => LintRule::ListCounter,
            SchemaError::BitFieldMask { .. } | SchemaError::BitFieldOverlap { .. } => LintRule::BitField,
            SchemaError::InvalidCustomLayout { .. } => LintRule::CustomLayout,
        }
    }
}

impl From<DiagnosticRule> for LintRule {
    fn from(rule: DiagnosticRule) -> Self {
        match rule {
            DiagnosticRule::UnresolvedInitialValue
            | DiagnosticRule::InitialValueNotPrimitive
            | DiagnosticRule::InitialValueLiteral => LintRule::InitialValue,
            DiagnosticRule::BitFieldOnNonPrimitive => LintRule::BitField,
        }
    }
}

/// A single lint message, located by type and attribute.
#[derive(Debug, Clone)]
pub struct LintMessage {
    pub class: String,
    pub attribute: Option<String>,
    pub rule: LintRule,
    pub severity: Severity,
    pub message: String,
}

impl LintMessage {
    fn fatal(e: &SchemaError) -> Self {
        LintMessage {
            class: e.class().to_string(),
            attribute: e.attribute().map(str::to_string),
            rule: LintRule::from(e),
            severity: Severity::Error,
            message: e.to_string(),
        }
    }

    /// `Class` or `Class.attribute`.
    pub fn location(&self) -> String {
        match &self.attribute {
            Some(a) => format!("{}.{}", self.class, a),
            None => self.class.clone(),
        }
    }
}

/// Run every check on the schema as written. Messages follow declaration order of the offending
/// types.
pub fn lint(classes: &[RecordType], types: &TypeMappingTable, options: &EmitOptions) -> Vec<LintMessage> {
    lint_patched(classes, types, options, &Patcher::new(), ProtocolVersion::default())
}

/// Like [`lint`], but first applies `patcher` for `version`, as generation does. A rule whose
/// target cannot take a custom layout is reported as a warning.
pub fn lint_patched(
    classes: &[RecordType],
    types: &TypeMappingTable,
    options: &EmitOptions,
    patcher: &Patcher,
    version: ProtocolVersion,
) -> Vec<LintMessage> {
    let mut out = Vec::new();
    let mut index = InheritanceIndex::new();
    for class in classes {
        if let Err(e) = index.register(class.clone()) {
            out.push(LintMessage::fatal(&e));
        }
    }

    let outcomes = patcher.apply(&mut index, version);
    for (rule, outcome) in patcher.rules().iter().zip(outcomes) {
        if outcome == PatchOutcome::NotPrimitive {
            out.push(LintMessage {
                class: rule.class.clone(),
                attribute: Some(rule.attribute.clone()),
                rule: LintRule::CustomLayout,
                severity: Severity::Warning,
                message: format!("{} layout not applied: target is not a primitive", rule.strategy),
            });
        }
    }

    let mut dropped: HashSet<String> = HashSet::new();
    let schema = loop {
        match index.clone().freeze() {
            Ok(schema) => break schema,
            Err(e) => {
                let class = e.class().to_string();
                // Children of a dropped type would only repeat the root cause.
                let cascaded = matches!(&e, SchemaError::UnknownParent { parent, .. }
                    if dropped.contains(&parent.to_ascii_lowercase()));
                if !cascaded {
                    out.push(LintMessage::fatal(&e));
                }
                dropped.insert(class.to_ascii_lowercase());
                index = without(&index, &class);
            }
        }
    };

    let emitter = CodeEmitter::new(&schema, types, options);
    for id in schema.ids() {
        match emitter.emit(id) {
            Ok(emission) => out.extend(emission.diagnostics.into_iter().map(|d| LintMessage {
                class: d.class,
                attribute: Some(d.attribute),
                rule: d.rule.into(),
                severity: Severity::Warning,
                message: d.message,
            })),
            Err(e) => out.push(LintMessage::fatal(&e)),
        }
    }
    out
}

/// True when any message is an error.
pub fn has_errors(messages: &[LintMessage]) -> bool {
    messages.iter().any(|m| m.severity == Severity::Error)
}

fn without(index: &InheritanceIndex, class: &str) -> InheritanceIndex {
    let mut next = InheritanceIndex::new();
    for c in index.iter().filter(|c| !c.name.eq_ignore_ascii_case(class)) {
        // names were unique in `index`
        let _ = next.register(c.clone());
    }
    next
}
