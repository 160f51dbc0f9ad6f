//! Declarative per-attribute layout overrides for protocol-version quirks.
//!
//! A [`PatchRule`] names a type, one of its attributes, the protocol versions it applies to and
//! the [`LayoutStrategy`] that replaces the generic rule. [`Patcher::apply`] rewrites the
//! attribute's kind to [`AttributeKind::Custom`] before the index is frozen, so every later
//! decision (size, wire steps, rendering) sees the override instead of patching rendered text.

use crate::index::InheritanceIndex;
use crate::schema::{AttributeKind, LayoutStrategy, ProtocolVersion};

#[derive(Debug, Clone, PartialEq)]
pub struct PatchRule {
    pub class: String,
    pub attribute: String,
    pub versions: Vec<ProtocolVersion>,
    pub strategy: LayoutStrategy,
    /// Replaces the attribute comment once applied.
    pub note: Option<String>,
}

impl PatchRule {
    pub fn new(class: &str, attribute: &str, strategy: LayoutStrategy) -> Self {
        PatchRule {
            class: class.to_string(),
            attribute: attribute.to_string(),
            versions: Vec::new(),
            strategy,
            note: None,
        }
    }

    #[must_use]
    pub fn for_version(mut self, version: ProtocolVersion) -> Self {
        self.versions.push(version);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    /// A rule without versions applies to all of them.
    pub fn applies_to(&self, version: ProtocolVersion) -> bool {
        self.versions.is_empty() || self.versions.contains(&version)
    }
}

/// Outcome of one rule against one schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// Rule is scoped to other protocol versions.
    OtherVersion,
    /// Type or attribute not in this schema.
    Absent,
    /// Target is not a plain primitive, so it cannot take a custom layout.
    NotPrimitive,
}

#[derive(Debug, Clone, Default)]
pub struct Patcher {
    rules: Vec<PatchRule>,
}

impl Patcher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rule(mut self, rule: PatchRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    /// Builtin DIS rules: in 1998 two length counters measure bits instead of elements.
    pub fn dis_legacy() -> Self {
        Patcher::new()
            .with_rule(
                PatchRule::new("SignalPdu", "dataLength", LayoutStrategy::BitCount { bits_per_element: 8 })
                    .for_version(ProtocolVersion::Dis1998)
                    .with_note(
                        "Number of bits used from the data field. When zero, every byte of the data field counts as 8 bits.",
                    ),
            )
            .with_rule(
                PatchRule::new(
                    "VariableDatum",
                    "variableDatumLength",
                    LayoutStrategy::BitCount { bits_per_element: 64 },
                )
                .for_version(ProtocolVersion::Dis1998)
                .with_note("Length of the variable datum in bits; the list holds 64-bit chunks."),
            )
    }

    /// Apply every rule that targets `version`. Must run before [`InheritanceIndex::freeze`].
    pub fn apply(&self, index: &mut InheritanceIndex, version: ProtocolVersion) -> Vec<PatchOutcome> {
        self.rules
            .iter()
            .map(|rule| {
                let outcome = apply_rule(rule, index, version);
                if outcome == PatchOutcome::NotPrimitive {
                    tracing::warn!(
                        class = %rule.class,
                        attribute = %rule.attribute,
                        %version,
                        "patch rule target is not a primitive; layout not applied"
                    );
                }
                tracing::debug!(
                    class = %rule.class,
                    attribute = %rule.attribute,
                    %version,
                    ?outcome,
                    "patch rule"
                );
                outcome
            })
            .collect()
    }
}

fn apply_rule(rule: &PatchRule, index: &mut InheritanceIndex, version: ProtocolVersion) -> PatchOutcome {
    if !rule.applies_to(version) {
        return PatchOutcome::OtherVersion;
    }
    let Some(class) = index.find_mut(&rule.class) else {
        return PatchOutcome::Absent;
    };
    let Some(attr) = class.attributes.iter_mut().find(|a| a.name == rule.attribute) else {
        return PatchOutcome::Absent;
    };
    if attr.kind != AttributeKind::Primitive {
        return PatchOutcome::NotPrimitive;
    }
    attr.kind = AttributeKind::Custom(rule.strategy);
    if let Some(note) = &rule.note {
        attr.comment = Some(note.clone());
    }
    PatchOutcome::Applied
}
