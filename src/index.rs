//! Registry of record types and the resolved inheritance graph used during emission.
//!
//! Types are registered into an [`InheritanceIndex`] while the schema loads. Once every type is
//! present, [`InheritanceIndex::freeze`] resolves parent names to direct references and yields a
//! read-only [`ResolvedSchema`] that emission shares across threads.

use crate::error::SchemaError;
use crate::schema::{Attribute, RecordType};
use std::collections::HashMap;

/// Position of a record type inside a [`ResolvedSchema`].
pub type ClassId = usize;

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Name-keyed registry of all record types (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct InheritanceIndex {
    classes: Vec<RecordType>,
    by_name: HashMap<String, ClassId>,
}

impl InheritanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: RecordType) -> Result<ClassId, SchemaError> {
        let id = self.classes.len();
        let k = key(&class.name);
        if self.by_name.contains_key(&k) {
            return Err(SchemaError::DuplicateClass(class.name));
        }
        self.by_name.insert(k, id);
        self.classes.push(class);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<&RecordType> {
        self.by_name.get(&key(name)).map(|&i| &self.classes[i])
    }

    pub(crate) fn find_mut(&mut self, name: &str) -> Option<&mut RecordType> {
        let i = *self.by_name.get(&key(name))?;
        self.classes.get_mut(i)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordType> {
        self.classes.iter()
    }

    /// Resolve every parent reference. Fails on unknown parents and cycles.
    pub fn freeze(self) -> Result<ResolvedSchema, SchemaError> {
        let mut parents = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            if class.is_root() {
                parents.push(None);
                continue;
            }
            let parent = self.by_name.get(&key(&class.parent)).copied().ok_or_else(|| {
                SchemaError::UnknownParent {
                    class: class.name.clone(),
                    parent: class.parent.clone(),
                }
            })?;
            parents.push(Some(parent));
        }
        for (id, class) in self.classes.iter().enumerate() {
            let mut steps = 0;
            let mut cur = parents[id];
            while let Some(p) = cur {
                steps += 1;
                if p == id || steps > self.classes.len() {
                    return Err(SchemaError::InheritanceCycle {
                        class: class.name.clone(),
                    });
                }
                cur = parents[p];
            }
        }
        tracing::debug!(types = self.classes.len(), "schema frozen");
        Ok(ResolvedSchema {
            classes: self.classes,
            by_name: self.by_name,
            parents,
        })
    }
}

/// Frozen schema: every type holds a direct reference to its parent.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    classes: Vec<RecordType>,
    by_name: HashMap<String, ClassId>,
    parents: Vec<Option<ClassId>>,
}

impl ResolvedSchema {
    /// Case-insensitive lookup.
    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(&key(name)).copied()
    }

    pub fn class(&self, name: &str) -> Option<&RecordType> {
        self.find(name).map(|id| &self.classes[id])
    }

    pub fn get(&self, id: ClassId) -> &RecordType {
        &self.classes[id]
    }

    pub fn parent(&self, id: ClassId) -> Option<ClassId> {
        self.parents[id]
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Ids in registration order.
    pub fn ids(&self) -> std::ops::Range<ClassId> {
        0..self.classes.len()
    }

    /// `id` itself, then each ancestor up to the root.
    pub fn ancestor_chain(&self, id: ClassId) -> AncestorChain<'_> {
        AncestorChain {
            schema: self,
            next: Some(id),
        }
    }

    /// Search `id` and its ancestors outward for an attribute named `name`.
    pub fn find_attribute(&self, id: ClassId, name: &str) -> Option<(ClassId, &Attribute)> {
        self.ancestor_chain(id)
            .find_map(|(cid, class)| class.attribute(name).map(|a| (cid, a)))
    }

    /// True if `ancestor` (by name) appears in the chain strictly above `id`.
    pub fn descends_from(&self, id: ClassId, ancestor: &str) -> bool {
        self.ancestor_chain(id)
            .skip(1)
            .any(|(_, c)| c.name.eq_ignore_ascii_case(ancestor))
    }
}

/// Lazy walk from a type up to the root.
pub struct AncestorChain<'a> {
    schema: &'a ResolvedSchema,
    next: Option<ClassId>,
}

impl<'a> Iterator for AncestorChain<'a> {
    type Item = (ClassId, &'a RecordType);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.schema.parents[id];
        Some((id, &self.schema.classes[id]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_levels() -> ResolvedSchema {
        let mut index = InheritanceIndex::new();
        index
            .register(RecordType::new("Pdu").with_attribute(Attribute::primitive("length", "unsigned short")))
            .unwrap();
        index
            .register(RecordType::new("EntityPdu").with_parent("pdu"))
            .unwrap();
        index
            .register(
                RecordType::new("EntityStatePdu")
                    .with_parent("EntityPdu")
                    .with_attribute(Attribute::primitive("marking", "unsigned byte")),
            )
            .unwrap();
        index.freeze().unwrap()
    }

    #[test]
    fn find_is_case_insensitive() {
        let s = three_levels();
        assert_eq!(s.find("entitystatepdu"), Some(2));
        assert!(s.find("Missing").is_none());
    }

    #[test]
    fn ancestor_chain_walks_to_root() {
        let s = three_levels();
        let names: Vec<_> = s.ancestor_chain(2).map(|(_, c)| c.name.as_str()).collect();
        assert_eq!(names, vec!["EntityStatePdu", "EntityPdu", "Pdu"]);
    }

    #[test]
    fn find_attribute_searches_ancestors() {
        let s = three_levels();
        let (owner, attr) = s.find_attribute(2, "length").expect("inherited");
        assert_eq!(owner, 0);
        assert_eq!(attr.type_name, "unsigned short");
        assert!(s.find_attribute(2, "nope").is_none());
        assert!(s.descends_from(2, "PDU"));
        assert!(!s.descends_from(0, "Pdu"));
    }

    #[test]
    fn duplicate_and_unknown_parent_are_rejected() {
        let mut index = InheritanceIndex::new();
        index.register(RecordType::new("A")).unwrap();
        assert!(matches!(
            index.register(RecordType::new("a")),
            Err(SchemaError::DuplicateClass(_))
        ));
        index.register(RecordType::new("B").with_parent("Nope")).unwrap();
        assert!(matches!(index.freeze(), Err(SchemaError::UnknownParent { .. })));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut index = InheritanceIndex::new();
        index.register(RecordType::new("A").with_parent("B")).unwrap();
        index.register(RecordType::new("B").with_parent("A")).unwrap();
        assert!(matches!(index.freeze(), Err(SchemaError::InheritanceCycle { .. })));
    }
}
