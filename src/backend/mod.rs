//! Pluggable output backends.
//!
//! A backend supplies its [`TypeMappingTable`] and spells a [`ClassPlan`] in one target
//! language. It never changes sizing, ordering or counter decisions; those are fixed in the
//! plan. Every unit is rendered in the same order: fields, constructor, size, accessors,
//! bit-field accessors, marshal, unmarshal, equality, hash.

pub mod csharp;
pub mod rust;

pub use csharp::CsharpBackend;
pub use rust::RustBackend;

use crate::emit::ClassPlan;
use crate::types::TypeMappingTable;

pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn types(&self) -> &TypeMappingTable;

    /// Output file name for one record type.
    fn file_name(&self, class: &str) -> String;

    fn render(&self, plan: &ClassPlan) -> String;

    /// Shared files written next to the units (module index, failure hook): (file name, source).
    fn support_files(&self, _classes: &[&str]) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Indented line writer used by the renderers.
#[derive(Debug, Default)]
pub struct CodeWriter {
    out: String,
    indent: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push_str("    ");
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Write `text` and indent what follows.
    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.indent += 1;
    }

    /// Dedent, then write `text`.
    pub fn close(&mut self, text: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(text);
    }

    /// Dedent, write `text`, indent again (`} else {`).
    pub fn reopen(&mut self, text: impl AsRef<str>) {
        self.close(text);
        self.indent += 1;
    }

    /// One `///` line per comment line.
    pub fn doc(&mut self, prefix: &str, comment: &str) {
        for l in comment.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.line(format!("{} {}", prefix, l));
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// `dataLength` / `EntityID` -> `data_length` / `entity_id`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_ascii_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out
}

/// `dataLength` -> `DataLength`.
pub fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
