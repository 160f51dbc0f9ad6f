//! Rust backend: one module per record type, `byteorder` big-endian streams.
//!
//! A child embeds its parent as a `base` field and derefs to it, so inherited accessors stay
//! reachable and every parent operation is a delegated call.

use super::{snake_case, Backend, CodeWriter};
use crate::emit::{ClassPlan, CountSource, Element, FieldPlan, MemberStep, Storage, WireStep};
use crate::layout::SizeTerm;
use crate::types::{PrimitiveMapping, TypeMappingTable, WireType};

const KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "crate", "else", "enum", "extern", "false", "fn", "for", "if", "impl", "in",
    "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "static", "struct", "super", "trait",
    "true", "type", "unsafe", "use", "where", "while", "async", "await", "dyn", "abstract", "become", "box", "do",
    "final", "macro", "override", "priv", "typeof", "unsized", "virtual", "yield", "try",
];

#[derive(Debug, Clone)]
pub struct RustBackend {
    types: TypeMappingTable,
}

impl Default for RustBackend {
    fn default() -> Self {
        RustBackend {
            types: TypeMappingTable::rust(),
        }
    }
}

impl RustBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for RustBackend {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn types(&self) -> &TypeMappingTable {
        &self.types
    }

    fn file_name(&self, class: &str) -> String {
        format!("{}.rs", snake_case(class))
    }

    fn render(&self, plan: &ClassPlan) -> String {
        let mut w = CodeWriter::new();
        w.line("// Generated by pdugen. Do not edit.");
        w.blank();
        match &plan.alias_for {
            Some(target) => render_alias(&mut w, plan, target),
            None => render_class(&mut w, plan),
        }
        w.finish()
    }

    fn support_files(&self, classes: &[&str]) -> Vec<(String, String)> {
        let mut m = CodeWriter::new();
        m.line("// Generated by pdugen. Do not edit.");
        m.blank();
        m.line("pub mod support;");
        for c in classes {
            m.line(format!("pub mod {};", ident(&snake_case(c))));
        }
        m.blank();
        for c in classes {
            m.line(format!("pub use {}::{};", ident(&snake_case(c)), c));
        }

        let mut s = CodeWriter::new();
        s.line("// Generated by pdugen. Do not edit.");
        s.blank();
        s.line("use std::sync::OnceLock;");
        s.blank();
        s.line("static HOOK: OnceLock<fn(&str, &std::io::Error)> = OnceLock::new();");
        s.blank();
        s.line("/// Install the receiver of marshal/unmarshal failures. Only the first call takes effect.");
        s.open("pub fn set_failure_hook(hook: fn(&str, &std::io::Error)) -> bool {");
        s.line("HOOK.set(hook).is_ok()");
        s.close("}");
        s.blank();
        s.open("pub fn on_failure(class: &str, err: &std::io::Error) {");
        s.open("match HOOK.get() {");
        s.line("Some(hook) => hook(class, err),");
        s.line("None => eprintln!(\"{}: marshal/unmarshal failed: {}\", class, err),");
        s.close("}");
        s.close("}");

        vec![("mod.rs".to_string(), m.finish()), ("support.rs".to_string(), s.finish())]
    }
}

fn ident(name: &str) -> String {
    if KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

fn field_ident(attribute: &str) -> String {
    ident(&snake_case(attribute))
}

fn module_of(class: &str) -> String {
    ident(&snake_case(class))
}

fn literal(mapping: &PrimitiveMapping, text: &str) -> String {
    let t = text.trim();
    if !mapping.wire.is_integer() && !t.contains(['.', 'e', 'E']) {
        format!("{}.0", t)
    } else {
        t.to_string()
    }
}

fn element_type(element: &Element) -> String {
    match element {
        Element::Primitive(m) => m.target_type.clone(),
        Element::Class(c) => c.clone(),
    }
}

fn storage_type(storage: &Storage) -> String {
    match storage {
        Storage::Scalar(m) => m.target_type.clone(),
        Storage::Embedded(c) => c.clone(),
        Storage::FixedArray { element, length } => format!("[{}; {}]", element_type(element), length),
        Storage::List(element) => format!("Vec<{}>", element_type(element)),
        Storage::ByteBlob => "Vec<u8>".to_string(),
    }
}

fn initialiser(field: &FieldPlan) -> String {
    match &field.storage {
        Storage::Scalar(m) => literal(m, field.initial.as_deref().unwrap_or(&m.default_literal)),
        Storage::Embedded(c) => format!("{}::default()", c),
        Storage::FixedArray {
            element: Element::Primitive(m),
            length,
        } => format!("[{}; {}]", literal(m, &m.default_literal), length),
        Storage::FixedArray {
            element: Element::Class(c),
            ..
        } => format!("std::array::from_fn(|_| {}::default())", c),
        Storage::List(_) | Storage::ByteBlob => "Vec::new()".to_string(),
    }
}

fn unsigned_of(wire: WireType) -> &'static str {
    match wire.size() {
        1 => "u8",
        2 => "u16",
        4 => "u32",
        _ => "u64",
    }
}

/// Hash contribution of a scalar expression.
fn scalar_hash(wire: WireType, expr: &str) -> String {
    if wire.is_integer() {
        format!("{} as u64", expr)
    } else {
        format!("{}.to_bits() as u64", expr)
    }
}

fn render_alias(w: &mut CodeWriter, plan: &ClassPlan, target: &str) {
    w.line(format!("use super::{}::{};", module_of(target), target));
    w.blank();
    if let Some(c) = &plan.comment {
        w.doc("///", c);
    }
    w.line(format!("pub type {} = {};", plan.name, target));
}

fn render_class(w: &mut CodeWriter, plan: &ClassPlan) {
    let name = &plan.name;
    w.line("#[allow(unused_imports)]");
    w.line("use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};");
    w.line("use std::io::{Read, Write};");
    w.blank();
    w.line("use super::support::on_failure;");
    for r in plan.references.iter().filter(|r| *r != name) {
        w.line(format!("use super::{}::{};", module_of(r), r));
    }
    w.blank();

    // fields
    if let Some(c) = &plan.comment {
        w.doc("///", c);
    }
    if plan.is_abstract {
        w.line("/// Abstract record type: only sent as part of a subtype.");
    }
    if let Some(s) = &plan.special_case {
        w.doc("/// Special case:", s);
    }
    w.line("#[derive(Debug, Clone)]");
    w.open(format!("pub struct {} {{", name));
    if let Some(parent) = &plan.parent {
        w.line(format!("pub base: {},", parent));
    }
    for f in &plan.fields {
        if let Some(c) = &f.comment {
            w.doc("///", c);
        }
        w.line(format!("{}: {},", field_ident(&f.name), storage_type(&f.storage)));
    }
    w.close("}");
    w.blank();

    // constructor
    w.open(format!("impl Default for {} {{", name));
    w.open("fn default() -> Self {");
    w.line("#[allow(unused_mut)]");
    w.open(format!("let mut value = {} {{", name));
    if let Some(parent) = &plan.parent {
        w.line(format!("base: {}::default(),", parent));
    }
    for f in &plan.fields {
        w.line(format!("{}: {},", field_ident(&f.name), initialiser(f)));
    }
    w.close("};");
    for b in &plan.constructor.bindings {
        let lit = literal(&b.mapping, &b.literal);
        if b.owner == *name {
            w.line(format!("value.{} = {};", field_ident(&b.attribute), lit));
        } else {
            w.line(format!("value.set_{}({});", snake_case(&b.attribute), lit));
        }
    }
    w.line("value");
    w.close("}");
    w.close("}");
    w.blank();

    w.open(format!("impl {} {{", name));
    render_size(w, plan);
    render_accessors(w, plan);
    render_bit_fields(w, plan);
    render_marshal(w, plan);
    render_unmarshal(w, plan);
    w.close("}");
    w.blank();

    render_equality(w, plan);
    w.blank();
    render_hash(w, plan);

    if let Some(parent) = &plan.parent {
        w.blank();
        w.open(format!("impl std::ops::Deref for {} {{", name));
        w.line(format!("type Target = {};", parent));
        w.blank();
        w.open(format!("fn deref(&self) -> &{} {{", parent));
        w.line("&self.base");
        w.close("}");
        w.close("}");
        w.blank();
        w.open(format!("impl std::ops::DerefMut for {} {{", name));
        w.open(format!("fn deref_mut(&mut self) -> &mut {} {{", parent));
        w.line("&mut self.base");
        w.close("}");
        w.close("}");
    }
}

fn render_size(w: &mut CodeWriter, plan: &ClassPlan) {
    w.line("/// Marshalled size in bytes.");
    w.open("pub fn size(&self) -> usize {");
    w.line("let mut size = 0usize;");
    for term in &plan.size.terms {
        let line = match term {
            SizeTerm::Parent { .. } => "size += self.base.size();".to_string(),
            SizeTerm::Fixed { attribute, bytes } => format!("size += {}; // {}", bytes, attribute),
            SizeTerm::Nested { attribute } => format!("size += self.{}.size();", field_ident(attribute)),
            SizeTerm::FixedPrimitiveArray {
                attribute,
                length,
                element_bytes,
            } => format!("size += {} * {}; // {}", length, element_bytes, attribute),
            SizeTerm::FixedClassArray { attribute, .. } | SizeTerm::ClassList { attribute } => format!(
                "size += self.{}.iter().map(|item| item.size()).sum::<usize>();",
                field_ident(attribute)
            ),
            SizeTerm::ByteBlob { attribute } => format!("size += self.{}.len();", field_ident(attribute)),
            SizeTerm::PrimitiveList {
                attribute,
                element_bytes,
            } => format!("size += self.{}.len() * {};", field_ident(attribute), element_bytes),
        };
        w.line(line);
    }
    w.line("size");
    w.close("}");
}

fn render_accessors(w: &mut CodeWriter, plan: &ClassPlan) {
    for a in &plan.accessors {
        let Some(f) = plan.field(&a.attribute) else {
            continue;
        };
        let field = field_ident(&f.name);
        let snake = snake_case(&f.name);
        let ty = storage_type(&f.storage);
        w.blank();
        match &f.storage {
            Storage::Scalar(_) => {
                w.open(format!("pub fn {}(&self) -> {} {{", field, ty));
                w.line(format!("self.{}", field));
                w.close("}");
            }
            Storage::List(element) => {
                w.open(format!("pub fn {}(&self) -> &[{}] {{", field, element_type(element)));
                w.line(format!("&self.{}", field));
                w.close("}");
                w.blank();
                w.open(format!("pub fn {}_mut(&mut self) -> &mut {} {{", snake, ty));
                w.line(format!("&mut self.{}", field));
                w.close("}");
            }
            Storage::ByteBlob => {
                w.open(format!("pub fn {}(&self) -> &[u8] {{", field));
                w.line(format!("&self.{}", field));
                w.close("}");
                w.blank();
                w.open(format!("pub fn {}_mut(&mut self) -> &mut Vec<u8> {{", snake));
                w.line(format!("&mut self.{}", field));
                w.close("}");
            }
            Storage::Embedded(_) | Storage::FixedArray { .. } => {
                w.open(format!("pub fn {}(&self) -> &{} {{", field, ty));
                w.line(format!("&self.{}", field));
                w.close("}");
                w.blank();
                w.open(format!("pub fn {}_mut(&mut self) -> &mut {} {{", snake, ty));
                w.line(format!("&mut self.{}", field));
                w.close("}");
            }
        }
        w.blank();
        if let Some(list) = &a.counts {
            w.line("/// Setting this value does not change the marshalled value: the length of");
            w.line(format!("/// `{}` is written instead. Kept for completeness; do not use it for computations.", list));
        }
        w.open(format!("pub fn set_{}(&mut self, value: {}) {{", snake, ty));
        w.line(format!("self.{} = value;", field));
        w.close("}");
    }
}

fn render_bit_fields(w: &mut CodeWriter, plan: &ClassPlan) {
    for b in &plan.bit_fields {
        let host = field_ident(&b.host);
        let ty = &b.host_type.target_type;
        let uty = unsigned_of(b.host_type.wire);
        let signed = b.host_type.wire.is_signed();
        let raw = |expr: &str| if signed { format!("({} as {})", expr, uty) } else { expr.to_string() };
        let back = |expr: String| if signed { format!("({}) as {}", expr, ty) } else { expr };
        let mask = format!("{:#x}", b.mask);

        w.blank();
        if let Some(c) = &b.comment {
            w.doc("///", c);
        }
        w.open(format!("pub fn {}(&self) -> {} {{", ident(&snake_case(&b.name)), ty));
        w.line(back(format!("({} & {}) >> {}", raw(&format!("self.{}", host)), mask, b.shift)));
        w.close("}");
        w.blank();
        w.open(format!("pub fn set_{}(&mut self, value: {}) {{", snake_case(&b.name), ty));
        w.line(format!("let new_bits = ({} << {}) & {};", raw("value"), b.shift, mask));
        w.line(format!(
            "self.{} = {};",
            host,
            back(format!("({} & !{}) | new_bits", raw(&format!("self.{}", host)), mask))
        ));
        w.close("}");
    }
}

fn count_expr(counter: &str, source: CountSource) -> String {
    match source {
        CountSource::Elements => format!("self.{} as usize", field_ident(counter)),
        CountSource::Bits { bits_per_element } => {
            format!("(self.{} as usize).div_ceil({})", field_ident(counter), bits_per_element)
        }
    }
}

fn render_marshal(w: &mut CodeWriter, plan: &ClassPlan) {
    w.blank();
    w.line("/// Write to `w`. Failures are reported through the failure hook, not returned.");
    w.open("pub fn marshal<W: Write>(&self, w: &mut W) {");
    w.open("if let Err(e) = self.try_marshal(w) {");
    w.line(format!("on_failure(\"{}\", &e);", plan.name));
    w.close("}");
    w.close("}");

    if let Some(auto) = &plan.auto_length {
        w.blank();
        w.line(format!("/// Store `size()` into `{}`, then marshal.", auto.attribute));
        w.open("pub fn marshal_auto_length<W: Write>(&mut self, w: &mut W) {");
        w.line(format!("let size = self.size() as {};", auto.mapping.target_type));
        w.line(format!("self.set_{}(size);", snake_case(&auto.attribute)));
        w.line("self.marshal(w);");
        w.close("}");
    }

    w.blank();
    w.open("pub fn try_marshal<W: Write>(&self, w: &mut W) -> std::io::Result<()> {");
    for step in plan.marshal_steps() {
        match step {
            WireStep::Parent { .. } => w.line("self.base.try_marshal(w)?;"),
            WireStep::Primitive { attribute, mapping } => {
                w.line(format!("w.{}(self.{})?;", mapping.encode_op, field_ident(attribute)))
            }
            WireStep::Counter {
                attribute,
                mapping,
                list,
                source,
            } => {
                let ty = &mapping.target_type;
                let list = field_ident(list);
                let value = match source {
                    CountSource::Elements => format!("self.{}.len() as {}", list, ty),
                    CountSource::Bits { bits_per_element } => {
                        let f = field_ident(attribute);
                        format!(
                            "if self.{f} != 0 {{ self.{f} }} else {{ (self.{list}.len() * {bits_per_element}) as {ty} }}"
                        )
                    }
                };
                w.line(format!("w.{}({})?;", mapping.encode_op, value));
            }
            WireStep::Embedded { attribute, .. } => {
                w.line(format!("self.{}.try_marshal(w)?;", field_ident(attribute)))
            }
            WireStep::FixedArray { attribute, element, .. } | WireStep::List { attribute, element, .. } => {
                w.open(format!("for item in &self.{} {{", field_ident(attribute)));
                match element {
                    Element::Primitive(m) => w.line(format!("w.{}(*item)?;", m.encode_op)),
                    Element::Class(_) => w.line("item.try_marshal(w)?;"),
                }
                w.close("}");
            }
            WireStep::ByteBlob { attribute, .. } => w.line(format!("w.write_all(&self.{})?;", field_ident(attribute))),
        }
    }
    w.line("Ok(())");
    w.close("}");
}

fn render_unmarshal(w: &mut CodeWriter, plan: &ClassPlan) {
    w.blank();
    w.line("/// Read from `r`. Failures are reported through the failure hook, not returned.");
    w.open("pub fn unmarshal<R: Read>(&mut self, r: &mut R) {");
    w.open("if let Err(e) = self.try_unmarshal(r) {");
    w.line(format!("on_failure(\"{}\", &e);", plan.name));
    w.close("}");
    w.close("}");
    w.blank();
    w.open("pub fn try_unmarshal<R: Read>(&mut self, r: &mut R) -> std::io::Result<()> {");
    for step in plan.unmarshal_steps() {
        match step {
            WireStep::Parent { .. } => w.line("self.base.try_unmarshal(r)?;"),
            WireStep::Primitive { attribute, mapping } | WireStep::Counter { attribute, mapping, .. } => {
                w.line(format!("self.{} = r.{}()?;", field_ident(attribute), mapping.decode_op))
            }
            WireStep::Embedded { attribute, .. } => {
                w.line(format!("self.{}.try_unmarshal(r)?;", field_ident(attribute)))
            }
            WireStep::FixedArray { attribute, element, .. } => {
                w.open(format!("for item in self.{}.iter_mut() {{", field_ident(attribute)));
                match element {
                    Element::Primitive(m) => w.line(format!("*item = r.{}()?;", m.decode_op)),
                    Element::Class(_) => w.line("item.try_unmarshal(r)?;"),
                }
                w.close("}");
            }
            WireStep::ByteBlob {
                attribute,
                counter,
                source,
            } => {
                let f = field_ident(attribute);
                w.open("{");
                w.line(format!("let count = {};", count_expr(counter, *source)));
                w.line(format!("self.{} = vec![0; count];", f));
                w.line(format!("r.read_exact(&mut self.{})?;", f));
                w.close("}");
            }
            WireStep::List {
                attribute,
                element,
                counter,
                source,
            } => {
                let f = field_ident(attribute);
                w.line(format!("self.{}.clear();", f));
                w.open(format!("for _ in 0..{} {{", count_expr(counter, *source)));
                match element {
                    Element::Primitive(m) => w.line(format!("self.{}.push(r.{}()?);", f, m.decode_op)),
                    Element::Class(c) => {
                        w.line(format!("let mut item = {}::default();", c));
                        w.line("item.try_unmarshal(r)?;");
                        w.line(format!("self.{}.push(item);", f));
                    }
                }
                w.close("}");
            }
        }
    }
    w.line("Ok(())");
    w.close("}");
}

fn render_equality(w: &mut CodeWriter, plan: &ClassPlan) {
    w.open(format!("impl PartialEq for {} {{", plan.name));
    w.line("/// Compares every attribute, even after a mismatch.");
    w.open("fn eq(&self, other: &Self) -> bool {");
    w.line("let mut ivars_equal = true;");
    for m in &plan.members {
        match m {
            MemberStep::Parent => w.line("ivars_equal &= self.base == other.base;"),
            MemberStep::Scalar { attribute } | MemberStep::Delegate { attribute } => {
                let f = field_ident(attribute);
                w.line(format!("ivars_equal &= self.{f} == other.{f};"));
            }
            MemberStep::FixedArray { attribute, length } => {
                let f = field_ident(attribute);
                w.open(format!("for idx in 0..{} {{", length));
                w.line(format!("ivars_equal &= self.{f}[idx] == other.{f}[idx];"));
                w.close("}");
            }
            MemberStep::List { attribute } => {
                let f = field_ident(attribute);
                w.open(format!("if self.{f}.len() != other.{f}.len() {{"));
                w.line("ivars_equal = false;");
                w.reopen("} else {");
                w.open(format!("for idx in 0..self.{f}.len() {{"));
                w.line(format!("ivars_equal &= self.{f}[idx] == other.{f}[idx];"));
                w.close("}");
                w.close("}");
            }
        }
    }
    w.line("ivars_equal");
    w.close("}");
    w.close("}");
}

fn render_hash(w: &mut CodeWriter, plan: &ClassPlan) {
    w.open(format!("impl {} {{", plan.name));
    w.line("/// Rotate-left-5-then-XOR over the parent hash and every attribute in declared order.");
    w.open("pub fn hash_code(&self) -> u64 {");
    w.line("let mut result = 0u64;");
    for m in &plan.members {
        match m {
            MemberStep::Parent => w.line("result = result.rotate_left(5) ^ self.base.hash_code();"),
            MemberStep::Scalar { attribute } | MemberStep::Delegate { attribute } => {
                let expr = format!("self.{}", field_ident(attribute));
                let h = match plan.field(attribute).map(|f| &f.storage) {
                    Some(Storage::Scalar(m)) => scalar_hash(m.wire, &expr),
                    _ => format!("{}.hash_code()", expr),
                };
                w.line(format!("result = result.rotate_left(5) ^ {};", h));
            }
            MemberStep::FixedArray { attribute, .. } | MemberStep::List { attribute } => {
                let h = match plan.field(attribute).map(|f| &f.storage) {
                    Some(Storage::FixedArray {
                        element: Element::Primitive(m),
                        ..
                    })
                    | Some(Storage::List(Element::Primitive(m))) => scalar_hash(m.wire, "(*item)"),
                    Some(Storage::ByteBlob) => "*item as u64".to_string(),
                    _ => "item.hash_code()".to_string(),
                };
                w.open(format!("for item in &self.{} {{", field_ident(attribute)));
                w.line(format!("result = result.rotate_left(5) ^ {};", h));
                w.close("}");
            }
        }
    }
    w.line("result");
    w.close("}");
    w.close("}");
}
