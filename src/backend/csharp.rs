//! C# backend: one class per record type over `DataOutputStream` / `DataInputStream`.

use super::{pascal_case, Backend, CodeWriter};
use crate::emit::{ClassPlan, CountSource, Element, FieldPlan, MemberStep, Storage, WireStep};
use crate::layout::SizeTerm;
use crate::types::{PrimitiveMapping, TypeMappingTable};

pub const DEFAULT_NAMESPACE: &str = "DISnet";

#[derive(Debug, Clone)]
pub struct CsharpBackend {
    types: TypeMappingTable,
    namespace: String,
}

impl Default for CsharpBackend {
    fn default() -> Self {
        CsharpBackend {
            types: TypeMappingTable::csharp(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl CsharpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

impl Backend for CsharpBackend {
    fn name(&self) -> &'static str {
        "csharp"
    }

    fn types(&self) -> &TypeMappingTable {
        &self.types
    }

    fn file_name(&self, class: &str) -> String {
        format!("{}.cs", class)
    }

    fn render(&self, plan: &ClassPlan) -> String {
        let mut w = CodeWriter::new();
        w.line("// Generated by pdugen. Do not edit.");
        w.blank();
        w.line("using System;");
        w.line("using System.Collections.Generic;");
        w.line("using DISnet.DataStreamUtilities;");
        w.blank();
        w.line(format!("namespace {}", self.namespace));
        w.open("{");
        match &plan.alias_for {
            Some(target) => {
                summary(&mut w, plan.comment.as_deref());
                w.line(format!("public class {} : {}", plan.name, target));
                w.line("{");
                w.line("}");
            }
            None => render_class(&mut w, plan),
        }
        w.close("}");
        w.finish()
    }
}

fn summary(w: &mut CodeWriter, text: Option<&str>) {
    if let Some(t) = text {
        w.line("/// <summary>");
        w.doc("///", t);
        w.line("/// </summary>");
    }
}

fn backing(attribute: &str) -> String {
    format!("_{}", attribute)
}

fn literal(mapping: &PrimitiveMapping, text: &str) -> String {
    let t = text.trim();
    match mapping.target_type.as_str() {
        "float" => format!("{}f", t),
        "double" if !t.contains(['.', 'e', 'E']) => format!("{}.0", t),
        _ => t.to_string(),
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
        Storage::FixedArray { element, .. } => format!("{}[]", element_type(element)),
        Storage::List(element) => format!("List<{}>", element_type(element)),
        Storage::ByteBlob => "byte[]".to_string(),
    }
}

fn initialiser(field: &FieldPlan) -> Option<String> {
    match &field.storage {
        Storage::Scalar(m) => field.initial.as_deref().map(|lit| literal(m, lit)),
        Storage::Embedded(c) => Some(format!("new {}()", c)),
        Storage::FixedArray { element, length } => Some(format!("new {}[{}]", element_type(element), length)),
        Storage::List(element) => Some(format!("new List<{}>()", element_type(element))),
        Storage::ByteBlob => Some("new byte[0]".to_string()),
    }
}

/// `virtual` on the root of a hierarchy, `override` below it.
fn modifier(plan: &ClassPlan) -> &'static str {
    if plan.is_root() {
        "virtual"
    } else {
        "override"
    }
}

fn render_class(w: &mut CodeWriter, plan: &ClassPlan) {
    let name = &plan.name;
    summary(w, plan.comment.as_deref());
    if let Some(s) = &plan.special_case {
        w.doc("// Special case:", s);
    }
    w.line("[Serializable]");
    let abstract_kw = if plan.is_abstract { "abstract " } else { "" };
    match &plan.parent {
        Some(parent) => w.line(format!("public {}class {} : {}", abstract_kw, name, parent)),
        None => w.line(format!("public {}class {}", abstract_kw, name)),
    }
    w.open("{");

    for f in &plan.fields {
        summary(w, f.comment.as_deref());
        match initialiser(f) {
            Some(init) => w.line(format!("private {} {} = {};", storage_type(&f.storage), backing(&f.name), init)),
            None => w.line(format!("private {} {};", storage_type(&f.storage), backing(&f.name))),
        }
        w.blank();
    }

    // constructor
    w.line("/// <summary>");
    w.line(format!("/// Initializes a new instance of the <see cref=\"{}\"/> class.", name));
    w.line("/// </summary>");
    w.line(format!("public {}()", name));
    w.open("{");
    for b in &plan.constructor.bindings {
        w.line(format!("{} = {};", pascal_case(&b.attribute), literal(&b.mapping, &b.literal)));
    }
    for (attribute, class) in &plan.constructor.eager_arrays {
        let f = backing(attribute);
        w.line(format!("for (int idx = 0; idx < this.{}.Length; idx++)", f));
        w.open("{");
        w.line(format!("this.{}[idx] = new {}();", f, class));
        w.close("}");
    }
    w.close("}");
    w.blank();

    render_size(w, plan);
    render_accessors(w, plan);
    render_bit_fields(w, plan);
    render_marshal(w, plan);
    render_unmarshal(w, plan);
    render_equality(w, plan);
    render_hash(w, plan);
    if plan.is_root() {
        render_failure_event(w);
    }

    w.close("}");
}

fn render_size(w: &mut CodeWriter, plan: &ClassPlan) {
    w.line(format!("public {} int GetMarshalledSize()", modifier(plan)));
    w.open("{");
    w.line("int marshalSize = 0;");
    for term in &plan.size.terms {
        match term {
            SizeTerm::Parent { .. } => w.line("marshalSize = base.GetMarshalledSize();"),
            SizeTerm::Fixed { attribute, bytes } => w.line(format!("marshalSize += {};  // this.{}", bytes, backing(attribute))),
            SizeTerm::Nested { attribute } => w.line(format!(
                "marshalSize += this.{}.GetMarshalledSize();",
                backing(attribute)
            )),
            SizeTerm::FixedPrimitiveArray {
                attribute,
                length,
                element_bytes,
            } => w.line(format!("marshalSize += {} * {};  // {}", length, element_bytes, backing(attribute))),
            SizeTerm::FixedClassArray { attribute, .. } => {
                let f = backing(attribute);
                w.line(format!("for (int idx = 0; idx < this.{}.Length; idx++)", f));
                w.open("{");
                w.line(format!("marshalSize += this.{}[idx].GetMarshalledSize();", f));
                w.close("}");
            }
            SizeTerm::ClassList { attribute } => {
                let f = backing(attribute);
                w.line(format!("for (int idx = 0; idx < this.{}.Count; idx++)", f));
                w.open("{");
                w.line(format!("marshalSize += this.{}[idx].GetMarshalledSize();", f));
                w.close("}");
            }
            SizeTerm::ByteBlob { attribute } => w.line(format!("marshalSize += this.{}.Length;", backing(attribute))),
            SizeTerm::PrimitiveList {
                attribute,
                element_bytes,
            } => w.line(format!("marshalSize += this.{}.Count * {};", backing(attribute), element_bytes)),
        }
    }
    w.line("return marshalSize;");
    w.close("}");
}

fn render_accessors(w: &mut CodeWriter, plan: &ClassPlan) {
    for a in &plan.accessors {
        let Some(f) = plan.field(&a.attribute) else {
            continue;
        };
        w.blank();
        w.line("/// <summary>");
        match &a.counts {
            Some(list) => {
                w.line(format!("/// Gets or sets the {}.", f.name));
                w.line("/// </summary>");
                w.line("/// <remarks>");
                w.line(format!(
                    "/// Note that setting this value will not change the marshalled value. The length of {} is used for that purpose.",
                    backing(list)
                ));
                w.line("/// The property is here for completeness and should not be used for any computations.");
                w.line("/// </remarks>");
            }
            None => {
                w.line(format!("/// Gets or sets the {}.", f.name));
                w.line("/// </summary>");
            }
        }
        w.line(format!("public {} {}", storage_type(&f.storage), pascal_case(&f.name)));
        w.open("{");
        w.line(format!("get {{ return this.{}; }}", backing(&f.name)));
        w.line(format!("set {{ this.{} = value; }}", backing(&f.name)));
        w.close("}");
    }
}

fn render_bit_fields(w: &mut CodeWriter, plan: &ClassPlan) {
    for b in &plan.bit_fields {
        let host = backing(&b.host);
        let ty = &b.host_type.target_type;
        w.blank();
        summary(w, b.comment.as_deref());
        w.line(format!("public {} {}", ty, pascal_case(&b.name)));
        w.open("{");
        w.line(format!(
            "get {{ return ({})((this.{} & {:#x}) >> {}); }}",
            ty, host, b.mask, b.shift
        ));
        w.line("set");
        w.open("{");
        w.line(format!("long newBits = ((long)value << {}) & {:#x};", b.shift, b.mask));
        w.line(format!(
            "this.{} = unchecked(({})((this.{} & ~{:#x}L) | newBits));",
            host, ty, host, b.mask
        ));
        w.close("}");
        w.close("}");
    }
}

fn count_expr(counter: &str, source: CountSource) -> String {
    let c = backing(counter);
    match source {
        CountSource::Elements => format!("(int)this.{}", c),
        CountSource::Bits { bits_per_element: b } => {
            format!("(int)(this.{c} / {b}) + (this.{c} % {b} > 0 ? 1 : 0)")
        }
    }
}

fn open_try(w: &mut CodeWriter, stream: &str) {
    w.line(format!("if ({} != null)", stream));
    w.open("{");
    w.line("try");
    w.open("{");
}

fn close_try(w: &mut CodeWriter) {
    w.close("}");
    w.line("catch (Exception e)");
    w.open("{");
    w.line("this.OnException(e);");
    w.close("}");
    w.close("}");
}

fn render_marshal(w: &mut CodeWriter, plan: &ClassPlan) {
    if let Some(auto) = &plan.auto_length {
        w.blank();
        w.line("/// <summary>");
        w.line(format!("/// Sets {} to the marshalled size, then marshals.", pascal_case(&auto.attribute)));
        w.line("/// </summary>");
        let modifier = if auto.inherited { "override" } else { "virtual" };
        w.line(format!("public {} void MarshalAutoLengthSet(DataOutputStream dos)", modifier));
        w.open("{");
        w.line(format!(
            "this.{} = ({})this.GetMarshalledSize();",
            pascal_case(&auto.attribute),
            auto.mapping.target_type
        ));
        w.line("this.Marshal(dos);");
        w.close("}");
    }

    w.blank();
    w.line(format!("public {} void Marshal(DataOutputStream dos)", modifier(plan)));
    w.open("{");
    if !plan.is_root() {
        w.line("base.Marshal(dos);");
    }
    open_try(w, "dos");
    for step in plan.marshal_steps() {
        match step {
            WireStep::Parent { .. } => {}
            WireStep::Primitive { attribute, mapping } => w.line(format!(
                "dos.{}(({})this.{});",
                mapping.encode_op,
                mapping.target_type,
                backing(attribute)
            )),
            WireStep::Counter {
                attribute,
                mapping,
                list,
                source,
            } => {
                let l = backing(list);
                let len = if matches!(plan.field(list).map(|f| &f.storage), Some(Storage::ByteBlob)) {
                    format!("this.{}.Length", l)
                } else {
                    format!("this.{}.Count", l)
                };
                let value = match source {
                    CountSource::Elements => len,
                    CountSource::Bits { bits_per_element } => {
                        let c = backing(attribute);
                        format!("(this.{c} == 0 && {len} > 0) ? {len} * {bits_per_element} : this.{c}")
                    }
                };
                w.line(format!("dos.{}(({})({}));", mapping.encode_op, mapping.target_type, value));
            }
            WireStep::Embedded { attribute, .. } => w.line(format!("this.{}.Marshal(dos);", backing(attribute))),
            WireStep::FixedArray { attribute, element, .. } | WireStep::List { attribute, element, .. } => {
                let f = backing(attribute);
                let bound = if matches!(step, WireStep::FixedArray { .. }) { "Length" } else { "Count" };
                w.line(format!("for (int idx = 0; idx < this.{}.{}; idx++)", f, bound));
                w.open("{");
                match element {
                    Element::Primitive(m) => w.line(format!("dos.{}(this.{}[idx]);", m.encode_op, f)),
                    Element::Class(_) => w.line(format!("this.{}[idx].Marshal(dos);", f)),
                }
                w.close("}");
            }
            WireStep::ByteBlob { attribute, .. } => w.line(format!("dos.WriteByte(this.{});", backing(attribute))),
        }
    }
    close_try(w);
    w.close("}");
}

fn render_unmarshal(w: &mut CodeWriter, plan: &ClassPlan) {
    w.blank();
    w.line(format!("public {} void Unmarshal(DataInputStream dis)", modifier(plan)));
    w.open("{");
    if !plan.is_root() {
        w.line("base.Unmarshal(dis);");
    }
    open_try(w, "dis");
    for step in plan.unmarshal_steps() {
        match step {
            WireStep::Parent { .. } => {}
            WireStep::Primitive { attribute, mapping } | WireStep::Counter { attribute, mapping, .. } => {
                w.line(format!("this.{} = dis.{}();", backing(attribute), mapping.decode_op))
            }
            WireStep::Embedded { attribute, .. } => w.line(format!("this.{}.Unmarshal(dis);", backing(attribute))),
            WireStep::FixedArray { attribute, element, .. } => {
                let f = backing(attribute);
                w.line(format!("for (int idx = 0; idx < this.{}.Length; idx++)", f));
                w.open("{");
                match element {
                    Element::Primitive(m) => w.line(format!("this.{}[idx] = dis.{}();", f, m.decode_op)),
                    Element::Class(_) => w.line(format!("this.{}[idx].Unmarshal(dis);", f)),
                }
                w.close("}");
            }
            WireStep::ByteBlob {
                attribute,
                counter,
                source,
            } => w.line(format!(
                "this.{} = dis.ReadByteArray({});",
                backing(attribute),
                count_expr(counter, *source)
            )),
            WireStep::List {
                attribute,
                element,
                counter,
                source,
            } => {
                let f = backing(attribute);
                w.line(format!("this.{}.Clear();", f));
                w.line(format!("int {}Count = {};", attribute, count_expr(counter, *source)));
                w.line(format!("for (int idx = 0; idx < {}Count; idx++)", attribute));
                w.open("{");
                match element {
                    Element::Primitive(m) => w.line(format!("this.{}.Add(dis.{}());", f, m.decode_op)),
                    Element::Class(c) => {
                        w.line(format!("{} anX = new {}();", c, c));
                        w.line("anX.Unmarshal(dis);");
                        w.line(format!("this.{}.Add(anX);", f));
                    }
                }
                w.close("}");
            }
        }
    }
    close_try(w);
    w.close("}");
}

fn render_equality(w: &mut CodeWriter, plan: &ClassPlan) {
    let name = &plan.name;
    w.blank();
    w.line("public override bool Equals(object obj)");
    w.open("{");
    w.line(format!("return this.Equals(obj as {});", name));
    w.close("}");
    w.blank();
    w.line("/// <summary>");
    w.line("/// Compares every attribute, even after a mismatch.");
    w.line("/// </summary>");
    w.line(format!("public bool Equals({} obj)", name));
    w.open("{");
    w.line("bool ivarsEqual = true;");
    w.blank();
    w.line("if (obj == null || obj.GetType() != this.GetType())");
    w.open("{");
    w.line("return false;");
    w.close("}");
    w.blank();
    for m in &plan.members {
        match m {
            MemberStep::Parent => w.line("ivarsEqual = base.Equals(obj);"),
            MemberStep::Scalar { attribute } => {
                let f = backing(attribute);
                w.line(format!("if (this.{f} != obj.{f})"));
                w.open("{");
                w.line("ivarsEqual = false;");
                w.close("}");
            }
            MemberStep::Delegate { attribute } => {
                let f = backing(attribute);
                w.line(format!("if (!this.{f}.Equals(obj.{f}))"));
                w.open("{");
                w.line("ivarsEqual = false;");
                w.close("}");
            }
            MemberStep::FixedArray { attribute, length } => {
                let f = backing(attribute);
                w.line(format!("for (int idx = 0; idx < {}; idx++)", length));
                w.open("{");
                w.line(format!("if (!this.{f}[idx].Equals(obj.{f}[idx]))"));
                w.open("{");
                w.line("ivarsEqual = false;");
                w.close("}");
                w.close("}");
            }
            MemberStep::List { attribute } => {
                let f = backing(attribute);
                let count = if matches!(plan.field(attribute).map(|f| &f.storage), Some(Storage::ByteBlob)) {
                    "Length"
                } else {
                    "Count"
                };
                w.line(format!("if (this.{f}.{count} != obj.{f}.{count})"));
                w.open("{");
                w.line("ivarsEqual = false;");
                w.close("}");
                w.line("else");
                w.open("{");
                w.line(format!("for (int idx = 0; idx < this.{f}.{count}; idx++)"));
                w.open("{");
                w.line(format!("if (!this.{f}[idx].Equals(obj.{f}[idx]))"));
                w.open("{");
                w.line("ivarsEqual = false;");
                w.close("}");
                w.close("}");
                w.close("}");
            }
        }
    }
    w.blank();
    w.line("return ivarsEqual;");
    w.close("}");
}

fn render_hash(w: &mut CodeWriter, plan: &ClassPlan) {
    w.blank();
    w.line("/// <summary>");
    w.line("/// HashCode Helper: rotates left by 5.");
    w.line("/// </summary>");
    w.line("private static int GenerateHash(int h)");
    w.open("{");
    w.line("return (int)(((uint)h << 5) | ((uint)h >> 27));");
    w.close("}");
    w.blank();
    w.line("public override int GetHashCode()");
    w.open("{");
    w.line("int result = 0;");
    w.blank();
    for m in &plan.members {
        match m {
            MemberStep::Parent => w.line("result = GenerateHash(result) ^ base.GetHashCode();"),
            MemberStep::Scalar { attribute } | MemberStep::Delegate { attribute } => w.line(format!(
                "result = GenerateHash(result) ^ this.{}.GetHashCode();",
                backing(attribute)
            )),
            MemberStep::FixedArray { attribute, .. } | MemberStep::List { attribute } => {
                let f = backing(attribute);
                let count = match plan.field(attribute).map(|f| &f.storage) {
                    Some(Storage::ByteBlob) | Some(Storage::FixedArray { .. }) => "Length",
                    _ => "Count",
                };
                w.line(format!("for (int idx = 0; idx < this.{f}.{count}; idx++)"));
                w.open("{");
                w.line(format!("result = GenerateHash(result) ^ this.{f}[idx].GetHashCode();"));
                w.close("}");
            }
        }
    }
    w.blank();
    w.line("return result;");
    w.close("}");
}

fn render_failure_event(w: &mut CodeWriter) {
    w.blank();
    w.line("/// <summary>");
    w.line("/// Raised when marshal or unmarshal fails; the failure is not rethrown.");
    w.line("/// </summary>");
    w.line("public event EventHandler<UnhandledExceptionEventArgs> ExceptionOccured;");
    w.blank();
    w.line("protected void OnException(Exception e)");
    w.open("{");
    w.line("EventHandler<UnhandledExceptionEventArgs> handler = this.ExceptionOccured;");
    w.line("if (handler != null)");
    w.open("{");
    w.line("handler(this, new UnhandledExceptionEventArgs(e, false));");
    w.close("}");
    w.close("}");
}
