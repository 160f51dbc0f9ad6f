//! Parse schema text into record types using PEST.
//!
//! See `grammar.pest` for the format. The parser only builds the model; name resolution,
//! counter rules and type mapping are checked later by the index and the emitter.

use crate::index::InheritanceIndex;
use crate::schema::{Attribute, AttributeKind, BitField, InitialValue, LayoutStrategy, RecordType};
use crate::types::parse_integer_literal;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct SchemaParser;

/// Parse schema source into record types, in declaration order.
pub fn parse(source: &str) -> Result<Vec<RecordType>, String> {
    let pairs = SchemaParser::parse(Rule::schema, source).map_err(|e| format!("Parse error: {}", e))?;
    let pair = pairs.into_iter().next().ok_or("Empty parse")?;
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::class_decl)
        .map(build_class)
        .collect()
}

/// Parse and register every record type. Duplicate names are rejected.
pub fn load(source: &str) -> Result<InheritanceIndex, String> {
    let mut index = InheritanceIndex::new();
    for class in parse(source)? {
        index.register(class).map_err(|e| e.to_string())?;
    }
    Ok(index)
}

fn doc_text(docs: &[String]) -> Option<String> {
    if docs.is_empty() {
        None
    } else {
        Some(docs.join("\n"))
    }
}

fn push_doc(docs: &mut Vec<String>, pair: &Pair<Rule>) {
    docs.push(pair.as_str().trim_start_matches('/').trim().to_string());
}

fn build_class(pair: Pair<Rule>) -> Result<RecordType, String> {
    let mut docs = Vec::new();
    let mut class: Option<RecordType> = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::doc => push_doc(&mut docs, &inner),
            Rule::ident => class = Some(RecordType::new(inner.as_str())),
            Rule::parent => {
                let c = class.as_mut().ok_or("class: parent before name")?;
                c.parent = first_ident(inner).ok_or("class: missing parent name")?;
            }
            Rule::class_flag => {
                let c = class.as_mut().ok_or("class: flag before name")?;
                let flag = inner.into_inner().next().ok_or("class: empty flag")?;
                match flag.as_rule() {
                    Rule::abstract_flag => c.is_abstract = true,
                    Rule::alias_flag => c.alias_for = first_ident(flag),
                    Rule::special_flag => {
                        let text = flag
                            .into_inner()
                            .find(|p| p.as_rule() == Rule::string)
                            .and_then(|s| s.into_inner().next())
                            .map(|s| s.as_str().to_string());
                        c.special_case = text;
                    }
                    _ => {}
                }
            }
            Rule::attribute => {
                let c = class.as_mut().ok_or("class: attribute before name")?;
                c.attributes.push(build_attribute(inner)?);
            }
            Rule::init_decl => {
                let c = class.as_mut().ok_or("class: init before name")?;
                let mut it = inner.into_inner().filter(|p| p.as_rule() != Rule::kw_init);
                let attribute = it.next().ok_or("init: attribute")?.as_str().to_string();
                let literal = it.next().ok_or("init: literal")?.as_str().to_string();
                c.initial_values.push(InitialValue { attribute, literal });
            }
            _ => {}
        }
    }
    let mut class = class.ok_or("class: missing name")?;
    class.comment = doc_text(&docs);
    Ok(class)
}

fn first_ident(pair: Pair<Rule>) -> Option<String> {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::ident)
        .map(|p| p.as_str().to_string())
}

fn build_attribute(pair: Pair<Rule>) -> Result<Attribute, String> {
    let mut docs = Vec::new();
    let mut name = None;
    let mut attr: Option<Attribute> = None;
    let mut default = None;
    let mut transient = false;
    let mut counts = None;
    let mut layout = None;
    let mut bits = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::doc => push_doc(&mut docs, &inner),
            Rule::ident => name = Some(inner.as_str().to_string()),
            Rule::kind => {
                let n = name.clone().ok_or("attribute: missing name")?;
                attr = Some(build_kind(&n, inner)?);
            }
            Rule::default => {
                default = inner.into_inner().next().map(|l| l.as_str().to_string());
            }
            Rule::modifier => {
                let m = inner.into_inner().next().ok_or("attribute: empty modifier")?;
                match m.as_rule() {
                    Rule::transient_mod => transient = true,
                    Rule::counts_mod => counts = first_ident(m),
                    Rule::layout_mod => {
                        let n = m
                            .into_inner()
                            .find(|p| p.as_rule() == Rule::num)
                            .ok_or("layout: missing bit count")?;
                        let bits_per_element = parse_num(n.as_str())
                            .and_then(|v| u32::try_from(v).ok())
                            .ok_or_else(|| format!("layout: bad bit count {}", n.as_str()))?;
                        layout = Some(LayoutStrategy::BitCount { bits_per_element });
                    }
                    _ => {}
                }
            }
            Rule::bit_block => {
                for decl in inner.into_inner().filter(|p| p.as_rule() == Rule::bit_decl) {
                    bits.push(build_bit(decl)?);
                }
            }
            _ => {}
        }
    }

    let mut attr = attr.ok_or("attribute: missing kind")?;
    attr.comment = doc_text(&docs);
    attr.default = default;
    attr.serialize = !transient;
    attr.length_counter_for = counts;
    if let Some(strategy) = layout {
        if attr.kind != AttributeKind::Primitive {
            return Err(format!("{}: layout applies to primitive attributes only", attr.name));
        }
        attr.kind = AttributeKind::Custom(strategy);
    }
    for mut bit in bits {
        bit.owner = attr.name.clone();
        attr.bit_fields.push(bit);
    }
    Ok(attr)
}

/// Element type name and whether it is a primitive.
fn build_element(pair: Pair<Rule>) -> Result<(String, bool), String> {
    let inner = pair.into_inner().next().ok_or("element: empty")?;
    let primitive = inner.as_rule() == Rule::primitive_kind;
    let name = inner
        .into_inner()
        .find(|p| matches!(p.as_rule(), Rule::type_text | Rule::ident))
        .map(|p| p.as_str().to_string())
        .ok_or("element: missing type")?;
    Ok((name, primitive))
}

fn build_kind(name: &str, pair: Pair<Rule>) -> Result<Attribute, String> {
    let inner = pair.into_inner().next().ok_or("kind: empty")?;
    match inner.as_rule() {
        Rule::primitive_kind | Rule::class_kind => {
            let rule = inner.as_rule();
            let type_name = inner
                .into_inner()
                .find(|p| matches!(p.as_rule(), Rule::type_text | Rule::ident))
                .map(|p| p.as_str().to_string())
                .ok_or("kind: missing type")?;
            Ok(if rule == Rule::primitive_kind {
                Attribute::primitive(name, type_name)
            } else {
                Attribute::class_ref(name, type_name)
            })
        }
        Rule::array_kind => {
            let mut element = None;
            let mut length = None;
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::element => element = Some(build_element(p)?),
                    Rule::num => {
                        length = parse_num(p.as_str()).and_then(|v| usize::try_from(v).ok());
                    }
                    _ => {}
                }
            }
            let (type_name, primitive) = element.ok_or("array: missing element")?;
            let length = length.ok_or("array: bad length")?;
            Ok(Attribute::fixed_list(name, type_name, length, primitive))
        }
        Rule::list_kind => {
            let mut element = None;
            let mut count_field = None;
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::element => element = Some(build_element(p)?),
                    Rule::ident => count_field = Some(p.as_str().to_string()),
                    _ => {}
                }
            }
            let (type_name, primitive) = element.ok_or("list: missing element")?;
            let count_field = count_field.ok_or("list: missing count field")?;
            Ok(Attribute::object_list(name, type_name, count_field, primitive))
        }
        other => Err(format!("kind: unexpected {:?}", other)),
    }
}

fn build_bit(pair: Pair<Rule>) -> Result<BitField, String> {
    let mut docs = Vec::new();
    let mut name = None;
    let mut mask = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::doc => push_doc(&mut docs, &p),
            Rule::ident => name = Some(p.as_str().to_string()),
            Rule::num => mask = parse_num(p.as_str()),
            _ => {}
        }
    }
    let name = name.ok_or("bit: missing name")?;
    let mask = mask.ok_or_else(|| format!("bit {}: bad mask", name))?;
    Ok(BitField {
        name,
        mask,
        comment: doc_text(&docs),
        owner: String::new(),
    })
}

fn parse_num(text: &str) -> Option<u64> {
    parse_integer_literal(text).and_then(|v| u64::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = r#"
        /// Top of the PDU hierarchy.
        class Pdu abstract {
            protocolVersion: primitive<unsigned byte> = 6;
            length: primitive<unsigned short>;
        }

        class EntityID {
            site: primitive<unsigned short>;
        }

        // plain comments are skipped
        class Sample : Pdu special "fixed header" {
            /// How many ids follow.
            count: primitive<unsigned short> counts ids;
            ids: list<class EntityID> count count;
            origin: array<primitive<float>, 3>;
            scratch: primitive<int> transient;
            flags: primitive<unsigned byte> {
                /// Mode selector.
                bit mode = 0x38;
                bit lit = 0x01;
            }
            init protocolVersion = 7;
        }

        class SampleAlias : Sample alias Sample {
        }
    "#;

    #[test]
    fn parses_classes_in_order() {
        let classes = parse(SRC).unwrap();
        let names: Vec<_> = classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Pdu", "EntityID", "Sample", "SampleAlias"]);
        assert!(classes[0].is_abstract);
        assert!(classes[0].is_root());
        assert_eq!(classes[0].comment.as_deref(), Some("Top of the PDU hierarchy."));
        assert_eq!(classes[0].attributes[0].default.as_deref(), Some("6"));
        assert_eq!(classes[3].alias_for.as_deref(), Some("Sample"));
    }

    #[test]
    fn parses_attribute_kinds() {
        let classes = parse(SRC).unwrap();
        let s = &classes[2];
        assert_eq!(s.parent, "Pdu");
        assert_eq!(s.special_case.as_deref(), Some("fixed header"));

        let count = s.attribute("count").unwrap();
        assert_eq!(count.kind, AttributeKind::Primitive);
        assert_eq!(count.type_name, "unsigned short");
        assert_eq!(count.length_counter_for.as_deref(), Some("ids"));
        assert_eq!(count.comment.as_deref(), Some("How many ids follow."));

        let ids = s.attribute("ids").unwrap();
        assert_eq!(ids.kind, AttributeKind::ObjectList { count_field: "count".into() });
        assert!(!ids.element_is_primitive);

        let origin = s.attribute("origin").unwrap();
        assert_eq!(origin.kind, AttributeKind::PrimitiveList { length: 3 });
        assert!(origin.element_is_primitive);

        assert!(!s.attribute("scratch").unwrap().serialize);

        let flags = s.attribute("flags").unwrap();
        assert_eq!(flags.bit_fields.len(), 2);
        assert_eq!(flags.bit_fields[0].mask, 0x38);
        assert_eq!(flags.bit_fields[0].owner, "flags");
        assert_eq!(flags.bit_fields[0].comment.as_deref(), Some("Mode selector."));

        assert_eq!(s.initial_values.len(), 1);
        assert_eq!(s.initial_values[0].literal, "7");
    }

    #[test]
    fn layout_modifier_makes_custom_kind() {
        let src = "class S { n: primitive<unsigned short> counts d layout bitcount(8); d: list<class OneByteChunk> count n; }";
        let classes = parse(src).unwrap();
        let n = classes[0].attribute("n").unwrap();
        assert_eq!(n.kind, AttributeKind::Custom(LayoutStrategy::BitCount { bits_per_element: 8 }));
        assert!(classes[0].attribute("d").unwrap().is_byte_blob());
    }

    #[test]
    fn rejects_malformed_source() {
        assert!(parse("class { }").is_err());
        assert!(parse("class A { x: primitive<int> }").is_err());
    }

    #[test]
    fn load_rejects_duplicates() {
        let err = load("class A { } class a { }").unwrap_err();
        assert!(err.contains("duplicate"), "{}", err);
    }
}
