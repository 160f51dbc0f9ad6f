//! Rendered output shape for both backends and the directory writer.

use pdugen::generate::{run, write_units, BackendKind, GeneratorConfig};
use pdugen::{load, ProtocolVersion};

const SCHEMA: &str = r#"
/// Header shared by every PDU.
class Pdu abstract {
    protocolVersion: primitive<unsigned byte> = 7;
    length: primitive<unsigned short>;
}

class EntityID {
    site: primitive<unsigned short>;
}

class Child : Pdu special "counter written from the list" {
    tagCount: primitive<unsigned short> counts tags;
    tags: list<primitive<unsigned byte>> count tagCount;
    owner: class EntityID;
    spin: primitive<float>;
    flags: primitive<unsigned byte> {
        bit mode = 0x38;
    }
    init spin = 1;
}

class ChildAlias : Child alias Child {
}

class SignalPdu : Pdu {
    dataLength: primitive<unsigned short> counts data;
    data: list<class OneByteChunk> count dataLength;
}
"#;

fn generate(backend: BackendKind) -> pdugen::Generation {
    let config = GeneratorConfig {
        backend,
        ..GeneratorConfig::default()
    };
    run(load(SCHEMA).expect("load"), &config).expect("generate")
}

fn source<'g>(g: &'g pdugen::Generation, class: &str) -> &'g str {
    &g.unit(class).expect("unit").source
}

/// Byte offset of each needle, asserting they appear in the given order.
fn assert_in_order(src: &str, needles: &[&str]) {
    let mut from = 0;
    for n in needles {
        let at = src[from..]
            .find(n)
            .unwrap_or_else(|| panic!("{:?} missing (or out of order) in:\n{}", n, src));
        from += at + n.len();
    }
}

#[test]
fn rust_units_follow_fixed_section_order() {
    let g = generate(BackendKind::Rust);
    let src = source(&g, "Child");
    assert_in_order(
        src,
        &[
            "pub struct Child {",
            "pub base: Pdu,",
            "impl Default for Child {",
            "pub fn size(&self) -> usize {",
            "pub fn tag_count(&self)",
            "pub fn mode(&self)",
            "pub fn try_marshal<W: Write>",
            "pub fn try_unmarshal<R: Read>",
            "impl PartialEq for Child {",
            "pub fn hash_code(&self) -> u64 {",
        ],
    );
}

#[test]
fn rust_counter_is_written_from_the_list() {
    let g = generate(BackendKind::Rust);
    let src = source(&g, "Child");
    assert!(src.contains("self.base.try_marshal(w)?;"), "{src}");
    assert!(src.contains("w.write_u16::<BigEndian>(self.tags.len() as u16)?;"), "{src}");
    assert!(src.contains("for _ in 0..self.tag_count as usize {"), "{src}");
    assert!(src.contains("value.spin = 1.0;"), "{src}");
    assert!(src.contains("ivars_equal &="), "{src}");
    assert!(src.contains("rotate_left(5)"), "{src}");
    assert!(src.contains("/// Special case: counter written from the list"), "{src}");
    assert!(src.contains("pub fn marshal_auto_length<W: Write>"), "{src}");
}

#[test]
fn rust_alias_and_support_files() {
    let g = generate(BackendKind::Rust);
    assert!(source(&g, "ChildAlias").contains("pub type ChildAlias = Child;"));
    let names: Vec<_> = g.support.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["mod.rs", "support.rs"]);
    let module = &g.support[0].1;
    assert!(module.contains("pub mod child_alias;"));
    assert!(module.contains("pub use entity_id::EntityID;"));
}

#[test]
fn csharp_units_use_properties_and_virtual_root() {
    let g = generate(BackendKind::Csharp);
    let pdu = source(&g, "Pdu");
    assert!(pdu.contains("public abstract class Pdu"), "{pdu}");
    assert!(pdu.contains("public virtual void Marshal(DataOutputStream dos)"), "{pdu}");
    assert!(pdu.contains("public event EventHandler<UnhandledExceptionEventArgs> ExceptionOccured;"));
    assert!(pdu.contains("/// Header shared by every PDU."));

    let child = source(&g, "Child");
    assert_in_order(
        child,
        &[
            "public class Child : Pdu",
            "public Child()",
            "public override int GetMarshalledSize()",
            "public ushort TagCount",
            "public byte Mode",
            "public virtual void MarshalAutoLengthSet(DataOutputStream dos)",
            "public override void Marshal(DataOutputStream dos)",
            "public override void Unmarshal(DataInputStream dis)",
            "public override bool Equals(object obj)",
            "public override int GetHashCode()",
        ],
    );
    assert!(child.contains("base.Marshal(dos);"));
    assert!(child.contains("this.OnException(e);"));
    assert!(child.contains("Spin = 1f;"), "{child}");
    assert!(!child.contains("ExceptionOccured"), "only the root declares the event");
    assert_eq!(g.unit("Child").map(|u| u.file_name.as_str()), Some("Child.cs"));
    assert!(g.support.is_empty());
}

#[test]
fn csharp_legacy_counter_counts_bits() {
    let config = GeneratorConfig {
        backend: BackendKind::Csharp,
        protocol: ProtocolVersion::Dis1998,
        ..GeneratorConfig::default()
    };
    let g = run(load(SCHEMA).unwrap(), &config).unwrap();
    let src = source(&g, "SignalPdu");
    assert!(src.contains("this._data.Length * 8"), "{src}");
    assert!(src.contains("(int)(this._dataLength / 8) + (this._dataLength % 8 > 0 ? 1 : 0)"), "{src}");

    let modern = generate(BackendKind::Csharp);
    let src = source(&modern, "SignalPdu");
    assert!(src.contains("dos.WriteUnsignedShort((ushort)(this._data.Length));"), "{src}");
}

#[test]
fn write_units_creates_one_file_per_type() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("generated");
    let g = generate(BackendKind::Rust);
    let written = write_units(&g, &out).unwrap();
    assert_eq!(written.len(), g.units.len() + g.support.len());
    for name in ["pdu.rs", "entity_id.rs", "child.rs", "child_alias.rs", "signal_pdu.rs", "mod.rs", "support.rs"] {
        assert!(out.join(name).is_file(), "{} missing", name);
    }
    let child = std::fs::read_to_string(out.join("child.rs")).unwrap();
    assert_eq!(child, source(&g, "Child"));
}

#[test]
fn rust_float_elements_hash_through_to_bits() {
    let src = r#"
        class Orientation {
            angles: array<primitive<float>, 3>;
            samples: primitive<unsigned short> counts readings;
            readings: list<primitive<double>> count samples;
            ids: array<primitive<short>, 2>;
        }
    "#;
    let g = run(load(src).unwrap(), &GeneratorConfig::default()).unwrap();
    let src = source(&g, "Orientation");
    assert_eq!(
        src.matches("result = result.rotate_left(5) ^ (*item).to_bits() as u64;").count(),
        2,
        "{src}"
    );
    assert!(src.contains("result = result.rotate_left(5) ^ (*item) as u64;"), "{src}");
    assert!(!src.contains("*item.to_bits()"), "{src}");
}

#[test]
fn csharp_auto_length_is_overridden_below_the_first_level() {
    let src = r#"
        class Pdu {
            length: primitive<unsigned short>;
        }
        class FamilyPdu : Pdu {
            family: primitive<unsigned byte>;
        }
        class FirePdu : FamilyPdu {
            munition: primitive<unsigned int>;
        }
    "#;
    let config = GeneratorConfig {
        backend: BackendKind::Csharp,
        ..GeneratorConfig::default()
    };
    let g = run(load(src).unwrap(), &config).unwrap();
    assert!(!source(&g, "Pdu").contains("MarshalAutoLengthSet"));
    assert!(source(&g, "FamilyPdu").contains("public virtual void MarshalAutoLengthSet(DataOutputStream dos)"));
    assert!(source(&g, "FirePdu").contains("public override void MarshalAutoLengthSet(DataOutputStream dos)"));
}
