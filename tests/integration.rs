//! Integration tests: load schema text, run the codec over emitted plans, check wire laws.

use pdugen::codec::{Codec, Endianness};
use pdugen::generate::{prepare, GeneratorConfig};
use pdugen::{load, ProtocolVersion, Record, TypeMappingTable, Value};

const PARENT_CHILD: &str = r#"
class Parent {
    id: primitive<unsigned int>;
}

class Child : Parent {
    kind: primitive<unsigned short>;
    tagCount: primitive<unsigned short> counts tags;
    tags: list<primitive<unsigned byte>> count tagCount;
}
"#;

const ENTITY: &str = r#"
class Vector3Float {
    x: primitive<float>;
    y: primitive<float>;
    z: primitive<float>;
}

class EntityID {
    site: primitive<unsigned short>;
    application: primitive<unsigned short>;
    entity: primitive<unsigned short>;
}

class Pdu {
    protocolVersion: primitive<unsigned byte> = 7;
    length: primitive<unsigned short>;
}

class EntityPdu : Pdu {
    origin: class EntityID;
    location: class<Vector3Float>;
}

class Sample : EntityPdu {
    orientation: array<primitive<float>, 3>;
    corners: array<class Vector3Float, 2>;
    idCount: primitive<unsigned byte> counts ids;
    dataLength: primitive<unsigned short> counts data;
    ids: list<class EntityID> count idCount;
    data: list<class OneByteChunk> count dataLength;
    scratch: primitive<int> transient;
    flags: primitive<unsigned short> {
        bit mode = 0x000F;
        bit state = 0x00F0;
        bit extra = 0xFF00;
    }
}
"#;

const LEVELS: &str = r#"
class A {
    a: primitive<unsigned byte>;
}

class B : A {
    b: primitive<unsigned short>;
}

class C : B {
    c: primitive<unsigned int>;
}
"#;

fn codec_for(source: &str) -> Codec {
    let schema = load(source).expect("load").freeze().expect("freeze");
    Codec::new(&schema, &TypeMappingTable::rust(), Endianness::Big).expect("codec")
}

fn codec_for_version(source: &str, protocol: ProtocolVersion) -> Codec {
    let config = GeneratorConfig {
        protocol,
        ..GeneratorConfig::default()
    };
    let schema = prepare(load(source).expect("load"), &config).expect("prepare");
    Codec::new(&schema, &TypeMappingTable::rust(), Endianness::Big).expect("codec")
}

fn entity_id(codec: &Codec, site: u16, application: u16, entity: u16) -> Value {
    let mut id = codec.instantiate("EntityID").unwrap();
    id.set("site", Value::U16(site));
    id.set("application", Value::U16(application));
    id.set("entity", Value::U16(entity));
    id.into()
}

fn populated_sample(codec: &Codec) -> Record {
    let mut s = codec.instantiate("Sample").unwrap();
    s.set("origin", entity_id(codec, 1, 2, 3));
    let mut location = codec.instantiate("Vector3Float").unwrap();
    location.set("x", Value::Float(1.5));
    location.set("z", Value::Float(-4.0));
    s.set("location", location.into());
    s.set(
        "orientation",
        Value::List(vec![Value::Float(0.25), Value::Float(0.5), Value::Float(0.75)]),
    );
    s.set("idCount", Value::U8(2));
    s.set(
        "ids",
        Value::List(vec![entity_id(codec, 10, 20, 30), entity_id(codec, 40, 50, 60)]),
    );
    s.set("dataLength", Value::U16(5));
    s.set("data", Value::Bytes(vec![9, 8, 7, 6, 5]));
    s.set("flags", Value::U16(0x1234));
    s
}

#[test]
fn test_parent_child_scenario() {
    let codec = codec_for(PARENT_CHILD);
    let mut child = codec.instantiate("Child").unwrap();
    assert!(child.set("id", Value::U32(7)));
    assert!(child.set("kind", Value::U16(3)));
    assert!(child.set(
        "tags",
        Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(9)])
    ));

    assert_eq!(codec.size(&child).unwrap(), 11);
    let bytes = codec.try_marshal(&child).unwrap();
    assert_eq!(bytes, vec![0, 0, 0, 7, 0, 3, 0, 3, 1, 2, 9]);

    let back = codec.try_unmarshal("Child", &bytes).unwrap();
    assert_eq!(back.get("id"), Some(&Value::U32(7)));
    assert_eq!(back.get("kind"), Some(&Value::U16(3)));
    assert_eq!(back.get("tagCount"), Some(&Value::U16(3)));
    assert_eq!(
        back.get("tags"),
        Some(&Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(9)]))
    );
}

#[test]
fn test_counter_decoupling() {
    let codec = codec_for(PARENT_CHILD);
    let mut child = codec.instantiate("Child").unwrap();
    child.set("tags", Value::List(vec![Value::U8(1), Value::U8(2), Value::U8(9)]));
    let before = codec.try_marshal(&child).unwrap();

    child.set("tagCount", Value::U16(200));
    let after = codec.try_marshal(&child).unwrap();
    assert_eq!(before, after, "stored counter must not reach the wire");

    child.get_mut("tags").and_then(Value::as_list_mut).unwrap().push(Value::U8(4));
    let grown = codec.try_marshal(&child).unwrap();
    assert_eq!(grown.len(), before.len() + 1);
    assert_eq!(&grown[6..8], &[0, 4]);
}

#[test]
fn test_size_law() {
    let codec = codec_for(ENTITY);
    let default = codec.instantiate("Sample").unwrap();
    // Pdu 3 + EntityPdu 18 + orientation 12 + corners 24 + counters 3
    assert_eq!(codec.size(&default).unwrap(), 60);
    assert_eq!(codec.try_marshal(&default).unwrap().len(), 60);

    let populated = populated_sample(&codec);
    assert_eq!(codec.size(&populated).unwrap(), 60 + 2 * 6 + 5);
    assert_eq!(
        codec.try_marshal(&populated).unwrap().len(),
        codec.size(&populated).unwrap()
    );

    for class in ["Vector3Float", "EntityID", "Pdu", "EntityPdu"] {
        let r = codec.instantiate(class).unwrap();
        assert_eq!(codec.try_marshal(&r).unwrap().len(), codec.size(&r).unwrap(), "{}", class);
    }
}

#[test]
fn test_transient_attribute_is_off_wire_but_compared() {
    let codec = codec_for(ENTITY);
    let a = populated_sample(&codec);
    let mut b = a.clone();
    b.set("scratch", Value::I32(42));
    assert_eq!(codec.try_marshal(&a).unwrap(), codec.try_marshal(&b).unwrap());
    assert!(!codec.equals(&a, &b));
    assert_ne!(codec.hash_code(&a), codec.hash_code(&b));
}

#[test]
fn test_round_trip_every_type() {
    let codec = codec_for(ENTITY);
    for class in ["Vector3Float", "EntityID", "Pdu", "EntityPdu", "Sample"] {
        let x = codec.instantiate(class).unwrap();
        let bytes = codec.try_marshal(&x).unwrap();
        let y = codec.try_unmarshal(class, &bytes).unwrap();
        assert!(codec.equals(&x, &y), "default {} did not round trip", class);
        assert_eq!(codec.hash_code(&x), codec.hash_code(&y));
    }

    let x = populated_sample(&codec);
    let bytes = codec.try_marshal(&x).unwrap();
    let y = codec.try_unmarshal("Sample", &bytes).unwrap();
    assert!(codec.equals(&x, &y));
    assert_eq!(codec.hash_code(&x), codec.hash_code(&y));
}

#[test]
fn test_default_literal_and_auto_length() {
    let codec = codec_for(ENTITY);
    let mut s = populated_sample(&codec);
    assert_eq!(s.get("protocolVersion"), Some(&Value::U8(7)));
    let bytes = codec.marshal_auto_length(&mut s);
    assert_eq!(bytes.len(), 77);
    assert_eq!(&bytes[0..3], &[7, 0, 77]);
    assert_eq!(s.get("length"), Some(&Value::U16(77)));

    // Types outside the Pdu hierarchy have no length to refresh.
    let mut id = codec.instantiate("EntityID").unwrap();
    assert_eq!(codec.marshal_auto_length(&mut id), vec![0; 6]);
}

#[test]
fn test_bit_field_law() {
    let codec = codec_for(ENTITY);
    let mut s = codec.instantiate("Sample").unwrap();
    codec.set_bit_field(&mut s, "extra", 0xAB).unwrap();
    for (name, width) in [("mode", 4u32), ("state", 4)] {
        for v in 0..(1u64 << width) {
            codec.set_bit_field(&mut s, name, v).unwrap();
            assert_eq!(codec.bit_field(&s, name).unwrap(), v);
            assert_eq!(codec.bit_field(&s, "extra").unwrap(), 0xAB);
        }
    }
    codec.set_bit_field(&mut s, "mode", 0x3).unwrap();
    codec.set_bit_field(&mut s, "state", 0x9).unwrap();
    assert_eq!(s.get("flags"), Some(&Value::U16(0xAB93)));
    assert!(codec.bit_field(&s, "nope").is_err());
}

#[test]
fn test_inheritance_byte_order() {
    let codec = codec_for(LEVELS);
    let mut c = codec.instantiate("C").unwrap();
    c.set("a", Value::U8(0x11));
    c.set("b", Value::U16(0x2233));
    c.set("c", Value::U32(0x4455_6677));
    let bytes = codec.try_marshal(&c).unwrap();
    assert_eq!(bytes, vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77]);

    // 3 levels: parent bytes ++ own bytes
    let b_part = c.parent.as_deref().unwrap();
    let b_bytes = codec.try_marshal(b_part).unwrap();
    assert_eq!(&bytes[..b_bytes.len()], &b_bytes[..]);
    assert_eq!(&bytes[b_bytes.len()..], &[0x44, 0x55, 0x66, 0x77]);

    // 2 levels
    let a_part = b_part.parent.as_deref().unwrap();
    let a_bytes = codec.try_marshal(a_part).unwrap();
    assert_eq!(a_bytes, vec![0x11]);
    assert_eq!(&b_bytes[1..], &[0x22, 0x33]);
}

#[test]
fn test_little_endian_codec() {
    let schema = load(LEVELS).unwrap().freeze().unwrap();
    let codec = Codec::new(&schema, &TypeMappingTable::rust(), Endianness::Little).unwrap();
    let mut b = codec.instantiate("B").unwrap();
    b.set("b", Value::U16(0x2233));
    assert_eq!(codec.try_marshal(&b).unwrap(), vec![0x00, 0x33, 0x22]);
}

#[test]
fn test_equality_does_not_depend_on_mismatch_position() {
    let codec = codec_for(LEVELS);
    let x = codec.instantiate("C").unwrap();
    let mut y = x.clone();
    y.set("a", Value::U8(1));
    let mut z = x.clone();
    z.set("c", Value::U32(1));
    assert!(codec.equals(&x, &x.clone()));
    assert!(!codec.equals(&x, &y));
    assert!(!codec.equals(&x, &z));
}

const SIGNAL: &str = r#"
class SignalPdu {
    dataLength: primitive<unsigned short> counts data;
    data: list<class OneByteChunk> count dataLength;
}
"#;

#[test]
fn test_legacy_bit_count_counter() {
    let legacy = codec_for_version(SIGNAL, ProtocolVersion::Dis1998);
    let mut s = legacy.instantiate("SignalPdu").unwrap();
    s.set("data", Value::Bytes(vec![1, 2, 3]));
    assert_eq!(legacy.try_marshal(&s).unwrap(), vec![0, 24, 1, 2, 3]);

    // A non-zero stored bit count goes on wire as is.
    s.set("dataLength", Value::U16(20));
    let bytes = legacy.try_marshal(&s).unwrap();
    assert_eq!(bytes, vec![0, 20, 1, 2, 3]);
    let back = legacy.try_unmarshal("SignalPdu", &bytes).unwrap();
    assert_eq!(back.get("data"), Some(&Value::Bytes(vec![1, 2, 3])));
    assert_eq!(back.get("dataLength"), Some(&Value::U16(20)));

    let modern = codec_for_version(SIGNAL, ProtocolVersion::Dis2012);
    let mut s = modern.instantiate("SignalPdu").unwrap();
    s.set("data", Value::Bytes(vec![1, 2, 3]));
    s.set("dataLength", Value::U16(20));
    assert_eq!(modern.try_marshal(&s).unwrap(), vec![0, 3, 1, 2, 3]);
}

#[test]
fn test_truncated_input_is_reported_not_raised() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let failures = Arc::new(AtomicUsize::new(0));
    let seen = failures.clone();
    let codec = codec_for(PARENT_CHILD).with_failure_hook(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    let r = codec.unmarshal("Child", &[0, 0, 0, 7, 0, 3, 0, 9, 1]).unwrap();
    assert_eq!(r.get("id"), Some(&Value::U32(7)));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(codec.unmarshal("Nobody", &[]).is_none());
    assert_eq!(failures.load(Ordering::SeqCst), 2);
}

#[test]
fn test_dump_lists_parent_first() {
    let codec = codec_for(PARENT_CHILD);
    let mut child = codec.instantiate("Child").unwrap();
    child.set("id", Value::U32(7));
    let text = pdugen::dump::record_to_dump(&child);
    let parent_at = text.find("id: 7").unwrap();
    let own_at = text.find("kind: 0").unwrap();
    assert!(parent_at < own_at, "{}", text);
}
