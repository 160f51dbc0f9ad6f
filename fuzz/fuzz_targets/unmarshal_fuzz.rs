//! Unmarshal fuzz target: arbitrary bytes into a record with nested, counted and blob lists.
//! Truncated or oversized counts must be reported, never panic or over-allocate.
//! Build with: cargo fuzz run unmarshal_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const SCHEMA: &str = r#"
class EntityID {
    site: primitive<unsigned short>;
    entity: primitive<unsigned short>;
}

class Sample {
    n: primitive<unsigned byte> counts ids;
    len: primitive<unsigned short> counts data;
    ids: list<class EntityID> count n;
    data: list<class OneByteChunk> count len;
    spin: array<primitive<float>, 2>;
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(index) = pdugen::load(SCHEMA) else { return };
    let Ok(schema) = index.freeze() else { return };
    let Ok(codec) = pdugen::Codec::new(&schema, &pdugen::TypeMappingTable::rust(), pdugen::Endianness::Big) else {
        return;
    };
    let codec = codec.with_failure_hook(|_, _| {});
    if let Ok(record) = codec.try_unmarshal("Sample", data) {
        let bytes = codec.try_marshal(&record).expect("decoded record re-encodes");
        assert!(data.starts_with(&bytes));
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run unmarshal_fuzz");
}
