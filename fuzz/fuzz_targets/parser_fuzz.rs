//! Parser fuzz target: feed arbitrary bytes to the schema parser, then lint what parses.
//! Neither step may panic.
//! Build with: cargo fuzz run parser_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(x) => x,
        Err(_) => return,
    };
    if let Ok(classes) = pdugen::parse(s) {
        let _ = pdugen::lint::lint(
            &classes,
            &pdugen::TypeMappingTable::rust(),
            &pdugen::EmitOptions::default(),
        );
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}
