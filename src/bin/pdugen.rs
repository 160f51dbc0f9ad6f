//! Generate PDU marshalling code from schema files.
//!
//! Usage:
//!   pdugen [OPTIONS] FILE ...
//!   pdugen [OPTIONS] < schema.pdu
//!
//! All files are loaded into one schema, so a type may inherit from a type declared in another
//! file.
//!
//! Options:
//!   --backend, -b rust|csharp      Target language (default rust)
//!   --protocol, -p 1995|1998|2012  DIS version for legacy layout rules (default 2012)
//!   --out, -o DIR                  Write one file per type into DIR (default: print to stdout)
//!   --check, -c                    Only lint the schema; exit 1 on errors
//!   --human, -H                    Human-readable lint output

use anyhow::{anyhow, bail, Context};
use pdugen::generate::{self, BackendKind, GeneratorConfig};
use pdugen::lint::{lint_patched, LintMessage, LintRule, Severity};
use pdugen::parser;
use pdugen::schema::ProtocolVersion;
use std::io::{self, Read};
use std::path::PathBuf;

fn rule_id(rule: LintRule) -> &'static str {
    match rule {
        LintRule::DuplicateType => "duplicate-type",
        LintRule::Inheritance => "inheritance",
        LintRule::TypeMapping => "type-mapping",
        LintRule::ClassReference => "class-reference",
        LintRule::ArrayLength => "array-length",
        LintRule::ListCounter => "list-counter",
        LintRule::BitField => "bit-field",
        LintRule::CustomLayout => "custom-layout",
        LintRule::InitialValue => "initial-value",
    }
}

fn print_message(m: &LintMessage, style: OutputStyle) {
    let severity_str = match m.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    match style {
        OutputStyle::Compact => {
            println!("{}: {}: {} [{}]", m.location(), severity_str, m.message, rule_id(m.rule));
        }
        OutputStyle::Human => {
            println!("  {} {}: {}", severity_str, m.location(), m.message);
            println!("    rule: {}", rule_id(m.rule));
        }
    }
}

#[derive(Clone, Copy)]
enum OutputStyle {
    Compact,
    Human,
}

fn take_flag(args: &mut Vec<String>, long: &str, short: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == long || a == short) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn take_value(args: &mut Vec<String>, long: &str, short: &str) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == long || a == short) else {
        return Ok(None);
    };
    args.remove(pos);
    if pos >= args.len() {
        bail!("{} needs a value", long);
    }
    Ok(Some(args.remove(pos)))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let check = take_flag(&mut args, "--check", "-c");
    let style = if take_flag(&mut args, "--human", "-H") {
        OutputStyle::Human
    } else {
        OutputStyle::Compact
    };
    let mut config = GeneratorConfig::default();
    if let Some(b) = take_value(&mut args, "--backend", "-b")? {
        config.backend = b.parse::<BackendKind>().map_err(|e| anyhow!(e))?;
    }
    if let Some(p) = take_value(&mut args, "--protocol", "-p")? {
        config.protocol = p.parse::<ProtocolVersion>().map_err(|e| anyhow!(e))?;
    }
    let out_dir = take_value(&mut args, "--out", "-o")?.map(PathBuf::from);

    let mut source = String::new();
    if args.is_empty() {
        io::stdin().read_to_string(&mut source)?;
    } else {
        for path in &args {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            source.push_str(&text);
            source.push('\n');
        }
    }
    let classes = parser::parse(&source).map_err(|e| anyhow!(e))?;

    if check {
        let backend = config.backend.backend();
        let messages = lint_patched(
            &classes,
            backend.types(),
            &config.options,
            &config.patcher,
            config.protocol,
        );
        let total_errors = messages.iter().filter(|m| m.severity == Severity::Error).count();
        let total_warnings = messages.len() - total_errors;
        for m in &messages {
            print_message(m, style);
        }
        if total_errors > 0 || total_warnings > 0 {
            eprintln!("lint: {} error(s), {} warning(s)", total_errors, total_warnings);
        }
        if total_errors > 0 {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut index = pdugen::InheritanceIndex::new();
    for class in classes {
        index.register(class)?;
    }
    let generation = generate::run(index, &config)?;
    match out_dir {
        Some(dir) => {
            let written = generate::write_units(&generation, &dir)
                .with_context(|| format!("writing {}", dir.display()))?;
            eprintln!("{}: {} file(s) written", dir.display(), written.len());
        }
        None => {
            for unit in &generation.units {
                println!("// ---- {}", unit.file_name);
                print!("{}", unit.source);
            }
            for (name, source) in &generation.support {
                println!("// ---- {}", name);
                print!("{}", source);
            }
        }
    }
    Ok(())
}
