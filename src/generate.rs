//! Batch driver: patch, freeze, emit every type in parallel, render, write.
//!
//! The index must hold every type before [`prepare`] freezes it. After that, emission only
//! reads shared immutable state, so types are emitted concurrently with `rayon`. The first
//! fatal [`SchemaError`] aborts the batch; files already written by [`write_units`] are not
//! removed.

use crate::backend::{Backend, CsharpBackend, RustBackend};
use crate::emit::{CodeEmitter, Diagnostic, EmitOptions};
use crate::error::SchemaError;
use crate::index::{InheritanceIndex, ResolvedSchema};
use crate::patch::Patcher;
use crate::schema::ProtocolVersion;
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Rust,
    Csharp,
}

impl BackendKind {
    pub fn backend(self) -> Box<dyn Backend> {
        match self {
            BackendKind::Rust => Box::new(RustBackend::new()),
            BackendKind::Csharp => Box::new(CsharpBackend::new()),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rust" | "rs" => Ok(BackendKind::Rust),
            "csharp" | "cs" | "c#" => Ok(BackendKind::Csharp),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Rust => "rust",
            BackendKind::Csharp => "csharp",
        })
    }
}

/// Everything a run needs, built once and passed explicitly.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub backend: BackendKind,
    pub protocol: ProtocolVersion,
    pub options: EmitOptions,
    pub patcher: Patcher,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            backend: BackendKind::default(),
            protocol: ProtocolVersion::default(),
            options: EmitOptions::default(),
            patcher: Patcher::dis_legacy(),
        }
    }
}

/// One rendered record type.
#[derive(Debug, Clone)]
pub struct GeneratedUnit {
    pub class: String,
    pub file_name: String,
    pub source: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct Generation {
    /// In registration order.
    pub units: Vec<GeneratedUnit>,
    /// Backend support files: (file name, source).
    pub support: Vec<(String, String)>,
}

impl Generation {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.units.iter().flat_map(|u| u.diagnostics.iter())
    }

    pub fn unit(&self, class: &str) -> Option<&GeneratedUnit> {
        self.units.iter().find(|u| u.class.eq_ignore_ascii_case(class))
    }
}

/// Apply version-scoped patch rules, then resolve the inheritance graph.
pub fn prepare(mut index: InheritanceIndex, config: &GeneratorConfig) -> Result<ResolvedSchema, SchemaError> {
    config.patcher.apply(&mut index, config.protocol);
    index.freeze()
}

/// Emit and render every registered type.
pub fn generate(
    schema: &ResolvedSchema,
    backend: &dyn Backend,
    options: &EmitOptions,
) -> Result<Generation, SchemaError> {
    let emitter = CodeEmitter::new(schema, backend.types(), options);
    let units = schema
        .ids()
        .into_par_iter()
        .map(|id| {
            let emission = emitter.emit(id)?;
            Ok(GeneratedUnit {
                class: emission.plan.name.clone(),
                file_name: backend.file_name(&emission.plan.name),
                source: backend.render(&emission.plan),
                diagnostics: emission.diagnostics,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    let classes: Vec<&str> = units.iter().map(|u| u.class.as_str()).collect();
    let support = backend.support_files(&classes);
    let diagnostics: usize = units.iter().map(|u| u.diagnostics.len()).sum();
    tracing::info!(
        backend = backend.name(),
        units = units.len(),
        diagnostics,
        "generation complete"
    );
    Ok(Generation { units, support })
}

/// [`prepare`] then [`generate`] with the configured backend.
pub fn run(index: InheritanceIndex, config: &GeneratorConfig) -> Result<Generation, SchemaError> {
    let schema = prepare(index, config)?;
    let backend = config.backend.backend();
    generate(&schema, backend.as_ref(), &config.options)
}

/// Write every unit and support file into `dir`, creating it if needed.
pub fn write_units(generation: &Generation, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let files = generation
        .units
        .iter()
        .map(|u| (u.file_name.as_str(), u.source.as_str()))
        .chain(generation.support.iter().map(|(n, s)| (n.as_str(), s.as_str())));
    let mut written = Vec::new();
    for (name, source) in files {
        let path = dir.join(name);
        std::fs::write(&path, source)?;
        tracing::debug!(path = %path.display(), "wrote unit");
        written.push(path);
    }
    Ok(written)
}
