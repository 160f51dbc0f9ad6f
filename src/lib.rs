//! # pdugen: schema-driven PDU code generator
//!
//! Reads record-type definitions (DIS protocol data units and the records they embed), resolves
//! inheritance, computes wire layouts and emits, per type, source code that marshals and
//! unmarshals the type to a big-endian byte stream, compares and hashes instances and exposes
//! bit-fields packed inside integer attributes.
//!
//! ## Pipeline
//!
//! 1. [`parser`] loads schema text into [`schema::RecordType`]s.
//! 2. Types are registered into an [`InheritanceIndex`]; [`patch::Patcher`] applies
//!    version-scoped layout rules; [`InheritanceIndex::freeze`] resolves the graph.
//! 3. [`emit::CodeEmitter`] turns each type into a backend-independent [`emit::ClassPlan`].
//! 4. A [`backend::Backend`] (Rust or C#) renders each plan; [`generate`] drives the batch.
//!
//! The [`Codec`] interprets the same plans over dynamic [`Record`]s. It is the executable
//! reference for what generated code does on the wire.
//!
//! ## Example schema
//!
//! ```text
//! class Parent {
//!     a: primitive<unsigned int>;
//! }
//!
//! class Child : Parent {
//!     n: primitive<unsigned short> counts items;
//!     k: primitive<unsigned short> transient;
//!     items: list<primitive<unsigned byte>> count n;
//! }
//! ```

pub mod backend;
pub mod codec;
pub mod dump;
pub mod emit;
pub mod error;
pub mod generate;
pub mod index;
pub mod layout;
pub mod lint;
pub mod parser;
pub mod patch;
pub mod schema;
pub mod types;
pub mod value;

pub use codec::{Codec, CodecError, Endianness};
pub use emit::{ClassPlan, CodeEmitter, Diagnostic, EmitOptions};
pub use error::SchemaError;
pub use generate::{BackendKind, GeneratorConfig, Generation};
pub use index::{InheritanceIndex, ResolvedSchema};
pub use parser::{load, parse};
pub use schema::{Attribute, AttributeKind, ProtocolVersion, RecordType};
pub use types::TypeMappingTable;
pub use value::{Record, Value};
