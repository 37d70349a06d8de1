//! TOON serialization and output rendering.
//!
//! Provides the TOON encoder/decoder pair plus renderers that turn an
//! [`kaggleingest_shared::IngestionResult`] into TOON, plain text, or
//! Markdown output.

pub mod decode;
pub mod encode;
pub mod render;

pub use decode::{ParsedBlock, ParsedDocument, ParsedSection, decode, to_json, validate};
pub use encode::{Document, Section, Value, encode_value};
pub use render::render;
