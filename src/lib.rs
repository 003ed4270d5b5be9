// src/lib.rs
pub mod error;
pub mod extractor;
pub mod fields;
pub mod format;
pub mod path;
pub mod plugin;

pub use error::*;

pub use extractor::buffer::{BufferHandle, OutputBuffer};
pub use extractor::cache::DecodeCache;
pub use extractor::config::ExtractorConfig;
pub use extractor::{event_payload, ExtractionContext, ExtractionStats};
pub use fields::{fields_json, list_fields, FieldDescriptor, FieldId, FieldRequest};
pub use format::pretty_print;
pub use path::extract_by_path;
