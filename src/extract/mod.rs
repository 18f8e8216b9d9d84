//! Data extraction
//!
//! Turns a classified message into a typed payload: what to save, what to
//! look for, what to delete, how to filter a listing, or what to change.

mod extractor;
mod payload;
pub mod rules;

pub use extractor::DataExtractor;
pub use payload::{
    DeleteTarget, ExtractedPayload, Extraction, ExtractionMethod, ListFilter, RetrieveQuery,
    SaveData, UpdateSpec, ValueKind,
};
