//! Column and type normalization
//!
//! Turns a [`RawTable`](crate::models::RawTable) keyed by export headers into
//! a [`TransformedTable`](crate::models::TransformedTable) keyed by canonical
//! names and carrying typed values. Everything here is pure.

pub mod convert;
pub mod duration;
pub mod error;
pub mod normalizer;
pub mod sanitize;

pub use convert::{coerce, parse_cell};
pub use duration::parse_duration_minutes;
pub use error::{ConversionError, MappingError};
pub use normalizer::{NormalizedFile, normalize};
pub use sanitize::{sanitize, sanitize_header};
