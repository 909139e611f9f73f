//! Shared types for the views client.
//!
//! - [`DesignDocumentNamespace`] selects production or development design documents
//! - [`Serializer`] is the pluggable value codec used to decode result rows
//! - [`UnknownTokenError`] is returned when a canonical wire token does not parse

pub mod namespace;
pub mod serializer;

pub use namespace::{DesignDocumentNamespace, UnknownTokenError};
pub use serializer::{DefaultJsonSerializer, Serializer};
