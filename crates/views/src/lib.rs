//! Client-side execution of view queries.
//!
//! - [`ViewQuery`] validates [`ViewOptions`] and encodes them into a flat
//!   [`EncodedViewQuery`]
//! - [`ViewRequest`] submits the query through a [`ViewTransport`] and
//!   streams rows from the returned [`RawRowSource`], exactly once
//! - [`ViewMetaData`] becomes available after the stream ends naturally
//! - [`InMemoryViewTransport`] answers queries from in-memory indexes
//! - [`Bucket`] ties query building, configuration and transport together

pub mod bucket;
pub mod collation;
pub mod config;
pub mod encoded;
pub mod error;
pub mod memory;
pub mod query;
pub mod request;
pub mod row;
pub mod source;
pub mod state;

pub use bucket::Bucket;
pub use common::{DefaultJsonSerializer, DesignDocumentNamespace, Serializer};
pub use config::ViewConfig;
pub use encoded::{EncodedViewQuery, ViewParam};
pub use error::{Result, ViewError};
pub use memory::{InMemoryViewTransport, IndexEntry, ReduceFunction};
pub use query::{
    QueryTimeout, ViewErrorMode, ViewOptions, ViewOrdering, ViewQuery, ViewScanConsistency,
};
pub use request::ViewRequest;
pub use row::{ViewMetaData, ViewRow};
pub use source::{ErrorMarker, RawItem, RawRowSource, SourceError, VecRowSource, ViewTransport};
pub use state::StreamState;
