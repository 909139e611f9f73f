//! The seam between the request state machine and the transport.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::encoded::EncodedViewQuery;

/// Any fault raised by a raw row source.
///
/// Faults that are already a [`ViewError`](crate::ViewError) keep their
/// kind; anything else is reported as an internal SDK error.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// A failure the server encoded inside an otherwise successful stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMarker {
    pub code: u32,
    pub message: String,
    pub context: Option<Value>,
}

impl ErrorMarker {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// One item pulled from a raw row source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    /// An encoded row payload.
    Row(Vec<u8>),
    /// An in-stream error marker; the stream is unusable afterwards.
    Error(ErrorMarker),
    /// End of rows. The metadata trailer can now be fetched.
    End,
}

/// A pull-based stream of encoded rows for one submitted query.
#[async_trait]
pub trait RawRowSource: Send {
    /// Pulls the next item, waiting until one is available.
    async fn next_item(&mut self) -> std::result::Result<RawItem, SourceError>;

    /// Fetches the metadata trailer. Only meaningful after [`RawItem::End`].
    async fn metadata(&mut self) -> std::result::Result<Vec<u8>, SourceError>;
}

/// Submits encoded view queries and hands back their raw row sources.
#[async_trait]
pub trait ViewTransport: Send + Sync {
    /// Submits the query; resolves once the server has begun streaming.
    ///
    /// `timeout` is the effective request timeout. Enforcing it is up to
    /// the transport.
    async fn submit(
        &self,
        query: &EncodedViewQuery,
        timeout: Duration,
    ) -> Result<Box<dyn RawRowSource>>;
}

/// A scripted row source over a queue of items and a trailer.
///
/// Used for replaying captured responses and in tests. Running out of
/// scripted items reads as [`RawItem::End`].
#[derive(Debug, Default)]
pub struct VecRowSource {
    items: VecDeque<ScriptedItem>,
    trailer: Option<Vec<u8>>,
}

#[derive(Debug)]
enum ScriptedItem {
    Item(RawItem),
    Fault(String),
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct ScriptedFault(String);

impl VecRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an encoded row.
    pub fn row(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.items
            .push_back(ScriptedItem::Item(RawItem::Row(payload.into())));
        self
    }

    /// Appends a row encoded as JSON.
    pub fn row_json(self, row: &Value) -> Self {
        self.row(row.to_string())
    }

    /// Appends an in-stream error marker.
    pub fn error(mut self, marker: ErrorMarker) -> Self {
        self.items
            .push_back(ScriptedItem::Item(RawItem::Error(marker)));
        self
    }

    /// Appends a transport-level fault, raised as a non-SDK error.
    pub fn fault(mut self, message: impl Into<String>) -> Self {
        self.items.push_back(ScriptedItem::Fault(message.into()));
        self
    }

    /// Appends the end-of-stream sentinel.
    pub fn end(mut self) -> Self {
        self.items.push_back(ScriptedItem::Item(RawItem::End));
        self
    }

    pub fn trailer(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.trailer = Some(payload.into());
        self
    }

    pub fn trailer_json(self, trailer: &Value) -> Self {
        self.trailer(trailer.to_string())
    }

    /// Returns the number of items not yet pulled.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

#[async_trait]
impl RawRowSource for VecRowSource {
    async fn next_item(&mut self) -> std::result::Result<RawItem, SourceError> {
        match self.items.pop_front() {
            Some(ScriptedItem::Item(item)) => Ok(item),
            Some(ScriptedItem::Fault(message)) => Err(Box::new(ScriptedFault(message))),
            None => Ok(RawItem::End),
        }
    }

    async fn metadata(&mut self) -> std::result::Result<Vec<u8>, SourceError> {
        self.trailer.take().ok_or_else(|| {
            Box::new(ScriptedFault("no metadata trailer".to_string())) as SourceError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replays_items_in_order() {
        let mut source = VecRowSource::new()
            .row_json(&json!({"id": "a", "key": 1, "value": null}))
            .error(ErrorMarker::new(502, "not_found"))
            .end();

        assert!(matches!(source.next_item().await.unwrap(), RawItem::Row(_)));
        assert_eq!(
            source.next_item().await.unwrap(),
            RawItem::Error(ErrorMarker::new(502, "not_found"))
        );
        assert_eq!(source.next_item().await.unwrap(), RawItem::End);
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn exhausted_source_reads_as_end() {
        let mut source = VecRowSource::new();
        assert_eq!(source.next_item().await.unwrap(), RawItem::End);
        assert_eq!(source.next_item().await.unwrap(), RawItem::End);
    }

    #[tokio::test]
    async fn faults_are_not_view_errors() {
        let mut source = VecRowSource::new().fault("connection reset");
        let err = source.next_item().await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert!(err.downcast_ref::<crate::ViewError>().is_none());
    }

    #[tokio::test]
    async fn trailer_is_handed_out_once() {
        let mut source = VecRowSource::new().trailer_json(&json!({"total_rows": 3}));
        let trailer = source.metadata().await.unwrap();
        assert_eq!(trailer, br#"{"total_rows":3}"#.to_vec());
        assert!(source.metadata().await.is_err());
    }
}
