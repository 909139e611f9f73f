//! Single-pass streaming of view result rows.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{DefaultJsonSerializer, Serializer};
use futures_core::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::encoded::{EncodedViewQuery, fields};
use crate::row::{ViewMetaData, ViewRow};
use crate::source::{RawItem, RawRowSource, SourceError, ViewTransport};
use crate::state::StreamState;
use crate::{Result, ViewError};

/// Turns one decoded JSON value into the caller's row type.
type RowDecoder<R> = fn(Value) -> serde_json::Result<R>;

/// A submitted (or ready to submit) view query and its result stream.
///
/// Rows can be pulled exactly once. Metadata becomes available after the
/// stream ends naturally; an error ends the stream without metadata.
///
/// The request owns its raw source. It can be moved to another task or
/// thread but is not meant to be shared: pulls must be sequential.
pub struct ViewRequest<R = ViewRow> {
    state: StreamState,
    transport: Option<Arc<dyn ViewTransport>>,
    source: Option<Box<dyn RawRowSource>>,
    query: EncodedViewQuery,
    timeout: Duration,
    serializer: Arc<dyn Serializer>,
    decode: RowDecoder<R>,
    metadata: Option<ViewMetaData>,
    rows_streamed: u64,
    started_at: Option<Instant>,
}

impl ViewRequest<ViewRow> {
    /// Creates a request that yields structured [`ViewRow`]s.
    pub fn new(
        transport: Arc<dyn ViewTransport>,
        query: EncodedViewQuery,
        timeout: Duration,
    ) -> Self {
        Self::with_row_type(transport, query, timeout)
    }
}

impl ViewRequest<Value> {
    /// Creates a request that yields rows as raw JSON values.
    pub fn raw(
        transport: Arc<dyn ViewTransport>,
        query: EncodedViewQuery,
        timeout: Duration,
    ) -> Self {
        Self::assemble(Some(transport), None, query, timeout, Ok)
    }
}

impl<R: DeserializeOwned> ViewRequest<R> {
    /// Creates a request that maps each row onto `R` by field name.
    pub fn with_row_type(
        transport: Arc<dyn ViewTransport>,
        query: EncodedViewQuery,
        timeout: Duration,
    ) -> Self {
        Self::assemble(
            Some(transport),
            None,
            query,
            timeout,
            serde_json::from_value::<R>,
        )
    }

    /// Wraps a source for a query that has already been submitted.
    pub fn from_source(source: Box<dyn RawRowSource>, query: EncodedViewQuery) -> Self {
        let timeout = query
            .get_u64(fields::TIMEOUT)
            .map(Duration::from_micros)
            .unwrap_or_default();
        let mut request = Self::assemble(
            None,
            Some(source),
            query,
            timeout,
            serde_json::from_value::<R>,
        );
        request.state = StreamState::Streaming;
        request.started_at = Some(Instant::now());
        request
    }
}

impl<R> ViewRequest<R> {
    fn assemble(
        transport: Option<Arc<dyn ViewTransport>>,
        source: Option<Box<dyn RawRowSource>>,
        query: EncodedViewQuery,
        timeout: Duration,
        decode: RowDecoder<R>,
    ) -> Self {
        let serializer = query
            .serializer()
            .unwrap_or_else(|| Arc::new(DefaultJsonSerializer));
        Self {
            state: StreamState::NotStarted,
            transport,
            source,
            query,
            timeout,
            serializer,
            decode,
            metadata: None,
            rows_streamed: 0,
            started_at: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// The encoded query this request executes.
    pub fn query(&self) -> &EncodedViewQuery {
        &self.query
    }

    /// Number of rows handed to the caller so far.
    pub fn rows_streamed(&self) -> u64 {
        self.rows_streamed
    }

    /// Returns the metadata once the stream ended naturally.
    pub fn metadata(&self) -> Option<&ViewMetaData> {
        self.metadata.as_ref()
    }

    /// Submits the query to the transport.
    ///
    /// Fails with [`ViewError::AlreadyQueried`] unless the request has not
    /// been submitted yet.
    #[tracing::instrument(
        skip(self),
        fields(
            design_document = self.query.get_str(fields::DOCUMENT_NAME).unwrap_or_default(),
            view = self.query.get_str(fields::VIEW_NAME).unwrap_or_default(),
        )
    )]
    pub async fn submit(&mut self) -> Result<()> {
        if !self.state.can_submit() {
            return Err(ViewError::AlreadyQueried);
        }
        let Some(transport) = self.transport.take() else {
            return Err(ViewError::AlreadyQueried);
        };

        metrics::counter!("views_queries_submitted").increment(1);
        match transport.submit(&self.query, self.timeout).await {
            Ok(source) => {
                self.source = Some(source);
                self.state = StreamState::Streaming;
                self.started_at = Some(Instant::now());
                tracing::debug!("view query submitted");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Pulls the next row, submitting the query first if needed.
    ///
    /// Returns `None` at the natural end of the stream and on every call
    /// after the stream is done.
    pub async fn next_row(&mut self) -> Option<Result<R>> {
        if !self.state.can_pull() {
            return None;
        }
        if self.state.can_submit()
            && let Err(err) = self.submit().await
        {
            return Some(Err(err));
        }

        let pulled = match self.source.as_mut() {
            Some(source) => source.next_item().await,
            None => Err(Box::new(ViewError::internal("row source is missing")) as SourceError),
        };
        let item = match pulled {
            Ok(item) => item,
            Err(fault) => return Some(Err(self.fail(from_source_error(fault)))),
        };

        match item {
            RawItem::Row(payload) => match self.decode_row(&payload) {
                Ok(row) => {
                    self.rows_streamed += 1;
                    metrics::counter!("views_rows_streamed").increment(1);
                    Some(Ok(row))
                }
                Err(err) => Some(Err(self.fail(err))),
            },
            RawItem::Error(marker) => {
                tracing::warn!(
                    code = marker.code,
                    detail = %marker.message,
                    "in-stream view error"
                );
                Some(Err(self.fail(ViewError::from_marker(&marker))))
            }
            RawItem::End => match self.complete().await {
                Ok(()) => None,
                Err(err) => Some(Err(err)),
            },
        }
    }

    /// Returns the remaining rows as a stream.
    ///
    /// Fails with [`ViewError::AlreadyQueried`] once the request is done.
    pub fn rows(&mut self) -> Result<impl Stream<Item = Result<R>> + Send + '_>
    where
        R: Send,
    {
        if !self.state.can_pull() {
            return Err(ViewError::AlreadyQueried);
        }
        Ok(futures_util::stream::unfold(self, |request| async move {
            request.next_row().await.map(|row| (row, request))
        }))
    }

    /// Drains every remaining row into a vector.
    pub async fn execute(&mut self) -> Result<Vec<R>> {
        if !self.state.can_pull() {
            return Err(ViewError::AlreadyQueried);
        }
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn decode_row(&self, payload: &[u8]) -> Result<R> {
        self.serializer
            .deserialize(payload)
            .and_then(self.decode)
            .map_err(|e| ViewError::internal(format!("failed to decode view row: {e}")))
    }

    /// Natural end of stream: fetch the trailer exactly once.
    async fn complete(&mut self) -> Result<()> {
        self.state = StreamState::Done;
        let Some(mut source) = self.source.take() else {
            return Err(self.fail(ViewError::internal("row source is missing")));
        };
        let trailer = match source.metadata().await {
            Ok(trailer) => trailer,
            Err(fault) => return Err(self.fail(from_source_error(fault))),
        };
        let metadata: ViewMetaData = match serde_json::from_slice(&trailer) {
            Ok(metadata) => metadata,
            Err(e) => {
                return Err(self.fail(ViewError::internal(format!(
                    "failed to decode view metadata: {e}"
                ))));
            }
        };

        metrics::counter!("views_streams_completed").increment(1);
        if let Some(started) = self.started_at {
            metrics::histogram!("views_stream_duration_seconds")
                .record(started.elapsed().as_secs_f64());
        }
        tracing::debug!(
            rows = self.rows_streamed,
            total_rows = metadata.total_rows,
            "view stream complete"
        );
        self.metadata = Some(metadata);
        Ok(())
    }

    /// Moves to `Done` and releases the source. No metadata is fetched.
    fn fail(&mut self, err: ViewError) -> ViewError {
        self.state = StreamState::Done;
        self.source = None;
        self.transport = None;
        metrics::counter!("views_stream_errors").increment(1);
        tracing::warn!(error = %err, rows = self.rows_streamed, "view stream failed");
        err
    }
}

fn from_source_error(fault: SourceError) -> ViewError {
    match fault.downcast::<ViewError>() {
        Ok(err) => *err,
        Err(other) => ViewError::InternalSdk(other.to_string()),
    }
}
