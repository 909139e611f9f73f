use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::DesignDocumentNamespace;
use serde_json::{Value, json};

use crate::collation::collate;
use crate::encoded::{EncodedViewQuery, fields};
use crate::error::codes;
use crate::source::{ErrorMarker, RawRowSource, VecRowSource, ViewTransport};
use crate::{Result, ViewError};

/// Built-in reduce functions supported by the in-memory transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceFunction {
    /// `_count`: number of rows.
    Count,
    /// `_sum`: sum of numeric values.
    Sum,
}

/// One emitted index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub key: Value,
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
struct ViewIndex {
    entries: Vec<IndexEntry>,
    reduce: Option<ReduceFunction>,
}

#[derive(Debug, Default)]
struct TransportState {
    design_documents: HashMap<String, HashMap<String, ViewIndex>>,
    fail_next_submit: Option<ViewError>,
    fail_stream_after: Option<usize>,
    submitted: Vec<Value>,
    last_timeout: Option<Duration>,
}

/// In-memory view transport for testing and local development.
///
/// Holds design documents and their view indexes in memory and answers
/// submitted queries the way a view node would, including in-stream error
/// markers for missing design documents and views.
#[derive(Debug, Clone, Default)]
pub struct InMemoryViewTransport {
    state: Arc<RwLock<TransportState>>,
}

impl InMemoryViewTransport {
    /// Creates an empty transport with no design documents.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) an empty view inside a design document.
    pub fn upsert_view(
        &self,
        namespace: DesignDocumentNamespace,
        design_document: &str,
        view_name: &str,
        reduce: Option<ReduceFunction>,
    ) {
        let mut state = self.state.write().unwrap();
        state
            .design_documents
            .entry(namespace.qualify(design_document))
            .or_default()
            .insert(
                view_name.to_string(),
                ViewIndex {
                    entries: Vec::new(),
                    reduce,
                },
            );
    }

    /// Adds an entry to a view index, as if a document had emitted it.
    pub fn emit(
        &self,
        namespace: DesignDocumentNamespace,
        design_document: &str,
        view_name: &str,
        id: impl Into<String>,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let qualified = namespace.qualify(design_document);
        let mut state = self.state.write().unwrap();
        let views = state
            .design_documents
            .get_mut(&qualified)
            .ok_or_else(|| ViewError::DesignDocumentNotFound(qualified.clone()))?;
        let index = views
            .get_mut(view_name)
            .ok_or_else(|| ViewError::ViewNotFound(format!("{qualified}/{view_name}")))?;
        index.entries.push(IndexEntry {
            id: id.into(),
            key: key.into(),
            value: value.into(),
        });
        Ok(())
    }

    /// Removes a design document and all of its views.
    pub fn drop_design_document(
        &self,
        namespace: DesignDocumentNamespace,
        design_document: &str,
    ) -> bool {
        self.state
            .write()
            .unwrap()
            .design_documents
            .remove(&namespace.qualify(design_document))
            .is_some()
    }

    /// Fails the next submission with the given error.
    pub fn fail_next_submit(&self, err: ViewError) {
        self.state.write().unwrap().fail_next_submit = Some(err);
    }

    /// Makes the next stream raise a transport fault after `rows` rows.
    pub fn fail_stream_after(&self, rows: usize) {
        self.state.write().unwrap().fail_stream_after = Some(rows);
    }

    /// Returns the wire form of every query submitted so far.
    pub fn submitted_queries(&self) -> Vec<Value> {
        self.state.read().unwrap().submitted.clone()
    }

    /// Returns the timeout handed over with the last submission.
    pub fn last_timeout(&self) -> Option<Duration> {
        self.state.read().unwrap().last_timeout
    }

    /// Returns the number of entries in a view index.
    pub fn index_size(
        &self,
        namespace: DesignDocumentNamespace,
        design_document: &str,
        view_name: &str,
    ) -> Option<usize> {
        let state = self.state.read().unwrap();
        state
            .design_documents
            .get(&namespace.qualify(design_document))
            .and_then(|views| views.get(view_name))
            .map(|index| index.entries.len())
    }
}

#[async_trait]
impl ViewTransport for InMemoryViewTransport {
    async fn submit(
        &self,
        query: &EncodedViewQuery,
        timeout: Duration,
    ) -> Result<Box<dyn RawRowSource>> {
        let mut state = self.state.write().unwrap();
        state.submitted.push(query.to_json());
        state.last_timeout = Some(timeout);
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }
        let fail_after = state.fail_stream_after.take();

        let source = match answer(&state, query) {
            Ok(answer) => {
                tracing::debug!(
                    rows = answer.rows.len(),
                    total_rows = ?answer.total_rows,
                    "answering view query"
                );
                answer.into_source(fail_after)
            }
            Err(marker) => {
                tracing::debug!(code = marker.code, "view query failed on the server");
                VecRowSource::new().error(marker)
            }
        };
        Ok(Box::new(source))
    }
}

struct Answer {
    rows: Vec<Value>,
    total_rows: Option<usize>,
    debug: Option<Value>,
}

impl Answer {
    fn into_source(self, fail_after: Option<usize>) -> VecRowSource {
        let mut source = VecRowSource::new();
        for (i, row) in self.rows.iter().enumerate() {
            if fail_after == Some(i) {
                return source.fault("view node connection closed mid-stream");
            }
            source = source.row_json(row);
        }
        if fail_after == Some(self.rows.len()) {
            return source.fault("view node connection closed mid-stream");
        }

        let mut trailer = json!({});
        if let Some(total_rows) = self.total_rows {
            trailer["total_rows"] = json!(total_rows);
        }
        if let Some(debug) = self.debug {
            trailer["debug"] = debug;
        }
        source.end().trailer_json(&trailer)
    }
}

/// Server-side outcome: either a value or the marker the server streams.
type ServerResult<T> = std::result::Result<T, ErrorMarker>;

fn invalid(message: impl Into<String>) -> ErrorMarker {
    ErrorMarker::new(codes::INVALID_ARGUMENT, message)
}

fn parse_key(query: &EncodedViewQuery, field: &str) -> ServerResult<Option<Value>> {
    query
        .get_str(field)
        .map(|text| {
            serde_json::from_str(text).map_err(|e| invalid(format!("invalid {field}: {e}")))
        })
        .transpose()
}

/// Evaluates a query against the stored indexes.
fn answer(state: &TransportState, query: &EncodedViewQuery) -> ServerResult<Answer> {
    let namespace = match query.get_str(fields::NAMESPACE) {
        Some(token) => token
            .parse::<DesignDocumentNamespace>()
            .map_err(|e| invalid(e.to_string()))?,
        None => DesignDocumentNamespace::default(),
    };
    let design_document = query.get_str(fields::DOCUMENT_NAME).unwrap_or_default();
    let view_name = query.get_str(fields::VIEW_NAME).unwrap_or_default();
    let qualified = namespace.qualify(design_document);

    let views = state.design_documents.get(&qualified).ok_or_else(|| {
        ErrorMarker::new(
            codes::DESIGN_DOCUMENT_NOT_FOUND,
            format!("design document {qualified} not found"),
        )
        .with_context(json!({ "design_document": qualified }))
    })?;
    let index = views.get(view_name).ok_or_else(|| {
        ErrorMarker::new(
            codes::VIEW_NOT_FOUND,
            format!("view {view_name} not found in {qualified}"),
        )
    })?;

    let descending = query.get_str(fields::ORDER) == Some("descending");
    let mut entries: Vec<&IndexEntry> = index.entries.iter().collect();
    entries.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(&b.id)));
    if descending {
        entries.reverse();
    }

    let selected = select(query, entries, descending)?;

    let reduce = match (index.reduce, query.get_bool(fields::REDUCE)) {
        (Some(function), None | Some(true)) => Some(function),
        (None, Some(true)) => {
            return Err(invalid(format!("view {view_name} has no reduce function")));
        }
        _ => None,
    };
    let mut rows = match reduce {
        Some(function) => reduce_rows(query, &selected, function),
        None => selected
            .iter()
            .map(|e| json!({ "id": e.id, "key": e.key, "value": e.value }))
            .collect(),
    };

    let skip = query.get_u64(fields::SKIP).unwrap_or(0) as usize;
    rows.drain(..skip.min(rows.len()));
    if let Some(limit) = query.get_u64(fields::LIMIT) {
        rows.truncate(limit as usize);
    }

    let debug = query.get_bool(fields::DEBUG).unwrap_or(false).then(|| {
        json!({
            "design_document": qualified,
            "view": view_name,
            "matched_rows": selected.len(),
        })
    });

    Ok(Answer {
        rows,
        total_rows: reduce.is_none().then_some(index.entries.len()),
        debug,
    })
}

/// Applies key, keys and range filters in scan order.
fn select<'a>(
    query: &EncodedViewQuery,
    entries: Vec<&'a IndexEntry>,
    descending: bool,
) -> ServerResult<Vec<&'a IndexEntry>> {
    if let Some(keys) = query.get_str_list(fields::KEYS) {
        let mut selected = Vec::new();
        for text in keys {
            let key: Value = serde_json::from_str(text)
                .map_err(|e| invalid(format!("invalid keys entry: {e}")))?;
            selected.extend(
                entries
                    .iter()
                    .copied()
                    .filter(|e| collate(&e.key, &key) == Ordering::Equal),
            );
        }
        return Ok(selected);
    }

    let key = parse_key(query, fields::KEY)?;
    let start = parse_key(query, fields::START_KEY)?;
    let end = parse_key(query, fields::END_KEY)?;
    let start_id = query.get_str(fields::START_KEY_DOC_ID);
    let end_id = query.get_str(fields::END_KEY_DOC_ID);
    let inclusive_end = query.get_bool(fields::INCLUSIVE_END).unwrap_or(true);

    // Position of an entry relative to a bound, in scan direction.
    let position = |entry: &IndexEntry, bound: &Value, bound_id: Option<&str>| {
        let mut ord = collate(&entry.key, bound);
        if ord == Ordering::Equal
            && let Some(id) = bound_id
        {
            ord = entry.id.as_str().cmp(id);
        }
        if descending { ord.reverse() } else { ord }
    };

    Ok(entries
        .into_iter()
        .filter(|e| {
            key.as_ref()
                .is_none_or(|k| collate(&e.key, k) == Ordering::Equal)
        })
        .filter(|e| {
            start
                .as_ref()
                .is_none_or(|s| position(*e, s, start_id) != Ordering::Less)
        })
        .filter(|e| {
            end.as_ref().is_none_or(|b| {
                let ord = position(*e, b, end_id);
                if inclusive_end {
                    ord != Ordering::Greater
                } else {
                    ord == Ordering::Less
                }
            })
        })
        .collect())
}

fn group_key(key: &Value, level: Option<u64>) -> Value {
    match (key, level) {
        (Value::Array(items), Some(level)) => {
            Value::Array(items.iter().take(level as usize).cloned().collect())
        }
        _ => key.clone(),
    }
}

fn reduce_values(entries: &[&IndexEntry], function: ReduceFunction) -> Value {
    match function {
        ReduceFunction::Count => Value::from(entries.len()),
        ReduceFunction::Sum => {
            if entries.iter().all(|e| e.value.is_i64()) {
                Value::from(entries.iter().filter_map(|e| e.value.as_i64()).sum::<i64>())
            } else {
                Value::from(entries.iter().filter_map(|e| e.value.as_f64()).sum::<f64>())
            }
        }
    }
}

fn reduce_rows(
    query: &EncodedViewQuery,
    entries: &[&IndexEntry],
    function: ReduceFunction,
) -> Vec<Value> {
    let group = query.get_bool(fields::GROUP);
    let level = match (group, query.get_u64(fields::GROUP_LEVEL)) {
        (Some(true), _) => Some(None),
        (_, Some(level)) => Some(Some(level)),
        _ => None,
    };

    let Some(level) = level else {
        if entries.is_empty() {
            return Vec::new();
        }
        return vec![json!({ "key": null, "value": reduce_values(entries, function) })];
    };

    let mut rows = Vec::new();
    let mut group: Vec<&IndexEntry> = Vec::new();
    let mut current: Option<Value> = None;
    for entry in entries {
        let key = group_key(&entry.key, level);
        if let Some(ref k) = current
            && collate(k, &key) != Ordering::Equal
        {
            rows.push(json!({ "key": k, "value": reduce_values(&group, function) }));
            group.clear();
        }
        current = Some(key);
        group.push(*entry);
    }
    if let Some(k) = current {
        rows.push(json!({ "key": k, "value": reduce_values(&group, function) }));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawItem;

    const NS: DesignDocumentNamespace = DesignDocumentNamespace::Development;

    fn transport() -> InMemoryViewTransport {
        let transport = InMemoryViewTransport::new();
        transport.upsert_view(NS, "ddoc", "by_key", None);
        for (id, key) in [("c", 3), ("a", 1), ("b", 2)] {
            transport
                .emit(NS, "ddoc", "by_key", id, key, Value::Null)
                .unwrap();
        }
        transport
    }

    fn query(extra: Vec<(&'static str, crate::encoded::ViewParam)>) -> EncodedViewQuery {
        let mut pairs: Vec<(&'static str, crate::encoded::ViewParam)> = vec![
            (fields::BUCKET_NAME, "default".into()),
            (fields::DOCUMENT_NAME, "ddoc".into()),
            (fields::VIEW_NAME, "by_key".into()),
            (fields::NAMESPACE, "development".into()),
        ];
        pairs.extend(extra);
        EncodedViewQuery::from_pairs(pairs)
    }

    async fn drain(source: &mut Box<dyn RawRowSource>) -> Vec<Value> {
        let mut rows = Vec::new();
        loop {
            match source.next_item().await.unwrap() {
                RawItem::Row(bytes) => rows.push(serde_json::from_slice(&bytes).unwrap()),
                RawItem::End => return rows,
                RawItem::Error(marker) => panic!("unexpected marker: {marker:?}"),
            }
        }
    }

    #[tokio::test]
    async fn answers_in_key_order_with_trailer() {
        let transport = transport();
        let mut source = transport
            .submit(&query(vec![]), Duration::from_secs(75))
            .await
            .unwrap();

        let rows = drain(&mut source).await;
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let trailer: Value = serde_json::from_slice(&source.metadata().await.unwrap()).unwrap();
        assert_eq!(trailer["total_rows"], 3);
        assert_eq!(transport.last_timeout(), Some(Duration::from_secs(75)));
    }

    #[tokio::test]
    async fn missing_design_document_is_an_in_stream_marker() {
        let transport = transport();
        let mut encoded = query(vec![]);
        encoded.insert(fields::DOCUMENT_NAME, "fake-ddoc");
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();

        match source.next_item().await.unwrap() {
            RawItem::Error(marker) => assert_eq!(marker.code, codes::DESIGN_DOCUMENT_NOT_FOUND),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn production_namespace_does_not_see_development_views() {
        let transport = transport();
        let encoded = EncodedViewQuery::from_pairs([
            (fields::BUCKET_NAME, "default"),
            (fields::DOCUMENT_NAME, "ddoc"),
            (fields::VIEW_NAME, "by_key"),
        ]);
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();
        assert!(matches!(
            source.next_item().await.unwrap(),
            RawItem::Error(_)
        ));
    }

    #[tokio::test]
    async fn missing_view_is_an_in_stream_marker() {
        let transport = transport();
        let mut encoded = query(vec![]);
        encoded.insert(fields::VIEW_NAME, "nope");
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();

        match source.next_item().await.unwrap() {
            RawItem::Error(marker) => assert_eq!(marker.code, codes::VIEW_NOT_FOUND),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn descending_range_swaps_bounds() {
        let transport = transport();
        let encoded = query(vec![
            (fields::ORDER, "descending".into()),
            (fields::START_KEY, "3".into()),
            (fields::END_KEY, "2".into()),
        ]);
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();
        let rows = drain(&mut source).await;
        let keys: Vec<_> = rows.iter().map(|r| r["key"].as_i64().unwrap()).collect();
        assert_eq!(keys, vec![3, 2]);
    }

    #[tokio::test]
    async fn exclusive_end_drops_the_bound() {
        let transport = transport();
        let encoded = query(vec![
            (fields::END_KEY, "2".into()),
            (fields::INCLUSIVE_END, false.into()),
        ]);
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();
        assert_eq!(drain(&mut source).await.len(), 1);
    }

    #[tokio::test]
    async fn skip_and_limit_apply_after_filtering() {
        let transport = transport();
        let encoded = query(vec![
            (fields::SKIP, 1u64.into()),
            (fields::LIMIT, 1u64.into()),
        ]);
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();
        let rows = drain(&mut source).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "b");
    }

    #[tokio::test]
    async fn reduce_on_plain_view_is_rejected() {
        let transport = transport();
        let encoded = query(vec![(fields::REDUCE, true.into())]);
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();
        match source.next_item().await.unwrap() {
            RawItem::Error(marker) => assert_eq!(marker.code, codes::INVALID_ARGUMENT),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reduced_trailer_has_no_total_rows() {
        let transport = transport();
        transport.upsert_view(NS, "ddoc", "count", Some(ReduceFunction::Count));
        transport
            .emit(NS, "ddoc", "count", "a", 1, Value::Null)
            .unwrap();
        let mut encoded = query(vec![]);
        encoded.insert(fields::VIEW_NAME, "count");
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();

        assert_eq!(
            drain(&mut source).await,
            vec![json!({"key": null, "value": 1})]
        );
        let trailer: Value = serde_json::from_slice(&source.metadata().await.unwrap()).unwrap();
        assert_eq!(trailer, json!({}));
    }

    #[tokio::test]
    async fn injected_submit_failure_is_one_shot() {
        let transport = transport();
        transport.fail_next_submit(ViewError::ServiceNotAvailable("down".to_string()));

        let encoded = query(vec![]);
        assert!(transport.submit(&encoded, Duration::ZERO).await.is_err());
        assert!(transport.submit(&encoded, Duration::ZERO).await.is_ok());
        assert_eq!(transport.submitted_queries().len(), 2);
    }

    #[tokio::test]
    async fn injected_stream_fault_cuts_rows() {
        let transport = transport();
        transport.fail_stream_after(1);
        let encoded = query(vec![]);
        let mut source = transport.submit(&encoded, Duration::ZERO).await.unwrap();

        assert!(matches!(source.next_item().await.unwrap(), RawItem::Row(_)));
        assert!(source.next_item().await.is_err());
    }

    #[test]
    fn group_level_truncates_array_keys() {
        assert_eq!(
            group_key(&json!(["a", "b", "c"]), Some(2)),
            json!(["a", "b"])
        );
        assert_eq!(group_key(&json!(["a", "b"]), None), json!(["a", "b"]));
        assert_eq!(group_key(&json!("a"), Some(1)), json!("a"));
    }

    #[test]
    fn emit_into_unknown_view_fails() {
        let transport = transport();
        let production = DesignDocumentNamespace::Production;
        assert!(matches!(
            transport.emit(NS, "ddoc", "nope", "x", 1, 1),
            Err(ViewError::ViewNotFound(_))
        ));
        assert!(matches!(
            transport.emit(production, "ddoc", "by_key", "x", 1, 1),
            Err(ViewError::DesignDocumentNotFound(_))
        ));
        assert_eq!(transport.index_size(NS, "ddoc", "by_key"), Some(3));
    }
}
