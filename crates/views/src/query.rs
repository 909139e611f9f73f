//! View query options and the built, validated query.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use common::{DesignDocumentNamespace, Serializer, UnknownTokenError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::encoded::{EncodedViewQuery, ViewParam, fields};
use crate::{Result, ViewError};

/// Row ordering requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewOrdering {
    Ascending,
    Descending,
}

impl ViewOrdering {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewOrdering::Ascending => "ascending",
            ViewOrdering::Descending => "descending",
        }
    }
}

impl std::fmt::Display for ViewOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ViewOrdering {
    type Err = UnknownTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ascending" => Ok(ViewOrdering::Ascending),
            "descending" => Ok(ViewOrdering::Descending),
            other => Err(UnknownTokenError::new("order", other)),
        }
    }
}

/// What the server does when a view function fails on some node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewErrorMode {
    Stop,
    Continue,
}

impl ViewErrorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewErrorMode::Stop => "stop",
            ViewErrorMode::Continue => "continue",
        }
    }
}

impl std::fmt::Display for ViewErrorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ViewErrorMode {
    type Err = UnknownTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "stop" => Ok(ViewErrorMode::Stop),
            "continue" => Ok(ViewErrorMode::Continue),
            other => Err(UnknownTokenError::new("on_error", other)),
        }
    }
}

/// Staleness tolerance for the index answering the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewScanConsistency {
    /// Serve from the index as it is now.
    NotBounded,
    /// Update the index before answering.
    RequestPlus,
    /// Answer from the current index, then trigger an update.
    UpdateAfter,
}

impl ViewScanConsistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewScanConsistency::NotBounded => "not_bounded",
            ViewScanConsistency::RequestPlus => "request_plus",
            ViewScanConsistency::UpdateAfter => "update_after",
        }
    }
}

impl std::fmt::Display for ViewScanConsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ViewScanConsistency {
    type Err = UnknownTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not_bounded" => Ok(ViewScanConsistency::NotBounded),
            "request_plus" => Ok(ViewScanConsistency::RequestPlus),
            "update_after" => Ok(ViewScanConsistency::UpdateAfter),
            other => Err(UnknownTokenError::new("scan_consistency", other)),
        }
    }
}

/// A query timeout in any of the accepted input forms.
///
/// Plain integers are whole seconds, floats are fractional seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryTimeout {
    Duration(Duration),
    Seconds(i64),
    FractionalSeconds(f64),
}

impl QueryTimeout {
    /// Normalizes the timeout to whole microseconds.
    pub fn to_micros(&self) -> Result<u64> {
        match *self {
            QueryTimeout::Duration(d) => u64::try_from(d.as_micros())
                .map_err(|_| ViewError::InvalidArgument(format!("timeout {d:?} is too large"))),
            QueryTimeout::Seconds(secs) => {
                if secs < 0 {
                    return Err(ViewError::InvalidArgument(format!(
                        "timeout must be non-negative, got {secs}"
                    )));
                }
                (secs as u64).checked_mul(1_000_000).ok_or_else(|| {
                    ViewError::InvalidArgument(format!("timeout {secs}s is too large"))
                })
            }
            QueryTimeout::FractionalSeconds(secs) => {
                if !secs.is_finite() || secs < 0.0 {
                    return Err(ViewError::InvalidArgument(format!(
                        "timeout must be a finite non-negative number, got {secs}"
                    )));
                }
                let micros = (secs * 1_000_000.0).round();
                if micros > u64::MAX as f64 {
                    return Err(ViewError::InvalidArgument(format!(
                        "timeout {secs}s is too large"
                    )));
                }
                Ok(micros as u64)
            }
        }
    }
}

impl From<Duration> for QueryTimeout {
    fn from(value: Duration) -> Self {
        QueryTimeout::Duration(value)
    }
}

impl From<i64> for QueryTimeout {
    fn from(value: i64) -> Self {
        QueryTimeout::Seconds(value)
    }
}

impl From<i32> for QueryTimeout {
    fn from(value: i32) -> Self {
        QueryTimeout::Seconds(value.into())
    }
}

impl From<u32> for QueryTimeout {
    fn from(value: u32) -> Self {
        QueryTimeout::Seconds(value.into())
    }
}

impl From<u64> for QueryTimeout {
    fn from(value: u64) -> Self {
        QueryTimeout::Duration(Duration::from_secs(value))
    }
}

impl From<f64> for QueryTimeout {
    fn from(value: f64) -> Self {
        QueryTimeout::FractionalSeconds(value)
    }
}

/// Options for a view query.
///
/// Every option is unset by default and only set options are encoded.
/// Conflicting combinations (e.g. `key` together with `keys`) are passed
/// through for the server to judge.
#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub client_context_id: Option<String>,
    pub debug: Option<bool>,
    pub key: Option<Value>,
    pub keys: Option<Vec<Value>>,
    pub startkey: Option<Value>,
    pub endkey: Option<Value>,
    pub startkey_docid: Option<String>,
    pub endkey_docid: Option<String>,
    pub inclusive_end: Option<bool>,
    pub group: Option<bool>,
    pub group_level: Option<i64>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
    pub reduce: Option<bool>,
    pub namespace: Option<DesignDocumentNamespace>,
    pub order: Option<ViewOrdering>,
    pub on_error: Option<ViewErrorMode>,
    pub scan_consistency: Option<ViewScanConsistency>,
    pub timeout: Option<QueryTimeout>,
    pub serializer: Option<Arc<dyn Serializer>>,
}

impl ViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_context_id(mut self, id: impl Into<String>) -> Self {
        self.client_context_id = Some(id.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Matches a single key exactly.
    pub fn key(mut self, key: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Matches any of the given keys, returned in the given order.
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Value>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn startkey(mut self, key: impl Into<Value>) -> Self {
        self.startkey = Some(key.into());
        self
    }

    pub fn endkey(mut self, key: impl Into<Value>) -> Self {
        self.endkey = Some(key.into());
        self
    }

    pub fn startkey_docid(mut self, id: impl Into<String>) -> Self {
        self.startkey_docid = Some(id.into());
        self
    }

    pub fn endkey_docid(mut self, id: impl Into<String>) -> Self {
        self.endkey_docid = Some(id.into());
        self
    }

    pub fn inclusive_end(mut self, inclusive: bool) -> Self {
        self.inclusive_end = Some(inclusive);
        self
    }

    pub fn group(mut self, group: bool) -> Self {
        self.group = Some(group);
        self
    }

    pub fn group_level(mut self, level: i64) -> Self {
        self.group_level = Some(level);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn reduce(mut self, reduce: bool) -> Self {
        self.reduce = Some(reduce);
        self
    }

    pub fn namespace(mut self, namespace: DesignDocumentNamespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn order(mut self, order: ViewOrdering) -> Self {
        self.order = Some(order);
        self
    }

    pub fn on_error(mut self, mode: ViewErrorMode) -> Self {
        self.on_error = Some(mode);
        self
    }

    pub fn scan_consistency(mut self, consistency: ViewScanConsistency) -> Self {
        self.scan_consistency = Some(consistency);
        self
    }

    /// Sets the timeout as a `Duration`, whole seconds or fractional seconds.
    pub fn timeout(mut self, timeout: impl Into<QueryTimeout>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }
}

/// A built, immutable view query.
#[derive(Debug, Clone)]
pub struct ViewQuery {
    bucket_name: String,
    design_document: String,
    view_name: String,
    namespace: DesignDocumentNamespace,
    order: Option<ViewOrdering>,
    on_error: Option<ViewErrorMode>,
    consistency: Option<ViewScanConsistency>,
    timeout_micros: Option<u64>,
    serializer: Option<Arc<dyn Serializer>>,
    encoded: EncodedViewQuery,
}

impl ViewQuery {
    /// Builds a query, validating and encoding every set option.
    pub fn build(
        bucket_name: impl Into<String>,
        design_document: impl Into<String>,
        view_name: impl Into<String>,
        options: ViewOptions,
    ) -> Result<Self> {
        let bucket_name = bucket_name.into();
        let design_document = design_document.into();
        let view_name = view_name.into();

        let mut encoded = EncodedViewQuery::new();
        encoded.insert(fields::BUCKET_NAME, bucket_name.as_str());
        encoded.insert(fields::DOCUMENT_NAME, design_document.as_str());
        encoded.insert(fields::VIEW_NAME, view_name.as_str());

        if let Some(namespace) = options.namespace {
            encoded.insert(fields::NAMESPACE, namespace.as_str());
        }
        if let Some(id) = options.client_context_id {
            encoded.insert(fields::CLIENT_CONTEXT_ID, id);
        }
        if let Some(debug) = options.debug {
            encoded.insert(fields::DEBUG, debug);
        }
        if let Some(key) = &options.key {
            encoded.insert(fields::KEY, encode_key(fields::KEY, key)?);
        }
        if let Some(keys) = &options.keys {
            let encoded_keys = keys
                .iter()
                .map(|k| encode_key(fields::KEYS, k))
                .collect::<Result<Vec<_>>>()?;
            encoded.insert(fields::KEYS, encoded_keys);
        }
        if let Some(key) = &options.startkey {
            encoded.insert(fields::START_KEY, encode_key(fields::START_KEY, key)?);
        }
        if let Some(key) = &options.endkey {
            encoded.insert(fields::END_KEY, encode_key(fields::END_KEY, key)?);
        }
        if let Some(id) = options.startkey_docid {
            encoded.insert(fields::START_KEY_DOC_ID, id);
        }
        if let Some(id) = options.endkey_docid {
            encoded.insert(fields::END_KEY_DOC_ID, id);
        }
        if let Some(inclusive) = options.inclusive_end {
            encoded.insert(fields::INCLUSIVE_END, inclusive);
        }
        if let Some(group) = options.group {
            encoded.insert(fields::GROUP, group);
        }
        if let Some(level) = options.group_level {
            encoded.insert(
                fields::GROUP_LEVEL,
                check_count(fields::GROUP_LEVEL, level)?,
            );
        }
        if let Some(limit) = options.limit {
            encoded.insert(fields::LIMIT, check_count(fields::LIMIT, limit)?);
        }
        if let Some(skip) = options.skip {
            encoded.insert(fields::SKIP, check_count(fields::SKIP, skip)?);
        }
        if let Some(reduce) = options.reduce {
            encoded.insert(fields::REDUCE, reduce);
        }
        if let Some(order) = options.order {
            encoded.insert(fields::ORDER, order.as_str());
        }
        if let Some(mode) = options.on_error {
            encoded.insert(fields::ON_ERROR, mode.as_str());
        }
        if let Some(consistency) = options.scan_consistency {
            encoded.insert(fields::SCAN_CONSISTENCY, consistency.as_str());
        }
        let timeout_micros = options.timeout.map(|t| t.to_micros()).transpose()?;
        if let Some(micros) = timeout_micros {
            encoded.insert(fields::TIMEOUT, micros);
        }
        if let Some(serializer) = &options.serializer {
            let param = ViewParam::Serializer(Arc::clone(serializer));
            encoded.insert(fields::SERIALIZER, param);
        }

        Ok(Self {
            bucket_name,
            design_document,
            view_name,
            namespace: options.namespace.unwrap_or_default(),
            order: options.order,
            on_error: options.on_error,
            consistency: options.scan_consistency,
            timeout_micros,
            serializer: options.serializer,
            encoded,
        })
    }

    /// Returns the flat encoded parameter mapping.
    pub fn as_encodable(&self) -> &EncodedViewQuery {
        &self.encoded
    }

    pub fn into_encodable(self) -> EncodedViewQuery {
        self.encoded
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn design_document(&self) -> &str {
        &self.design_document
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// The namespace the query targets; production unless set.
    pub fn namespace(&self) -> DesignDocumentNamespace {
        self.namespace
    }

    pub fn order(&self) -> Option<ViewOrdering> {
        self.order
    }

    pub fn on_error(&self) -> Option<ViewErrorMode> {
        self.on_error
    }

    pub fn consistency(&self) -> Option<ViewScanConsistency> {
        self.consistency
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_micros.map(Duration::from_micros)
    }

    pub fn serializer(&self) -> Option<&Arc<dyn Serializer>> {
        self.serializer.as_ref()
    }
}

fn encode_key(field: &str, key: &Value) -> Result<String> {
    serde_json::to_string(key)
        .map_err(|e| ViewError::InvalidArgument(format!("{field} is not JSON-encodable: {e}")))
}

fn check_count(field: &str, value: i64) -> Result<u64> {
    if !(0..=i64::from(u32::MAX)).contains(&value) {
        return Err(ViewError::InvalidArgument(format!(
            "{field} must be between 0 and {}, got {value}",
            u32::MAX
        )));
    }
    Ok(value as u64)
}
