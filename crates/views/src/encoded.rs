//! The flat, encodable form of a view query.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::Serializer;
use serde_json::{Map, Value};

/// A single encoded parameter value.
#[derive(Debug, Clone)]
pub enum ViewParam {
    String(String),
    Bool(bool),
    UInt(u64),
    StringList(Vec<String>),
    /// Client-side only; never sent over the wire.
    Serializer(Arc<dyn Serializer>),
}

impl PartialEq for ViewParam {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ViewParam::String(a), ViewParam::String(b)) => a == b,
            (ViewParam::Bool(a), ViewParam::Bool(b)) => a == b,
            (ViewParam::UInt(a), ViewParam::UInt(b)) => a == b,
            (ViewParam::StringList(a), ViewParam::StringList(b)) => a == b,
            (ViewParam::Serializer(a), ViewParam::Serializer(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for ViewParam {
    fn from(value: &str) -> Self {
        ViewParam::String(value.to_string())
    }
}

impl From<String> for ViewParam {
    fn from(value: String) -> Self {
        ViewParam::String(value)
    }
}

impl From<bool> for ViewParam {
    fn from(value: bool) -> Self {
        ViewParam::Bool(value)
    }
}

impl From<u64> for ViewParam {
    fn from(value: u64) -> Self {
        ViewParam::UInt(value)
    }
}

impl From<Vec<String>> for ViewParam {
    fn from(value: Vec<String>) -> Self {
        ViewParam::StringList(value)
    }
}

/// Encoded view query: canonical field name to parameter value.
///
/// Only explicitly set options appear; there are no null placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedViewQuery {
    params: BTreeMap<&'static str, ViewParam>,
}

impl EncodedViewQuery {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, field: &'static str, value: impl Into<ViewParam>) {
        self.params.insert(field, value.into());
    }

    /// Builds an encoded query from explicit pairs, mostly useful in tests.
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<ViewParam>,
    {
        Self {
            params: pairs.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&ViewParam> {
        self.params.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        match self.params.get(field) {
            Some(ViewParam::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        match self.params.get(field) {
            Some(ViewParam::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_u64(&self, field: &str) -> Option<u64> {
        match self.params.get(field) {
            Some(ViewParam::UInt(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_str_list(&self, field: &str) -> Option<&[String]> {
        match self.params.get(field) {
            Some(ViewParam::StringList(list)) => Some(list),
            _ => None,
        }
    }

    /// Returns the configured serializer, if one was set.
    pub fn serializer(&self) -> Option<Arc<dyn Serializer>> {
        match self.params.get(fields::SERIALIZER) {
            Some(ViewParam::Serializer(s)) => Some(Arc::clone(s)),
            _ => None,
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.params.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the field names in sorted order.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.params.keys().copied().collect()
    }

    /// Produces the wire JSON object. The serializer entry is dropped.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (field, param) in &self.params {
            let value = match param {
                ViewParam::String(s) => Value::String(s.clone()),
                ViewParam::Bool(b) => Value::Bool(*b),
                ViewParam::UInt(n) => Value::from(*n),
                ViewParam::StringList(list) => {
                    Value::Array(list.iter().cloned().map(Value::String).collect())
                }
                ViewParam::Serializer(_) => continue,
            };
            map.insert((*field).to_string(), value);
        }
        Value::Object(map)
    }
}

/// Canonical encoded field names.
pub mod fields {
    pub const BUCKET_NAME: &str = "bucket_name";
    pub const DOCUMENT_NAME: &str = "document_name";
    pub const VIEW_NAME: &str = "view_name";
    pub const NAMESPACE: &str = "namespace";
    pub const CLIENT_CONTEXT_ID: &str = "client_context_id";
    pub const DEBUG: &str = "debug";
    pub const END_KEY: &str = "end_key";
    pub const END_KEY_DOC_ID: &str = "end_key_doc_id";
    pub const GROUP: &str = "group";
    pub const GROUP_LEVEL: &str = "group_level";
    pub const INCLUSIVE_END: &str = "inclusive_end";
    pub const KEY: &str = "key";
    pub const KEYS: &str = "keys";
    pub const LIMIT: &str = "limit";
    pub const ON_ERROR: &str = "on_error";
    pub const ORDER: &str = "order";
    pub const REDUCE: &str = "reduce";
    pub const SCAN_CONSISTENCY: &str = "scan_consistency";
    pub const SERIALIZER: &str = "serializer";
    pub const SKIP: &str = "skip";
    pub const START_KEY: &str = "start_key";
    pub const START_KEY_DOC_ID: &str = "start_key_doc_id";
    pub const TIMEOUT: &str = "timeout";
}
