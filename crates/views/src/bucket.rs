//! Bucket-level entry point for view queries.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Result;
use crate::config::ViewConfig;
use crate::encoded::EncodedViewQuery;
use crate::query::{ViewOptions, ViewQuery};
use crate::request::ViewRequest;
use crate::row::ViewRow;
use crate::source::ViewTransport;

/// A bucket handle that issues view queries over a transport.
///
/// Building a query is synchronous and fails fast on bad options. Nothing
/// is sent until the returned request is first pulled or submitted.
pub struct Bucket<T: ViewTransport + 'static> {
    name: String,
    transport: Arc<T>,
    config: ViewConfig,
}

impl<T: ViewTransport + 'static> Clone for Bucket<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<T: ViewTransport + 'static> Bucket<T> {
    /// Creates a bucket handle with default configuration.
    pub fn new(name: impl Into<String>, transport: T) -> Self {
        Self::with_config(name, transport, ViewConfig::default())
    }

    pub fn with_config(name: impl Into<String>, transport: T, config: ViewConfig) -> Self {
        Self {
            name: name.into(),
            transport: Arc::new(transport),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Queries a view, yielding structured rows.
    pub fn view_query(
        &self,
        design_document: &str,
        view_name: &str,
        options: ViewOptions,
    ) -> Result<ViewRequest<ViewRow>> {
        let (query, timeout) = self.prepare(design_document, view_name, options)?;
        Ok(ViewRequest::new(self.shared_transport(), query, timeout))
    }

    /// Queries a view, yielding each row as a raw JSON value.
    pub fn view_query_raw(
        &self,
        design_document: &str,
        view_name: &str,
        options: ViewOptions,
    ) -> Result<ViewRequest<Value>> {
        let (query, timeout) = self.prepare(design_document, view_name, options)?;
        Ok(ViewRequest::raw(self.shared_transport(), query, timeout))
    }

    /// Queries a view, mapping each row onto `R` by field name.
    pub fn view_query_as<R: DeserializeOwned>(
        &self,
        design_document: &str,
        view_name: &str,
        options: ViewOptions,
    ) -> Result<ViewRequest<R>> {
        let (query, timeout) = self.prepare(design_document, view_name, options)?;
        Ok(ViewRequest::with_row_type(
            self.shared_transport(),
            query,
            timeout,
        ))
    }

    fn prepare(
        &self,
        design_document: &str,
        view_name: &str,
        options: ViewOptions,
    ) -> Result<(EncodedViewQuery, Duration)> {
        let query = ViewQuery::build(&self.name, design_document, view_name, options)?;
        let timeout = query.timeout().unwrap_or(self.config.view_timeout);
        tracing::debug!(
            bucket = %self.name,
            design_document,
            view_name,
            namespace = %query.namespace(),
            "view query built"
        );
        Ok((query.into_encodable(), timeout))
    }

    fn shared_transport(&self) -> Arc<dyn ViewTransport> {
        self.transport.clone()
    }
}
