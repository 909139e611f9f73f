use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a canonical wire token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} token: {token:?}")]
pub struct UnknownTokenError {
    /// The enum being parsed (e.g. "namespace").
    pub kind: &'static str,
    /// The token that failed to parse.
    pub token: String,
}

impl UnknownTokenError {
    /// Creates an error for the given enum kind and offending token.
    pub fn new(kind: &'static str, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
        }
    }
}

/// The namespace a design document lives in.
///
/// Development design documents are prefixed with `dev_` on the server and
/// only index a subset of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignDocumentNamespace {
    #[default]
    Production,
    Development,
}

impl DesignDocumentNamespace {
    /// Returns the canonical wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            DesignDocumentNamespace::Production => "production",
            DesignDocumentNamespace::Development => "development",
        }
    }

    /// Returns the name the server stores a design document under.
    pub fn qualify(&self, design_document: &str) -> String {
        match self {
            DesignDocumentNamespace::Production => design_document.to_string(),
            DesignDocumentNamespace::Development => format!("dev_{design_document}"),
        }
    }
}

impl std::fmt::Display for DesignDocumentNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DesignDocumentNamespace {
    type Err = UnknownTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(DesignDocumentNamespace::Production),
            "development" => Ok(DesignDocumentNamespace::Development),
            other => Err(UnknownTokenError::new("namespace", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_production() {
        assert_eq!(
            DesignDocumentNamespace::default(),
            DesignDocumentNamespace::Production
        );
    }

    #[test]
    fn tokens_parse_back() {
        for ns in [
            DesignDocumentNamespace::Production,
            DesignDocumentNamespace::Development,
        ] {
            assert_eq!(ns.as_str().parse::<DesignDocumentNamespace>(), Ok(ns));
        }
    }

    #[test]
    fn unknown_token_is_rejected() {
        let err = "DEVELOPMENT"
            .parse::<DesignDocumentNamespace>()
            .unwrap_err();
        assert_eq!(err.kind, "namespace");
        assert_eq!(err.token, "DEVELOPMENT");
    }

    #[test]
    fn development_names_are_prefixed() {
        assert_eq!(DesignDocumentNamespace::Production.qualify("beer"), "beer");
        assert_eq!(
            DesignDocumentNamespace::Development.qualify("beer"),
            "dev_beer"
        );
    }

    #[test]
    fn serde_uses_wire_tokens() {
        let json = serde_json::to_string(&DesignDocumentNamespace::Development).unwrap();
        assert_eq!(json, "\"development\"");
    }
}
