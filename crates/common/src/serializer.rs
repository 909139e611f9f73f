use serde_json::Value;

/// Pluggable codec between raw row payloads and JSON values.
///
/// Implementations must be stateless or internally synchronized; a single
/// serializer is shared by every request built from the same options.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// Encodes a value into its byte representation.
    fn serialize(&self, value: &Value) -> serde_json::Result<Vec<u8>>;

    /// Decodes a byte payload into a value.
    fn deserialize(&self, bytes: &[u8]) -> serde_json::Result<Value>;
}

/// The default serializer: plain JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJsonSerializer;

impl DefaultJsonSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for DefaultJsonSerializer {
    fn serialize(&self, value: &Value) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(value)
    }

    fn deserialize(&self, bytes: &[u8]) -> serde_json::Result<Value> {
        serde_json::from_slice(bytes)
    }
}
