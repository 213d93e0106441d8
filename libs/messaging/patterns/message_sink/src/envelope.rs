use crate::SinkError;
use std::collections::HashMap;
use std::fmt;

/// Maximum envelope body size in bytes (1MB default)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Out-of-band metadata value carried next to the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            AttributeValue::Int(_) => None,
        }
    }

    /// Integer view; numeric strings are accepted since some backends
    /// only carry string properties
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Str(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(s) => f.write_str(s),
            AttributeValue::Int(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

/// Unit of transfer between a publisher and a subscriber
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    /// Opaque payload bytes
    pub body: Vec<u8>,

    /// Routing and validation metadata
    pub attributes: HashMap<String, AttributeValue>,

    /// Partition or storage key, backend-interpreted
    pub partition_key: Option<String>,
}

impl Envelope {
    /// Create an envelope, validating body size
    pub fn new(body: Vec<u8>) -> Result<Self, SinkError> {
        Self::new_with_limit(body, DEFAULT_MAX_BODY_SIZE)
    }

    pub fn new_with_limit(body: Vec<u8>, max_size: usize) -> Result<Self, SinkError> {
        if body.len() > max_size {
            return Err(SinkError::body_too_large(body.len(), max_size));
        }

        Ok(Self::new_unchecked(body))
    }

    /// Create an envelope without size validation
    pub fn new_unchecked(body: Vec<u8>) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
            partition_key: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// String attribute, `None` when absent or not a string
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttributeValue::as_str)
    }

    pub fn int_attribute(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(AttributeValue::as_int)
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limit() {
        assert!(Envelope::new_with_limit(vec![0u8; 16], 16).is_ok());

        let err = Envelope::new_with_limit(vec![0u8; 17], 16).unwrap_err();
        assert!(matches!(err, SinkError::BodyTooLarge { size: 17, limit: 16 }));
    }

    #[test]
    fn test_attribute_views() {
        let envelope = Envelope::new_unchecked(b"{}".to_vec())
            .with_attribute("senderid", "alpha")
            .with_attribute("senderIdx", 3i64)
            .with_attribute("legacyIdx", "7")
            .with_partition_key("alpha");

        assert_eq!(envelope.str_attribute("senderid"), Some("alpha"));
        assert_eq!(envelope.str_attribute("senderIdx"), None);
        assert_eq!(envelope.int_attribute("senderIdx"), Some(3));
        assert_eq!(envelope.int_attribute("legacyIdx"), Some(7));
        assert_eq!(envelope.int_attribute("senderid"), None);
        assert_eq!(envelope.partition_key.as_deref(), Some("alpha"));
        assert_eq!(envelope.attribute("senderIdx").unwrap().to_string(), "3");
    }
}
