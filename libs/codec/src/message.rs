//! Wire types for synthetic message batches
//!
//! ```json
//! {"messages":[{"current":17,"delta":3,"clientip":"41.7.200.9"}],"count":1,"ts":1718000000000}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Exclusive upper bound of [`MessageRecord::current`]
pub const CURRENT_LIMIT: u32 = 4096;

/// Exclusive upper bound of [`MessageRecord::delta`]
pub const DELTA_LIMIT: u32 = 64;

/// Free-form per-record attributes
pub type Attributes = Map<String, Value>;

/// One synthetic record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub current: u32,
    pub delta: u32,
    #[serde(rename = "clientip")]
    pub client_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

/// Records created together by one send call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBatch {
    #[serde(rename = "messages")]
    pub list: Vec<MessageRecord>,
    pub count: usize,
    /// Creation time, milliseconds since the Unix epoch
    #[serde(rename = "ts")]
    pub timestamp_ms: i64,
}

impl MessageBatch {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// Wall-clock milliseconds since the Unix epoch
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
