use crate::errors::DbError;
use bson::Document;
use serde::{Deserialize, Serialize};

const fn default_true() -> bool {
    true
}

/// Per-query options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Use the connection's shared session instead of cloning a private one.
    #[serde(default)]
    pub pooling: bool,
    /// Keep a private session open after `exec`, for batches of writes.
    #[serde(default)]
    pub multiexec: bool,
    /// Count matching documents before fetching. Costs one extra store round trip.
    #[serde(default = "default_true")]
    pub count: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { pooling: false, multiexec: false, count: true }
    }
}

impl QueryConfig {
    /// Reads options from a configuration map. Unknown keys are ignored.
    ///
    /// # Errors
    /// Returns an error when a recognized key holds a value of the wrong type.
    pub fn from_document(settings: &Document) -> Result<Self, DbError> {
        Ok(bson::from_document(settings.clone())?)
    }

    #[must_use]
    pub const fn pooling(mut self, on: bool) -> Self {
        self.pooling = on;
        self
    }

    #[must_use]
    pub const fn multiexec(mut self, on: bool) -> Self {
        self.multiexec = on;
        self
    }

    #[must_use]
    pub const fn count(mut self, on: bool) -> Self {
        self.count = on;
        self
    }
}
