use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::CoreError;

/// Opaque 128-bit entity identifier.
///
/// Backed by a UUIDv7 rendered in its canonical hyphenated form, so the
/// byte-wise order of two ids is compatible with their creation times and
/// natural sort approximates insertion order.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Uid(String);

impl Uid {
    /// Generate a fresh time-ordered identifier.
    pub fn generate() -> Self {
        Uid(Uuid::now_v7().to_string())
    }

    /// Parse an identifier from caller-supplied bytes.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let parsed = Uuid::parse_str(raw)
            .map_err(|e| CoreError::InvalidArgument(format!("malformed id {:?}: {}", raw, e)))?;
        Ok(Uid(parsed.to_string()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
