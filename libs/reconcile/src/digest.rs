//! Order-insensitive fingerprints of relation sets.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Fingerprint of a set of serialisable items.
///
/// Items are rendered to JSON with sorted object keys, the renderings are
/// sorted, and the result is hashed. Two sets with the same members produce
/// the same digest regardless of order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SetDigest(String);

impl SetDigest {
    /// Digest of `items`.
    ///
    /// # Errors
    ///
    /// Returns an error if an item fails to serialise.
    pub fn of<T: Serialize>(items: &[T]) -> Result<Self, serde_json::Error> {
        let mut rendered = items
            .iter()
            .map(|item| serde_json::to_value(item).map(|value| value.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        rendered.sort_unstable();

        let mut hasher = Sha256::new();
        for line in &rendered {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        let result = hasher.finalize();
        Ok(Self(format!("sha256:{}", hex::encode(&result[..16]))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SetDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
