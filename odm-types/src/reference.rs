//! Opaque reference tokens.
//!
//! A token names one document in one collection. Reference fields store
//! tokens, never the referenced entity itself.

use crate::{DocumentId, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pointer to a stored document: collection name plus document id.
///
/// The textual form is `collection:id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefToken {
    collection: String,
    id: DocumentId,
}

impl RefToken {
    #[must_use]
    pub fn new(collection: impl Into<String>, id: DocumentId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }

    /// Name of the collection the referenced document lives in.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn id(&self) -> DocumentId {
        self.id
    }
}

impl fmt::Display for RefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.collection, self.id)
    }
}

impl FromStr for RefToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (collection, id) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidToken(format!("missing ':' in '{s}'")))?;
        if collection.is_empty() {
            return Err(Error::InvalidToken(format!("empty collection in '{s}'")));
        }
        Ok(Self::new(collection, DocumentId::parse(id)?))
    }
}
