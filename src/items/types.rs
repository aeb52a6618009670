//! Item types.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type ItemId = Uuid;

/// A stored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub value: String,
}

impl Item {
    /// A new item with a random id.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("Item with id {0} does not exist.")]
    NotFound(ItemId),

    #[error("Item with id {0} already exists.")]
    AlreadyExists(ItemId),
}
