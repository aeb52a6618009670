//! In-memory item store.
//!
//! Stands in for a database: every operation is a DB-level span.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use opentelemetry::KeyValue;

use crate::items::types::{Item, ItemError, ItemId};
use crate::observability::{Granularity, Telemetry};

pub struct ItemStore {
    items: DashMap<ItemId, String>,
    telemetry: Telemetry,
}

fn id_attribute(id: &ItemId) -> [KeyValue; 1] {
    [KeyValue::new("item.id", id.to_string())]
}

impl ItemStore {
    pub fn new(telemetry: Telemetry) -> Self {
        Self {
            items: DashMap::new(),
            telemetry,
        }
    }

    pub fn create(&self, item: Item) -> Result<Item, ItemError> {
        self.telemetry
            .try_wrap("ItemStore.create_item", Granularity::Db, id_attribute(&item.id), || {
                match self.items.entry(item.id) {
                    Entry::Occupied(_) => Err(ItemError::AlreadyExists(item.id)),
                    Entry::Vacant(slot) => {
                        slot.insert(item.value.clone());
                        Ok(item)
                    }
                }
            })
    }

    pub fn fetch(&self, id: ItemId) -> Result<Item, ItemError> {
        self.telemetry
            .try_wrap("ItemStore.read_item", Granularity::Db, id_attribute(&id), || {
                self.items
                    .get(&id)
                    .map(|value| Item {
                        id,
                        value: value.clone(),
                    })
                    .ok_or(ItemError::NotFound(id))
            })
    }

    pub fn update(&self, id: ItemId, value: String) -> Result<Item, ItemError> {
        self.telemetry
            .try_wrap("ItemStore.update_item", Granularity::Db, id_attribute(&id), || {
                let mut slot = self.items.get_mut(&id).ok_or(ItemError::NotFound(id))?;
                *slot = value.clone();
                Ok(Item { id, value })
            })
    }

    pub fn delete(&self, id: ItemId) -> Result<Item, ItemError> {
        self.telemetry
            .try_wrap("ItemStore.delete_item", Granularity::Db, id_attribute(&id), || {
                self.items
                    .remove(&id)
                    .map(|(id, value)| Item { id, value })
                    .ok_or(ItemError::NotFound(id))
            })
    }

    /// All items, ordered by id.
    pub fn list(&self) -> Vec<Item> {
        self.telemetry.wrap("ItemStore.list_items", Granularity::Db, [], || {
            let mut items: Vec<Item> = self
                .items
                .iter()
                .map(|entry| Item {
                    id: *entry.key(),
                    value: entry.value().clone(),
                })
                .collect();
            items.sort_by_key(|item| item.id);
            self.telemetry
                .add_attributes_to_current_span([KeyValue::new("item.count", items.len() as i64)]);
            items
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
