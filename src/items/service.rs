//! Item business logic.

use std::sync::Arc;

use opentelemetry::KeyValue;

use crate::items::store::ItemStore;
use crate::items::types::{Item, ItemError, ItemId};
use crate::observability::{Counter, Granularity, Telemetry};

pub struct ItemService {
    store: ItemStore,
    telemetry: Telemetry,
    created: Arc<Counter>,
    deleted: Arc<Counter>,
}

impl ItemService {
    pub fn new(store: ItemStore, telemetry: Telemetry) -> Self {
        let created = telemetry.get_or_create_counter("items.created", "1", "Items created");
        let deleted = telemetry.get_or_create_counter("items.deleted", "1", "Items deleted");
        Self {
            store,
            telemetry,
            created,
            deleted,
        }
    }

    pub fn create_item(&self, value: String) -> Result<Item, ItemError> {
        self.telemetry
            .try_wrap("ItemService.create_item", Granularity::Service, [], || {
                let item = self.store.create(Item::new(value))?;
                self.telemetry
                    .add_attributes_to_current_span([KeyValue::new("item.id", item.id.to_string())]);
                self.created.add(1);
                tracing::debug!(item_id = %item.id, "Item created");
                Ok(item)
            })
    }

    pub fn read_item(&self, id: ItemId) -> Result<Item, ItemError> {
        self.telemetry.try_wrap(
            "ItemService.read_item",
            Granularity::Service,
            [KeyValue::new("item.id", id.to_string())],
            || self.store.fetch(id),
        )
    }

    pub fn update_item(&self, id: ItemId, value: String) -> Result<Item, ItemError> {
        self.telemetry.try_wrap(
            "ItemService.update_item",
            Granularity::Service,
            [KeyValue::new("item.id", id.to_string())],
            || self.store.update(id, value),
        )
    }

    pub fn delete_item(&self, id: ItemId) -> Result<Item, ItemError> {
        self.telemetry.try_wrap(
            "ItemService.delete_item",
            Granularity::Service,
            [KeyValue::new("item.id", id.to_string())],
            || {
                let item = self.store.delete(id)?;
                self.deleted.add(1);
                tracing::debug!(item_id = %id, "Item deleted");
                Ok(item)
            },
        )
    }

    pub fn list_items(&self) -> Vec<Item> {
        self.telemetry
            .wrap("ItemService.list_items", Granularity::Service, [], || self.store.list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
    use opentelemetry_sdk::trace::TracerProvider;

    fn service(granularity: Granularity) -> (ItemService, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let telemetry = Telemetry::from_providers(
            "items-test",
            granularity,
            Some(provider),
            SdkMeterProvider::default(),
        );
        let service = ItemService::new(ItemStore::new(telemetry.clone()), telemetry);
        (service, exporter)
    }

    #[test]
    fn test_crud_round() {
        let (service, _) = service(Granularity::None);
        let item = service.create_item("apple".to_string()).unwrap();
        assert_eq!(service.read_item(item.id).unwrap().value, "apple");
        assert_eq!(service.update_item(item.id, "pear".to_string()).unwrap().value, "pear");
        assert_eq!(service.list_items().len(), 1);
        service.delete_item(item.id).unwrap();
        assert_eq!(service.read_item(item.id), Err(ItemError::NotFound(item.id)));
    }

    #[test]
    fn test_service_granularity_skips_store_spans() {
        let (service, exporter) = service(Granularity::Service);
        service.create_item("apple".to_string()).unwrap();

        let names: Vec<String> = exporter
            .get_finished_spans()
            .unwrap()
            .into_iter()
            .map(|s| s.name.to_string())
            .collect();
        assert_eq!(names, vec!["ItemService.create_item".to_string()]);
    }

    #[test]
    fn test_not_found_marks_both_spans_failed() {
        let (service, exporter) = service(Granularity::All);
        let id = ItemId::new_v4();
        assert!(service.read_item(id).is_err());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 2);
        for span in spans {
            assert!(matches!(span.status, opentelemetry::trace::Status::Error { .. }));
        }
    }

    #[test]
    fn test_counters_shared_across_services() {
        let telemetry = Telemetry::disabled();
        let first = ItemService::new(ItemStore::new(telemetry.clone()), telemetry.clone());
        let second = ItemService::new(ItemStore::new(telemetry.clone()), telemetry);
        assert!(Arc::ptr_eq(&first.created, &second.created));
        assert!(Arc::ptr_eq(&first.deleted, &second.deleted));
    }
}
