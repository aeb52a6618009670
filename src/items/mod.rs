//! Items domain.
//!
//! # Data Flow
//! ```text
//! http/handlers.rs   (API spans)
//!     → service.rs   (SERVICE spans, items.* counters)
//!     → store.rs     (DB spans, in-memory map)
//! ```

pub mod service;
pub mod store;
pub mod types;

pub use service::ItemService;
pub use store::ItemStore;
pub use types::{Item, ItemError, ItemId};
