pub mod sqlite;

use crate::app::Result;
use crate::domain::{ArchivedDelivery, ConfigurationRecord, SourceKind};

pub use sqlite::SqliteStore;

/// Persistent configuration and archive storage.
///
/// Every write is a single self-contained statement; concurrent writers
/// get row-level last-write-wins.
pub trait Store: Send + Sync {
    // Configuration operations
    fn create_configuration(&self, record: &ConfigurationRecord) -> Result<i64>;
    fn get_configuration(&self, id: i64) -> Result<Option<ConfigurationRecord>>;
    /// `None` filters match everything.
    fn list_configurations(
        &self,
        plugin: Option<SourceKind>,
        id: Option<i64>,
    ) -> Result<Vec<ConfigurationRecord>>;
    fn update_configuration(&self, record: &ConfigurationRecord) -> Result<()>;
    fn delete_configuration(&self, id: i64) -> Result<bool>;

    // Bookkeeping
    fn update_timestamp(&self, id: i64, timestamp: i64) -> Result<()>;
    fn add_to_counter(&self, id: i64, count: i64) -> Result<()>;
    /// Move `last_timestamp` and add `count` to the counter in one write.
    fn record_progress(&self, id: i64, timestamp: i64, count: i64) -> Result<()>;
    fn update_alert_timestamp(&self, id: i64, timestamp: i64) -> Result<()>;

    // Archive operations
    fn add_archive(&self, delivery: &ArchivedDelivery) -> Result<i64>;
    fn list_archive(&self) -> Result<Vec<ArchivedDelivery>>;
    fn delete_archive(&self, id: i64) -> Result<()>;
}
