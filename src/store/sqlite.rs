use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use serde::de::DeserializeOwned;

use crate::app::{Result, SluiceError};
use crate::domain::{
    ArchivedDelivery, ConfigurationRecord, GrabbedImage, ImageBounds, OutgoingMail, SourceKind,
};
use crate::store::Store;

const CONFIGURATION_COLUMNS: &str = "id, enabled, plugin, source, destinations, alert_interval, \
     update_interval, description, patterns, actions, last_timestamp, counter, last_alert, \
     image_min_width, image_min_height, image_max_width, image_max_height";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            SluiceError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| SluiceError::Config(format!("Database migration failed: {}", e)))?;

        Ok(())
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    }

    fn configuration_from_row(row: &Row<'_>) -> rusqlite::Result<ConfigurationRecord> {
        let plugin: String = row.get(2)?;
        let plugin = plugin.parse::<SourceKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
        })?;

        Ok(ConfigurationRecord {
            id: row.get(0)?,
            enabled: row.get::<_, i32>(1)? != 0,
            plugin,
            source: row.get(3)?,
            destinations: Self::json_column(row, 4)?,
            alert_interval: row.get(5)?,
            update_interval: row.get(6)?,
            description: row.get(7)?,
            patterns: Self::json_column(row, 8)?,
            actions: Self::json_column(row, 9)?,
            last_timestamp: row.get(10)?,
            counter: row.get(11)?,
            last_alert: row.get(12)?,
            image_bounds: ImageBounds {
                min_width: row.get(13)?,
                min_height: row.get(14)?,
                max_width: row.get(15)?,
                max_height: row.get(16)?,
            },
        })
    }

    fn images_for(conn: &Connection, archive_id: i64) -> Result<Vec<GrabbedImage>> {
        let mut stmt = conn.prepare(
            "SELECT format, data FROM archive_images WHERE archive_id = ?1 ORDER BY position",
        )?;

        let images = stmt
            .query_map(params![archive_id], |row| {
                Ok(GrabbedImage {
                    format: row.get(0)?,
                    data: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(images)
    }
}

impl Store for SqliteStore {
    fn create_configuration(&self, record: &ConfigurationRecord) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO configurations (enabled, plugin, source, destinations, alert_interval,
                 update_interval, description, patterns, actions, last_timestamp, counter,
                 last_alert, image_min_width, image_min_height, image_max_width, image_max_height)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                record.enabled as i32,
                record.plugin.as_str(),
                record.source,
                serde_json::to_string(&record.destinations)?,
                record.alert_interval,
                record.update_interval,
                record.description,
                serde_json::to_string(&record.patterns)?,
                serde_json::to_string(&record.actions)?,
                record.last_timestamp,
                record.counter,
                record.last_alert,
                record.image_bounds.min_width,
                record.image_bounds.min_height,
                record.image_bounds.max_width,
                record.image_bounds.max_height,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    fn get_configuration(&self, id: i64) -> Result<Option<ConfigurationRecord>> {
        let conn = self.conn()?;

        let result = conn
            .query_row(
                &format!("SELECT {} FROM configurations WHERE id = ?1", CONFIGURATION_COLUMNS),
                params![id],
                Self::configuration_from_row,
            )
            .optional()?;

        Ok(result)
    }

    fn list_configurations(
        &self,
        plugin: Option<SourceKind>,
        id: Option<i64>,
    ) -> Result<Vec<ConfigurationRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM configurations
             WHERE (?1 IS NULL OR plugin = ?1) AND (?2 IS NULL OR id = ?2)
             ORDER BY id",
            CONFIGURATION_COLUMNS
        ))?;

        let records = stmt
            .query_map(
                params![plugin.map(|p| p.as_str()), id],
                Self::configuration_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn update_configuration(&self, record: &ConfigurationRecord) -> Result<()> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE configurations SET enabled = ?1, plugin = ?2, source = ?3,
                 destinations = ?4, alert_interval = ?5, update_interval = ?6,
                 description = ?7, patterns = ?8, actions = ?9, last_timestamp = ?10,
                 counter = ?11, image_min_width = ?12, image_min_height = ?13,
                 image_max_width = ?14, image_max_height = ?15
             WHERE id = ?16",
            params![
                record.enabled as i32,
                record.plugin.as_str(),
                record.source,
                serde_json::to_string(&record.destinations)?,
                record.alert_interval,
                record.update_interval,
                record.description,
                serde_json::to_string(&record.patterns)?,
                serde_json::to_string(&record.actions)?,
                record.last_timestamp,
                record.counter,
                record.image_bounds.min_width,
                record.image_bounds.min_height,
                record.image_bounds.max_width,
                record.image_bounds.max_height,
                record.id,
            ],
        )?;

        if changed == 0 {
            return Err(SluiceError::ConfigurationNotFound(record.id));
        }
        Ok(())
    }

    fn delete_configuration(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM configurations WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn update_timestamp(&self, id: i64, timestamp: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE configurations SET last_timestamp = ?1 WHERE id = ?2",
            params![timestamp, id],
        )?;
        Ok(())
    }

    fn add_to_counter(&self, id: i64, count: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE configurations SET counter = counter + ?1 WHERE id = ?2",
            params![count, id],
        )?;
        Ok(())
    }

    fn record_progress(&self, id: i64, timestamp: i64, count: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE configurations SET last_timestamp = ?1, counter = counter + ?2 WHERE id = ?3",
            params![timestamp, count, id],
        )?;
        Ok(())
    }

    fn update_alert_timestamp(&self, id: i64, timestamp: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE configurations SET last_alert = ?1 WHERE id = ?2",
            params![timestamp, id],
        )?;
        Ok(())
    }

    fn add_archive(&self, delivery: &ArchivedDelivery) -> Result<i64> {
        let mut conn = self.conn()?;
        let mail = &delivery.mail;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO archive (config_id, destination, subject, headers, priority, body,
                 markup, screenshot, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                delivery.config_id,
                mail.to,
                mail.subject,
                serde_json::to_string(&mail.headers)?,
                mail.priority,
                mail.body,
                mail.markup,
                mail.screenshot,
                mail.text,
                delivery.created_at.to_rfc3339(),
            ],
        )?;
        let archive_id = tx.last_insert_rowid();

        for (position, image) in mail.images.iter().enumerate() {
            tx.execute(
                "INSERT INTO archive_images (archive_id, position, format, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![archive_id, position as i64, image.format, image.data],
            )?;
        }

        tx.commit()?;
        Ok(archive_id)
    }

    fn list_archive(&self) -> Result<Vec<ArchivedDelivery>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, config_id, destination, subject, headers, priority, body, markup,
                 screenshot, text, created_at
             FROM archive ORDER BY id",
        )?;

        let mut deliveries = stmt
            .query_map([], |row| {
                Ok(ArchivedDelivery {
                    id: row.get(0)?,
                    config_id: row.get(1)?,
                    mail: OutgoingMail {
                        to: row.get(2)?,
                        subject: row.get(3)?,
                        headers: Self::json_column(row, 4)?,
                        priority: row.get(5)?,
                        body: row.get(6)?,
                        markup: row.get(7)?,
                        screenshot: row.get(8)?,
                        text: row.get(9)?,
                        images: Vec::new(),
                    },
                    created_at: row
                        .get::<_, String>(10)
                        .ok()
                        .and_then(|s| Self::parse_datetime(&s))
                        .unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for delivery in &mut deliveries {
            delivery.mail.images = Self::images_for(&conn, delivery.id)?;
        }

        Ok(deliveries)
    }

    fn delete_archive(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM archive WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Destination;

    fn record(plugin: SourceKind, source: &str) -> ConfigurationRecord {
        let mut record = ConfigurationRecord::new(
            plugin,
            source,
            vec![
                Destination::Mail("a@example.com".into()),
                Destination::Exec("/usr/local/bin/hook".into()),
            ],
        );
        record.patterns = vec!["release".into()];
        record.actions = vec!["grab=text".into(), "tag=k:v".into()];
        record
    }

    fn archived(config_id: i64, images: usize) -> ArchivedDelivery {
        let mut mail = OutgoingMail::notice("a@example.com", "subject", "release notes");
        mail.headers = vec![("X-Sluice-Id".into(), config_id.to_string())];
        mail.priority = Some(1);
        mail.screenshot = Some(vec![0x89, 0x50, 0x4e, 0x47]);
        mail.images = (0..images)
            .map(|i| GrabbedImage {
                data: vec![i as u8; 4],
                format: "png".into(),
            })
            .collect();
        ArchivedDelivery::new(config_id, mail)
    }

    #[test]
    fn test_create_and_get_configuration() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .create_configuration(&record(SourceKind::Rss, "https://example.com/feed.xml"))
            .unwrap();

        let retrieved = store.get_configuration(id).unwrap().unwrap();
        assert_eq!(retrieved.id, id);
        assert_eq!(retrieved.plugin, SourceKind::Rss);
        assert_eq!(retrieved.destinations.len(), 2);
        assert_eq!(retrieved.patterns, vec!["release".to_string()]);
        assert_eq!(retrieved.actions.len(), 2);
        assert!(retrieved.enabled);
        assert_eq!(retrieved.image_bounds, ImageBounds::default());
    }

    #[test]
    fn test_get_configuration_nonexistent() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_configuration(999).unwrap().is_none());
    }

    #[test]
    fn test_list_filters() {
        let store = SqliteStore::in_memory().unwrap();
        let rss = store
            .create_configuration(&record(SourceKind::Rss, "https://a/feed"))
            .unwrap();
        store
            .create_configuration(&record(SourceKind::Twitter, "rustlang"))
            .unwrap();
        store
            .create_configuration(&record(SourceKind::Rss, "https://b/feed"))
            .unwrap();

        assert_eq!(store.list_configurations(None, None).unwrap().len(), 3);
        assert_eq!(
            store
                .list_configurations(Some(SourceKind::Rss), None)
                .unwrap()
                .len(),
            2
        );

        let by_id = store.list_configurations(None, Some(rss)).unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].source, "https://a/feed");

        assert!(store
            .list_configurations(Some(SourceKind::Twitter), Some(rss))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_update_configuration() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .create_configuration(&record(SourceKind::Rss, "https://a/feed"))
            .unwrap();

        let mut updated = store.get_configuration(id).unwrap().unwrap();
        updated.enabled = false;
        updated.description = Some("Updated".into());
        updated.update_interval = 60;
        store.update_configuration(&updated).unwrap();

        let retrieved = store.get_configuration(id).unwrap().unwrap();
        assert!(!retrieved.enabled);
        assert_eq!(retrieved.description.as_deref(), Some("Updated"));
        assert_eq!(retrieved.update_interval, 60);
    }

    #[test]
    fn test_update_missing_configuration() {
        let store = SqliteStore::in_memory().unwrap();
        let mut missing = record(SourceKind::Rss, "https://a/feed");
        missing.id = 42;
        assert!(matches!(
            store.update_configuration(&missing),
            Err(SluiceError::ConfigurationNotFound(42))
        ));
    }

    #[test]
    fn test_bookkeeping_updates() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .create_configuration(&record(SourceKind::Rss, "https://a/feed"))
            .unwrap();

        store.update_timestamp(id, 1_700_000_000).unwrap();
        store.add_to_counter(id, 3).unwrap();
        store.add_to_counter(id, 2).unwrap();
        store.update_alert_timestamp(id, 1_700_000_500).unwrap();

        let retrieved = store.get_configuration(id).unwrap().unwrap();
        assert_eq!(retrieved.last_timestamp, 1_700_000_000);
        assert_eq!(retrieved.counter, 5);
        assert_eq!(retrieved.last_alert, 1_700_000_500);
    }

    #[test]
    fn test_record_progress() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .create_configuration(&record(SourceKind::Rss, "https://a/feed"))
            .unwrap();

        store.record_progress(id, 1_700_000_000, 3).unwrap();
        store.record_progress(id, 1_700_000_900, 1).unwrap();

        let retrieved = store.get_configuration(id).unwrap().unwrap();
        assert_eq!(retrieved.last_timestamp, 1_700_000_900);
        assert_eq!(retrieved.counter, 4);
        assert_eq!(retrieved.last_alert, 0);
    }

    #[test]
    fn test_delete_configuration() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .create_configuration(&record(SourceKind::Rss, "https://a/feed"))
            .unwrap();

        assert!(store.delete_configuration(id).unwrap());
        assert!(!store.delete_configuration(id).unwrap());
        assert!(store.get_configuration(id).unwrap().is_none());
    }

    #[test]
    fn test_archive_append_list_delete() {
        let store = SqliteStore::in_memory().unwrap();
        let first = store.add_archive(&archived(1, 2)).unwrap();
        let second = store.add_archive(&archived(2, 0)).unwrap();

        let all = store.list_archive().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first);
        assert_eq!(all[0].config_id, 1);
        assert_eq!(all[0].mail.priority, Some(1));
        assert_eq!(all[0].mail.body, "release notes");
        assert_eq!(all[0].mail.headers[0].0, "X-Sluice-Id");
        assert_eq!(all[0].mail.images.len(), 2);
        assert_eq!(all[0].mail.images[1].data, vec![1u8; 4]);
        assert!(all[1].mail.images.is_empty());

        store.delete_archive(first).unwrap();
        let remaining = store.list_archive().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second);
    }

    #[test]
    fn test_delete_archive_cascades_images() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.add_archive(&archived(1, 3)).unwrap();
        store.delete_archive(id).unwrap();

        let conn = store.conn().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM archive_images", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sluice.db");

        let id = {
            let store = SqliteStore::new(&path).unwrap();
            store
                .create_configuration(&record(SourceKind::Rss, "https://a/feed"))
                .unwrap()
        };

        let reopened = SqliteStore::new(&path).unwrap();
        assert!(reopened.get_configuration(id).unwrap().is_some());
    }
}
