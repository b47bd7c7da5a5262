use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{Result, SluiceError};
use crate::config::Settings;
use crate::dispatch::SmtpConnector;
use crate::domain::SourceKind;
use crate::grabber::WebGrabber;
use crate::pipeline::Pipeline;
use crate::source::{FeedSource, SourceRegistry, TimelineSource};
use crate::store::SqliteStore;

pub struct AppContext {
    pub settings: Arc<Settings>,
    pub store: Arc<SqliteStore>,
    pub pipeline: Arc<Pipeline>,
}

impl AppContext {
    pub fn new(settings: Settings, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::build(settings, store)
    }

    pub fn in_memory(settings: Settings) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::build(settings, store)
    }

    fn build(settings: Settings, store: Arc<SqliteStore>) -> Result<Self> {
        let settings = Arc::new(settings);

        let sources = SourceRegistry::new()
            .with(SourceKind::Rss, Arc::new(FeedSource::new(&settings.grab)?))
            .with(
                SourceKind::Twitter,
                Arc::new(TimelineSource::new(&settings.grab, &settings.twitter)?),
            );
        let grabber = Arc::new(WebGrabber::new(settings.grab.clone())?);
        let connector = Arc::new(SmtpConnector::new(
            settings.smtp.clone(),
            settings.mail.attachment_name.clone(),
        ));

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&settings),
            store.clone(),
            sources,
            grabber,
            connector,
        ));

        Ok(Self {
            settings,
            store,
            pipeline,
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| SluiceError::Config("Could not find data directory".into()))?;
        let sluice_dir = data_dir.join("sluice");
        std::fs::create_dir_all(&sluice_dir)?;
        Ok(sluice_dir.join("sluice.db"))
    }
}
