use std::collections::BTreeMap;

use chrono::DateTime;

use crate::app::{AppContext, Result, SluiceError};
use crate::cli::{CreateArgs, ImageBoundsArgs, Selection, SetArgs};
use crate::config::{format_interval, Settings};
use crate::directive::parse_directives;
use crate::domain::{ConfigurationRecord, ConfigurationUpdate, Destination, ImageBounds, SourceKind};
use crate::matcher::RegexMatcher;
use crate::pipeline::{RunLock, RunSummary};
use crate::store::Store;

fn plugin_filter(value: &str) -> Result<Option<SourceKind>> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(SluiceError::InvalidConfiguration)
}

fn id_filter(value: &str) -> Result<Option<i64>> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| SluiceError::InvalidConfiguration(format!("Invalid id: {}", value)))
}

/// Records matching any plugin filter and any id filter, ordered by id.
pub fn select(store: &dyn Store, selection: &Selection) -> Result<Vec<ConfigurationRecord>> {
    let mut selected = BTreeMap::new();

    for plugin in &selection.plugin {
        let plugin = plugin_filter(plugin)?;
        for id in &selection.id {
            for record in store.list_configurations(plugin, id_filter(id)?)? {
                selected.insert(record.id, record);
            }
        }
    }

    Ok(selected.into_values().collect())
}

fn clean_description(description: &str) -> String {
    description
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .collect::<String>()
        .trim()
        .to_string()
}

fn merge_bounds(base: ImageBounds, args: &ImageBoundsArgs) -> ImageBounds {
    ImageBounds {
        min_width: args.image_min_width.unwrap_or(base.min_width),
        min_height: args.image_min_height.unwrap_or(base.min_height),
        max_width: args.image_max_width.unwrap_or(base.max_width),
        max_height: args.image_max_height.unwrap_or(base.max_height),
    }
}

/// Reject a record that could never be dispatched as configured.
fn validate(record: &ConfigurationRecord) -> Result<()> {
    if record.destinations.is_empty() {
        return Err(SluiceError::InvalidConfiguration(
            "Destination is required".to_string(),
        ));
    }
    if record.update_interval < 0 || record.alert_interval < 0 {
        return Err(SluiceError::InvalidConfiguration(
            "Intervals must not be negative".to_string(),
        ));
    }
    let bounds = &record.image_bounds;
    if bounds.min_width > bounds.max_width || bounds.min_height > bounds.max_height {
        return Err(SluiceError::InvalidConfiguration(
            "Image minimum exceeds maximum".to_string(),
        ));
    }
    RegexMatcher::new(&record.patterns)?;
    parse_directives(&record.actions, &record.destinations)?;
    Ok(())
}

/// Build and validate a new record from `create` arguments.
pub fn build_record(settings: &Settings, args: &CreateArgs) -> Result<ConfigurationRecord> {
    let destinations = if args.destination.is_empty() {
        settings
            .general
            .default_destinations
            .iter()
            .map(|d| d.parse::<Destination>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(SluiceError::InvalidConfiguration)?
    } else {
        args.destination.clone()
    };

    let mut record = ConfigurationRecord::new(args.plugin, args.source.trim(), destinations);
    record.alert_interval = args.alert.unwrap_or(settings.general.default_alert_interval);
    record.update_interval = args
        .interval
        .unwrap_or(settings.general.default_update_interval);
    record.description = args.description.as_deref().map(clean_description);
    record.patterns = args.patterns.clone();
    record.actions = args.actions.clone();
    record.image_bounds = merge_bounds(settings.grab.image_bounds(), &args.images);

    validate(&record)?;
    Ok(record)
}

pub fn create(ctx: &AppContext, args: &CreateArgs) -> Result<i64> {
    let record = build_record(&ctx.settings, args)?;
    let id = ctx.store.create_configuration(&record)?;
    println!("Created configuration {}", id);
    Ok(id)
}

pub fn delete(ctx: &AppContext, selection: &Selection, yes: bool) -> Result<usize> {
    if !yes {
        println!("Refusing to delete without --yes");
        return Ok(0);
    }

    let mut deleted = 0;
    for record in select(ctx.store.as_ref(), selection)? {
        if ctx.store.delete_configuration(record.id)? {
            println!("Deleted configuration {}", record.label());
            deleted += 1;
        }
    }

    if deleted == 0 {
        println!("No configurations matched");
    }
    Ok(deleted)
}

/// One run: take the lock, replay the archive, then process the selection.
pub async fn fetch(ctx: &AppContext, selection: &Selection, force: bool) -> Result<RunSummary> {
    let _lock = RunLock::acquire(&ctx.settings.general.lock_file)?;

    if let Err(e) = ctx.pipeline.replay_archive().await {
        tracing::error!("Archive replay failed: {}", e);
    }

    let records = select(ctx.store.as_ref(), selection)?;
    if records.is_empty() {
        println!("No configurations to process");
        return Ok(RunSummary::default());
    }

    let summary = ctx.pipeline.run(records, force).await;
    println!(
        "Processed: {}, skipped: {}, new messages: {}",
        summary.processed, summary.skipped, summary.matched
    );
    Ok(summary)
}

fn format_timestamp(ts: i64) -> String {
    if ts <= 0 {
        return "never".to_string();
    }
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn describe(record: &ConfigurationRecord) -> String {
    let destinations = record
        .destinations
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = format!(
        "[{}] {} {} {}\n  destinations: {}\n  interval: {}, alert after: {}\n",
        record.id,
        if record.enabled { "on " } else { "off" },
        record.plugin,
        record.source,
        destinations,
        format_interval(record.update_interval),
        format_interval(record.alert_interval),
    );
    if let Some(ref description) = record.description {
        out.push_str(&format!("  description: {}\n", description));
    }
    if !record.patterns.is_empty() {
        out.push_str(&format!("  patterns: {}\n", record.patterns.join(" | ")));
    }
    if !record.actions.is_empty() {
        out.push_str(&format!("  actions: {}\n", record.actions.join(", ")));
    }
    out.push_str(&format!(
        "  last update: {}, messages: {}",
        format_timestamp(record.last_timestamp),
        record.counter
    ));
    out
}

pub fn list(ctx: &AppContext, selection: &Selection) -> Result<()> {
    let records = select(ctx.store.as_ref(), selection)?;

    if records.is_empty() {
        println!("No configurations");
        return Ok(());
    }

    for record in records {
        println!("{}", describe(&record));
    }
    Ok(())
}

impl SetArgs {
    fn to_update(&self) -> ConfigurationUpdate {
        ConfigurationUpdate {
            enabled: self.enabled,
            plugin: self.plugin,
            source: self.source.as_deref().map(|s| s.trim().to_string()),
            destinations: self.destination.clone(),
            alert_interval: self.alert,
            update_interval: self.interval,
            description: self.description.as_deref().map(clean_description),
            patterns: self.patterns.clone(),
            actions: self.actions.clone(),
            image_bounds: None,
        }
    }
}

/// Apply `args` to every listed id. Each updated record is re-validated,
/// so actions must still be supported by the resulting destinations.
pub fn set(ctx: &AppContext, args: &SetArgs) -> Result<usize> {
    let update = args.to_update();
    let mut updated = 0;

    for id in &args.id {
        let mut record = ctx
            .store
            .get_configuration(*id)?
            .ok_or(SluiceError::ConfigurationNotFound(*id))?;

        update.apply(&mut record);
        record.image_bounds = merge_bounds(record.image_bounds, &args.images);
        validate(&record)?;

        ctx.store.update_configuration(&record)?;
        println!("Updated configuration {}", record.label());
        updated += 1;
    }

    Ok(updated)
}
