//! # Sluice
//!
//! Pulls new items from feeds and timelines, keeps the ones matching a
//! configuration's patterns, optionally grabs the linked page, and forwards
//! the result by mail or to an external program.
//!
//! ## Architecture
//!
//! ```text
//! Source → Matcher → Directives → Grabber → Dispatcher
//! ```
//!
//! A run locks, replays undelivered mail from the archive, then spreads the
//! due configurations over a bounded worker pool.
//!
//! ## Quick Start
//!
//! ```bash
//! # Forward release announcements by mail
//! sluice create --plugin rss --source https://blog.rust-lang.org/feed.xml \
//!     -d mail:me@example.com -r release -a grab=text priority=high
//!
//! # Process every due configuration
//! sluice fetch
//!
//! # Show configurations
//! sluice list
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together settings,
/// store and pipeline.
pub mod app;

/// Settings loaded from `~/.config/sluice/config.toml` and interval parsing.
pub mod config;

/// Command-line interface using clap.
///
/// - `create` - Add a configuration
/// - `delete --yes` - Remove configurations
/// - `fetch [--force]` - Process due configurations
/// - `list` - Show configurations
/// - `set` - Update configurations
pub mod cli;

/// `key=value` action directives and their validation.
pub mod directive;

/// Delivery to mail and exec destinations, and archive replay.
pub mod dispatch;

/// Core domain models.
///
/// - [`ConfigurationRecord`](domain::ConfigurationRecord): one source bound to its destinations
/// - [`CandidateMessage`](domain::CandidateMessage): an item fetched during a run
/// - [`EnrichedMessage`](domain::EnrichedMessage): a matched item ready for dispatch
/// - [`ArchivedDelivery`](domain::ArchivedDelivery): mail kept for replay
pub mod domain;

/// Alternate representations of a linked page: markup, text, screenshot, images.
pub mod grabber;

pub mod matcher;

/// Worker pool, per-configuration state machine, log aggregation and run lock.
pub mod pipeline;

/// Feed and timeline source plugins.
pub mod source;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
