pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::parse_interval;
use crate::domain::{Destination, SourceKind};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Pull, filter and forward feed and timeline updates", long_about = None)]
pub struct Cli {
    /// Settings file (default: ~/.config/sluice/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (default: <data dir>/sluice/sluice.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which configurations a command applies to. `all` matches everything.
#[derive(Args, Debug, Clone)]
pub struct Selection {
    /// Plugin filter: rss, twitter or all
    #[arg(long, num_args = 1.., default_value = "all")]
    pub plugin: Vec<String>,

    /// Configuration ids, or all
    #[arg(long, num_args = 1.., default_value = "all")]
    pub id: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ImageBoundsArgs {
    /// Smallest image width kept by an image grab
    #[arg(long)]
    pub image_min_width: Option<u32>,
    #[arg(long)]
    pub image_min_height: Option<u32>,
    /// Largest image width kept by an image grab
    #[arg(long)]
    pub image_max_width: Option<u32>,
    #[arg(long)]
    pub image_max_height: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Source plugin: rss or twitter
    #[arg(long)]
    pub plugin: SourceKind,

    /// Feed URL or screen name
    #[arg(long)]
    pub source: String,

    /// mail:<address>, exec:<path> or a bare address
    #[arg(short, long, num_args = 1..)]
    pub destination: Vec<Destination>,

    /// Alert when nothing new arrived for this long (e.g. 7d)
    #[arg(long, value_parser = parse_interval)]
    pub alert: Option<i64>,

    /// Minimum time between two fetches (e.g. 15m)
    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<i64>,

    #[arg(long)]
    pub description: Option<String>,

    /// Case-insensitive regular expressions; a message must match one
    #[arg(short = 'r', long = "pattern", num_args = 1..)]
    pub patterns: Vec<String>,

    /// key=value action directives (grab, priority, subject, tag)
    #[arg(short = 'a', long = "action", num_args = 1..)]
    pub actions: Vec<String>,

    #[command(flatten)]
    pub images: ImageBoundsArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SetArgs {
    /// Configuration ids to update
    #[arg(long, num_args = 1.., required = true)]
    pub id: Vec<i64>,

    #[arg(long)]
    pub enabled: Option<bool>,

    #[arg(long)]
    pub plugin: Option<SourceKind>,

    /// A new source resets the last update time and counter
    #[arg(long)]
    pub source: Option<String>,

    #[arg(short, long, num_args = 1..)]
    pub destination: Option<Vec<Destination>>,

    #[arg(long, value_parser = parse_interval)]
    pub alert: Option<i64>,

    #[arg(long, value_parser = parse_interval)]
    pub interval: Option<i64>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(short = 'r', long = "pattern", num_args = 1..)]
    pub patterns: Option<Vec<String>>,

    #[arg(short = 'a', long = "action", num_args = 1..)]
    pub actions: Option<Vec<String>>,

    #[command(flatten)]
    pub images: ImageBoundsArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a configuration
    Create(CreateArgs),
    /// Delete configurations
    Delete {
        #[command(flatten)]
        selection: Selection,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Process every due configuration
    Fetch {
        #[command(flatten)]
        selection: Selection,

        /// Ignore update intervals and the enabled flag
        #[arg(long)]
        force: bool,
    },
    /// List configurations
    List {
        #[command(flatten)]
        selection: Selection,
    },
    /// Update configurations
    Set(SetArgs),
}
