//! Action directives: `key=value` strings attached to a configuration.
//!
//! | key        | value                                              |
//! |------------|----------------------------------------------------|
//! | `grab`     | `markup`, `text`, `screenshot`, `images` or `full` |
//! | `priority` | `low`, `normal` or `high`                          |
//! | `subject`  | free text prefixed to the subject line             |
//! | `tag`      | `name:value`                                       |
//!
//! A key is only legal when at least one destination of the configuration
//! advertises the matching [`Capability`]. The first offending directive
//! rejects the whole list.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::domain::{Capability, Destination};
use crate::grabber::GrabKind;

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<key>[A-Za-z][A-Za-z0-9_-]*)\s*=\s*(?P<value>\S.*?)\s*$")
        .expect("directive grammar is a valid regex")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("'{0}' is not of the form key=value")]
    Malformed(String),

    #[error("'{0}': unknown action, expected one of grab, priority, subject, tag")]
    UnknownKey(String),

    #[error("'{0}': no destination of this configuration supports this action")]
    Unsupported(String),

    #[error("'{directive}': {reason}")]
    InvalidValue { directive: String, reason: String },
}

impl DirectiveError {
    /// The raw directive that failed validation.
    pub fn directive(&self) -> &str {
        match self {
            DirectiveError::Malformed(d)
            | DirectiveError::UnknownKey(d)
            | DirectiveError::Unsupported(d) => d,
            DirectiveError::InvalidValue { directive, .. } => directive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// `X-Priority` value.
    pub fn numeric(&self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Normal => 3,
            Priority::Low => 5,
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err("priority must be one of low, normal, high".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabRequest {
    One(GrabKind),
    Full,
}

impl GrabRequest {
    pub fn kinds(&self) -> Vec<GrabKind> {
        match self {
            GrabRequest::One(kind) => vec![*kind],
            GrabRequest::Full => GrabKind::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDirective {
    Grab(GrabRequest),
    Priority(Priority),
    Subject(String),
    Tag { name: String, value: String },
}

/// Parse and validate a directive list against the destinations it will
/// be dispatched to.
pub fn parse_directives(
    raw: &[String],
    destinations: &[Destination],
) -> Result<Vec<ActionDirective>, DirectiveError> {
    raw.iter()
        .map(|directive| parse_one(directive, destinations))
        .collect()
}

fn parse_one(raw: &str, destinations: &[Destination]) -> Result<ActionDirective, DirectiveError> {
    let caps = DIRECTIVE_RE
        .captures(raw)
        .ok_or_else(|| DirectiveError::Malformed(raw.to_string()))?;
    let key = caps["key"].to_lowercase();
    let value = &caps["value"];

    let capability = match key.as_str() {
        "grab" => Capability::Grab,
        "priority" => Capability::Priority,
        "subject" => Capability::Subject,
        "tag" => Capability::Tag,
        _ => return Err(DirectiveError::UnknownKey(raw.to_string())),
    };

    if !destinations.iter().any(|d| d.supports(capability)) {
        return Err(DirectiveError::Unsupported(raw.to_string()));
    }

    let invalid = |reason: &str| DirectiveError::InvalidValue {
        directive: raw.to_string(),
        reason: reason.to_string(),
    };

    let directive = match capability {
        Capability::Grab => {
            let request = if value.eq_ignore_ascii_case("full") {
                GrabRequest::Full
            } else {
                GrabRequest::One(value.parse().map_err(|e: String| invalid(&e))?)
            };
            ActionDirective::Grab(request)
        }
        Capability::Priority => {
            ActionDirective::Priority(value.parse().map_err(|e: String| invalid(&e))?)
        }
        Capability::Subject => ActionDirective::Subject(value.to_string()),
        Capability::Tag => {
            let (name, tag_value) = value
                .split_once(':')
                .map(|(n, v)| (n.trim(), v.trim()))
                .filter(|(n, v)| !n.is_empty() && !v.is_empty())
                .ok_or_else(|| invalid("tag must be of the form name:value"))?;
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(invalid("tag name may only contain letters, digits, '-' and '_'"));
            }
            ActionDirective::Tag {
                name: name.to_string(),
                value: tag_value.to_string(),
            }
        }
    };

    Ok(directive)
}

/// The effective actions for one dispatch, folded from a directive list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actions {
    pub grabs: BTreeSet<GrabKind>,
    pub priority: Option<Priority>,
    pub subject: Option<String>,
    pub tags: Vec<(String, String)>,
}

impl Actions {
    pub fn from_directives(directives: &[ActionDirective]) -> Self {
        let mut actions = Actions::default();
        for directive in directives {
            match directive {
                ActionDirective::Grab(request) => actions.grabs.extend(request.kinds()),
                ActionDirective::Priority(p) => actions.priority = Some(*p),
                ActionDirective::Subject(s) => actions.subject = Some(s.clone()),
                ActionDirective::Tag { name, value } => {
                    actions.tags.push((name.clone(), value.clone()))
                }
            }
        }
        actions
    }
}
