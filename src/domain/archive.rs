use chrono::{DateTime, Utc};

use crate::domain::{EnrichedMessage, GrabbedImage};

/// A fully assembled mail, independent of the transport that sends it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub headers: Vec<(String, String)>,
    pub priority: Option<u8>,
    pub body: String,
    pub markup: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub text: Option<String>,
    pub images: Vec<GrabbedImage>,
}

impl OutgoingMail {
    pub fn from_enriched(to: &str, message: &EnrichedMessage, headers: Vec<(String, String)>) -> Self {
        Self {
            to: to.to_string(),
            subject: message.subject.clone(),
            headers,
            priority: message.priority,
            body: message.body.clone(),
            markup: message.markup.clone(),
            screenshot: message.screenshot.clone(),
            text: message.plain_text.clone(),
            images: message.images.clone(),
        }
    }

    /// A body-only notice with no headers or attachments.
    pub fn notice(to: &str, subject: &str, body: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            headers: Vec::new(),
            priority: None,
            body: body.to_string(),
            markup: None,
            screenshot: None,
            text: None,
            images: Vec::new(),
        }
    }
}

/// A mail that could not be sent, kept for replay on the next run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedDelivery {
    pub id: i64,
    pub config_id: i64,
    pub mail: OutgoingMail,
    pub created_at: DateTime<Utc>,
}

impl ArchivedDelivery {
    pub fn new(config_id: i64, mail: OutgoingMail) -> Self {
        Self {
            id: 0,
            config_id,
            mail,
            created_at: Utc::now(),
        }
    }
}
