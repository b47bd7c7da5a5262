use chrono::Utc;

/// An item produced by a source plugin for one run. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMessage {
    /// Seconds since epoch
    pub timestamp: i64,
    pub text: String,
    pub url: Option<String>,
}

impl CandidateMessage {
    /// Sources without a timestamp get the current time.
    pub fn new(timestamp: Option<i64>, text: impl Into<String>, url: Option<String>) -> Self {
        Self {
            timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp()),
            text: text.into(),
            url: url.filter(|u| !u.is_empty()),
        }
    }

    pub fn first_line(&self) -> &str {
        self.text.lines().next().unwrap_or("").trim()
    }

    /// Text followed by a separator and the follow-up URL, when there is one.
    pub fn body(&self) -> String {
        match self.url {
            Some(ref url) => format!("{}\n\n---\n{}", self.text, url),
            None => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabbedImage {
    pub data: Vec<u8>,
    /// Lowercase file extension, e.g. `png`
    pub format: String,
}

/// A matched candidate plus everything grabbed and resolved for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedMessage {
    pub timestamp: i64,
    pub text: String,
    pub body: String,
    pub url: Option<String>,
    pub markup: Option<String>,
    pub plain_text: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub images: Vec<GrabbedImage>,
    pub subject: String,
    pub priority: Option<u8>,
    /// `(name, value)` pairs from tag directives
    pub tags: Vec<(String, String)>,
}

impl EnrichedMessage {
    pub fn from_candidate(candidate: &CandidateMessage) -> Self {
        Self {
            timestamp: candidate.timestamp,
            text: candidate.text.clone(),
            body: candidate.body(),
            url: candidate.url.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_timestamp_uses_now() {
        let before = Utc::now().timestamp();
        let msg = CandidateMessage::new(None, "hello", None);
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn test_empty_url_is_dropped() {
        let msg = CandidateMessage::new(Some(1), "hello", Some(String::new()));
        assert!(msg.url.is_none());
    }

    #[test]
    fn test_body_appends_url() {
        let msg = CandidateMessage::new(Some(1), "release notes", Some("https://x/y".into()));
        assert_eq!(msg.body(), "release notes\n\n---\nhttps://x/y");

        let bare = CandidateMessage::new(Some(1), "release notes", None);
        assert_eq!(bare.body(), "release notes");
    }

    #[test]
    fn test_first_line() {
        let msg = CandidateMessage::new(Some(1), "  headline \nsecond line", None);
        assert_eq!(msg.first_line(), "headline");
    }
}
