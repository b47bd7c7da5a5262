//! Content grabbing for a candidate's follow-up URL.
//!
//! # Architecture
//!
//! ```text
//! follow-up URL → Grabber (markup | text | screenshot | images) → EnrichedMessage
//! ```
//!
//! Every call goes through [`grab`], which bounds it with a single timeout.
//! A failed or timed-out representation is simply absent from the message.

mod extractor;
mod web;

pub use extractor::{html_to_text, image_probe_script};
pub use web::WebGrabber;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use crate::app::{Result, SluiceError};
use crate::domain::{EnrichedMessage, GrabbedImage, ImageBounds};

/// The representations a page can be grabbed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GrabKind {
    Markup,
    Text,
    Screenshot,
    Images,
}

impl GrabKind {
    pub const ALL: [GrabKind; 4] = [
        GrabKind::Markup,
        GrabKind::Text,
        GrabKind::Screenshot,
        GrabKind::Images,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrabKind::Markup => "markup",
            GrabKind::Text => "text",
            GrabKind::Screenshot => "screenshot",
            GrabKind::Images => "images",
        }
    }
}

impl fmt::Display for GrabKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrabKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markup" | "html" => Ok(GrabKind::Markup),
            "text" => Ok(GrabKind::Text),
            "screenshot" => Ok(GrabKind::Screenshot),
            "images" => Ok(GrabKind::Images),
            _ => Err("grab must be one of markup, text, screenshot, images, full".to_string()),
        }
    }
}

/// One grabbed representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Grabbed {
    Markup(String),
    Text(String),
    Screenshot(Vec<u8>),
    Images(Vec<GrabbedImage>),
}

impl Grabbed {
    pub fn apply_to(self, message: &mut EnrichedMessage) {
        match self {
            Grabbed::Markup(markup) => message.markup = Some(markup),
            Grabbed::Text(text) => message.plain_text = Some(text),
            Grabbed::Screenshot(png) => message.screenshot = Some(png),
            Grabbed::Images(images) => message.images = images,
        }
    }
}

/// Fetches alternate representations of a web page. Calls are independent
/// and share no state beyond connection pools.
#[async_trait]
pub trait Grabber: Send + Sync {
    async fn markup(&self, url: &str) -> Result<String>;

    /// Markup converted to plain text, links dropped.
    async fn text(&self, url: &str) -> Result<String>;

    /// PNG of the fully loaded page.
    async fn screenshot(&self, url: &str) -> Result<Vec<u8>>;

    /// Every image on the page whose pixel size falls within `bounds`.
    async fn images(&self, url: &str, bounds: &ImageBounds) -> Result<Vec<GrabbedImage>>;
}

/// Grab one representation, bounded by `timeout`.
pub async fn grab(
    grabber: &dyn Grabber,
    kind: GrabKind,
    url: &str,
    bounds: &ImageBounds,
    timeout: Duration,
) -> Result<Grabbed> {
    let call = async {
        Ok::<_, SluiceError>(match kind {
            GrabKind::Markup => Grabbed::Markup(grabber.markup(url).await?),
            GrabKind::Text => Grabbed::Text(grabber.text(url).await?),
            GrabKind::Screenshot => Grabbed::Screenshot(grabber.screenshot(url).await?),
            GrabKind::Images => Grabbed::Images(grabber.images(url, bounds).await?),
        })
    };

    tokio::time::timeout(timeout, call).await.map_err(|_| {
        SluiceError::Timeout(format!("{} grab of {} after {}s", kind, url, timeout.as_secs()))
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowGrabber;

    #[async_trait]
    impl Grabber for SlowGrabber {
        async fn markup(&self, _url: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        async fn text(&self, _url: &str) -> Result<String> {
            Ok("plain".into())
        }

        async fn screenshot(&self, _url: &str) -> Result<Vec<u8>> {
            Err(SluiceError::Browser("no chrome".into()))
        }

        async fn images(&self, _url: &str, _bounds: &ImageBounds) -> Result<Vec<GrabbedImage>> {
            Ok(vec![GrabbedImage {
                data: vec![1, 2, 3],
                format: "png".into(),
            }])
        }
    }

    #[test]
    fn test_grab_kind_parsing() {
        assert_eq!("markup".parse::<GrabKind>().unwrap(), GrabKind::Markup);
        assert_eq!("HTML".parse::<GrabKind>().unwrap(), GrabKind::Markup);
        assert_eq!("images".parse::<GrabKind>().unwrap(), GrabKind::Images);
        assert!("full".parse::<GrabKind>().is_err());
        assert!("pdf".parse::<GrabKind>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_times_out() {
        let result = grab(
            &SlowGrabber,
            GrabKind::Markup,
            "https://x/y",
            &ImageBounds::default(),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(result, Err(SluiceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_grab_passes_errors_and_values() {
        let bounds = ImageBounds::default();
        let timeout = Duration::from_secs(5);

        let text = grab(&SlowGrabber, GrabKind::Text, "https://x/y", &bounds, timeout).await;
        assert_eq!(text.unwrap(), Grabbed::Text("plain".into()));

        let shot = grab(&SlowGrabber, GrabKind::Screenshot, "https://x/y", &bounds, timeout).await;
        assert!(matches!(shot, Err(SluiceError::Browser(_))));
    }

    #[tokio::test]
    async fn test_apply_to_message() {
        let mut message = EnrichedMessage::default();

        let images = grab(
            &SlowGrabber,
            GrabKind::Images,
            "https://x/y",
            &ImageBounds::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        images.apply_to(&mut message);
        Grabbed::Text("plain".into()).apply_to(&mut message);

        assert_eq!(message.images.len(), 1);
        assert_eq!(message.plain_text.as_deref(), Some("plain"));
        assert!(message.markup.is_none());
    }
}
