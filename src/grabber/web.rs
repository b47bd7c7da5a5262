use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::app::{Result, SluiceError};
use crate::config::GrabSettings;
use crate::domain::{GrabbedImage, ImageBounds};
use crate::grabber::extractor::{html_to_text, image_probe_script};
use crate::grabber::Grabber;

/// Grabs markup and text over HTTP, screenshots and images through a
/// headless Chrome launched on first use.
pub struct WebGrabber {
    client: Client,
    config: GrabSettings,
    browser: OnceCell<Arc<Browser>>,
}

#[derive(Debug, Deserialize)]
struct ImageProbe {
    src: String,
    width: u32,
    height: u32,
}

/// A browser tab that can be closed in the background.
trait Tab: Clone + Send + 'static {
    fn close_tab(self) -> BoxFuture<'static, ()>;
}

impl Tab for Page {
    fn close_tab(self) -> BoxFuture<'static, ()> {
        async move {
            if let Err(e) = self.close().await {
                tracing::debug!("Cannot close tab: {}", e);
            }
        }
        .boxed()
    }
}

/// Closes its tab when dropped, so a grab cancelled by its timeout or
/// failing halfway through never leaves the tab open.
struct TabGuard<T: Tab> {
    tab: T,
}

impl<T: Tab> TabGuard<T> {
    fn new(tab: T) -> Self {
        Self { tab }
    }
}

impl<T: Tab> Deref for TabGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.tab
    }
}

impl<T: Tab> Drop for TabGuard<T> {
    fn drop(&mut self) {
        let close = self.tab.clone().close_tab();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close);
            }
            Err(_) => tracing::debug!("No runtime left to close tab"),
        }
    }
}

impl WebGrabber {
    pub fn new(config: GrabSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(!config.check_ssl)
            .build()?;

        Ok(Self {
            client,
            config,
            browser: OnceCell::new(),
        })
    }

    async fn browser(&self) -> Result<Arc<Browser>> {
        self.browser
            .get_or_try_init(|| async {
                let mut builder = BrowserConfig::builder()
                    .window_size(self.config.window_width, self.config.window_height)
                    .arg("--no-sandbox")
                    .arg("--disable-gpu")
                    .arg("--disable-dev-shm-usage");

                if !self.config.check_ssl {
                    builder = builder.arg("--ignore-certificate-errors");
                }
                if !self.config.headless {
                    builder = builder.with_head();
                }

                let browser_config = builder.build().map_err(|e| {
                    SluiceError::Browser(format!("Failed to build browser config: {}", e))
                })?;

                let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
                    SluiceError::Browser(format!(
                        "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                        e
                    ))
                })?;

                tokio::spawn(async move { while handler.next().await.is_some() {} });

                tracing::debug!("Headless browser launched");
                Ok::<_, SluiceError>(Arc::new(browser))
            })
            .await
            .cloned()
    }

    /// Open `url` in a fresh tab and wait for it to settle.
    async fn open(&self, url: &str) -> Result<TabGuard<Page>> {
        let browser = self.browser().await?;
        let page = TabGuard::new(
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| SluiceError::Browser(format!("Failed to create page: {}", e)))?,
        );

        page.set_user_agent(self.config.user_agent.as_str())
            .await
            .map_err(|e| SluiceError::Browser(format!("Failed to set user agent: {}", e)))?;

        page.goto(url)
            .await
            .map_err(|e| SluiceError::Browser(format!("Navigation failed: {}", e)))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| SluiceError::Browser(format!("Navigation failed: {}", e)))?;

        tokio::time::sleep(self.config.wait_after_load()).await;
        Ok(page)
    }

    async fn fetch_image(&self, src: &str) -> Result<GrabbedImage> {
        let response = self.client.get(src).send().await?.error_for_status()?;

        let format = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(image_format)
            .ok_or_else(|| SluiceError::Other(format!("Not an image: {}", src)))?;

        let data = response.bytes().await?.to_vec();
        Ok(GrabbedImage { data, format })
    }
}

/// `image/svg+xml; charset=utf-8` → `svg`
fn image_format(content_type: &str) -> Option<String> {
    let mime = content_type.split(';').next()?.trim().to_lowercase();
    let subtype = mime.strip_prefix("image/")?;
    let format = subtype.split('+').next()?;
    (!format.is_empty()).then(|| format.to_string())
}

#[async_trait]
impl Grabber for WebGrabber {
    async fn markup(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn text(&self, url: &str) -> Result<String> {
        let markup = self.markup(url).await?;
        Ok(html_to_text(&markup))
    }

    async fn screenshot(&self, url: &str) -> Result<Vec<u8>> {
        let page = self.open(url).await?;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| SluiceError::Browser(format!("Screenshot failed: {}", e)))
    }

    async fn images(&self, url: &str, bounds: &ImageBounds) -> Result<Vec<GrabbedImage>> {
        let page = self.open(url).await?;
        let probes = page
            .evaluate(image_probe_script())
            .await
            .map_err(|e| SluiceError::Browser(format!("Script execution failed: {}", e)))
            .and_then(|result| {
                result
                    .into_value::<Vec<ImageProbe>>()
                    .map_err(|e| SluiceError::Browser(format!("Failed to parse result: {:?}", e)))
            });
        drop(page);

        let mut images = Vec::new();
        for probe in probes? {
            if probe.width == 0 || probe.height == 0 {
                tracing::debug!("Image could not be decoded: {}", probe.src);
                continue;
            }
            if !bounds.contains(probe.width, probe.height) {
                continue;
            }

            match self.fetch_image(&probe.src).await {
                Ok(image) => images.push(image),
                Err(e) => tracing::debug!("Skipping image {}: {}", probe.src, e),
            }
        }

        tracing::debug!("Grabbed {} images from {}", images.len(), url);
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone)]
    struct CountingTab(Arc<AtomicUsize>);

    impl Tab for CountingTab {
        fn close_tab(self) -> BoxFuture<'static, ()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            async {}.boxed()
        }
    }

    #[tokio::test]
    async fn test_tab_closed_after_use() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let _tab = TabGuard::new(CountingTab(closes.clone()));
            assert_eq!(closes.load(Ordering::SeqCst), 0);
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_closed_when_grab_times_out() {
        let closes = Arc::new(AtomicUsize::new(0));
        let tab = CountingTab(closes.clone());

        let grab = async move {
            let _tab = TabGuard::new(tab);
            tokio::time::sleep(Duration::from_secs(3600)).await;
        };
        tokio_test::assert_err!(tokio::time::timeout(Duration::from_secs(5), grab).await);

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tab_closed_on_early_error() {
        let closes = Arc::new(AtomicUsize::new(0));
        let open = |tab: CountingTab| -> Result<TabGuard<CountingTab>> {
            let _tab = TabGuard::new(tab);
            Err(SluiceError::Browser("Navigation failed".into()))
        };
        assert!(open(CountingTab(closes.clone())).is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_image_format() {
        assert_eq!(image_format("image/png"), Some("png".into()));
        assert_eq!(image_format("image/JPEG; charset=binary"), Some("jpeg".into()));
        assert_eq!(image_format("image/svg+xml"), Some("svg".into()));
        assert_eq!(image_format("text/html"), None);
        assert_eq!(image_format("image/"), None);
    }

    #[test]
    fn test_new_respects_settings() {
        let config = GrabSettings {
            check_ssl: false,
            ..Default::default()
        };
        assert!(WebGrabber::new(config).is_ok());
    }
}
