//! Catalogue access through a rendered browser session.
//!
//! Used for catalogues behind interactive single sign-on. The API JSON is
//! read back from a hidden container of the rendered page.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use super::{unwrap_envelope, CatalogueClient};
use crate::config::validate_base_url;
use crate::error::{InventoryError, Result};

/// Opening tag of the container holding the API response.
const JSON_CONTAINER_OPEN: &str = r#"<div hidden="true">"#;
const JSON_CONTAINER_CLOSE: &str = "</div>";

/// A browser session that navigates to a URL and returns the rendered HTML.
///
/// Sessions are not reentrant; [`BrowserCatalogueClient`] serializes calls.
pub trait PageRenderer: Send {
    fn render(&mut self, url: &str) -> Result<String>;
}

/// Extract and parse the JSON document embedded in a rendered API page.
///
/// # Errors
/// `MalformedResponse` when the container is absent or its content is not JSON.
pub fn extract_embedded_json(url: &str, html: &str) -> Result<Value> {
    let malformed = |reason: String| InventoryError::MalformedResponse {
        url: url.to_string(),
        reason,
    };

    let (_, after_open) = html
        .split_once(JSON_CONTAINER_OPEN)
        .ok_or_else(|| malformed("no embedded JSON container in page".to_string()))?;
    let embedded = after_open
        .split_once(JSON_CONTAINER_CLOSE)
        .map_or(after_open, |(inside, _)| inside);

    let text = embedded
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    serde_json::from_str(text.trim()).map_err(|e| malformed(e.to_string()))
}

/// Catalogue client driving one browser session.
///
/// Every request navigates twice: single sign-on strips the query string on
/// the first navigation. The session lock is held for the whole request.
pub struct BrowserCatalogueClient<R: PageRenderer> {
    base_url: String,
    session: Mutex<R>,
}

impl<R: PageRenderer> BrowserCatalogueClient<R> {
    pub fn new(base_url: &str, renderer: R) -> Result<Self> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            session: Mutex::new(renderer),
        })
    }

    /// Give back the underlying session.
    pub fn into_renderer(self) -> R {
        self.session
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: PageRenderer> CatalogueClient for BrowserCatalogueClient<R> {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_raw(&self, url: &str) -> Result<Value> {
        let html = {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            session.render(url)?;
            session.render(url)?
        };
        let envelope = extract_embedded_json(url, &html)?;
        unwrap_envelope(url, envelope)
    }
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumRenderer;

#[cfg(feature = "browser")]
mod chromium {
    use std::path::PathBuf;

    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::Page;
    use futures::StreamExt;
    use tokio::runtime::Runtime;
    use tokio::task::JoinHandle;

    use super::PageRenderer;
    use crate::error::{InventoryError, Result};

    fn browser_error(e: impl std::fmt::Display) -> InventoryError {
        InventoryError::Browser(e.to_string())
    }

    /// Headless Chromium session.
    ///
    /// Owns a private Tokio runtime so that it can be driven from blocking code.
    pub struct ChromiumRenderer {
        runtime: Runtime,
        browser: Browser,
        page: Page,
        handler: JoinHandle<()>,
    }

    impl ChromiumRenderer {
        /// Launch headless Chromium with a fresh profile.
        pub fn launch() -> Result<Self> {
            Self::launch_with_profile(None)
        }

        /// Launch headless Chromium, optionally reusing a signed-in profile
        /// directory so single sign-on succeeds without interaction.
        pub fn launch_with_profile(profile: Option<PathBuf>) -> Result<Self> {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()?;

            let (browser, page, handler) = runtime.block_on(async {
                let mut builder = BrowserConfig::builder()
                    .arg("--disable-gpu")
                    .arg("--log-level=3");
                if let Some(profile) = profile {
                    builder = builder.user_data_dir(profile);
                }
                let config = builder.build().map_err(InventoryError::Browser)?;

                let (browser, mut events) = Browser::launch(config).await.map_err(browser_error)?;
                let handler = tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        if event.is_err() {
                            break;
                        }
                    }
                });
                let page = browser.new_page("about:blank").await.map_err(browser_error)?;
                Ok::<_, InventoryError>((browser, page, handler))
            })?;

            tracing::info!("Browser session started");
            Ok(Self {
                runtime,
                browser,
                page,
                handler,
            })
        }
    }

    impl PageRenderer for ChromiumRenderer {
        fn render(&mut self, url: &str) -> Result<String> {
            let page = &self.page;
            self.runtime.block_on(async {
                page.goto(url).await.map_err(browser_error)?;
                page.wait_for_navigation().await.map_err(browser_error)?;
                page.content().await.map_err(browser_error)
            })
        }
    }

    impl Drop for ChromiumRenderer {
        fn drop(&mut self) {
            let browser = &mut self.browser;
            if let Err(e) = self.runtime.block_on(browser.close()) {
                tracing::warn!(error = %e, "Failed to close browser");
            }
            self.handler.abort();
        }
    }
}
