use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use ferry_core::config::SessionConfig;
use ferry_core::error::AppError;
use ferry_core::job::{Locator, SelectorSpec};
use ferry_core::traits::{BrowserDriver, BrowserSession};
use futures::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

/// Headless-Chromium driver using the Chrome DevTools Protocol.
///
/// Every [`BrowserDriver::open_session`] call launches its own Chromium
/// process with its own profile directory and download directory, so
/// sessions running on different workers share nothing.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use ferry_client::ChromeDriver;
/// use ferry_core::config::SessionConfig;
/// use ferry_core::traits::{BrowserDriver, BrowserSession};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let driver = ChromeDriver::new();
/// let config = SessionConfig::configure(Path::new("/tmp/downloads"), true, "ferry");
/// let session = driver.open_session(&config).await?;
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChromeDriver;

impl ChromeDriver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the browser binary to launch.
    ///
    /// An explicit path must exist. Without one we search well-known
    /// locations and, failing that, return `None` and let `chromiumoxide`
    /// do its own lookup.
    pub fn locate_browser(explicit: Option<&Path>) -> Result<Option<PathBuf>, AppError> {
        match explicit {
            Some(path) if path.exists() => Ok(Some(path.to_path_buf())),
            Some(path) => Err(AppError::SessionStart(format!(
                "browser executable not found: {}",
                path.display()
            ))),
            None => Ok(Self::find_chrome_binary()),
        }
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via **snap**, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
    /// We look for the real binary inside the snap first, then fall back to
    /// well-known system paths.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            // Snap (Ubuntu default)
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            // Flatpak
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            // Common apt / manual installs
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    /// Extra Chromium flags for a session.
    fn launch_args(config: &SessionConfig) -> Vec<String> {
        let mut args = Vec::new();
        if config.headless {
            args.push("--headless=new".to_string());
        }
        args.extend(
            [
                "--disable-gpu",
                "--disable-software-rasterizer",
                "--disable-dev-shm-usage",
                "--disable-notifications",
                "--disable-extensions",
                "--disable-popup-blocking",
                "--disable-translate",
                "--no-first-run",
            ]
            .map(String::from),
        );
        args.push(format!(
            "--window-size={},{}",
            config.window_size.0, config.window_size.1
        ));
        args.push(format!("--user-agent={}", config.user_agent));
        args
    }

    fn browser_config(config: &SessionConfig) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .window_size(config.window_size.0, config.window_size.1)
            // Leave room for our own navigation timeout to fire first.
            .request_timeout(config.page_load_timeout + Duration::from_secs(5));

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(bin) = Self::locate_browser(config.executable.as_deref())? {
            builder = builder.chrome_executable(bin);
        }
        if let Some(profile) = &config.profile_dir {
            builder = builder.user_data_dir(profile);
        }
        for arg in Self::launch_args(config) {
            builder = builder.arg(arg);
        }

        builder
            .build()
            .map_err(|e| AppError::SessionStart(format!("Browser config error: {e}")))
    }
}

impl BrowserDriver for ChromeDriver {
    type Session = ChromeSession;

    async fn open_session(&self, config: &SessionConfig) -> Result<ChromeSession, AppError> {
        // Chromium only accepts an absolute download path.
        let download_dir = tokio::fs::canonicalize(&config.download_dir).await?;
        let browser_config = Self::browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AppError::SessionStart(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser CDP handler error: {e}");
                }
            }
        });

        // From here on a failure drops the session, which kills the browser.
        let mut session = ChromeSession {
            browser,
            page: None,
            handler,
        };

        let download_behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.to_string_lossy().into_owned())
            .build()
            .map_err(|e| AppError::SessionStart(format!("Download behaviour: {e}")))?;
        session
            .browser
            .execute(download_behavior)
            .await
            .map_err(|e| AppError::SessionStart(format!("Failed to enable downloads: {e}")))?;

        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::SessionStart(format!("Failed to open tab: {e}")))?;
        session.page = Some(page);

        tracing::debug!(download_dir = %download_dir.display(), "Browser session opened");
        Ok(session)
    }
}

/// One Chromium process with a single tab.
pub struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler: JoinHandle<()>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, AppError> {
        self.page
            .as_ref()
            .ok_or_else(|| AppError::Driver("session has no open tab".into()))
    }
}

impl BrowserSession for ChromeSession {
    type Element = Element;

    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<(), AppError> {
        let page = self.page()?;
        let timed_out = || AppError::NavigationTimeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        };

        match tokio::time::timeout(timeout, page.goto(url.as_str())).await {
            Err(_) | Ok(Err(CdpError::Timeout)) => Err(timed_out()),
            Ok(Err(e)) => Err(AppError::Driver(format!("Failed to navigate to {url}: {e}"))),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn locate_element(&mut self, selector: &SelectorSpec) -> Result<Element, AppError> {
        let page = self.page()?;
        let found = match selector.to_locator() {
            Locator::Css(css) => page.find_element(css).await,
            Locator::XPath(xpath) => page.find_xpath(xpath).await,
        };
        found.map_err(|e| AppError::ElementNotFound(format!("{selector}: {e}")))
    }

    async fn click(&mut self, element: &Element) -> Result<(), AppError> {
        element
            .click()
            .await
            .map(|_| ())
            .map_err(|e| AppError::Driver(format!("Click failed: {e}")))
    }

    async fn close(mut self) -> Result<(), AppError> {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        let closed = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed
            .map(|_| ())
            .map_err(|e| AppError::Driver(format!("Failed to close browser: {e}")))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // `Browser` kills its child process on drop; the handler task would
        // otherwise outlive it.
        self.handler.abort();
    }
}
