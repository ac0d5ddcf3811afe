/// Smoke-test for `ChromeDriver`.
///
/// Launches a headless Chromium, opens a page, clicks the element matched by
/// a CSS selector, and lists whatever landed in a temporary download dir.
///
/// Run with:
///   cargo run -p ferry-client --example download_smoke -- <url> <css-selector>
use std::time::Duration;

use ferry_client::ChromeDriver;
use ferry_core::config::{DEFAULT_USER_AGENT, SessionConfig};
use ferry_core::job::SelectorSpec;
use ferry_core::traits::{BrowserDriver, BrowserSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(css)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: download_smoke <url> <css-selector>");
    };
    let url = url::Url::parse(&url)?;
    let selector = SelectorSpec::new("css", css)?;

    let downloads = tempfile::tempdir()?;
    let config = SessionConfig::configure(downloads.path(), true, DEFAULT_USER_AGENT);

    println!("Launching headless browser…");
    let driver = ChromeDriver::new();
    let mut session = driver.open_session(&config).await?;

    let clicked = async {
        session.navigate(&url, Duration::from_secs(10)).await?;
        let element = session.locate_element(&selector).await?;
        session.click(&element).await
    }
    .await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    session.close().await?;
    clicked?;

    for entry in std::fs::read_dir(downloads.path())? {
        let entry = entry?;
        println!("{} ({} bytes)", entry.file_name().to_string_lossy(), entry.metadata()?.len());
    }
    Ok(())
}
