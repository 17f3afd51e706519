//! Contract tests bridging `CdpBrowser` to a real Chromium binary. They are
//! ignored by default because they require Chrome/Chromium on the host.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{
    BrowsingSurface, CdpBrowser, CdpConfig, InteractiveSurface, Isolation, SurfaceEvent,
};
use tokio::time::timeout;

fn contract_enabled() -> bool {
    env::var("WORKFLOW_SHELL_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

async fn setup_browser() -> Arc<CdpBrowser> {
    let browser = Arc::new(CdpBrowser::new(CdpConfig::default()));
    Arc::clone(&browser).start().await.expect("browser start");
    browser
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set WORKFLOW_SHELL_CDP_CONTRACT=1"]
async fn contract_navigate_and_read_url() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (WORKFLOW_SHELL_CDP_CONTRACT not enabled)");
        return;
    }

    let browser = setup_browser().await;
    let page = browser.open_hidden().await.expect("open hidden page");
    page.load_url("https://example.com")
        .await
        .expect("navigate succeeds");
    let url = page.current_url().await.expect("current url");
    assert!(url.starts_with("https://example.com"));

    page.close().await.expect("close page");
    browser.shutdown().await;
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set WORKFLOW_SHELL_CDP_CONTRACT=1"]
async fn contract_relaxed_page_reports_console() {
    if !contract_enabled() {
        eprintln!("skipping CDP contract test (WORKFLOW_SHELL_CDP_CONTRACT not enabled)");
        return;
    }

    let browser = setup_browser().await;
    let page = browser
        .open_page(Isolation::Relaxed)
        .await
        .expect("open relaxed page");
    let mut events = page.subscribe();

    page.execute_script("console.log('[WORKFLOW_ACTION]', JSON.stringify({type: 'goto', url: 'x'}))")
        .await
        .expect("script runs");

    let console = timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(SurfaceEvent::ConsoleMessage { text, .. }) => return Some(text),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .expect("console event within deadline");
    assert_eq!(
        console.as_deref(),
        Some(r#"[WORKFLOW_ACTION] {"type":"goto","url":"x"}"#)
    );

    page.close().await.expect("close page");
    browser.shutdown().await;
}
