//! Runs the injected capture listener inside a real Chromium page. Ignored by
//! default because it requires Chrome/Chromium on the host.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use action_capture::{capture_script, ActionBuffer, CaptureTransport, Ingest, ScriptOptions, ACTION_TAG};
use cdp_adapter::{BrowsingSurface, CdpBrowser, CdpConfig, InteractiveSurface, Isolation};
use serde_json::Value;
use tokio::time::{sleep, timeout};
use workflow_core_types::{ActionKind, ScrollOffset};

const PAGE: &str = r#"<!doctype html>
<html><body style="margin:0">
<button id="submit">Send</button>
<div style="height:3000px"></div>
<button class="Ab3xQzT9mKpLsYh2 btn">Buy</button>
<input type="text">
</body></html>"#;

fn contract_enabled() -> bool {
    env::var("WORKFLOW_SHELL_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn data_url(html: &str) -> String {
    let mut encoded = String::from("data:text/html;charset=utf-8,");
    for byte in html.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'=' | b':' | b';' | b'/' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}

#[tokio::test]
#[ignore = "requires Chrome/Chromium; set WORKFLOW_SHELL_CDP_CONTRACT=1"]
async fn contract_listener_emits_actions_in_dom_order() {
    if !contract_enabled() {
        eprintln!("skipping listener contract test (WORKFLOW_SHELL_CDP_CONTRACT not enabled)");
        return;
    }

    let browser = Arc::new(CdpBrowser::new(CdpConfig::default()));
    Arc::clone(&browser).start().await.expect("browser start");
    let page = browser
        .open_page(Isolation::Relaxed)
        .await
        .expect("open relaxed page");
    page.load_url(&data_url(PAGE)).await.expect("load fixture page");

    let script = capture_script(&ScriptOptions::default());
    assert_eq!(page.execute_script(&script).await.expect("inject"), Value::Bool(true));
    assert_eq!(
        page.execute_script(&script).await.expect("re-inject"),
        Value::Bool(false)
    );

    let transport = CaptureTransport::new(ACTION_TAG, ActionBuffer::new());
    let mut events = page.subscribe();
    page.execute_script(
        r#"(() => {
            window.scrollTo(0, 400);
            document.getElementById('submit').click();
            document.querySelector('button.btn').click();
            const input = document.querySelector('input');
            input.value = 'a@b.com';
            input.dispatchEvent(new Event('input', { bubbles: true }));
            return true;
        })()"#,
    )
    .await
    .expect("dispatch interactions");

    timeout(Duration::from_secs(5), async {
        while transport.buffer().len() < 4 {
            let event = events.recv().await.expect("surface event stream");
            if let Ingest::Malformed(err) = transport.handle_event(&event) {
                panic!("listener emitted a malformed line: {err}");
            }
        }
    })
    .await
    .expect("four actions within deadline");

    // The debounced scroll fires after this and must not repeat the offset.
    sleep(Duration::from_millis(600)).await;
    while let Ok(event) = events.try_recv() {
        transport.handle_event(&event);
    }

    let actions = transport.buffer().drain();
    let kinds: Vec<_> = actions.iter().map(|a| a.kind()).collect();
    assert_eq!(
        kinds,
        vec![ActionKind::Scroll, ActionKind::Click, ActionKind::Click, ActionKind::Fill]
    );
    assert_eq!(actions[0].scroll_offset(), Some(ScrollOffset::new(0, 400)));
    assert_eq!(actions[1].selector(), Some("#submit"));
    assert_eq!(actions[2].selector(), Some("button.btn"));
    assert_eq!(actions[3].selector(), Some("input"));
    assert_eq!(actions[3].value().as_deref(), Some("a@b.com"));

    page.close().await.expect("close page");
    browser.shutdown().await;
}
