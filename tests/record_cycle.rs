//! Recording sessions driven through the mode controller.

use std::sync::Arc;
use std::time::Duration;

use action_capture::{encode_line, SimulatedBrowser, SimulatedSurface, ACTION_TAG};
use action_locator::ElementSpec;
use cdp_adapter::{BrowsingSurface, SurfaceFactory};
use workflow_core_types::{ActionKind, CapturedAction, ModeState};
use workflow_shell::{ControllerSettings, HostWindow, HostWindowState, ModeController};

struct Rig {
    browser: Arc<SimulatedBrowser>,
    hidden: Arc<SimulatedSurface>,
    host: Arc<HostWindowState>,
    controller: ModeController,
}

fn rig() -> Rig {
    let browser = Arc::new(SimulatedBrowser::default());
    let hidden = browser.hidden();
    let host = Arc::new(HostWindowState::new(1600, 1000));
    let controller = ModeController::new(
        ControllerSettings::default(),
        browser.clone() as Arc<dyn SurfaceFactory>,
        host.clone() as Arc<dyn HostWindow>,
    );
    controller.attach_hidden(hidden.clone());
    Rig {
        browser,
        hidden,
        host,
        controller,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn synthetic_actions() -> Vec<CapturedAction> {
    vec![
        CapturedAction::navigate("https://example.com", 1),
        CapturedAction::click("#submit", None, 2),
        CapturedAction::fill("#email", "a@b.com", 3),
    ]
}

#[tokio::test]
async fn record_cycle_hands_off_exactly_the_captured_actions() {
    let rig = rig();
    let started = rig.controller.enable_recording_mode().await;
    assert!(started.success, "{:?}", started.error);
    assert_eq!(started.url.as_deref(), Some("https://www.duckduckgo.com"));
    assert_eq!(rig.controller.mode().await, ModeState::Recording);
    assert!(!rig.host.screenshot_visible());

    let surface = rig.browser.last_created().unwrap();
    assert!(surface.listener_attached());
    for action in synthetic_actions() {
        surface.console_log(&encode_line(ACTION_TAG, &action));
    }
    surface.console_log("unrelated page log");
    surface.console_log("[WORKFLOW_ACTION] {not json");
    eventually(|| rig.controller.buffered() == 3).await;

    let drained = rig.controller.get_captured_actions().await;
    assert!(drained.success);
    assert_eq!(drained.actions, Some(synthetic_actions()));
    assert_eq!(rig.controller.buffered(), 0);

    let stopped = rig.controller.disable_recording_mode().await;
    assert!(stopped.success);
    assert_eq!(stopped.actions, Some(Vec::new()));
    assert_eq!(rig.controller.buffered(), 0);
    assert!(surface.is_closed());
    assert!(rig.host.screenshot_visible());
    assert_eq!(rig.controller.mode().await, ModeState::Agent);

    let again = rig.controller.get_captured_actions().await;
    assert_eq!(again.actions, Some(Vec::new()));
}

#[tokio::test]
async fn stopping_without_drain_returns_remaining_actions() {
    let rig = rig();
    rig.controller.enable_recording_mode().await;
    let surface = rig.browser.last_created().unwrap();
    for action in synthetic_actions() {
        surface.console_log(&encode_line(ACTION_TAG, &action));
    }
    eventually(|| rig.controller.buffered() == 3).await;

    let stopped = rig.controller.disable_recording_mode().await;
    assert_eq!(stopped.actions, Some(synthetic_actions()));
    assert_eq!(stopped.url.as_deref(), Some("https://www.duckduckgo.com"));
}

#[tokio::test]
async fn recording_starts_where_the_agent_is() {
    let rig = rig();
    rig.hidden
        .load_url("https://example.com/checkout")
        .await
        .unwrap();

    let started = rig.controller.enable_recording_mode().await;
    assert_eq!(started.url.as_deref(), Some("https://example.com/checkout"));
    let surface = rig.browser.last_created().unwrap();
    assert_eq!(surface.url(), "https://example.com/checkout");
}

#[tokio::test]
async fn dom_interactions_survive_page_navigation() {
    let rig = rig();
    rig.controller.enable_recording_mode().await;
    let surface = rig.browser.last_created().unwrap();

    let (email, submit) = surface.with_dom(|tree| {
        let body = tree.body();
        let email = tree
            .append(body, ElementSpec::new("input").attr("type", "email").id("email"))
            .unwrap();
        let submit = tree
            .append(body, ElementSpec::new("button").id("submit").text("Sign up"))
            .unwrap();
        (email, submit)
    });
    surface.input(email, "a@b.com").unwrap();
    surface.click(submit);
    eventually(|| rig.controller.buffered() == 2).await;

    surface.follow_link("https://example.com/welcome");
    eventually(|| surface.listener_attached()).await;
    eventually(|| rig.hidden.url() == "https://example.com/welcome").await;

    let next = surface.with_dom(|tree| {
        let body = tree.body();
        tree.append(body, ElementSpec::new("a").id("continue").attr("href", "/next"))
            .unwrap()
    });
    surface.click(next);
    eventually(|| rig.controller.buffered() == 3).await;

    let actions = rig.controller.disable_recording_mode().await.actions.unwrap();
    let kinds: Vec<ActionKind> = actions.iter().map(CapturedAction::kind).collect();
    assert_eq!(kinds, vec![ActionKind::Fill, ActionKind::Click, ActionKind::Click]);
    assert_eq!(actions[0].selector(), Some("#email"));
    assert_eq!(actions[0].value().as_deref(), Some("a@b.com"));
    assert_eq!(actions[2].selector(), Some("#continue"));
}

#[tokio::test]
async fn navigation_capture_records_goto_entries() {
    let browser = Arc::new(SimulatedBrowser::default());
    let host = Arc::new(HostWindowState::new(1600, 1000));
    let settings = ControllerSettings {
        capture_navigations: true,
        ..ControllerSettings::default()
    };
    let controller = ModeController::new(
        settings,
        browser.clone() as Arc<dyn SurfaceFactory>,
        host as Arc<dyn HostWindow>,
    );
    controller.attach_hidden(browser.hidden());
    controller.enable_recording_mode().await;

    let surface = browser.last_created().unwrap();
    surface.follow_link("https://example.com/docs");
    eventually(|| controller.buffered() == 1).await;

    let actions = controller.get_captured_actions().await.actions.unwrap();
    assert_eq!(
        actions[0].payload,
        workflow_core_types::ActionPayload::Navigate {
            url: "https://example.com/docs".into()
        }
    );
}

#[tokio::test]
async fn restored_actions_come_back_before_newer_ones() {
    let rig = rig();
    assert!(rig.controller.enable_recording_mode().await.success);
    let surface = rig.browser.last_created().unwrap();
    surface.console_log(&encode_line(ACTION_TAG, &CapturedAction::click("#submit", None, 2)));
    eventually(|| rig.controller.buffered() == 1).await;

    let undelivered = rig.controller.get_captured_actions().await.actions.unwrap();
    surface.console_log(&encode_line(
        ACTION_TAG,
        &CapturedAction::fill("#email", "a@b.com", 3),
    ));
    eventually(|| rig.controller.buffered() == 1).await;
    rig.controller.restore_captured_actions(undelivered).await;

    let actions = rig.controller.get_captured_actions().await.actions.unwrap();
    let selectors: Vec<_> = actions.iter().filter_map(|a| a.selector()).collect();
    assert_eq!(selectors, vec!["#submit", "#email"]);
    assert!(rig.controller.disable_recording_mode().await.success);
}
