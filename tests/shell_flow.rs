//! Operator console and automation server driving a recording end to end.

use std::sync::Arc;
use std::time::Duration;

use action_capture::{encode_line, SimulatedBrowser, ACTION_TAG};
use cdp_adapter::SurfaceFactory;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use workflow_core_types::{CapturedAction, ModeState};
use workflow_shell::channel::ServerChannel;
use workflow_shell::config::ServerConfig;
use workflow_shell::{ControllerSettings, HostWindow, HostWindowState, ModeController, Shell};

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

async fn reply(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(3), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn record_and_stop_sends_captured_actions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        assert_eq!(next_json(&mut ws).await["type"], "init");
        reply(&mut ws, json!({"type": "init_complete", "data": {"reset": false}})).await;

        assert_eq!(next_json(&mut ws).await["type"], "start_recording");
        reply(&mut ws, json!({"type": "recording_started", "message": "Recording started"})).await;

        let stop = next_json(&mut ws).await;
        assert_eq!(stop["type"], "stop_recording");
        assert_eq!(stop["workflow_name"], "Checkout");
        let actions = stop["captured_actions"].as_array().unwrap().clone();
        reply(
            &mut ws,
            json!({
                "type": "recording_stopped",
                "data": {"workflow_id": "wf_0a1b2c3d", "name": "Checkout", "action_count": actions.len(), "duration": 1.5}
            }),
        )
        .await;
        actions
    });

    let browser = Arc::new(SimulatedBrowser::default());
    let host = Arc::new(HostWindowState::new(1600, 1000));
    let controller = Arc::new(ModeController::new(
        ControllerSettings::default(),
        browser.clone() as Arc<dyn SurfaceFactory>,
        host.clone() as Arc<dyn HostWindow>,
    ));
    controller.attach_hidden(browser.hidden());

    let cfg = ServerConfig {
        url: format!("ws://{addr}"),
        connect_retries: 1,
        ..ServerConfig::default()
    };
    let (channel, updates) = ServerChannel::connect(&cfg).await.unwrap();
    let shell = Shell::new(Arc::clone(&controller), host).with_channel(channel, updates);

    let (mut console, input) = tokio::io::duplex(1024);
    let running = tokio::spawn(shell.run(BufReader::new(input)));

    console.write_all(b"record\n").await.unwrap();
    eventually(|| async { controller.mode().await == ModeState::Recording }).await;

    let surface = browser.last_created().unwrap();
    let first = CapturedAction::click("#add-to-cart", None, 10);
    let second = CapturedAction::fill("#coupon", "SPRING", 11);
    surface.console_log(&encode_line(ACTION_TAG, &first));
    surface.console_log(&encode_line(ACTION_TAG, &second));
    eventually(|| async { controller.buffered() == 2 }).await;

    console.write_all(b"stop Checkout\n").await.unwrap();
    let sent = server.await.unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["selector"], "#add-to-cart");
    assert_eq!(sent[1]["value"], "SPRING");

    eventually(|| async { controller.mode().await == ModeState::Agent }).await;
    assert!(surface.is_closed());
    assert_eq!(controller.buffered(), 0);

    console.write_all(b"quit\n").await.unwrap();
    running.await.unwrap().unwrap();
}
