//! Command dispatch: deduplication, timeouts and server errors.

mod common;

use common::{scripted_client, FRAME_WAIT};
use place_link::{CommandKind, ErrorCode, PlaceLinkError};
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_identical_exec_is_sent_once() {
    let (client, server) = scripted_client();
    let display = client.get_module("sys-A0", "Display_1").unwrap();

    let first = tokio::spawn({
        let display = display.clone();
        async move { display.execute("power", vec![json!(true)]).await }
    });
    let second = tokio::spawn({
        let display = display.clone();
        async move { display.execute("power", vec![json!(true)]).await }
    });

    let command = server.next_command().await;
    assert_eq!(command.cmd, CommandKind::Exec);
    assert_eq!(command.address.name, "power");
    assert_eq!(command.args, Some(vec![json!(true)]));
    server.expect_no_command(Duration::from_millis(100)).await;

    server.respond_success(command.id, json!("on"));
    assert_eq!(first.await.unwrap().unwrap(), json!("on"));
    assert_eq!(second.await.unwrap().unwrap(), json!("on"));
}

#[tokio::test]
async fn test_different_args_are_sent_separately() {
    let (client, server) = scripted_client();
    let display = client.get_module("sys-A0", "Display_1").unwrap();

    let up = tokio::spawn({
        let display = display.clone();
        async move { display.execute("volume", vec![json!(10)]).await }
    });
    let a = server.next_command().await;

    let down = tokio::spawn({
        let display = display.clone();
        async move { display.execute("volume", vec![json!(5)]).await }
    });
    let b = server.next_command().await;
    assert_ne!(a.id, b.id);

    server.respond_success(b.id, json!(5));
    server.respond_success(a.id, json!(10));
    assert_eq!(up.await.unwrap().unwrap(), json!(10));
    assert_eq!(down.await.unwrap().unwrap(), json!(5));
}

#[tokio::test]
async fn test_exec_times_out_and_late_response_is_ignored() {
    let (client, server) = scripted_client();
    let display = client.get_module("sys-A0", "Display_1").unwrap();

    let started = Instant::now();
    let slow = tokio::spawn({
        let display = display.clone();
        async move {
            display
                .execute_with_timeout("slow", vec![], Some(Duration::from_millis(50)))
                .await
        }
    });
    let command = server.next_command().await;

    let result = slow.await.unwrap();
    assert_eq!(result, Err(PlaceLinkError::TimeoutError));
    assert_eq!(result.unwrap_err().to_string(), "Request timed out");
    assert!(started.elapsed() >= Duration::from_millis(50));

    // Late answer for a request nobody waits on any more.
    server.respond_success(command.id, json!("late"));

    let next = tokio::spawn({
        let display = display.clone();
        async move { display.execute("fast", vec![]).await }
    });
    let command = server.next_command().await;
    assert_eq!(command.address.name, "fast");
    server.respond_success(command.id, json!(1));
    assert_eq!(next.await.unwrap().unwrap(), json!(1));
}

#[tokio::test]
async fn test_server_error_is_returned_as_protocol_error() {
    let (client, server) = scripted_client();
    let display = client.get_module("sys-A0", "Display_1").unwrap();

    let call = tokio::spawn({
        let display = display.clone();
        async move { display.execute("power", vec![]).await }
    });
    let command = server.next_command().await;
    server.respond_error(command.id, 6, "module Display_1 not found");

    match call.await.unwrap() {
        Err(PlaceLinkError::Protocol { code, message }) => {
            assert_eq!(code, ErrorCode::ModuleNotFound);
            assert_eq!(message, "module Display_1 not found");
        },
        other => panic!("Expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_fails_pending_requests() {
    let (client, server) = scripted_client();
    let display = client.get_module("sys-A0", "Display_1").unwrap();

    let call = tokio::spawn({
        let display = display.clone();
        async move { display.execute("power", vec![]).await }
    });
    server.next_command().await;

    client.disconnect().await;
    let result = tokio::time::timeout(FRAME_WAIT, call).await.unwrap().unwrap();
    assert_eq!(result, Err(PlaceLinkError::ConnectionLost));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_commands_reconnect_after_disconnect() {
    let (client, server) = scripted_client();
    client.connect().await.unwrap();
    client.disconnect().await;
    assert_eq!(server.opens(), 1);

    let display = client.get_module("sys-A0", "Display_1").unwrap();
    let call = tokio::spawn({
        let display = display.clone();
        async move { display.debug().await }
    });
    let command = server.next_command().await;
    assert_eq!(command.cmd, CommandKind::Debug);
    assert_eq!(command.address.module_id(), "Display_1");
    server.respond_success(command.id, json!(null));
    call.await.unwrap().unwrap();
    assert_eq!(server.opens(), 2);
}

#[tokio::test]
async fn test_debug_frames_reach_debug_stream() {
    let (client, server) = scripted_client();
    let mut events = client.debug_events();
    client.connect().await.unwrap();

    server.push_json(json!({
        "type": "debug",
        "mod": "mod-1234",
        "klass": "Display",
        "msg": "power on",
        "level": "info",
        "meta": { "mod": "Display", "index": 1 },
    }));

    let event = tokio::time::timeout(FRAME_WAIT, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.mod_id, "mod-1234");
    assert_eq!(event.module, "Display_1");
    assert_eq!(event.class_name, "Display");
    assert_eq!(event.message, "power on");
}

#[tokio::test]
async fn test_debug_with_timeout_fails_without_response() {
    let (client, server) = scripted_client();
    let display = client.get_module("sys-A0", "Display_1").unwrap();

    let call = tokio::spawn({
        let display = display.clone();
        async move { display.debug_with_timeout(Some(Duration::from_millis(50))).await }
    });
    let command = server.next_command().await;
    assert_eq!(command.cmd, CommandKind::Debug);
    assert_eq!(
        tokio::time::timeout(FRAME_WAIT, call).await.unwrap().unwrap(),
        Err(PlaceLinkError::TimeoutError)
    );

    let address = place_link::RequestAddress::new("sys-A0", "Display", 1, "power");
    let unbind = tokio::spawn({
        let client = client.clone();
        let address = address.clone();
        async move {
            client
                .unbind_with_timeout(&address, Some(Duration::from_millis(50)))
                .await
        }
    });
    let command = server.next_command().await;
    assert_eq!(command.cmd, CommandKind::Unbind);
    assert_eq!(command.address, address);
    assert_eq!(
        tokio::time::timeout(FRAME_WAIT, unbind).await.unwrap().unwrap(),
        Err(PlaceLinkError::TimeoutError)
    );
}
