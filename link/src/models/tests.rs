use serde_json::json;
use std::time::Duration;

use super::*;

// ==================== ConnectionOptions Tests ====================

#[test]
fn test_connection_options_default() {
    let opts = ConnectionOptions::default();

    assert!(opts.auto_reconnect, "auto_reconnect should default to true");
    assert_eq!(opts.reconnect_delay_ms, 300);
    assert_eq!(opts.max_reconnect_delay_ms, 5000);
    assert_eq!(opts.auth_wait_step_ms, 1000);
    assert_eq!(opts.max_auth_wait_steps, 10);
    assert_eq!(opts.max_auth_wait_attempts, 40);
}

#[test]
fn test_connection_options_builder_pattern() {
    let opts = ConnectionOptions::new()
        .with_auto_reconnect(false)
        .with_reconnect_delay_ms(100)
        .with_max_reconnect_delay_ms(1000)
        .with_max_auth_wait_attempts(3);

    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 100);
    assert_eq!(opts.max_reconnect_delay_ms, 1000);
    assert_eq!(opts.max_auth_wait_attempts, 3);
}

#[test]
fn test_connection_options_deserialize_fills_defaults() {
    let opts: ConnectionOptions =
        serde_json::from_value(json!({ "reconnect_delay_ms": 50 })).unwrap();
    assert_eq!(opts.reconnect_delay_ms, 50);
    assert_eq!(opts.max_reconnect_delay_ms, 5000);
    assert!(opts.auto_reconnect);
}

#[test]
fn test_reconnect_delay_is_non_decreasing_then_capped() {
    let opts = ConnectionOptions::default();
    let delays: Vec<Duration> = (0..30).map(|a| opts.reconnect_delay(a)).collect();

    assert_eq!(delays[0], Duration::from_millis(300));
    assert_eq!(delays[1], Duration::from_millis(600));
    for pair in delays.windows(2) {
        assert!(pair[0] <= pair[1], "backoff must never shrink: {:?}", pair);
    }
    assert_eq!(delays[16], Duration::from_millis(5000));
    assert!(delays[16..].iter().all(|d| *d == Duration::from_millis(5000)));
}

#[test]
fn test_auth_wait_delay_caps_at_ten_steps() {
    let opts = ConnectionOptions::default();
    assert_eq!(opts.auth_wait_delay(1), Duration::from_secs(1));
    assert_eq!(opts.auth_wait_delay(4), Duration::from_secs(4));
    assert_eq!(opts.auth_wait_delay(10), Duration::from_secs(10));
    assert_eq!(opts.auth_wait_delay(39), Duration::from_secs(10));
}

// ==================== Wire Format Tests ====================

#[test]
fn test_command_request_serializes_flat() {
    let request = CommandRequest::new(
        7,
        CommandKind::Exec,
        RequestAddress::new("sys-A0", "Display", 2, "power"),
    )
    .with_args(vec![json!(true)]);

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({
            "id": 7,
            "cmd": "exec",
            "sys": "sys-A0",
            "mod": "Display",
            "index": 2,
            "name": "power",
            "args": [true],
        })
    );
}

#[test]
fn test_command_request_omits_missing_args() {
    let request = CommandRequest::new(
        1,
        CommandKind::Bind,
        RequestAddress::new("sys-A0", "Display", 1, "power"),
    );
    let text = serde_json::to_string(&request).unwrap();
    assert!(!text.contains("args"));
    assert!(text.contains("\"cmd\":\"bind\""));
}

#[test]
fn test_parse_pong_frames() {
    assert_eq!(InboundFrame::parse("pong"), InboundFrame::Pong);
    assert_eq!(InboundFrame::parse("\"pong\""), InboundFrame::Pong);
}

#[test]
fn test_parse_success_frame() {
    let frame = InboundFrame::parse(r#"{"id":3,"type":"success","value":{"a":1}}"#);
    assert_eq!(
        frame,
        InboundFrame::Message(ServerMessage::Success {
            id: 3,
            value: json!({"a": 1}),
        })
    );
}

#[test]
fn test_parse_success_without_value() {
    let frame = InboundFrame::parse(r#"{"id":3,"type":"success"}"#);
    assert_eq!(
        frame,
        InboundFrame::Message(ServerMessage::Success {
            id: 3,
            value: serde_json::Value::Null,
        })
    );
}

#[test]
fn test_parse_error_frame_maps_codes() {
    let frame = InboundFrame::parse(r#"{"id":9,"type":"error","code":5,"msg":"gone"}"#);
    match frame {
        InboundFrame::Message(ServerMessage::Error { id, code, msg }) => {
            assert_eq!(id, 9);
            assert_eq!(code, ErrorCode::SystemNotFound);
            assert_eq!(msg, "gone");
        },
        other => panic!("Expected error frame, got {:?}", other),
    }

    assert_eq!(ErrorCode::from(42), ErrorCode::Other(42));
    assert_eq!(ErrorCode::Other(42).label(), "UNEXPECTED FAILURE");
    for code in 0..8 {
        assert_eq!(ErrorCode::from(code).as_i64(), code);
    }
}

#[test]
fn test_parse_notify_frame_ignores_extra_meta_fields() {
    let frame = InboundFrame::parse(
        r#"{"type":"notify","value":10,"meta":{"id":1,"cmd":"bind","sys":"sys-A0","mod":"Test","index":1,"name":"test"}}"#,
    );
    assert_eq!(
        frame,
        InboundFrame::Message(ServerMessage::Notify {
            meta: RequestAddress::new("sys-A0", "Test", 1, "test"),
            value: json!(10),
        })
    );
}

#[test]
fn test_parse_debug_frame() {
    let frame = InboundFrame::parse(
        r#"{"type":"debug","mod":"mod-123","klass":"Display","msg":"hello","level":"warn","meta":{"mod":"Display","index":1}}"#,
    );
    match frame {
        InboundFrame::Message(ServerMessage::Debug {
            mod_id,
            klass,
            msg,
            level,
            meta,
        }) => {
            assert_eq!(mod_id.as_deref(), Some("mod-123"));
            assert_eq!(klass.as_deref(), Some("Display"));
            assert_eq!(msg.as_deref(), Some("hello"));
            assert_eq!(level, Some(LogLevel::Warn));
            assert_eq!(meta.unwrap().module, "Display");
        },
        other => panic!("Expected debug frame, got {:?}", other),
    }
}

#[test]
fn test_parse_unknown_level_falls_back_to_debug() {
    let level: LogLevel = serde_json::from_value(json!("verbose")).unwrap();
    assert_eq!(level, LogLevel::Debug);
}

#[test]
fn test_log_level_names() {
    for (name, level) in [
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
        ("fatal", LogLevel::Fatal),
    ] {
        let parsed: LogLevel = serde_json::from_value(json!(name)).unwrap();
        assert_eq!(parsed, level);
        assert_eq!(serde_json::to_value(level).unwrap(), json!(name));
    }
    assert_eq!(LogLevel::default(), LogLevel::Debug);
}

#[test]
fn test_parse_echoed_command_and_garbage() {
    let echoed = InboundFrame::parse(
        r#"{"id":1,"cmd":"bind","sys":"s","mod":"M","index":1,"name":"n"}"#,
    );
    assert!(matches!(echoed, InboundFrame::Command(_)));

    assert!(matches!(InboundFrame::parse("{}"), InboundFrame::Unknown(_)));
    assert!(matches!(InboundFrame::parse("not json"), InboundFrame::Unknown(_)));
    assert!(matches!(
        InboundFrame::parse(r#"{"type":"mystery"}"#),
        InboundFrame::Unknown(_)
    ));
}

#[test]
fn test_request_address_display_and_identity() {
    let a = RequestAddress::new("sys-A0", "Display", 1, "power");
    assert_eq!(a.to_string(), "sys-A0|Display_1|power");
    assert_eq!(a.module_id(), "Display_1");

    // Components that would collide under naive string joining stay distinct.
    let b = RequestAddress::new("sys-A0", "Display_1", 1, "power");
    let c = RequestAddress::new("sys-A0", "Display", 11, "power");
    assert_ne!(a, b);
    assert_ne!(b, c);
}
