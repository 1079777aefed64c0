
use std::time::Duration;

use fixture::{create_polling_connection, create_server, send_req, OpenPacket};
use http::{Method, StatusCode};

#[tokio::test]
async fn polling_handshake() {
    create_server(4001);
    let (status, body) = send_req(
        4001,
        "EIO=4&transport=polling".to_string(),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with('0'));
    let open: OpenPacket = serde_json::from_str(&body[1..]).unwrap();
    assert_eq!(open.upgrades, ["websocket"]);
    assert_eq!(open.ping_interval, 300);
    assert_eq!(open.ping_timeout, 200);
    assert_eq!(open.max_payload, 1_000_000);
    assert!(!open.sid.is_empty());
}

#[tokio::test]
async fn rejects_bad_handshake_requests() {
    create_server(4002);
    let (status, _) = send_req(4002, "EIO=3&transport=polling".into(), Method::GET, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_req(4002, "transport=polling".into(), Method::GET, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_req(4002, "EIO=4&transport=tcp".into(), Method::GET, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_req(4002, "EIO=4&transport=polling".into(), Method::PUT, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_req(4002, "EIO=4&transport=polling".into(), Method::POST, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_sid_is_rejected() {
    create_server(4003);
    let (status, _) = send_req(
        4003,
        "EIO=4&transport=polling&sid=0123456789abcdefghijkl".into(),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ping_pong_on_polling() {
    create_server(4004);
    let sid = create_polling_connection(4004).await;
    for _ in 0..3 {
        let (status, body) = send_req(
            4004,
            format!("EIO=4&transport=polling&sid={sid}"),
            Method::GET,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "2");
        let (status, body) = send_req(
            4004,
            format!("EIO=4&transport=polling&sid={sid}"),
            Method::POST,
            Some("3".to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}

#[tokio::test]
async fn message_echo_roundtrip() {
    create_server(4005);
    let sid = create_polling_connection(4005).await;
    let (status, body) = send_req(
        4005,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::POST,
        Some("4hello".to_string()),
    )
    .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));
    let (status, body) = send_req(
        4005,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "4hello");
}

#[tokio::test]
async fn forced_close_frees_the_pending_poll() {
    create_server(4006);
    let sid = create_polling_connection(4006).await;

    // the client keeps a poll parked, as real clients do
    let pending = tokio::spawn({
        let sid = sid.clone();
        async move {
            send_req(
                4006,
                format!("EIO=4&transport=polling&sid={sid}"),
                Method::GET,
                None,
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = send_req(
        4006,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::POST,
        Some("1".to_string()),
    )
    .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));

    let (status, body) = pending.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "6");

    let (status, _) = send_req(
        4006,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_concurrent_poll_closes_the_session() {
    create_server(4007);
    let sid = create_polling_connection(4007).await;

    let pending = tokio::spawn({
        let sid = sid.clone();
        async move {
            send_req(
                4007,
                format!("EIO=4&transport=polling&sid={sid}"),
                Method::GET,
                None,
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, _) = send_req(
        4007,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    pending.await.unwrap();

    // the session is gone
    let (status, _) = send_req(
        4007,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn heartbeat_timeout_removes_the_session() {
    create_server(4008);
    let sid = create_polling_connection(4008).await;

    // never answer the ping: interval + timeout = 500ms
    tokio::time::sleep(Duration::from_millis(700)).await;
    let (status, _) = send_req(
        4008,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responding_to_pings_keeps_the_session_alive() {
    create_server(4009);
    let sid = create_polling_connection(4009).await;

    for _ in 0..4 {
        let (_, body) = send_req(
            4009,
            format!("EIO=4&transport=polling&sid={sid}"),
            Method::GET,
            None,
        )
        .await;
        assert_eq!(body, "2");
        send_req(
            4009,
            format!("EIO=4&transport=polling&sid={sid}"),
            Method::POST,
            Some("3".to_string()),
        )
        .await;
    }

    // over a second in, the session is still there
    let (status, body) = send_req(
        4009,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::POST,
        Some("4still-alive".to_string()),
    )
    .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "ok"));
}
