
use std::time::Duration;

use fixture::{create_polling_connection, create_server, create_ws_connection, send_req, OpenPacket};
use futures::{SinkExt, StreamExt};
use http::{Method, StatusCode};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn websocket_handshake() {
    create_server(4101);
    let mut ws = create_ws_connection(4101, None).await;
    let msg = ws.next().await.unwrap().unwrap();
    let body = msg.into_text().unwrap();
    assert!(body.starts_with('0'));
    let open: OpenPacket = serde_json::from_str(&body[1..]).unwrap();
    // nothing left to upgrade to
    assert!(open.upgrades.is_empty());
    assert_eq!(open.ping_interval, 300);
    assert_eq!(open.ping_timeout, 200);
}

#[tokio::test]
async fn websocket_echo() {
    create_server(4102);
    let mut ws = create_ws_connection(4102, None).await;
    // skip the open packet
    ws.next().await.unwrap().unwrap();

    ws.send(Message::Text("4hello".to_string())).await.unwrap();
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(msg) if msg == "2" => ws
                .send(Message::Text("3".to_string()))
                .await
                .unwrap(),
            Message::Text(msg) => {
                assert_eq!(msg, "4hello");
                break;
            }
            msg => panic!("unexpected message: {msg:?}"),
        }
    }

    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(msg) if msg == "2" => ws
                .send(Message::Text("3".to_string()))
                .await
                .unwrap(),
            Message::Binary(data) => {
                assert_eq!(data, vec![1, 2, 3]);
                break;
            }
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}

#[tokio::test]
async fn websocket_heartbeat() {
    create_server(4103);
    let mut ws = create_ws_connection(4103, None).await;
    ws.next().await.unwrap().unwrap();

    for _ in 0..3 {
        let msg = ws.next().await.unwrap().unwrap();
        assert_eq!(msg, Message::Text("2".to_string()));
        ws.send(Message::Text("3".to_string())).await.unwrap();
    }
}

#[tokio::test]
async fn invalid_packet_closes_the_connection() {
    create_server(4104);
    let mut ws = create_ws_connection(4104, None).await;
    ws.next().await.unwrap().unwrap();

    ws.send(Message::Text("abc".to_string())).await.unwrap();
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(msg))) if msg == "2" => continue,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(_)) => break,
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}

#[tokio::test]
async fn upgrade_from_polling() {
    create_server(4105);
    let sid = create_polling_connection(4105).await;

    let mut ws = create_ws_connection(4105, Some(&sid)).await;
    ws.send(Message::Text("2probe".to_string())).await.unwrap();
    let msg = ws.next().await.unwrap().unwrap();
    assert_eq!(msg, Message::Text("3probe".to_string()));
    ws.send(Message::Text("5".to_string())).await.unwrap();

    // the session now refuses polling
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (status, _) = send_req(
        4105,
        format!("EIO=4&transport=polling&sid={sid}"),
        Method::GET,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // and the websocket carries the traffic
    ws.send(Message::Text("4upgraded".to_string())).await.unwrap();
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(msg) if msg == "2" => ws
                .send(Message::Text("3".to_string()))
                .await
                .unwrap(),
            Message::Text(msg) if msg == "6" => continue,
            Message::Text(msg) => {
                assert_eq!(msg, "4upgraded");
                break;
            }
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}

#[tokio::test]
async fn second_websocket_for_the_same_sid_is_refused() {
    create_server(4106);
    let sid = create_polling_connection(4106).await;

    let mut ws = create_ws_connection(4106, Some(&sid)).await;
    ws.send(Message::Text("2probe".to_string())).await.unwrap();
    ws.next().await.unwrap().unwrap();
    ws.send(Message::Text("5".to_string())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut second = create_ws_connection(4106, Some(&sid)).await;
    loop {
        match second.next().await {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}

#[tokio::test]
async fn upgrade_with_unknown_sid_is_refused() {
    create_server(4107);
    let mut ws = create_ws_connection(4107, Some("0123456789abcdefghijkl")).await;
    loop {
        match ws.next().await {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}
