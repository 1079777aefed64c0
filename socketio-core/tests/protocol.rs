
use std::time::Duration;

use fixture::{connect_namespace, create_server, create_ws_connection, next_binary, next_text};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn connect_to_the_root_namespace() {
    create_server(4201);
    let mut ws = create_ws_connection(4201).await;
    let nsid = connect_namespace(&mut ws).await;
    assert!(!nsid.is_empty());
}

#[tokio::test]
async fn unknown_namespace_is_refused() {
    create_server(4202);
    let mut ws = create_ws_connection(4202).await;
    ws.send(Message::Text("40/random".to_string()))
        .await
        .unwrap();
    assert_eq!(
        next_text(&mut ws).await,
        "44/random,{\"message\":\"Invalid namespace\"}"
    );
}

#[tokio::test]
async fn event_with_ack() {
    create_server(4203);
    let mut ws = create_ws_connection(4203).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text(
        "42456[\"message-with-ack\",1,\"2\",{\"3\":[false]}]".to_string(),
    ))
    .await
    .unwrap();
    assert_eq!(next_text(&mut ws).await, "43456[1,\"2\",{\"3\":[false]}]");
}

#[tokio::test]
async fn event_echo() {
    create_server(4204);
    let mut ws = create_ws_connection(4204).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text("42[\"message\",\"hello\"]".to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await, "42[\"message-back\",\"hello\"]");
}

#[tokio::test]
async fn binary_event_roundtrip() {
    create_server(4205);
    let mut ws = create_ws_connection(4205).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text(
        "452-[\"message\",{\"_placeholder\":true,\"num\":0},{\"_placeholder\":true,\"num\":1}]"
            .to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    ws.send(Message::Binary(vec![4, 5, 6])).await.unwrap();

    assert_eq!(
        next_text(&mut ws).await,
        "452-[\"message-back\",{\"_placeholder\":true,\"num\":0},{\"_placeholder\":true,\"num\":1}]"
    );
    assert_eq!(next_binary(&mut ws).await, vec![1, 2, 3]);
    assert_eq!(next_binary(&mut ws).await, vec![4, 5, 6]);
}

#[tokio::test]
async fn binary_ack_roundtrip() {
    create_server(4206);
    let mut ws = create_ws_connection(4206).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text(
        "451-99[\"message-with-ack\",{\"_placeholder\":true,\"num\":0}]".to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::Binary(vec![7, 8])).await.unwrap();

    assert_eq!(
        next_text(&mut ws).await,
        "461-99[{\"_placeholder\":true,\"num\":0}]"
    );
    assert_eq!(next_binary(&mut ws).await, vec![7, 8]);
}

#[tokio::test]
async fn invalid_packet_closes_the_session() {
    create_server(4207);
    let mut ws = create_ws_connection(4207).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text("4abc".to_string())).await.unwrap();
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(msg))) if msg == "2" => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}

#[tokio::test]
async fn duplicate_connect_closes_the_session() {
    create_server(4208);
    let mut ws = create_ws_connection(4208).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text("40".to_string())).await.unwrap();
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(msg))) if msg == "2" => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}

#[tokio::test]
async fn connect_racing_a_pending_handshake_closes_the_session() {
    create_server(4215);
    let mut ws = create_ws_connection(4215).await;

    // the /slow hook is still awaiting when the second CONNECT lands
    ws.send(Message::Text("40/slow".to_string())).await.unwrap();
    ws.send(Message::Text("40/slow".to_string())).await.unwrap();
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(msg))) if msg == "2" => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            msg => panic!("unexpected message: {msg:?}"),
        }
    }
}

#[tokio::test]
async fn client_disconnect_then_reconnect() {
    create_server(4209);
    let mut ws = create_ws_connection(4209).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text("41".to_string())).await.unwrap();
    // events after DISCONNECT are dropped without killing the session
    ws.send(Message::Text("42[\"message\",\"ignored\"]".to_string()))
        .await
        .unwrap();

    // and the namespace accepts a fresh CONNECT on the same session
    tokio::time::sleep(Duration::from_millis(50)).await;
    connect_namespace(&mut ws).await;
    ws.send(Message::Text("42[\"message\",\"back\"]".to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await, "42[\"message-back\",\"back\"]");
}

#[tokio::test]
async fn connect_auth_is_enforced() {
    create_server(4210);
    let mut ws = create_ws_connection(4210).await;

    ws.send(Message::Text(
        "40/auth,{\"token\":\"wrong\"}".to_string(),
    ))
    .await
    .unwrap();
    assert_eq!(
        next_text(&mut ws).await,
        "44/auth,{\"message\":\"Forbidden\"}"
    );

    ws.send(Message::Text(
        "40/auth,{\"token\":\"let-me-in\"}".to_string(),
    ))
    .await
    .unwrap();
    let reply = next_text(&mut ws).await;
    assert!(reply.starts_with("40/auth,{"), "unexpected reply: {reply}");
}

#[tokio::test]
async fn room_broadcast_skips_the_sender() {
    create_server(4211);
    let mut sender = create_ws_connection(4211).await;
    connect_namespace(&mut sender).await;
    let mut receiver = create_ws_connection(4211).await;
    connect_namespace(&mut receiver).await;

    sender
        .send(Message::Text("42[\"join\",\"room1\"]".to_string()))
        .await
        .unwrap();
    receiver
        .send(Message::Text("42[\"join\",\"room1\"]".to_string()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    sender
        .send(Message::Text("42[\"broadcast-room\",\"hi\"]".to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut receiver).await, "42[\"room-msg\",\"hi\"]");

    // the sender only sees heartbeats
    let silent = tokio::time::timeout(Duration::from_millis(400), async {
        loop {
            match sender.next().await.unwrap().unwrap() {
                Message::Text(msg) if msg == "2" => {
                    sender.send(Message::Text("3".to_string())).await.unwrap()
                }
                msg => panic!("sender should not receive the broadcast: {msg:?}"),
            }
        }
    })
    .await;
    assert!(silent.is_err());
}

#[tokio::test]
async fn server_initiated_ack() {
    create_server(4212);
    let mut ws = create_ws_connection(4212).await;
    connect_namespace(&mut ws).await;

    ws.send(Message::Text("42[\"trigger-ack\"]".to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await, "421[\"server-ask\",\"question\"]");
    ws.send(Message::Text("431[\"answer\"]".to_string()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut ws).await, "42[\"ack-result\",\"answer\"]");
}

#[tokio::test]
async fn namespace_level_broadcast() {
    let io = create_server(4213);
    let mut a = create_ws_connection(4213).await;
    connect_namespace(&mut a).await;
    let mut b = create_ws_connection(4213).await;
    connect_namespace(&mut b).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    io.of("/")
        .unwrap()
        .emit("announcement", "hello everyone")
        .unwrap();

    assert_eq!(
        next_text(&mut a).await,
        "42[\"announcement\",\"hello everyone\"]"
    );
    assert_eq!(
        next_text(&mut b).await,
        "42[\"announcement\",\"hello everyone\"]"
    );
}

#[tokio::test]
async fn socketio_over_polling() {
    create_server(4214);
    let client = hyper::Client::new();

    let res = client
        .get(
            format!("http://127.0.0.1:4214/socket.io/?EIO=4&transport=polling")
                .parse()
                .unwrap(),
        )
        .await
        .unwrap();
    let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    let open: serde_json::Value = serde_json::from_str(&body[1..]).unwrap();
    let sid = open["sid"].as_str().unwrap();

    // CONNECT over a POST, reply over the next poll
    let req = http::Request::builder()
        .method(http::Method::POST)
        .uri(format!(
            "http://127.0.0.1:4214/socket.io/?EIO=4&transport=polling&sid={sid}"
        ))
        .body(hyper::Body::from("40"))
        .unwrap();
    let res = client.request(req).await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);

    let res = client
        .get(
            format!("http://127.0.0.1:4214/socket.io/?EIO=4&transport=polling&sid={sid}")
                .parse()
                .unwrap(),
        )
        .await
        .unwrap();
    let body = hyper::body::to_bytes(res.into_body()).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.starts_with("40{"), "unexpected poll body: {body}");
}
