use super::*;
use std::sync::Arc;

use crate::model::{BlacklistStatus, NewBlacklistEntry};
use crate::state::test_helpers::{seed_session, test_app_state};
use crate::store::Store;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn entry(subject: &str) -> BlacklistEntry {
    BlacklistEntry {
        id: Uuid::new_v4(),
        reported_by: Uuid::new_v4(),
        subject_name: subject.into(),
        platform: "Shopee".into(),
        reason: "fake refund claim".into(),
        description: None,
        status: BlacklistStatus::Verified,
        trust_score: 0,
        show_on_landing_page: true,
        created_at: time::OffsetDateTime::now_utc(),
    }
}

fn snapshot(generation: u64, items: Vec<BlacklistEntry>) -> Snapshot<BlacklistEntry> {
    Snapshot { generation, items: Arc::new(items) }
}

// =============================================================================
// process_inbound_text
// =============================================================================

#[test]
fn ping_is_answered_with_done() {
    let req = Frame::request("live:ping", Data::new());
    let text = serde_json::to_string(&req).unwrap_or_default();

    let replies = process_inbound_text(LiveView::Landing, &snapshot(1, vec![]), &text);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].kind, Kind::Done);
    assert_eq!(replies[0].reply_to, Some(req.id));
}

#[test]
fn refresh_returns_current_snapshot() {
    let req = Frame::request("live:refresh", Data::new());
    let text = serde_json::to_string(&req).unwrap_or_default();

    let replies = process_inbound_text(LiveView::Verified, &snapshot(4, vec![entry("Budi")]), &text);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].kind, Kind::Item);
    assert_eq!(replies[0].data["view"], "verified");
    assert_eq!(replies[0].data["generation"], 4);
    assert_eq!(replies[0].data["items"][0]["subject_name"], "Budi");
    assert_eq!(replies[1].kind, Kind::Done);
}

#[test]
fn unknown_op_is_an_error() {
    let req = Frame::request("live:subscribe", Data::new());
    let text = serde_json::to_string(&req).unwrap_or_default();

    let replies = process_inbound_text(LiveView::Landing, &snapshot(1, vec![]), &text);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].kind, Kind::Error);
    assert_eq!(replies[0].data["code"], "E_UNKNOWN_OP");
}

#[test]
fn malformed_text_is_an_error() {
    let replies = process_inbound_text(LiveView::Landing, &snapshot(1, vec![]), "not json");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].kind, Kind::Error);
    assert_eq!(replies[0].data["code"], "E_MALFORMED_FRAME");
}

#[test]
fn non_request_frames_are_ignored() {
    let push = Frame::push("live:ping", Data::new());
    let text = serde_json::to_string(&push).unwrap_or_default();
    assert!(process_inbound_text(LiveView::Landing, &snapshot(1, vec![]), &text).is_empty());
}

#[test]
fn snapshot_push_is_unsolicited() {
    let frame = snapshot_push(LiveView::Moderation, &snapshot(2, vec![entry("Budi")]));
    assert_eq!(frame.op, SNAPSHOT_OP);
    assert_eq!(frame.kind, Kind::Push);
    assert!(frame.reply_to.is_none());
    assert_eq!(frame.data["view"], "moderation");
    assert_eq!(frame.data["items"].as_array().map(Vec::len), Some(1));
}

#[test]
fn view_names_parse() {
    assert_eq!(LiveView::parse("moderation"), Some(LiveView::Moderation));
    assert_eq!(LiveView::parse("verified"), Some(LiveView::Verified));
    assert_eq!(LiveView::parse("landing"), Some(LiveView::Landing));
    assert_eq!(LiveView::parse("orders"), None);
}

// =============================================================================
// SOCKET
// =============================================================================

async fn serve(state: AppState) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, crate::routes::app(state)).await;
    });
    addr
}

async fn next_frame(client: &mut Client) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("frame receive timed out")
            .expect("socket should stay open")
            .expect("socket read should succeed");
        if let WsMessage::Text(_) = msg {
            let text = msg.to_text().expect("text frame should be utf-8");
            return serde_json::from_str(text).expect("server frames should parse");
        }
    }
}

/// Read pushes until one carries `count` items.
async fn snapshot_with(client: &mut Client, count: usize) -> Frame {
    loop {
        let frame = next_frame(client).await;
        if frame.op == SNAPSHOT_OP && frame.data["items"].as_array().map(Vec::len) == Some(count) {
            return frame;
        }
    }
}

#[tokio::test]
async fn landing_socket_receives_snapshot_then_promotion() {
    let (state, store) = test_app_state();
    let addr = serve(state).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/api/live?view=landing"))
        .await
        .expect("landing view should be public");
    let first = next_frame(&mut client).await;
    assert_eq!(first.op, SNAPSHOT_OP);
    assert_eq!(first.data["view"], "landing");

    let created = store
        .insert_blacklist(NewBlacklistEntry {
            reported_by: Uuid::new_v4(),
            subject_name: "Budi".into(),
            platform: "Shopee".into(),
            reason: "fake refund claim".into(),
            status: BlacklistStatus::Verified,
            description: None,
        })
        .await
        .expect("blacklist insert should succeed");
    store
        .set_blacklist_landing(created.id, true)
        .await
        .expect("landing toggle should succeed");

    let promoted = snapshot_with(&mut client, 1).await;
    assert_eq!(promoted.data["items"][0]["subject_name"], "Budi");
}

#[tokio::test]
async fn socket_answers_ping() {
    let (state, _) = test_app_state();
    let addr = serve(state).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/api/live?view=landing"))
        .await
        .expect("landing view should be public");
    next_frame(&mut client).await;

    let req = Frame::request("live:ping", Data::new());
    let text = serde_json::to_string(&req).expect("frame should serialize");
    client.send(WsMessage::Text(text.into())).await.expect("send should succeed");

    loop {
        let frame = next_frame(&mut client).await;
        if frame.reply_to == Some(req.id) {
            assert_eq!(frame.kind, Kind::Done);
            break;
        }
    }
}

#[tokio::test]
async fn vanished_client_releases_its_subscription() {
    let (state, _) = test_app_state();
    let addr = serve(state.clone()).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/api/live?view=landing"))
        .await
        .expect("landing view should be public");
    next_frame(&mut client).await;
    assert_eq!(state.live.landing.subscriber_count(), 1);

    // Queue a burst of replies, then vanish without a close frame.
    for _ in 0..32 {
        let text = serde_json::to_string(&Frame::request("live:refresh", Data::new())).expect("frame should serialize");
        client.send(WsMessage::Text(text.into())).await.expect("send should succeed");
    }
    drop(client);

    timeout(Duration::from_secs(2), async {
        while state.live.landing.subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connection should end once the client is gone");
}

#[tokio::test]
async fn moderation_socket_requires_admin() {
    let (state, _) = test_app_state();
    let (_, seller) = seed_session(&state, "toko@example.com", Role::Seller).await;
    let addr = serve(state).await;

    let anonymous = connect_async(format!("ws://{addr}/api/live?view=moderation")).await;
    match anonymous {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }

    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    let mut request = format!("ws://{addr}/api/live?view=moderation")
        .into_client_request()
        .expect("request should build");
    request.headers_mut().insert(
        "cookie",
        format!("session_token={seller}").parse().expect("header value should parse"),
    );
    match connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 403),
        other => panic!("expected 403, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn unknown_view_is_rejected() {
    let (state, _) = test_app_state();
    let addr = serve(state).await;

    match connect_async(format!("ws://{addr}/api/live?view=orders")).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 400),
        other => panic!("expected 400, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn access_levels() {
    assert_eq!(LiveView::Landing.access(), None);
    assert_eq!(LiveView::Verified.access(), Some(None));
    assert!(matches!(LiveView::Moderation.access(), Some(Some(roles)) if roles == guard::ADMIN));
}

