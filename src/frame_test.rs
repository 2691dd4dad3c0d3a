use super::*;

#[test]
fn push_is_unsolicited() {
    let frame = Frame::push("live:snapshot", Data::new());
    assert_eq!(frame.kind, Kind::Push);
    assert!(frame.reply_to.is_none());
    assert!(frame.sent_at > 0);
}

#[test]
fn replies_point_at_the_request() {
    let req = Frame::request("live:refresh", Data::new());
    let item = req.item(Data::new());
    let done = req.done();

    assert_eq!(item.kind, Kind::Item);
    assert_eq!(item.reply_to, Some(req.id));
    assert_eq!(done.kind, Kind::Done);
    assert_eq!(done.reply_to, Some(req.id));
    assert_eq!(done.op, "live:refresh");
    assert_ne!(item.id, done.id);
}

#[test]
fn error_from_store_error() {
    let req = Frame::request("live:refresh", Data::new());
    let err = req.error_from(&crate::store::StoreError::Unavailable("down".into()));

    assert_eq!(err.kind, Kind::Error);
    assert_eq!(err.data["code"], "E_UNAVAILABLE");
    assert_eq!(err.data["message"], "store unavailable: down");
    assert_eq!(err.data["retryable"], true);
}

#[test]
fn client_request_parses_with_minimal_fields() {
    let id = Uuid::new_v4();
    let raw = format!(r#"{{"id":"{id}","op":"live:ping","kind":"request"}}"#);
    let frame: Frame = serde_json::from_str(&raw).expect("frame should parse");
    assert_eq!(frame.id, id);
    assert_eq!(frame.kind, Kind::Request);
    assert!(frame.reply_to.is_none());
    assert!(frame.data.is_empty());
}

#[test]
fn kind_serializes_lowercase() {
    let json = serde_json::to_value(Frame::push("live:snapshot", Data::new())).expect("frame should serialize");
    assert_eq!(json["kind"], "push");
    assert_eq!(json["op"], "live:snapshot");
}
