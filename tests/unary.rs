//! Unary bridging over real HTTP.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use common::{start_bridge, test_config, MAX_RECV_SIZE};
use rpc_bridge::transport::{CallRequest, TransportError};
use serde_json::Value;

async fn echo_bridge() -> common::TestBridge {
    let bridge = start_bridge(test_config()).await;
    bridge
        .transport
        .handle("greeter", "Say.Hello", |req: CallRequest| async move { Ok(req.payload) });
    bridge
}

#[tokio::test]
async fn binary_payload_round_trips() {
    let bridge = echo_bridge().await;
    let payload = vec![0x08, 0x96, 0x01, 0x00, 0xff];

    let response = reqwest::Client::new()
        .post(bridge.url("/greeter/Say.Hello"))
        .header("content-type", "application/protobuf")
        .body(payload.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/protobuf");
    assert_eq!(response.headers()["content-length"], payload.len().to_string().as_str());
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.bytes().await.unwrap().to_vec(), payload);
}

#[tokio::test]
async fn get_query_becomes_json_payload() {
    let bridge = start_bridge(test_config()).await;
    bridge.transport.handle("greeter", "Say.Hello", |req: CallRequest| async move {
        assert_eq!(req.content_type, "application/json");
        Ok(req.payload)
    });

    let response = reqwest::get(bridge.url("/greeter/Say.Hello?a=1&b=2")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"a": "1", "b": "2"}));
}

#[tokio::test]
async fn oversized_body_is_rejected_before_the_call() {
    let bridge = start_bridge(test_config()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    bridge.transport.handle("greeter", "Say.Hello", move |req: CallRequest| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(req.payload) }
    });

    let response = reqwest::Client::new()
        .post(bridge.url("/greeter/Say.Hello"))
        .header("content-type", "application/json")
        .body(vec![b'x'; MAX_RECV_SIZE + 1])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 413);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn only_get_and_post_are_routed() {
    let bridge = echo_bridge().await;

    let response = reqwest::Client::new()
        .put(bridge.url("/greeter/Say.Hello"))
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], "rpc.bridge");
    assert_eq!(body["code"], 405);
}

#[tokio::test]
async fn unknown_service_fails_routing() {
    let bridge = echo_bridge().await;

    let response = reqwest::get(bridge.url("/missing/Call")).await.unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], "rpc.bridge");
    assert!(body["detail"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn grpc_requests_get_status_headers() {
    let bridge = echo_bridge().await;
    bridge.transport.handle("greeter", "Say.Fail", |_req: CallRequest| async move {
        Err::<Bytes, _>(TransportError::Io("boom".into()))
    });
    let client = reqwest::Client::new();

    let ok = client
        .post(bridge.url("/greeter/Say.Hello"))
        .header("content-type", "application/grpc")
        .body(vec![1u8, 2, 3])
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.headers()["grpc-status"], "0");

    let failed = client
        .post(bridge.url("/greeter/Say.Fail"))
        .header("content-type", "application/grpc")
        .body(vec![1u8])
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), 500);
    assert_eq!(failed.headers()["grpc-status"], "13");
    assert_eq!(failed.headers()["grpc-message"], "error during request: boom");
}

#[tokio::test]
async fn backend_status_codes_pass_through() {
    let bridge = start_bridge(test_config()).await;
    bridge.transport.handle("greeter", "Say.Hello", |_req: CallRequest| async move {
        Err::<Bytes, _>(TransportError::Status {
            code: 404,
            id: "greeter".into(),
            detail: "no such greeting".into(),
        })
    });

    let response = reqwest::Client::new()
        .post(bridge.url("/greeter/Say.Hello"))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], "greeter");
    assert_eq!(body["detail"], "no such greeting");
}

#[tokio::test]
async fn service_without_instances_is_unavailable() {
    let bridge = echo_bridge().await;

    let response = reqwest::Client::new()
        .post(bridge.url("/offline/Say.Hello"))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn json_rpc_envelope_is_unwrapped() {
    let bridge = echo_bridge().await;

    let response = reqwest::Client::new()
        .post(bridge.url("/greeter/Say.Hello"))
        .header("content-type", "application/json-rpc")
        .body(r#"{"method":"Say.Hello","params":[{"name":"john"}],"id":1}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"name":"john"}"#);

    let response = reqwest::Client::new()
        .post(bridge.url("/greeter/Say.Hello"))
        .header("content-type", "application/json-rpc")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}
