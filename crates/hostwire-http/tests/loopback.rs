//! End-to-end exchanges through the loopback transport.
//!
//! Each test drives a client request into an in-process handler and checks
//! what the client observes: response head, streamed body, trailers, and the
//! error codes produced by protocol violations and expired timeouts.

use std::sync::Once;
use std::time::Duration;

use bytes::Bytes;
use hostwire_http::{
    BodyError, ErrorCode, Fields, HostConfig, IncomingRequest, LoopbackTransport, Method,
    OutgoingRequest, OutgoingResponse, RequestOptions, ResponseBuilder, ResponseOutparam,
    Transport, send,
};
use hostwire_io::{StreamError, poll_list};

static TRACING_INIT: Once = Once::new();

/// Controlled by `RUST_LOG` (e.g. `RUST_LOG=hostwire_http=debug`).
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn get(path: &str) -> OutgoingRequest {
    OutgoingRequest::new(
        Method::Get,
        Some(path),
        Some("http".parse().unwrap()),
        Some("localhost"),
        Fields::new(),
    )
}

// ── Handlers ────────────────────────────────────────────────────────

async fn hello(_request: IncomingRequest, mut outparam: ResponseOutparam) {
    let headers = Fields::from_list([("HELLO", "WORLD")]).unwrap();
    let mut response = OutgoingResponse::new(200, headers);
    let mut body = response.write().unwrap();
    outparam.set(Ok(response)).unwrap();

    let mut stream = body.write().unwrap();
    stream
        .blocking_write_and_flush(Bytes::from_static(b"Hello!"))
        .await
        .unwrap();
    drop(stream);
    body.finish(None);
}

/// Streams the request body back, trailers included.
async fn echo(mut request: IncomingRequest, mut outparam: ResponseOutparam) {
    let mut incoming = request.consume().unwrap();
    let (response, mut body) = ResponseBuilder::new().streaming().unwrap();
    outparam.set(Ok(response)).unwrap();

    let mut src = incoming.stream().unwrap();
    let mut dst = body.write().unwrap();
    dst.forward(&mut src).await.unwrap();
    drop(src);
    drop(dst);

    let trailers = incoming.finish().wait().await.unwrap().unwrap();
    body.finish(Some(trailers));
}

async fn abandons_body(_request: IncomingRequest, mut outparam: ResponseOutparam) {
    let (response, mut body) = ResponseBuilder::new().streaming().unwrap();
    outparam.set(Ok(response)).unwrap();

    let mut stream = body.write().unwrap();
    stream
        .blocking_write_and_flush(Bytes::from_static(b"partial"))
        .await
        .unwrap();
    drop(stream);
    drop(body);
}

async fn never_answers(_request: IncomingRequest, _outparam: ResponseOutparam) {}

async fn answers_twice(_request: IncomingRequest, mut outparam: ResponseOutparam) {
    outparam
        .set(Ok(OutgoingResponse::new(201, Fields::new())))
        .unwrap();
    assert!(outparam
        .set(Ok(OutgoingResponse::new(500, Fields::new())))
        .is_err());
}

async fn slow_head(_request: IncomingRequest, mut outparam: ResponseOutparam) {
    tokio::time::sleep(Duration::from_secs(10)).await;
    let _ = outparam.set(Ok(OutgoingResponse::new(200, Fields::new())));
}

async fn stalls_mid_body(_request: IncomingRequest, mut outparam: ResponseOutparam) {
    let (response, mut body) = ResponseBuilder::new().streaming().unwrap();
    outparam.set(Ok(response)).unwrap();

    let mut stream = body.write().unwrap();
    stream
        .blocking_write_and_flush(Bytes::from_static(b"partial"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    drop(stream);
    body.finish(None);
}

async fn holds_slot(_request: IncomingRequest, mut outparam: ResponseOutparam) {
    outparam
        .set(Ok(OutgoingResponse::new(200, Fields::new())))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3600)).await;
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn hello_world_round_trip() {
    init_tracing();
    let transport = LoopbackTransport::new(hello);

    let mut response = send(&transport, get("/"), None).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("hello"), vec![b"WORLD".as_slice()]);

    let mut body = response.consume().unwrap();
    assert_eq!(&body.read_to_end().await.unwrap()[..], b"Hello!");
    assert_eq!(body.finish().wait().await, Ok(Ok(Fields::new())));
}

#[tokio::test]
async fn request_body_and_trailers_are_echoed() {
    init_tracing();
    let transport = LoopbackTransport::new(echo);

    let payload: Vec<u8> = (0..200 * 1024).map(|i| (i % 251) as u8).collect();
    let mut request = OutgoingRequest::new(Method::Post, Some("/echo"), None, None, Fields::new());
    let mut request_body = request.write().unwrap();
    let future = transport.send(request, None).unwrap();

    // The payload exceeds both body buffers, so the upload runs alongside the
    // download.
    let upload = payload.clone();
    let uploader = tokio::spawn(async move {
        let mut stream = request_body.write().unwrap();
        stream.blocking_write_and_flush(upload).await.unwrap();
        drop(stream);
        let trailers = Fields::from_list([("X-Checksum", "abc123")]).unwrap();
        request_body.finish(Some(trailers));
    });

    let mut response = future.wait().await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    let mut body = response.consume().unwrap();
    let received = body.read_to_end().await.unwrap();
    assert_eq!(received.len(), payload.len());
    assert_eq!(&received[..], &payload[..]);

    let trailers = body.finish().wait().await.unwrap().unwrap();
    assert_eq!(trailers.get("x-checksum"), vec![b"abc123".as_slice()]);
    uploader.await.unwrap();
}

#[tokio::test]
async fn response_future_is_pollable() {
    init_tracing();
    let transport = LoopbackTransport::new(hello);

    let future = transport.send(get("/"), None).unwrap();
    let ready = future.subscribe();
    assert_eq!(poll_list(&[&ready]).await, vec![0]);
    drop(ready);

    let response = future.get().unwrap().unwrap().unwrap();
    assert_eq!(response.status(), 200);
}

// ── Protocol violations ─────────────────────────────────────────────

#[tokio::test]
async fn abandoned_body_fails_stream_and_trailers() {
    init_tracing();
    let transport = LoopbackTransport::new(abandons_body);

    let mut response = send(&transport, get("/"), None).await.unwrap();
    let mut body = response.consume().unwrap();

    let mut stream = body.stream().unwrap();
    let (bytes, _) = stream.blocking_read(64).await.unwrap();
    assert_eq!(&bytes[..], b"partial");
    assert!(matches!(
        stream.blocking_read(64).await,
        Err(StreamError::LastOperationFailed(_))
    ));
    assert_eq!(stream.read(64), Err(StreamError::Closed));
    drop(stream);

    assert!(matches!(
        body.finish().wait().await,
        Ok(Err(ErrorCode::ProtocolError(_)))
    ));
}

#[tokio::test]
async fn unanswered_request_becomes_500() {
    init_tracing();
    let transport = LoopbackTransport::new(never_answers);

    let mut response = send(&transport, get("/"), None).await.unwrap();
    assert_eq!(response.status(), 500);
    let mut body = response.consume().unwrap();
    assert!(body.read_to_end().await.unwrap().is_empty());
}

#[tokio::test]
async fn first_answer_wins() {
    init_tracing();
    let transport = LoopbackTransport::new(answers_twice);
    let response = send(&transport, get("/"), None).await.unwrap();
    assert_eq!(response.status(), 201);
}

#[tokio::test]
async fn malformed_path_is_invalid_url() {
    init_tracing();
    let transport = LoopbackTransport::new(hello);
    let err = send(&transport, get("no-leading-slash"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ErrorCode::InvalidUrl(_)), "got {err:?}");
}

// ── Timeouts ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn slow_head_hits_first_byte_timeout() {
    init_tracing();
    let transport = LoopbackTransport::new(slow_head);
    let options = RequestOptions::new().with_first_byte_timeout(Duration::from_secs(1));

    let err = send(&transport, get("/"), Some(options)).await.unwrap_err();
    assert!(matches!(err, ErrorCode::TimeoutError(_)), "got {err:?}");
}

#[tokio::test(start_paused = true)]
async fn config_defaults_apply_unless_overridden() {
    init_tracing();
    let config = HostConfig::from_toml_str(
        r#"
        [request]
        first_byte_timeout_ms = 500
        "#,
    )
    .unwrap();
    let transport = LoopbackTransport::with_config(slow_head, &config);

    let err = send(&transport, get("/"), None).await.unwrap_err();
    assert!(matches!(err, ErrorCode::TimeoutError(_)), "got {err:?}");

    let patient = RequestOptions::new().with_first_byte_timeout(Duration::from_secs(30));
    let response = send(&transport, get("/"), Some(patient)).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test(start_paused = true)]
async fn stalled_body_hits_between_bytes_timeout() {
    init_tracing();
    let transport = LoopbackTransport::new(stalls_mid_body);
    let options = RequestOptions::new().with_between_bytes_timeout(Duration::from_secs(1));

    let mut response = send(&transport, get("/"), Some(options)).await.unwrap();
    assert_eq!(response.status(), 200);

    let mut body = response.consume().unwrap();
    let err = body.read_to_end().await.unwrap_err();
    match err {
        BodyError::Stream(StreamError::LastOperationFailed(io)) => {
            assert!(io.to_string().contains("no data received"), "got {io}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn busy_handler_hits_connect_timeout() {
    init_tracing();
    let config = HostConfig::default().with_max_concurrent_requests(1);
    let transport = LoopbackTransport::with_config(holds_slot, &config);

    let first = send(&transport, get("/first"), None).await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(transport.available_slots(), 0);

    let options = RequestOptions::new().with_connect_timeout(Duration::from_millis(100));
    let err = send(&transport, get("/second"), Some(options))
        .await
        .unwrap_err();
    assert!(matches!(err, ErrorCode::TimeoutError(_)), "got {err:?}");
}

#[tokio::test]
async fn slot_is_released_when_handler_ends() {
    init_tracing();
    let config = HostConfig::default().with_max_concurrent_requests(1);
    let transport = LoopbackTransport::with_config(hello, &config);

    for _ in 0..3 {
        let mut response = send(&transport, get("/"), None).await.unwrap();
        let mut body = response.consume().unwrap();
        assert_eq!(&body.read_to_end().await.unwrap()[..], b"Hello!");
    }

    while transport.available_slots() == 0 {
        tokio::task::yield_now().await;
    }
    assert_eq!(transport.available_slots(), 1);
}

#[tokio::test]
async fn zero_concurrency_limit_still_serves() {
    init_tracing();
    let config = HostConfig::default().with_max_concurrent_requests(0);
    let transport = LoopbackTransport::with_config(hello, &config);

    let response = tokio::time::timeout(Duration::from_secs(5), send(&transport, get("/"), None))
        .await
        .expect("request must not wait for a slot forever")
        .unwrap();
    assert_eq!(response.status(), 200);
}
