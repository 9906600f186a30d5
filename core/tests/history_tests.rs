/// History loader tests against a stub HTTP server
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use unimarket_messaging::{ChatError, Config, HistoryLoader, MessageStore, Session};

/// What the stub saw for one request
#[derive(Debug)]
struct SeenRequest {
    method: String,
    path: String,
    auth: String,
    body: String,
}

/// Stub API server answering every request with the given status and body
async fn spawn_api_stub(
    status: StatusCode,
    body: String,
    delay: Duration,
) -> (SocketAddr, mpsc::Receiver<SeenRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::channel(8);

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let io = TokioIo::new(stream);
            let body = body.clone();
            let seen_tx = seen_tx.clone();
            let svc = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                let body = body.clone();
                let seen_tx = seen_tx.clone();
                async move {
                    let method = req.method().to_string();
                    let path = req.uri().path().to_string();
                    let auth = req
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let req_body = req.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
                    let _ = seen_tx
                        .send(SeenRequest {
                            method,
                            path,
                            auth,
                            body: String::from_utf8_lossy(&req_body).to_string(),
                        })
                        .await;

                    tokio::time::sleep(delay).await;
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(status)
                            .header("Content-Type", "application/json")
                            .body(Full::new(Bytes::from(body)))
                            .unwrap(),
                    )
                }
            });
            tokio::spawn(async move {
                let _ = http1::Builder::new().serve_connection(io, svc).await;
            });
        }
    });

    (addr, seen_rx)
}

fn loader_for(addr: SocketAddr) -> HistoryLoader {
    let mut config = Config::default();
    config.api_base = format!("http://{}", addr);
    HistoryLoader::new(&config)
}

async fn logged_in_session() -> Session {
    let session = Session::new();
    session.login("sekrit", 42, "alice").await;
    session
}

fn history_body() -> String {
    serde_json::json!([
        {
            "id": 1,
            "sender": 7,
            "receiver": 42,
            "text": "is the desk still for sale?",
            "timestamp": "2024-03-01T09:00:00Z",
            "sender_name": "bob",
            "receiver_name": "alice",
            "sender_profile_picture": null,
            "receiver_profile_picture": null
        },
        {
            "id": 2,
            "sender": 42,
            "receiver": 7,
            "text": "yes, come by tomorrow",
            "timestamp": "2024-03-01T09:05:00Z",
            "sender_name": "alice",
            "receiver_name": "bob",
            "sender_profile_picture": null,
            "receiver_profile_picture": null
        }
    ])
    .to_string()
}

#[tokio::test]
async fn test_history_populates_the_store() {
    let (addr, mut seen) =
        spawn_api_stub(StatusCode::OK, history_body(), Duration::ZERO).await;
    let loader = loader_for(addr);
    let session = logged_in_session().await;
    let store = MessageStore::new();

    let added = loader.load(&session, &store).await.unwrap();
    assert_eq!(added, 2);
    assert_eq!(store.len().await, 2);

    let request = seen.recv().await.unwrap();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/api/messages/");
    assert_eq!(request.auth, "Token sekrit");
}

#[tokio::test]
async fn test_auth_failure_is_history_unavailable() {
    let (addr, _seen) = spawn_api_stub(
        StatusCode::UNAUTHORIZED,
        r#"{"detail": "Invalid token."}"#.to_string(),
        Duration::ZERO,
    )
    .await;
    let loader = loader_for(addr);
    let session = logged_in_session().await;
    let store = MessageStore::new();

    let result = loader.load(&session, &store).await;
    assert!(matches!(result, Err(ChatError::HistoryUnavailable(_))));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_malformed_body_is_history_unavailable() {
    let (addr, _seen) = spawn_api_stub(
        StatusCode::OK,
        "surprise, not json".to_string(),
        Duration::ZERO,
    )
    .await;
    let loader = loader_for(addr);
    let session = logged_in_session().await;
    let store = MessageStore::new();

    let result = loader.load(&session, &store).await;
    assert!(matches!(result, Err(ChatError::HistoryUnavailable(_))));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_unreachable_server_is_history_unavailable() {
    // Nothing listens here
    let loader = loader_for("127.0.0.1:9".parse().unwrap());
    let session = logged_in_session().await;
    let store = MessageStore::new();

    let result = loader.load(&session, &store).await;
    assert!(matches!(result, Err(ChatError::HistoryUnavailable(_))));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_load_requires_a_credential() {
    let loader = loader_for("127.0.0.1:9".parse().unwrap());
    let store = MessageStore::new();

    let result = loader.load(&Session::new(), &store).await;
    assert!(matches!(result, Err(ChatError::AuthRequired)));
}

#[tokio::test]
async fn test_logout_during_flight_discards_the_response() {
    let (addr, _seen) =
        spawn_api_stub(StatusCode::OK, history_body(), Duration::from_millis(300)).await;
    let loader = loader_for(addr);
    let session = logged_in_session().await;
    let store = MessageStore::new();

    let in_flight = {
        let loader = loader.clone();
        let session = session.clone();
        let store = store.clone();
        tokio::spawn(async move { loader.load(&session, &store).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    session.logout().await;

    let result = in_flight.await.unwrap();
    assert!(matches!(result, Err(ChatError::SessionChanged)));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_post_message_side_channel() {
    let created = serde_json::json!({
        "id": 99,
        "sender": 42,
        "receiver": 7,
        "text": "hi, I saw your ad",
        "timestamp": "2024-03-02T10:00:00Z",
        "sender_name": "alice",
        "receiver_name": "bob",
        "sender_profile_picture": null,
        "receiver_profile_picture": null
    })
    .to_string();
    let (addr, mut seen) = spawn_api_stub(StatusCode::CREATED, created, Duration::ZERO).await;
    let loader = loader_for(addr);
    let session = logged_in_session().await;

    let message = loader
        .post_message(&session, 7, "hi, I saw your ad")
        .await
        .unwrap();
    assert_eq!(message.id, 99);
    assert_eq!(message.receiver, 7);

    let request = seen.recv().await.unwrap();
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/messages/send/");
    assert_eq!(request.auth, "Token sekrit");
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["receiver"], 7);
    assert_eq!(body["text"], "hi, I saw your ad");
}
