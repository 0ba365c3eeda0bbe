use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use chrono::{Duration, Utc};
use reqwest::{Method, StatusCode};
use shared::protocol::{STATUS_MOTION, STATUS_NO_MOTION};
use smartcamd::api::{descriptor, routes};
use smartcamd::config::NotifyConfig;
use smartcamd::notify::NotificationDispatcher;
use smartcamd::subscriber_manager::SubscriberHandle;
use smartcamd::subscribers::SubscriberStore;

const PSK: &str = "s3cret";

struct TestServer {
    addr: SocketAddr,
    subscribers: SubscriberHandle,
    dispatcher: NotificationDispatcher,
    store_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("subscribers.sub");
        let subscribers = SubscriberHandle::spawn(SubscriberStore::open(&store_path).unwrap());
        let dispatcher =
            NotificationDispatcher::new(subscribers.clone(), &NotifyConfig::default(), STATUS_NO_MOTION)
                .unwrap();

        let state = routes::AppState {
            subscribers: subscribers.clone(),
            status_rx: dispatcher.status(),
            psk: Arc::new(PSK.to_string()),
            descriptor: Arc::new(descriptor::render("abc-123", "SmartCamera", "http://127.0.0.1/")),
        };
        let app = routes::router(state, "/smartcam.xml");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            subscribers,
            dispatcher,
            store_path,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn subscribe_method() -> Method {
    Method::from_bytes(b"SUBSCRIBE").unwrap()
}

#[tokio::test]
async fn test_descriptor_served_as_xml() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/smartcam.xml")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/xml");

    let body = resp.text().await.unwrap();
    assert!(body.contains("<UDN>uuid:abc-123</UDN>"));
    assert!(body.contains("<presentationURL>http://127.0.0.1/</presentationURL>"));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let server = TestServer::start().await;

    let resp = reqwest::get(server.url("/index.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_query_with_valid_psk() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/"))
        .header("X-Auth-PSK", PSK)
        .body(r#"{"method": "getStatus"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), STATUS_NO_MOTION);

    server.dispatcher.update_status(STATUS_MOTION).await;

    let resp = client
        .post(server.url("/"))
        .header("X-Auth-PSK", PSK)
        .body(r#"{"method": "getStatus"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), STATUS_MOTION);
}

#[tokio::test]
async fn test_status_query_rejections() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let wrong_psk = client
        .post(server.url("/"))
        .header("X-Auth-PSK", "nope")
        .body(r#"{"method": "getStatus"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_psk.status(), StatusCode::UNAUTHORIZED);

    let missing_psk = client
        .post(server.url("/"))
        .body(r#"{"method": "getStatus"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(missing_psk.status(), StatusCode::UNAUTHORIZED);

    let other_method = client
        .post(server.url("/"))
        .header("X-Auth-PSK", PSK)
        .body(r#"{"method": "reboot"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(other_method.status(), StatusCode::BAD_REQUEST);

    let not_json = client
        .post(server.url("/"))
        .header("X-Auth-PSK", PSK)
        .body("getStatus")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_subscribe_registers_and_persists() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let before = Utc::now();

    let resp = client
        .request(subscribe_method(), server.url("/"))
        .header("X-Auth-PSK", PSK)
        .header("CALLBACK", "<http://10.0.0.5:8080/cb>")
        .header("TIMEOUT", "Second-120")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["timeout"], "Second-120");

    let all = server.subscribers.live(Utc::now()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].callback_url, "http://10.0.0.5:8080/cb");
    assert!(all[0].expires_at >= before + Duration::seconds(120));
    assert!(all[0].expires_at <= Utc::now() + Duration::seconds(120));

    // Persisted before the request completed
    let reloaded = SubscriberStore::open(&server.store_path).unwrap();
    assert_eq!(reloaded.all(), all.as_slice());
}

#[tokio::test]
async fn test_resubscribe_does_not_duplicate() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    for timeout in ["Second-60", "Second-600"] {
        let resp = client
            .request(subscribe_method(), server.url("/smartcam.xml"))
            .header("X-Auth-PSK", PSK)
            .header("CALLBACK", "<http://10.0.0.5:8080/cb>")
            .header("TIMEOUT", timeout)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let all = server.subscribers.live(Utc::now()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].expires_at > Utc::now() + Duration::seconds(500));

    let bytes = std::fs::read(&server.store_path).unwrap();
    assert_eq!(&bytes[8..12], &1u32.to_be_bytes());
}

#[tokio::test]
async fn test_subscribe_rejections() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let wrong_psk = client
        .request(subscribe_method(), server.url("/"))
        .header("X-Auth-PSK", "nope")
        .header("CALLBACK", "<http://10.0.0.5:8080/cb>")
        .header("TIMEOUT", "Second-120")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_psk.status(), StatusCode::UNAUTHORIZED);

    let no_brackets = client
        .request(subscribe_method(), server.url("/"))
        .header("X-Auth-PSK", PSK)
        .header("CALLBACK", "http://10.0.0.5:8080/cb")
        .header("TIMEOUT", "Second-120")
        .send()
        .await
        .unwrap();
    assert_eq!(no_brackets.status(), StatusCode::BAD_REQUEST);

    let bad_timeout = client
        .request(subscribe_method(), server.url("/"))
        .header("X-Auth-PSK", PSK)
        .header("CALLBACK", "<http://10.0.0.5:8080/cb>")
        .header("TIMEOUT", "infinite")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_timeout.status(), StatusCode::BAD_REQUEST);

    assert!(server.subscribers.live(Utc::now()).await.unwrap().is_empty());
    assert!(!server.store_path.exists());
}
