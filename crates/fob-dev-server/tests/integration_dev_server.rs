//! End-to-end behavior of the assembled server: HTTP routes and WebSocket
//! namespaces on one port.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use fob_dev_server::{Delegates, DevServer, DevServerConfig, ExternalEndpoints};
use fob_multi_compiler::{
    Asset, BuildEngine, BuildEvent, BuildEventSink, BuildFailure, BuildOutput, ConfigurationError,
    OutputDirEngine, Target, TargetConfig, TargetPipeline, WatchOptions,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sinks = Arc<Mutex<HashMap<Target, BuildEventSink>>>;

#[derive(Default)]
struct ScriptedEngine {
    sinks: Sinks,
}

struct ScriptedPipeline {
    target: Target,
    sinks: Sinks,
}

impl BuildEngine for ScriptedEngine {
    fn create_pipeline(
        &self,
        config: &TargetConfig,
    ) -> Result<Box<dyn TargetPipeline>, ConfigurationError> {
        Ok(Box::new(ScriptedPipeline {
            target: config.name.clone(),
            sinks: Arc::clone(&self.sinks),
        }))
    }
}

impl TargetPipeline for ScriptedPipeline {
    fn watch(&mut self, _options: &WatchOptions, sink: BuildEventSink) -> Result<(), BuildFailure> {
        self.sinks.lock().insert(self.target.clone(), sink);
        Ok(())
    }
}

fn config() -> DevServerConfig {
    DevServerConfig {
        port: 0,
        targets: vec![
            TargetConfig::new("android", "build/android"),
            TargetConfig::new("ios", "build/ios"),
        ],
        ..DevServerConfig::default()
    }
}

fn server_with(engine: Arc<dyn BuildEngine>, config: DevServerConfig) -> Arc<DevServer> {
    let delegates = Delegates::from_config(&config);
    Arc::new(DevServer::new(config, engine, delegates, ExternalEndpoints::default()).unwrap())
}

fn scripted_server() -> Arc<DevServer> {
    server_with(Arc::new(ScriptedEngine::default()), config())
}

struct Running {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl Running {
    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

async fn serve(server: &Arc<DevServer>) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = Arc::clone(server);
    let task = tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = stopped.await;
            })
            .await
            .unwrap();
    });
    Running {
        addr,
        stop: Some(stop),
        task,
    }
}

async fn connect(addr: SocketAddr, path: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}{}", addr, path))
        .await
        .unwrap();
    socket
}

async fn next_message(socket: &mut Socket) -> Message {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection ended")
            .unwrap();
        if !matches!(message, Message::Ping(_) | Message::Pong(_)) {
            return message;
        }
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    let message = next_message(socket).await;
    serde_json::from_str(message.to_text().unwrap()).unwrap()
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Message::text(value.to_string())).await.unwrap();
}

async fn get(server: &DevServer, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = server
        .app()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8_lossy(&body).into_owned())
}

fn android() -> Target {
    Target::from("android")
}

fn bundle_build() -> BuildOutput {
    BuildOutput::new("android")
        .with_hash("abc123")
        .with_time(12)
        .with_asset("index.android.bundle", Asset::new("console.log(1)"))
}

#[tokio::test]
async fn test_status_and_hello_texts() {
    let server = scripted_server();

    let (status, headers, body) = get(&server, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "packager-status:running");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");

    let (_, _, body) = get(&server, "/").await;
    assert_eq!(body, "React Native packager is running");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let server = scripted_server();
    let response = server
        .app()
        .oneshot(
            Request::get("/status")
                .header(header::ORIGIN, "http://localhost:19000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_artifact_errors() {
    let server = scripted_server();

    let (status, _, _) = get(&server, "/main.js").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = get(&server, "/index.bundle?platform=ios").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("no compilation in progress"));

    let (status, _, _) = get(&server, "/index.ios.bundle.map").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = get(&server, "/index.bundle?platform=web").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_waits_for_running_build() {
    let server = scripted_server();
    server.compiler().handle_event(&android(), BuildEvent::Started);

    let request = tokio::spawn({
        let server = Arc::clone(&server);
        async move { get(&server, "/index.android.bundle").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!request.is_finished());

    server
        .compiler()
        .handle_event(&android(), BuildEvent::Completed(bundle_build()));

    let (status, headers, body) = request.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/javascript");
    assert_eq!(body, "console.log(1)");
}

#[tokio::test]
async fn test_artifact_path_is_percent_decoded() {
    let server = scripted_server();
    server.compiler().handle_event(&android(), BuildEvent::Started);
    server.compiler().handle_event(
        &android(),
        BuildEvent::Completed(
            bundle_build().with_asset("assets/my logo.png", Asset::new(vec![0x89, b'P', b'N', b'G'])),
        ),
    );

    let (status, headers, _) = get(&server, "/assets/my%20logo.png?platform=android").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");

    let (status, _, _) = get(&server, "/index%2Eandroid.bundle").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = get(&server, "/%FF.bundle?platform=android").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_build_failure_is_server_error() {
    let server = scripted_server();
    server.compiler().handle_event(&android(), BuildEvent::Started);

    let request = tokio::spawn({
        let server = Arc::clone(&server);
        async move { get(&server, "/index.android.bundle").await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.compiler().handle_event(
        &android(),
        BuildEvent::Failed(BuildFailure::new("Unexpected token")),
    );

    let (status, _, body) = request.await.unwrap();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("Unexpected token"));
}

#[tokio::test]
async fn test_api_routes() {
    let server = scripted_server();
    server.compiler().handle_event(&android(), BuildEvent::Started);
    server
        .compiler()
        .handle_event(&android(), BuildEvent::Completed(bundle_build()));

    let (status, _, body) = get(&server, "/api/platforms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({ "data": ["android", "ios"] })
    );

    let (_, _, body) = get(&server, "/api/stats/android").await;
    let stats: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(stats["data"]["hash"], "abc123");

    let (status, _, _) = get(&server, "/api/assets/web").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hmr_client_lifecycle() {
    let server = scripted_server();
    let running = serve(&server).await;

    let mut client = connect(running.addr, "/hmr?platform=android").await;
    assert_eq!(next_json(&mut client).await, json!({ "action": "sync", "body": null }));

    server.compiler().handle_event(&android(), BuildEvent::Invalidated);
    assert_eq!(next_json(&mut client).await, json!({ "action": "building" }));

    server
        .compiler()
        .handle_event(&android(), BuildEvent::Completed(bundle_build()));
    let built = next_json(&mut client).await;
    assert_eq!(built["action"], "built");
    assert_eq!(built["body"]["hash"], "abc123");

    let mut late = connect(running.addr, "/hmr?platform=android").await;
    assert_eq!(next_json(&mut late).await["body"]["hash"], "abc123");
    assert_eq!(server.hmr().client_count(), 2);

    running.stop().await;
}

#[tokio::test]
async fn test_hmr_events_stay_within_target() {
    let server = scripted_server();
    let running = serve(&server).await;

    let mut ios = connect(running.addr, "/hmr?platform=ios").await;
    let mut android_client = connect(running.addr, "/hmr?platform=android").await;
    next_json(&mut ios).await;
    next_json(&mut android_client).await;

    server
        .compiler()
        .handle_event(&Target::from("ios"), BuildEvent::Invalidated);
    server.compiler().handle_event(&android(), BuildEvent::Started);
    server
        .compiler()
        .handle_event(&android(), BuildEvent::Completed(bundle_build()));

    assert_eq!(next_json(&mut ios).await, json!({ "action": "building" }));
    assert_eq!(next_json(&mut android_client).await["action"], "built");

    running.stop().await;
}

#[tokio::test]
async fn test_hmr_requires_platform() {
    let server = scripted_server();
    let running = serve(&server).await;

    let mut client = connect(running.addr, "/hmr").await;
    match next_message(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected close frame, got {:?}", other),
    }

    running.stop().await;
}

#[tokio::test]
async fn test_message_namespace() {
    let server = scripted_server();
    let running = serve(&server).await;

    let mut app = connect(running.addr, "/message?name=app").await;
    let mut tool = connect(running.addr, "/message?name=tool").await;

    send_json(
        &mut app,
        json!({ "version": 2, "id": 1, "method": "getid", "target": "server" }),
    )
    .await;
    let app_id = next_json(&mut app).await["result"].as_str().unwrap().to_string();

    send_json(
        &mut tool,
        json!({ "version": 2, "id": 1, "method": "getpeers", "target": "server" }),
    )
    .await;
    let peers = next_json(&mut tool).await;
    assert_eq!(peers["result"][&app_id]["name"], "app");

    send_json(&mut tool, json!({ "version": 2, "method": "reload" })).await;
    assert_eq!(next_json(&mut app).await, json!({ "version": 2, "method": "reload" }));

    send_json(
        &mut tool,
        json!({ "version": 2, "id": "r1", "method": "ping", "target": app_id }),
    )
    .await;
    let forwarded = next_json(&mut app).await;
    assert_eq!(forwarded["method"], "ping");
    send_json(
        &mut app,
        json!({ "version": 2, "id": forwarded["id"], "result": "pong" }),
    )
    .await;
    assert_eq!(
        next_json(&mut tool).await,
        json!({ "version": 2, "id": "r1", "result": "pong" })
    );

    running.stop().await;
}

#[tokio::test]
async fn test_events_namespace() {
    let server = scripted_server();
    let running = serve(&server).await;

    let mut app = connect(running.addr, "/message").await;
    send_json(
        &mut app,
        json!({ "version": 2, "id": 1, "method": "getid", "target": "server" }),
    )
    .await;
    next_json(&mut app).await;

    let mut tooling = connect(running.addr, "/events").await;
    send_json(&mut tooling, json!({ "type": "command", "command": "devMenu" })).await;

    assert_eq!(next_json(&mut app).await, json!({ "version": 2, "method": "devMenu" }));
    assert_eq!(
        next_json(&mut tooling).await,
        json!({ "version": 2, "type": "event", "body": { "method": "devMenu" } })
    );

    server.compiler().handle_event(&android(), BuildEvent::Started);
    assert_eq!(
        next_json(&mut tooling).await["body"],
        json!({ "type": "BuildStart", "platform": "android" })
    );

    running.stop().await;
}

#[tokio::test]
async fn test_api_websocket() {
    let server = scripted_server();
    let running = serve(&server).await;

    let mut client = connect(running.addr, "/api-ws").await;
    send_json(&mut client, json!({ "id": 3, "method": "getPlatforms" })).await;
    assert_eq!(
        next_json(&mut client).await,
        json!({ "id": 3, "result": ["android", "ios"] })
    );

    send_json(&mut client, json!({ "id": 4, "method": "getAssets" })).await;
    assert!(next_json(&mut client).await["error"].is_string());

    running.stop().await;
}

#[tokio::test]
async fn test_unrouted_upgrade_is_not_found() {
    let server = scripted_server();
    let running = serve(&server).await;

    let err = connect_async(format!("ws://{}/nope", running.addr))
        .await
        .unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 404),
        other => panic!("expected http error, got {:?}", other),
    }

    running.stop().await;
}

#[tokio::test]
async fn test_inspector_without_endpoint_closes() {
    let server = scripted_server();
    let running = serve(&server).await;

    let mut client = connect(running.addr, "/inspector/device?name=phone").await;
    match next_message(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
        other => panic!("expected close frame, got {:?}", other),
    }

    running.stop().await;
}

#[tokio::test]
async fn test_serves_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("build").join("android");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("index.android.bundle"), "bundle()").unwrap();
    std::fs::write(out.join("index.android.bundle.map"), "{}").unwrap();

    let config = DevServerConfig {
        port: 0,
        root_dir: dir.path().to_path_buf(),
        targets: vec![TargetConfig::new("android", "build/android")],
        ..DevServerConfig::default()
    };
    let server = server_with(Arc::new(OutputDirEngine::new(dir.path())), config);
    let running = serve(&server).await;

    let mut served = None;
    for _ in 0..100 {
        let (status, _, body) = get(&server, "/index.android.bundle").await;
        if status == StatusCode::OK {
            served = Some(body);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(served.as_deref(), Some("bundle()"));

    let (status, _, body) = get(&server, "/index.android.bundle.map").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "{}");

    running.stop().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = DevServerConfig {
        targets: Vec::new(),
        ..DevServerConfig::default()
    };
    let delegates = Delegates::from_config(&config);
    let result = DevServer::new(
        config,
        Arc::new(ScriptedEngine::default()),
        delegates,
        ExternalEndpoints::default(),
    );
    assert!(matches!(
        result,
        Err(fob_dev_server::DevServerError::Config(_))
    ));
}
