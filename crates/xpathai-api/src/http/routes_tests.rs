use super::*;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::{json, Value};
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tower::ServiceExt;
use xpathai_llama::{
    CompletionPayload, CompletionReply, CompletionTransport, GenerationGateway, HealthCheck,
    HealthSample, LaunchSpec, Launcher, LlamaSupervisor, ModelSwitchboard, PollSchedule,
    ProbeOutcome, ReadinessProber, SupervisorConfig, TransportError,
};

/// Idle child standing in for the inference server.
struct SleepLauncher {
    launches: AtomicUsize,
}

impl Launcher for SleepLauncher {
    fn launch(&self, _spec: &LaunchSpec) -> io::Result<Child> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Command::new("sh")
            .args(["-c", "exec sleep 30"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

struct AlwaysReady;

#[async_trait]
impl HealthCheck for AlwaysReady {
    async fn probe(&self) -> HealthSample {
        HealthSample::now(ProbeOutcome::Ready)
    }
}

type Reply = Box<dyn Fn() -> Result<CompletionReply, TransportError> + Send + Sync>;

/// Answers every completion with `reply` and records the payloads.
struct RecordingTransport {
    reply: Reply,
    payloads: Mutex<Vec<CompletionPayload>>,
}

#[async_trait]
impl CompletionTransport for RecordingTransport {
    async fn complete(
        &self,
        payload: &CompletionPayload,
        _timeout: Duration,
    ) -> Result<CompletionReply, TransportError> {
        self.payloads.lock().unwrap().push(payload.clone());
        (self.reply)()
    }
}

fn text(content: &'static str) -> Reply {
    Box::new(move || {
        Ok(CompletionReply {
            content: content.to_string(),
            tokens_predicted: Some(4),
            tokens_evaluated: Some(10),
        })
    })
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    launcher: Arc<SleepLauncher>,
    transport: Arc<RecordingTransport>,
    _dir: TempDir,
}

impl Harness {
    fn new(models: &[&str], default_model: Option<&str>, reply: Reply) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for name in models {
            std::fs::write(dir.path().join(name), b"GGUF").unwrap();
        }
        let launcher = Arc::new(SleepLauncher {
            launches: AtomicUsize::new(0),
        });
        let config = SupervisorConfig {
            models_dir: dir.path().to_path_buf(),
            stop_grace: Duration::from_secs(2),
            ..SupervisorConfig::default()
        };
        let prober = ReadinessProber::new(Duration::from_secs(2))
            .with_schedule(PollSchedule::fixed(Duration::from_millis(10)));
        let supervisor = Arc::new(
            LlamaSupervisor::new(config)
                .with_launcher(launcher.clone())
                .with_health_check(Arc::new(AlwaysReady))
                .with_prober(prober),
        );
        let transport = Arc::new(RecordingTransport {
            reply,
            payloads: Mutex::new(Vec::new()),
        });
        let gateway = GenerationGateway::new(supervisor.status_cell().clone(), transport.clone());
        let switchboard = Arc::new(
            ModelSwitchboard::new(supervisor, gateway)
                .with_default_model(default_model.map(str::to_string)),
        );
        let state = Arc::new(AppState::new(switchboard));
        Self {
            app: create_router(state.clone()),
            state,
            launcher,
            transport,
            _dir: dir,
        }
    }

    async fn get(&self, uri: &str) -> Response {
        self.app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post(&self, uri: &str, body: Value) -> Response {
        self.app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    fn last_prompt(&self) -> String {
        self.transport
            .payloads
            .lock()
            .unwrap()
            .last()
            .map(|p| p.prompt.clone())
            .unwrap_or_default()
    }

    async fn shutdown(&self) {
        self.state.switchboard.unload().await;
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

const DOM: &str = r#"<html><head><script>var a = 1;</script></head><body><form><input type="text" name="q"><button id="go" class="btn">Go</button></form></body></html>"#;

fn button() -> Value {
    json!({"tag": "BUTTON", "attributes": [{"name": "id", "value": "go"}, {"name": "class", "value": "btn"}], "text": "Go"})
}

#[tokio::test]
async fn test_health_when_stopped() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server_status"], "unhealthy");
    assert_eq!(body["process_status"], "stopped");
    assert!(body["model"].is_null());
    assert!(body["pid"].is_null());
}

#[tokio::test]
async fn test_probes() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    assert_eq!(h.get("/livez").await.status(), StatusCode::OK);
    assert_eq!(h.get("/readyz").await.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = h.post("/models/select", json!({"model": "m1"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.get("/readyz").await.status(), StatusCode::OK);

    h.shutdown().await;
}

#[tokio::test]
async fn test_list_models() {
    let h = Harness::new(&["b.gguf", "a.gguf", "notes.txt"], Some("a"), text("x"));

    let body = json_body(h.get("/models").await).await;
    assert_eq!(body["available_models"], json!(["a.gguf", "b.gguf"]));
    assert_eq!(body["models"][0]["size_bytes"], 4);
    assert!(body["current_model"].is_null());
    assert_eq!(body["default_model"], "a.gguf");
}

#[tokio::test]
async fn test_select_unknown_model() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h.post("/models/select", json!({"model": "m2"})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "model_not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("m2.gguf"));
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_select_model_then_health() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h.post("/models/select", json!({"model": "m1"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["model"], "m1.gguf");
    assert_eq!(body["status"]["state"], "ready");

    let body = json_body(h.get("/health").await).await;
    assert_eq!(body["server_status"], "ready");
    assert_eq!(body["process_status"], "running");
    assert_eq!(body["model"], "m1.gguf");
    assert!(body["pid"].is_number());

    let body = json_body(h.post("/models/unload", json!({})).await).await;
    assert!(body["model"].is_null());
    assert_eq!(body["status"]["state"], "stopped");
}

#[tokio::test]
async fn test_generate_when_nothing_loaded() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h.post("/generate", json!({"prompt": "hello"})).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::RETRY_AFTER], "5");
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "not_ready");
    assert!(h.transport.payloads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_with_model() {
    let h = Harness::new(&["m1.gguf"], None, text("  hello world  "));

    let response = h
        .post(
            "/generate",
            json!({"prompt": "say hi", "model": "m1", "max_tokens": 16, "temperature": 0.0}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["text"], "hello world");
    assert_eq!(body["model"], "m1.gguf");
    assert!(body["execution_time"].as_f64().unwrap() >= 0.0);

    let payloads = h.transport.payloads.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].prompt, "say hi");
    assert_eq!(payloads[0].n_predict, 16);
    assert_eq!(payloads[0].temperature, 0.0);
    assert_eq!(payloads[0].top_k, 30);

    h.shutdown().await;
}

#[tokio::test]
async fn test_generate_validation() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h.post("/generate", json!({"prompt": "  "})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h.post("/generate", json!({"prompt": "x", "top_p": 0.0})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing required field.
    let response = h.post("/generate", json!({"model": "m1"})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_generate_upstream_error() {
    let h = Harness::new(
        &["m1.gguf"],
        None,
        Box::new(|| {
            Err(TransportError::Status {
                status: 500,
                body: "slot unavailable".to_string(),
            })
        }),
    );

    let response = h.post("/generate", json!({"prompt": "x", "model": "m1"})).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "upstream_error");

    h.shutdown().await;
}

#[tokio::test]
async fn test_xpath_heuristic_mode() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h
        .post(
            "/generate-xpath",
            json!({"dom": DOM, "element": button(), "mode": "heuristic"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["xpath"], "//button[@id='go']");
    assert_eq!(body["source"], "heuristic");
    assert!(body["model"].is_null());
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_xpath_heuristic_not_in_dom() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let element = json!({"tag": "a", "attributes": [{"name": "href", "value": "/missing"}]});
    let response = h
        .post(
            "/generate-xpath",
            json!({"dom": DOM, "element": element, "mode": "heuristic"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["kind"], "not_found_in_dom");
}

#[tokio::test]
async fn test_xpath_request_validation() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h
        .post("/generate-xpath", json!({"dom": "  ", "element": button()}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["kind"], "empty_dom");

    let response = h
        .post("/generate-xpath", json!({"dom": DOM, "element": {"attributes": []}}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["kind"], "missing_tag");

    let response = h
        .post(
            "/generate-xpath",
            json!({"dom": DOM, "element": {"tag": "div"}, "mode": "heuristic"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["kind"], "no_attributes");
}

#[tokio::test]
async fn test_xpath_ai_mode() {
    let h = Harness::new(
        &["m1.gguf"],
        Some("m1"),
        text(r#"```json
{"primary_xpath": "//button[@id='go']", "alternative_xpath": "//button[@name='go']", "explanation": "The id is unique."}
```"#),
    );

    let response = h
        .post("/generate-xpath", json!({"dom": DOM, "element": button()}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["xpath"], "//button[@id='go']");
    assert_eq!(body["alternative_xpath"], "//button[@name='go']");
    assert_eq!(body["explanation"], "The id is unique.");
    assert_eq!(body["source"], "ai");
    assert_eq!(body["model"], "m1.gguf");
    assert_eq!(
        body["warnings"],
        json!(["Alternative XPath not found in DOM: //button[@name='go']"])
    );

    let prompt = h.last_prompt();
    assert!(prompt.contains(r#"<button id="go" class="btn">Go</button>"#));
    assert!(!prompt.contains("<script>"));
    assert!(!prompt.contains("{dom}"));

    h.shutdown().await;
}

#[tokio::test]
async fn test_xpath_ai_prompt_override() {
    let h = Harness::new(&["m1.gguf"], Some("m1"), text("//button[@id='go']"));

    let response = h
        .post(
            "/generate-xpath",
            json!({"dom": DOM, "element": button(), "prompt_template": "ELEMENT {element}"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["xpath"], "//button[@id='go']");
    assert_eq!(
        h.last_prompt(),
        r#"ELEMENT <button id="go" class="btn">Go</button>"#
    );

    h.shutdown().await;
}

#[tokio::test]
async fn test_xpath_ai_unparsed_falls_back_to_heuristic() {
    let h = Harness::new(&["m1.gguf"], Some("m1"), text("I am not sure what you mean."));

    let response = h
        .post("/generate-xpath", json!({"dom": DOM, "element": button()}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["xpath"], "//button[@id='go']");
    assert_eq!(body["source"], "heuristic");
    assert_eq!(body["model"], "m1.gguf");
    assert_eq!(body["warnings"].as_array().unwrap().len(), 1);

    h.shutdown().await;
}

#[tokio::test]
async fn test_xpath_ai_unparsed_without_fallback() {
    let h = Harness::new(&["m1.gguf"], Some("m1"), text("No idea."));

    let response = h
        .post(
            "/generate-xpath",
            json!({"dom": DOM, "element": {"tag": "form"}}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"]["kind"], "unparsed_response");

    h.shutdown().await;
}

#[tokio::test]
async fn test_chat_completions() {
    let h = Harness::new(&["m1.gguf"], Some("m1"), text("//button[@id='go']"));

    let response = h
        .post(
            "/v1/chat/completions",
            json!({
                "model": "gpt-3.5-turbo",
                "messages": [
                    {"role": "system", "content": "Only XPath."},
                    {"role": "user", "content": "find the go button"}
                ],
                "max_tokens": 32
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "m1.gguf");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "//button[@id='go']");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["prompt_tokens"], 4);
    assert_eq!(body["usage"]["completion_tokens"], 1);
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));

    assert_eq!(h.last_prompt(), "find the go button");

    h.shutdown().await;
}

#[tokio::test]
async fn test_chat_completions_rejects_bad_requests() {
    let h = Harness::new(&["m1.gguf"], Some("m1"), text("x"));

    let response = h
        .post(
            "/v1/chat/completions",
            json!({"messages": [{"role": "system", "content": "x"}]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = h
        .post(
            "/v1/chat/completions",
            json!({"messages": [{"role": "user", "content": "x"}], "stream": true}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let h = Harness::new(&["m1.gguf"], None, text("x"));

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "chrome-extension://abcdef")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}
