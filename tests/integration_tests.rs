use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::Uri,
    response::Json,
    routing::{get, post},
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vigil::agent::tool_loop::{LoopEnd, LoopParams, ToolLoop};
use vigil::agent::tools::{ToolExecutor, Toolset};
use vigil::config::{AppConfig, PartialConfig};
use vigil::kernel::{HttpKernel, Kernel, Message, Notice};
use vigil::mailbox::Inbox;
use vigil::orchestration::{SubagentSupervisor, WorkerCommand, WorkerSettings};
use vigil::safety::SafetyLayer;
use vigil::scheduler::{BootKind, EpochStore, Scheduler, SupervisorState};

// ─── Fake kernel ─────────────────────────────────────────────────────

#[derive(Default)]
struct FakeKernel {
    answers: Mutex<VecDeque<Value>>,
    thinks: Mutex<Vec<Value>>,
    posts: Mutex<Vec<(String, Value)>>,
}

impl FakeKernel {
    fn posts_to(&self, path: &str) -> Vec<Value> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn think(State(fake): State<Arc<FakeKernel>>, Json(body): Json<Value>) -> Json<Value> {
    fake.thinks.lock().unwrap().push(body);
    let answer = fake
        .answers
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| json!({"content": "nothing more to do"}));
    Json(answer)
}

async fn record(State(fake): State<Arc<FakeKernel>>, uri: Uri, Json(body): Json<Value>) -> Json<Value> {
    fake.posts.lock().unwrap().push((uri.path().to_string(), body));
    Json(json!({"ok": true}))
}

async fn start_fake_kernel(answers: Vec<Value>) -> (Arc<FakeKernel>, String) {
    let fake = Arc::new(FakeKernel {
        answers: Mutex::new(answers.into()),
        ..Default::default()
    });
    let app = Router::new()
        .route("/api/think", post(think))
        .route("/api/status", get(|| async { "ok" }))
        .route(
            "/api/genesis",
            get(|| async { Json(json!({"identity": {"name": "Tester"}, "purpose": "Test things."})) }),
        )
        .route("/api/budget", get(|| async { Json(json!({"remaining": 5.0})) }))
        .route(
            "/api/chat",
            get(|| async { Json(json!({"messages": [{"id": 3, "source": "human", "message": "hi there"}]})) }),
        )
        .route(
            "/api/history",
            get(|| async { Json(json!({"commits": [{"hash": "abcdef0123", "message": "init"}]})) }),
        )
        .route("/api/memories", get(|| async { Json(json!({"memories": []})) }))
        .route(
            "/api/galla",
            get(|| async { Json(json!({"gallas": [{"galla": 0}]})) }).post(record),
        )
        .route("/api/chat/ack", post(record))
        .route("/api/log", post(record))
        .route("/api/heartbeat", post(record))
        .route("/api/memory/store", post(record))
        .route("/api/commit", post(record))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (fake, url)
}

fn config(tmp: &TempDir, kernel_url: &str) -> AppConfig {
    PartialConfig {
        kernel_url: Some(kernel_url.to_string()),
        brain: Some(tmp.path().join("brain")),
        sleep_secs: Some(0),
        ..Default::default()
    }
    .finalize()
}

fn http_kernel(url: &str) -> Arc<dyn Kernel> {
    Arc::new(HttpKernel::new(url, Duration::from_secs(10)).unwrap())
}

// ─── HTTP kernel ─────────────────────────────────────────────────────

#[tokio::test]
async fn tool_loop_round_trips_through_the_http_kernel() {
    let (fake, url) = start_fake_kernel(vec![
        json!({
            "content": "let me look",
            "tool_calls": [{"id": "c1", "name": "execute", "arguments": {"command": "echo from-tool"}}],
            "done": false
        }),
        json!({"content": "all done", "tool_calls": null}),
    ])
    .await;
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, &url);
    let kernel = http_kernel(&url);
    let safety = Arc::new(SafetyLayer::new(&cfg).unwrap());
    let tools = Arc::new(ToolExecutor::new(safety, kernel.clone()));

    let outcome = ToolLoop::new(kernel, tools)
        .run(vec![Message::user("go")], &LoopParams::new("code", Toolset::Plan))
        .await;
    assert_eq!(outcome.end, LoopEnd::Finished);
    assert_eq!(outcome.content, "all done");
    assert_eq!(outcome.actions.len(), 1);

    let thinks = fake.thinks.lock().unwrap().clone();
    assert_eq!(thinks.len(), 2);
    assert_eq!(thinks[0]["intent"], "code");
    assert_eq!(thinks[0]["max_tokens"], 8000);
    assert_eq!(thinks[0]["messages"], json!([{"role": "user", "content": "go"}]));
    assert!(thinks[0].get("system").is_none());

    let second = thinks[1]["messages"].as_array().unwrap();
    assert_eq!(second.len(), 3);
    assert_eq!(second[1]["role"], "assistant");
    assert_eq!(second[1]["tool_calls"][0]["id"], "c1");
    assert_eq!(second[2]["role"], "tool_result");
    assert_eq!(second[2]["content"], "from-tool");
    assert_eq!(second[2]["is_error"], false);
}

#[tokio::test]
async fn notices_post_kernel_shaped_bodies() {
    let (fake, url) = start_fake_kernel(vec![]).await;
    let kernel = http_kernel(&url);
    kernel
        .notify(Notice::Heartbeat {
            phase: "sleeping".into(),
            epoch: 4,
            active_agents: 1,
        })
        .await;
    kernel.notify(Notice::ChatAck { up_to_id: 9 }).await;

    assert_eq!(
        fake.posts_to("/api/heartbeat"),
        vec![json!({"phase": "sleeping", "galla": 4, "active_agents": 1})]
    );
    assert_eq!(fake.posts_to("/api/chat/ack"), vec![json!({"up_to_id": 9})]);
}

#[tokio::test]
async fn queries_decode_kernel_payloads() {
    let (_fake, url) = start_fake_kernel(vec![]).await;
    let kernel = http_kernel(&url);
    assert!(kernel.ping().await);
    assert_eq!(kernel.genesis().await.unwrap().name(), "Tester");
    let chat = kernel.unread_chat().await.unwrap();
    assert_eq!(chat[0].id, 3);
    assert_eq!(kernel.history().await.unwrap()[0].message, "init");
    assert!(kernel.memories(5).await.unwrap().is_empty());
    assert_eq!(kernel.epoch_records().await.unwrap()[0].epoch, 0);
}

// ─── Full epoch ──────────────────────────────────────────────────────

#[tokio::test]
async fn resumed_epoch_runs_plan_then_execute_and_persists() {
    let (fake, url) = start_fake_kernel(vec![
        json!({"content": "1. Reply to the human."}),
        json!({
            "content": "",
            "tool_calls": [{"id": "w1", "name": "write", "arguments": {"path": "reply.txt", "content": "hello"}}],
            "done": false
        }),
        json!({"content": "Replied."}),
    ])
    .await;
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp, &url);
    EpochStore::new(cfg.epoch_file()).save(5).unwrap();

    let kernel = http_kernel(&url);
    let safety = Arc::new(SafetyLayer::new(&cfg).unwrap());
    let subagents = SubagentSupervisor::new(
        WorkerCommand::new("sh", &["-c", "exit 0"]),
        WorkerSettings::default(),
        cfg.max_subagents,
        Duration::from_secs(cfg.subagent_timeout_secs),
    );
    let tools = Arc::new(ToolExecutor::new(safety, kernel.clone()).with_subagents(subagents.clone()));
    let state = Arc::new(SupervisorState::new());
    let mut scheduler = Scheduler::new(
        &cfg,
        state.clone(),
        kernel.clone(),
        Arc::new(Inbox::new()),
        subagents,
        ToolLoop::new(kernel, tools),
    )
    .with_kernel_wait(3, Duration::from_millis(10));

    assert_eq!(scheduler.boot(&CancellationToken::new()).await, BootKind::Resumed(5));
    let summary = scheduler.cycle().await.unwrap();
    assert_eq!(summary.epoch, 5);
    assert_eq!(summary.actions, 1);
    assert!(!summary.plan_failed);

    assert_eq!(std::fs::read_to_string(cfg.brain.join("reply.txt")).unwrap(), "hello");
    assert_eq!(EpochStore::new(cfg.epoch_file()).load(), 6);
    assert_eq!(state.epoch(), 6);

    let thinks = fake.thinks.lock().unwrap().clone();
    assert_eq!(thinks[0]["intent"], "plan");
    let wakeup = thinks[0]["messages"][0]["content"].as_str().unwrap();
    assert!(wakeup.starts_with("You are Tester."));
    assert!(wakeup.contains("This is epoch 5."));
    assert!(wakeup.contains("[human] hi there"));
    assert!(wakeup.contains("abcdef0 init"));
    assert_eq!(thinks[1]["messages"][1], json!({"role": "assistant", "content": "1. Reply to the human."}));

    assert_eq!(fake.posts_to("/api/chat/ack"), vec![json!({"up_to_id": 3})]);
    assert_eq!(
        fake.posts_to("/api/commit"),
        vec![json!({"message": "[g5] epoch 5: 1 actions"})]
    );
    let timeline = fake.posts_to("/api/galla");
    assert!(timeline.contains(&json!({"galla": 5, "plan": "1. Reply to the human."})));
    assert!(timeline.contains(&json!({"galla": 5, "summary": "Replied.", "actions_count": 1})));
    assert!(fake
        .posts_to("/api/memory/store")
        .iter()
        .any(|m| m["tags"] == json!(["restart"])));
    assert!(fake
        .posts_to("/api/log")
        .iter()
        .any(|l| l["message"].as_str().unwrap().starts_with("[vigil|g5]")));
}
