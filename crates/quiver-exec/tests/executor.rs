//! Executor behavior against a local mock server and an in-memory
//! database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quiver_core::domain::model::{
    Environment, EnvVariable, GraphqlRequest, HttpAssert, HttpKv, HttpKvKind, HttpRequest,
    MemberRole, Workspace, WorkspaceMember,
};
use quiver_core::{CoreError, Ctx, ModelKind, MutationEvent, Uid};
use quiver_store::{queries, Store};
use quiver_sync::{EventSink, EventStreamer, MutationPipeline, WorkspaceFilter};
use quiver_exec::{AssertEvaluator, ExecutorConfig, RequestExecutor};

struct Fixture {
    store: Store,
    ctx: Ctx,
    workspace: Workspace,
    environment: Environment,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Workspace with an owner member and a global environment.
async fn fixture() -> Fixture {
    init_tracing();
    let store = Store::in_memory().await.unwrap();
    let user = Uid::generate();
    let ctx = Ctx::for_user(user.clone());
    let workspace = Workspace::new("exec-ws");
    let environment = Environment::new(workspace.id.clone(), "globals", true);

    let mut pipe = MutationPipeline::new(store.clone(), None, None);
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &workspace).await.unwrap();
    pipe.insert(
        &ctx,
        &WorkspaceMember::new(workspace.id.clone(), user, MemberRole::Owner),
    )
    .await
    .unwrap();
    pipe.insert(&ctx, &environment).await.unwrap();
    pipe.commit().await.unwrap();

    Fixture {
        store,
        ctx,
        workspace,
        environment,
    }
}

async fn seed<M: quiver_store::Model>(fx: &Fixture, models: &[M]) {
    let mut pipe = MutationPipeline::new(fx.store.clone(), None, None);
    pipe.begin().await.unwrap();
    for model in models {
        pipe.insert(&fx.ctx, model).await.unwrap();
    }
    pipe.commit().await.unwrap();
}

fn executor(fx: &Fixture) -> RequestExecutor {
    RequestExecutor::new(fx.store.clone(), None, None, ExecutorConfig::default()).unwrap()
}

#[tokio::test]
async fn test_http_run_persists_response_headers_and_passing_assert() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(json!({"ok": true})),
        )
        .mount(&server)
        .await;

    let fx = fixture().await;
    let request = HttpRequest::new(
        fx.workspace.id.clone(),
        "health",
        "GET",
        format!("{}/health", server.uri()),
    );
    let assertion = HttpAssert::new(request.id.clone(), "status == 200");
    seed(&fx, &[request.clone()]).await;
    seed(&fx, &[assertion]).await;

    let response_id = executor(&fx)
        .send_http(&fx.ctx, &request.id)
        .await
        .unwrap();

    let response = fx.store.get_response(&response_id).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.request_id, request.id);
    assert_eq!(response.workspace_id, fx.workspace.id);
    // The persisted size is the body's byte length and the duration is
    // a sane wall-clock reading.
    let body = response.body.clone().unwrap();
    assert_eq!(response.size, body.len() as i64);
    assert!(response.duration_ms >= 0);

    let mut tx = fx.store.begin().await.unwrap();
    let headers = queries::response::list_headers_by_response(tx.conn(), &response_id)
        .await
        .unwrap();
    assert!(
        headers
            .iter()
            .any(|h| h.key.eq_ignore_ascii_case("content-type")
                && h.value.starts_with("application/json")),
        "content-type header row missing: {:?}",
        headers
    );
    let asserts = queries::response::list_asserts_by_response(tx.conn(), &response_id)
        .await
        .unwrap();
    assert_eq!(asserts.len(), 1);
    assert_eq!(asserts[0].expression, "status == 200");
    assert!(asserts[0].success);
    tx.rollback().await.unwrap();

    let back = fx.store.get_http_request(&request.id).await.unwrap();
    assert!(back.last_run_at.is_some(), "run must stamp last_run_at");
}

#[tokio::test]
async fn test_url_placeholders_resolve_from_global_environment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/12345/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let fx = fixture().await;
    seed(
        &fx,
        &[EnvVariable::new(
            fx.environment.id.clone(),
            "userId",
            "12345",
        )],
    )
    .await;
    let request = HttpRequest::new(
        fx.workspace.id.clone(),
        "profile",
        "GET",
        format!("{}/api/users/{{{{ userId }}}}/profile", server.uri()),
    );
    seed(&fx, &[request.clone()]).await;

    let response_id = executor(&fx)
        .send_http(&fx.ctx, &request.id)
        .await
        .unwrap();
    let response = fx.store.get_response(&response_id).await.unwrap();
    assert_eq!(response.status, 200);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].url.path(), "/api/users/12345/profile");
}

#[tokio::test]
async fn test_unknown_placeholder_fails_before_dispatch() {
    let server = MockServer::start().await;
    let fx = fixture().await;
    let request = HttpRequest::new(
        fx.workspace.id.clone(),
        "broken",
        "GET",
        format!("{}/x/{{{{ missing }}}}", server.uri()),
    );
    seed(&fx, &[request.clone()]).await;

    let err = executor(&fx)
        .send_http(&fx.ctx, &request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidArgument(_)), "got {:?}", err);
    assert!(server.received_requests().await.unwrap().is_empty());

    let mut tx = fx.store.begin().await.unwrap();
    let responses = queries::response::list_by_request(tx.conn(), &request.id)
        .await
        .unwrap();
    assert!(responses.is_empty(), "nothing may be persisted");
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_non_member_is_denied() {
    let fx = fixture().await;
    let request = HttpRequest::new(fx.workspace.id.clone(), "r", "GET", "http://localhost/");
    seed(&fx, &[request.clone()]).await;

    let stranger = Ctx::for_user(Uid::generate());
    let err = executor(&fx)
        .send_http(&stranger, &request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::PermissionDenied(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_headers_and_params_are_sent_interpolated() {
    let server = MockServer::start().await;
    // A leaked disabled header would match this first and fail the run.
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header_exists("X-Disabled"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("Authorization", "Bearer s3cr3t"))
        .and(query_param("q", "s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let fx = fixture().await;
    seed(
        &fx,
        &[EnvVariable::new(fx.environment.id.clone(), "token", "s3cr3t")],
    )
    .await;
    let request = HttpRequest::new(
        fx.workspace.id.clone(),
        "search",
        "GET",
        format!("{}/search", server.uri()),
    );
    let mut disabled = HttpKv::new(
        request.id.clone(),
        HttpKvKind::Header,
        "X-Disabled",
        "never",
    );
    disabled.enabled = false;
    seed(&fx, &[request.clone()]).await;
    seed(
        &fx,
        &[
            HttpKv::new(
                request.id.clone(),
                HttpKvKind::Header,
                "Authorization",
                "Bearer {{ token }}",
            ),
            disabled,
            HttpKv::new(request.id.clone(), HttpKvKind::Param, "q", "{{ token }}"),
        ],
    )
    .await;

    let response_id = executor(&fx).send_http(&fx.ctx, &request.id).await.unwrap();
    let response = fx.store.get_response(&response_id).await.unwrap();
    assert_eq!(response.status, 200, "only the interpolated shape matches");
}

/// Evaluator that sleeps past any reasonable per-assertion deadline.
struct SlowEvaluator;

impl AssertEvaluator for SlowEvaluator {
    fn evaluate(
        &self,
        _expression: &str,
        _env: &Map<String, Value>,
        _timeout: Duration,
    ) -> Result<Value, CoreError> {
        std::thread::sleep(Duration::from_secs(5));
        Ok(Value::Bool(true))
    }
}

#[tokio::test]
async fn test_runaway_assertion_times_out_without_failing_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let fx = fixture().await;
    let request = HttpRequest::new(
        fx.workspace.id.clone(),
        "slow",
        "GET",
        format!("{}/slow", server.uri()),
    );
    seed(&fx, &[request.clone()]).await;
    seed(&fx, &[HttpAssert::new(request.id.clone(), "status == 200")]).await;

    let config = ExecutorConfig {
        assert_timeout_ms: 50,
        assert_batch_timeout_ms: 500,
        ..ExecutorConfig::default()
    };
    let exec = RequestExecutor::new(fx.store.clone(), None, None, config)
        .unwrap()
        .with_evaluator(Arc::new(SlowEvaluator));

    let response_id = exec.send_http(&fx.ctx, &request.id).await.unwrap();

    let mut tx = fx.store.begin().await.unwrap();
    let asserts = queries::response::list_asserts_by_response(tx.conn(), &response_id)
        .await
        .unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(asserts.len(), 1);
    assert!(!asserts[0].success);
    assert!(
        asserts[0].expression.starts_with("ERROR:") && asserts[0].expression.contains("timeout"),
        "got {:?}",
        asserts[0].expression
    );
}

#[tokio::test]
async fn test_graphql_run_posts_query_and_stores_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({
            "variables": { "id": "42" }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_json(json!({"data": {"user": {"id": "42"}}})),
        )
        .mount(&server)
        .await;

    let fx = fixture().await;
    let mut entry = GraphqlRequest::new(
        fx.workspace.id.clone(),
        "user by id",
        format!("{}/graphql", server.uri()),
        "query($id: ID!) { user(id: $id) { id } }",
    );
    entry.variables_json = Some(r#"{"id": "{{ userId }}"}"#.to_string());
    seed(
        &fx,
        &[EnvVariable::new(fx.environment.id.clone(), "userId", "42")],
    )
    .await;
    seed(&fx, &[entry.clone()]).await;

    let response_id = executor(&fx)
        .send_graphql(&fx.ctx, &entry.id)
        .await
        .unwrap();
    let response = fx.store.get_response(&response_id).await.unwrap();
    assert_eq!(response.status, 200);
    let body: Value = serde_json::from_slice(&response.body.unwrap()).unwrap();
    assert_eq!(body["data"]["user"]["id"], json!("42"));

    let back = fx.store.get_graphql_request(&entry.id).await.unwrap();
    assert!(back.last_run_at.is_some());
}

struct OpenFilter;

#[async_trait]
impl WorkspaceFilter for OpenFilter {
    async fn allows(&self, _workspace_id: &Uid) -> bool {
        true
    }
}

struct ForwardSink(mpsc::UnboundedSender<Value>);

#[async_trait]
impl EventSink for ForwardSink {
    async fn send(&self, message: Value) -> Result<(), CoreError> {
        self.0
            .send(message)
            .map_err(|_| CoreError::Internal("receiver gone".to_string()))
    }
}

#[tokio::test]
async fn test_commit_publishes_response_and_entry_update_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/evt"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let fx = fixture().await;
    let request = HttpRequest::new(
        fx.workspace.id.clone(),
        "evt",
        "GET",
        format!("{}/evt", server.uri()),
    );
    seed(&fx, &[request.clone()]).await;

    let streamer = Arc::new(EventStreamer::new(8));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = streamer.subscribe(
        &[ModelKind::Response, ModelKind::HttpRequest],
        Arc::new(OpenFilter),
        Box::new(|events: &[MutationEvent]| {
            json!(events
                .iter()
                .map(|e| format!("{:?}/{:?}", e.kind, e.op))
                .collect::<Vec<_>>())
        }),
        Arc::new(ForwardSink(tx)),
        CancellationToken::new(),
    );

    let exec = RequestExecutor::new(
        fx.store.clone(),
        Some(streamer.clone()),
        None,
        ExecutorConfig::default(),
    )
    .unwrap();
    exec.send_http(&fx.ctx, &request.id).await.unwrap();

    let mut labels: Vec<String> = Vec::new();
    while labels.len() < 2 {
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("events must arrive")
            .expect("sink closed early");
        let batch: Vec<String> = serde_json::from_value(message).unwrap();
        labels.extend(batch);
    }
    assert!(labels.contains(&"Response/Insert".to_string()), "{labels:?}");
    assert!(
        labels.contains(&"HttpRequest/Update".to_string()),
        "{labels:?}"
    );
}
