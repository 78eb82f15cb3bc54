//! End-to-end execution of stored HTTP and GraphQL entries.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use quiver_core::domain::model::{
    BodyKind, HttpKvKind, Response, ResponseAssert, ResponseHeader,
};
use quiver_core::template::{interpolate, TemplateMode};
use quiver_core::{CoreError, Ctx, Uid};
use quiver_store::{Model, Store};
use quiver_sync::{EventStreamer, MutationPipeline, ReplayRecorder};

use crate::asserts::{response_env, run_asserts, AssertEvaluator, CapturedResponse, ExprEvaluator};
use crate::config::ExecutorConfig;

/// Runs stored entries against the network and persists the outcome.
///
/// Reentrant: concurrent executions of the same entry id share nothing
/// but the storage gateway and the streamer. Each run reads through the
/// non-transactional gateway, performs the call, then writes the whole
/// outcome in one pipeline transaction whose commit publishes the
/// Response, Response-Header, entry-update and Response-Assert events.
pub struct RequestExecutor {
    store: Store,
    streamer: Option<Arc<EventStreamer>>,
    recorder: Option<ReplayRecorder>,
    config: ExecutorConfig,
    client: reqwest::Client,
    evaluator: Arc<dyn AssertEvaluator>,
}

fn map_http_err(err: reqwest::Error) -> CoreError {
    if err.is_timeout() {
        CoreError::Timeout("outbound http call".to_string())
    } else {
        CoreError::Internal(format!("http: {}", err))
    }
}

/// Wire-format data of one resolved entry, ready to dispatch.
struct WireRequest {
    method: reqwest::Method,
    url: String,
    headers: Vec<(String, String)>,
    body: WireBody,
}

enum WireBody {
    None,
    Raw {
        content: String,
        content_type: Option<String>,
    },
    Form(Vec<(String, String)>),
    UrlEncoded(Vec<(String, String)>),
    Json(Value),
}

impl RequestExecutor {
    /// New executor over a store, optionally publishing and recording on
    /// each run's commit.
    pub fn new(
        store: Store,
        streamer: Option<Arc<EventStreamer>>,
        recorder: Option<ReplayRecorder>,
        config: ExecutorConfig,
    ) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| CoreError::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            store,
            streamer,
            recorder,
            config,
            client,
            evaluator: Arc::new(ExprEvaluator),
        })
    }

    /// Swap the assertion evaluator, used by tests.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn AssertEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    async fn authorize(&self, ctx: &Ctx, workspace_id: &Uid) -> Result<(), CoreError> {
        let user = ctx.require_user()?;
        if !self.store.is_member(workspace_id, user).await? {
            return Err(CoreError::PermissionDenied(format!(
                "user {} is not a member of workspace {}",
                user, workspace_id
            )));
        }
        Ok(())
    }

    /// Flat variable map from the workspace's global environment. On a
    /// key collision the first enabled row wins.
    async fn variable_map(&self, workspace_id: &Uid) -> Result<Map<String, Value>, CoreError> {
        let environment = self.store.global_environment(workspace_id).await?;
        let mut vars = Map::new();
        for variable in self.store.enabled_variables(&environment.id).await? {
            vars.entry(variable.key).or_insert(Value::String(variable.value));
        }
        Ok(vars)
    }

    fn interpolate_pairs(
        pairs: &[(String, String)],
        vars: &Map<String, Value>,
    ) -> Result<Vec<(String, String)>, CoreError> {
        pairs
            .iter()
            .map(|(key, value)| {
                Ok((
                    interpolate(key, vars, TemplateMode::Strict)?,
                    interpolate(value, vars, TemplateMode::Strict)?,
                ))
            })
            .collect()
    }

    /// Execute a stored HTTP entry and return the persisted response id.
    pub async fn send_http(&self, ctx: &Ctx, http_id: &Uid) -> Result<Uid, CoreError> {
        ctx.check_live()?;
        let mut entry = self.store.get_http_request(http_id).await?;
        self.authorize(ctx, &entry.workspace_id).await?;

        let headers: Vec<(String, String)> = self
            .store
            .list_http_kv(HttpKvKind::Header, http_id)
            .await?
            .into_iter()
            .filter(|row| row.enabled)
            .map(|row| (row.key, row.value))
            .collect();
        let params: Vec<(String, String)> = self
            .store
            .list_http_kv(HttpKvKind::Param, http_id)
            .await?
            .into_iter()
            .filter(|row| row.enabled)
            .map(|row| (row.key, row.value))
            .collect();
        let expressions: Vec<String> = self
            .store
            .list_http_asserts(http_id)
            .await?
            .into_iter()
            .filter(|a| a.enabled)
            .map(|a| a.expression)
            .collect();

        let vars = self.variable_map(&entry.workspace_id).await?;
        let url = interpolate(&entry.url, &vars, TemplateMode::Strict)?;
        let headers = Self::interpolate_pairs(&headers, &vars)?;
        let params = Self::interpolate_pairs(&params, &vars)?;

        let body = match entry.body_kind {
            BodyKind::NoBody => WireBody::None,
            BodyKind::Raw => match self.store.get_body_raw(http_id).await? {
                Some(raw) => WireBody::Raw {
                    content: interpolate(&raw.content, &vars, TemplateMode::Strict)?,
                    content_type: raw.content_type,
                },
                None => WireBody::None,
            },
            BodyKind::Form => {
                let items: Vec<(String, String)> = self
                    .store
                    .list_http_kv(HttpKvKind::FormItem, http_id)
                    .await?
                    .into_iter()
                    .filter(|row| row.enabled)
                    .map(|row| (row.key, row.value))
                    .collect();
                WireBody::Form(Self::interpolate_pairs(&items, &vars)?)
            }
            BodyKind::UrlEncoded => {
                let items: Vec<(String, String)> = self
                    .store
                    .list_http_kv(HttpKvKind::UrlEncodedItem, http_id)
                    .await?
                    .into_iter()
                    .filter(|row| row.enabled)
                    .map(|row| (row.key, row.value))
                    .collect();
                WireBody::UrlEncoded(Self::interpolate_pairs(&items, &vars)?)
            }
        };

        let method = reqwest::Method::from_bytes(entry.method.as_bytes())
            .map_err(|_| CoreError::InvalidArgument(format!("bad method {:?}", entry.method)))?;
        let wire = WireRequest {
            method,
            url,
            headers,
            body,
        };
        debug!(http_id = %http_id, method = %entry.method, "dispatching http entry");

        self.collect(async {
            let captured = self.dispatch(ctx, wire, &params).await?;
            let workspace_id = entry.workspace_id.clone();
            entry.last_run_at = Some(Utc::now());
            let patch = json!({ "last_run_at": entry.last_run_at });
            self.persist_run(ctx, &mut entry, &workspace_id, captured, expressions, false, patch)
                .await
        })
        .await
    }

    /// Execute a stored GraphQL entry and return the persisted response id.
    pub async fn send_graphql(&self, ctx: &Ctx, graphql_id: &Uid) -> Result<Uid, CoreError> {
        ctx.check_live()?;
        let mut entry = self.store.get_graphql_request(graphql_id).await?;
        self.authorize(ctx, &entry.workspace_id).await?;

        let headers: Vec<(String, String)> = self
            .store
            .list_graphql_headers(graphql_id)
            .await?
            .into_iter()
            .filter(|row| row.enabled)
            .map(|row| (row.key, row.value))
            .collect();

        let vars = self.variable_map(&entry.workspace_id).await?;
        let url = interpolate(&entry.url, &vars, TemplateMode::Strict)?;
        let headers = Self::interpolate_pairs(&headers, &vars)?;
        let query = interpolate(&entry.query, &vars, TemplateMode::Strict)?;
        let variables: Value = match &entry.variables_json {
            Some(raw) => {
                let raw = interpolate(raw, &vars, TemplateMode::Strict)?;
                serde_json::from_str(&raw).map_err(|e| {
                    CoreError::InvalidArgument(format!("variables are not valid JSON: {}", e))
                })?
            }
            None => Value::Object(Map::new()),
        };

        let wire = WireRequest {
            method: reqwest::Method::POST,
            url,
            headers,
            body: WireBody::Json(json!({ "query": query, "variables": variables })),
        };
        debug!(graphql_id = %graphql_id, "dispatching graphql entry");

        self.collect(async {
            let captured = self.dispatch(ctx, wire, &[]).await?;
            let workspace_id = entry.workspace_id.clone();
            entry.last_run_at = Some(Utc::now());
            let patch = json!({ "last_run_at": entry.last_run_at });
            self.persist_run(ctx, &mut entry, &workspace_id, captured, Vec::new(), true, patch)
                .await
        })
        .await
    }

    /// The collection phase, dispatch through persisted assertions, runs
    /// under one overall deadline.
    async fn collect<F>(&self, run: F) -> Result<Uid, CoreError>
    where
        F: std::future::Future<Output = Result<Uid, CoreError>>,
    {
        tokio::time::timeout(self.config.collection_timeout(), run)
            .await
            .map_err(|_| CoreError::Timeout("collection phase".to_string()))?
    }

    /// Perform the outbound call. Duration spans dispatch through the
    /// full body read; the caller's cancellation interrupts both.
    async fn dispatch(
        &self,
        ctx: &Ctx,
        wire: WireRequest,
        params: &[(String, String)],
    ) -> Result<Captured, CoreError> {
        ctx.check_live()?;
        let mut builder = self.client.request(wire.method, &wire.url);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        for (key, value) in &wire.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = match wire.body {
            WireBody::None => builder,
            WireBody::Raw {
                content,
                content_type,
            } => {
                if let Some(content_type) = content_type {
                    builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
                }
                builder.body(content)
            }
            WireBody::Form(items) => {
                let mut form = reqwest::multipart::Form::new();
                for (key, value) in items {
                    form = form.text(key, value);
                }
                builder.multipart(form)
            }
            WireBody::UrlEncoded(items) => builder.form(&items),
            WireBody::Json(value) => builder.json(&value),
        };

        let started = Instant::now();
        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(CoreError::Cancelled("caller cancelled".to_string()));
            }
            sent = builder.send() => sent.map_err(map_http_err)?,
        };
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(CoreError::Cancelled("caller cancelled".to_string()));
            }
            bytes = response.bytes() => bytes.map_err(map_http_err)?.to_vec(),
        };
        let duration_ms = started.elapsed().as_millis() as i64;
        Ok(Captured {
            status,
            headers,
            body,
            duration_ms,
        })
    }

    /// Write the whole run in one transaction: response row, one header
    /// row per (name, value) pair, the entry's `last_run_at` update, and
    /// one assert row per evaluated expression. The commit publishes.
    async fn persist_run<M: Model>(
        &self,
        ctx: &Ctx,
        entry: &mut M,
        workspace_id: &Uid,
        captured: Captured,
        expressions: Vec<String>,
        graphql: bool,
        patch: Value,
    ) -> Result<Uid, CoreError> {
        let env = response_env(&CapturedResponse {
            status: captured.status,
            headers: &captured.headers,
            body: &captured.body,
            graphql,
        });
        let outcomes = run_asserts(self.evaluator.clone(), &expressions, &env, &self.config).await;
        ctx.check_live()?;

        let mut response = Response::new(
            entry.id().clone(),
            workspace_id.clone(),
            captured.status as i64,
            captured.body,
        );
        response.duration_ms = captured.duration_ms;

        let mut pipeline = MutationPipeline::new(
            self.store.clone(),
            self.streamer.clone(),
            self.recorder.clone(),
        );
        pipeline.begin().await?;
        pipeline.insert(ctx, &response).await?;
        for (key, value) in &captured.headers {
            let header = ResponseHeader::new(response.id.clone(), workspace_id.clone(), key, value);
            pipeline.insert(ctx, &header).await?;
        }
        pipeline.update(ctx, entry, patch).await?;
        for outcome in &outcomes {
            let row = ResponseAssert::new(
                response.id.clone(),
                workspace_id.clone(),
                outcome.expression.clone(),
                outcome.success,
            );
            pipeline.insert(ctx, &row).await?;
        }
        pipeline.commit().await?;

        info!(
            response_id = %response.id,
            status = captured.status,
            duration_ms = response.duration_ms,
            asserts = outcomes.len(),
            "entry executed"
        );
        Ok(response.id)
    }
}

struct Captured {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    duration_ms: i64,
}
