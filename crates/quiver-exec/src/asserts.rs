//! Response-scoped assertion evaluation.
//!
//! Builds the environment user expressions run against and evaluates an
//! assertion batch in bounded parallel: one blocking task per assertion
//! under a semaphore, a per-assertion deadline, a batch deadline, and
//! panic isolation. Results come back in input order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

use quiver_core::expr::evaluate;
use quiver_core::CoreError;

use crate::config::ExecutorConfig;

/// Evaluates one assertion expression against an environment.
///
/// The executor goes through this seam so tests can inject pathological
/// evaluators (slow, panicking) without a pathological expression.
pub trait AssertEvaluator: Send + Sync + 'static {
    /// Evaluate `expression` against `env` under `timeout`.
    fn evaluate(
        &self,
        expression: &str,
        env: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, CoreError>;
}

/// The production evaluator: the expression language itself.
pub struct ExprEvaluator;

impl AssertEvaluator for ExprEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        env: &Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        evaluate(expression, env, timeout).map_err(CoreError::from)
    }
}

/// One evaluated assertion, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertOutcome {
    /// The expression text, or `ERROR: <message>` when evaluation failed.
    pub expression: String,
    /// Whether the assertion held.
    pub success: bool,
}

/// A captured response in the shape the environment builder needs.
pub struct CapturedResponse<'a> {
    /// HTTP status code.
    pub status: u16,
    /// Every (name, value) header pair, multi-values preserved.
    pub headers: &'a [(String, String)],
    /// Raw body bytes.
    pub body: &'a [u8],
    /// Whether the entry was a GraphQL operation.
    pub graphql: bool,
}

/// Build the environment assertions evaluate against.
///
/// `body` parses as JSON when the content type says so, otherwise it is
/// the raw string. The same keys are mirrored under a `response` object
/// so both `status == 200` and `response.status == 200` read naturally.
pub fn response_env(response: &CapturedResponse<'_>) -> Map<String, Value> {
    let content_type = response
        .headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone())
        .unwrap_or_default();
    let is_json = content_type
        .to_ascii_lowercase()
        .starts_with("application/json");

    let body_string = String::from_utf8_lossy(response.body).into_owned();
    let body: Value = if is_json {
        serde_json::from_slice(response.body).unwrap_or(Value::String(body_string.clone()))
    } else {
        Value::String(body_string.clone())
    };

    let mut headers = Map::new();
    for (name, value) in response.headers {
        headers.insert(name.clone(), Value::String(value.clone()));
    }

    let status = response.status;
    let mut env = Map::new();
    env.insert("status".to_string(), json!(status));
    env.insert("body".to_string(), body.clone());
    env.insert("body_string".to_string(), Value::String(body_string));
    env.insert("headers".to_string(), Value::Object(headers));
    env.insert("content_type".to_string(), Value::String(content_type));
    env.insert("success".to_string(), json!((200..300).contains(&status)));
    env.insert(
        "client_error".to_string(),
        json!((400..500).contains(&status)),
    );
    env.insert(
        "server_error".to_string(),
        json!((500..600).contains(&status)),
    );
    env.insert("is_json".to_string(), json!(is_json));
    env.insert("has_body".to_string(), json!(!response.body.is_empty()));

    if response.graphql {
        let data = body.get("data").cloned().unwrap_or(Value::Null);
        let errors = body.get("errors").cloned().unwrap_or(Value::Null);
        env.insert("data".to_string(), data);
        env.insert("errors".to_string(), errors);
    }

    // Alias object, so expressions may spell out `response.<key>`.
    env.insert("response".to_string(), Value::Object(env.clone()));
    env
}

/// Evaluate `expressions` in bounded parallel and return outcomes in
/// input order.
///
/// Failures never abort the batch: a timeout, evaluation error or panic
/// becomes an `ERROR: <message>` outcome with `success = false`. A
/// result that is not boolean `true` fails the assertion but keeps the
/// expression text.
pub async fn run_asserts(
    evaluator: Arc<dyn AssertEvaluator>,
    expressions: &[String],
    env: &Map<String, Value>,
    config: &ExecutorConfig,
) -> Vec<AssertOutcome> {
    if expressions.is_empty() {
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(config.parallelism_for(expressions.len())));
    let env = Arc::new(env.clone());
    let (results_tx, mut results_rx) = mpsc::channel::<(usize, AssertOutcome)>(expressions.len());
    let per_assert = config.assert_timeout();
    let slow_warn = config.slow_assert_warn();

    for (index, expression) in expressions.iter().cloned().enumerate() {
        let evaluator = evaluator.clone();
        let semaphore = semaphore.clone();
        let env = env.clone();
        let results = results_tx.clone();
        tokio::spawn(async move {
            // Closed semaphore means the batch gave up; just exit.
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            let started = Instant::now();
            let worker = {
                let expression = expression.clone();
                tokio::task::spawn_blocking(move || {
                    evaluator.evaluate(&expression, &env, per_assert)
                })
            };
            let outcome = match tokio::time::timeout(per_assert, worker).await {
                Ok(Ok(Ok(value))) => AssertOutcome {
                    success: value == Value::Bool(true),
                    expression,
                },
                Ok(Ok(Err(err))) => AssertOutcome {
                    expression: format!("ERROR: {}", err),
                    success: false,
                },
                Ok(Err(join_err)) => AssertOutcome {
                    expression: format!("ERROR: evaluator panicked: {}", join_err),
                    success: false,
                },
                Err(_) => AssertOutcome {
                    expression: "ERROR: timeout: assertion deadline expired".to_string(),
                    success: false,
                },
            };
            let elapsed = started.elapsed();
            if elapsed > slow_warn {
                warn!(index, elapsed_ms = elapsed.as_millis() as u64, "slow assertion");
            }
            let _ = results.send((index, outcome)).await;
        });
    }
    drop(results_tx);

    let mut outcomes: Vec<Option<AssertOutcome>> = vec![None; expressions.len()];
    let deadline = tokio::time::sleep(config.assert_batch_timeout());
    tokio::pin!(deadline);
    let mut pending = expressions.len();
    while pending > 0 {
        tokio::select! {
            received = results_rx.recv() => match received {
                Some((index, outcome)) => {
                    outcomes[index] = Some(outcome);
                    pending -= 1;
                }
                None => break,
            },
            _ = &mut deadline => {
                semaphore.close();
                break;
            }
        }
    }

    outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| {
            outcome.unwrap_or_else(|| AssertOutcome {
                expression: format!(
                    "ERROR: timeout: assertion batch deadline expired ({})",
                    index
                ),
                success: false,
            })
        })
        .collect()
}
