//! Per-table query functions.
//!
//! Every function takes `&mut SqliteConnection`, so the same code serves
//! the pool view and the transaction view. Batch variants take a slice of
//! parent ids and return all children in one statement, which is what
//! keeps the delete cascade at O(child-kinds) reads.

use sqlx::SqliteConnection;

use quiver_core::{CoreError, ModelKind, Uid};

use crate::connection::map_db_err;

pub mod environment;
pub mod file;
pub mod flow;
pub mod graphql;
pub mod http;
pub mod member;
pub mod response;
pub mod tag;
pub mod workspace;

/// `?, ?, ...` for an IN clause of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    let mut out = String::with_capacity(n * 3);
    for i in 0..n {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

/// Resolve the workspace of a parent entity, used to tag child events.
///
/// Children do not store their workspace (it is implied by their parent),
/// so the pipeline asks the parent row. Only kinds that can own children
/// appear here.
pub async fn workspace_of(
    conn: &mut SqliteConnection,
    kind: ModelKind,
    id: &Uid,
) -> Result<Uid, CoreError> {
    let table = match kind {
        ModelKind::Workspace => return Ok(id.clone()),
        ModelKind::Environment => "environments",
        ModelKind::HttpRequest => "http_requests",
        ModelKind::GraphqlRequest => "graphql_requests",
        ModelKind::Flow => "flows",
        ModelKind::File => "files",
        ModelKind::Response => "responses",
        other => {
            return Err(CoreError::Internal(format!(
                "{} cannot own children",
                other.as_str()
            )))
        }
    };
    let sql = format!("SELECT workspace_id FROM {} WHERE id = ?", table);
    let workspace_id: Uid = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found(kind.as_str(), id))?;
    Ok(workspace_id)
}
