//! Captured response queries. Responses and their children are
//! append-only; updates are limited to touching timestamps on the
//! response row itself.

use sqlx::SqliteConnection;

use quiver_core::domain::model::{Response, ResponseAssert, ResponseHeader};
use quiver_core::{CoreError, Uid};

use super::placeholders;
use crate::connection::map_db_err;

/// Fetch a response by id.
pub async fn get(conn: &mut SqliteConnection, id: &Uid) -> Result<Response, CoreError> {
    sqlx::query_as::<_, Response>("SELECT * FROM responses WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("response", id))
}

/// Responses of one request, newest first.
pub async fn list_by_request(
    conn: &mut SqliteConnection,
    request_id: &Uid,
) -> Result<Vec<Response>, CoreError> {
    sqlx::query_as::<_, Response>("SELECT * FROM responses WHERE request_id = ? ORDER BY id DESC")
        .bind(request_id)
        .fetch_all(conn)
        .await
        .map_err(map_db_err)
}

/// Responses of many requests in one statement, for the cascade.
pub async fn list_by_requests(
    conn: &mut SqliteConnection,
    request_ids: &[Uid],
) -> Result<Vec<Response>, CoreError> {
    if request_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM responses WHERE request_id IN ({}) ORDER BY id",
        placeholders(request_ids.len())
    );
    let mut query = sqlx::query_as::<_, Response>(&sql);
    for id in request_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// All responses of a workspace, for the workspace cascade.
pub async fn list_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<Response>, CoreError> {
    sqlx::query_as::<_, Response>("SELECT * FROM responses WHERE workspace_id = ? ORDER BY id")
        .bind(workspace_id)
        .fetch_all(conn)
        .await
        .map_err(map_db_err)
}

/// Insert a response row.
pub async fn insert(conn: &mut SqliteConnection, resp: &Response) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO responses \
         (id, request_id, workspace_id, status, body, duration_ms, size, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&resp.id)
    .bind(&resp.request_id)
    .bind(&resp.workspace_id)
    .bind(resp.status)
    .bind(&resp.body)
    .bind(resp.duration_ms)
    .bind(resp.size)
    .bind(resp.created_at)
    .bind(resp.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Delete a response by id. Headers and assertion records cascade.
pub async fn delete(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM responses WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Headers of one response, insertion order.
pub async fn list_headers_by_response(
    conn: &mut SqliteConnection,
    response_id: &Uid,
) -> Result<Vec<ResponseHeader>, CoreError> {
    sqlx::query_as::<_, ResponseHeader>(
        "SELECT * FROM response_headers WHERE response_id = ? ORDER BY id",
    )
    .bind(response_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Headers of many responses in one statement.
pub async fn list_headers_by_responses(
    conn: &mut SqliteConnection,
    response_ids: &[Uid],
) -> Result<Vec<ResponseHeader>, CoreError> {
    if response_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM response_headers WHERE response_id IN ({}) ORDER BY id",
        placeholders(response_ids.len())
    );
    let mut query = sqlx::query_as::<_, ResponseHeader>(&sql);
    for id in response_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a response header row.
pub async fn insert_header(
    conn: &mut SqliteConnection,
    header: &ResponseHeader,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO response_headers \
         (id, response_id, workspace_id, key, value, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&header.id)
    .bind(&header.response_id)
    .bind(&header.workspace_id)
    .bind(&header.key)
    .bind(&header.value)
    .bind(header.created_at)
    .bind(header.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Delete a response header by id.
pub async fn delete_header(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM response_headers WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Assertion records of one response, insertion order.
pub async fn list_asserts_by_response(
    conn: &mut SqliteConnection,
    response_id: &Uid,
) -> Result<Vec<ResponseAssert>, CoreError> {
    sqlx::query_as::<_, ResponseAssert>(
        "SELECT * FROM response_asserts WHERE response_id = ? ORDER BY id",
    )
    .bind(response_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Assertion records of many responses in one statement.
pub async fn list_asserts_by_responses(
    conn: &mut SqliteConnection,
    response_ids: &[Uid],
) -> Result<Vec<ResponseAssert>, CoreError> {
    if response_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM response_asserts WHERE response_id IN ({}) ORDER BY id",
        placeholders(response_ids.len())
    );
    let mut query = sqlx::query_as::<_, ResponseAssert>(&sql);
    for id in response_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert an assertion record row.
pub async fn insert_assert(
    conn: &mut SqliteConnection,
    record: &ResponseAssert,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO response_asserts \
         (id, response_id, workspace_id, expression, success, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.response_id)
    .bind(&record.workspace_id)
    .bind(&record.expression)
    .bind(record.success)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Delete an assertion record by id.
pub async fn delete_assert(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM response_asserts WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
