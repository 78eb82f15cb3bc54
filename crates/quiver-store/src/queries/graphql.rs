//! GraphQL operation and header queries.

use sqlx::SqliteConnection;

use quiver_core::domain::model::{GraphqlHeader, GraphqlRequest};
use quiver_core::{CoreError, Uid};

use super::placeholders;
use crate::connection::map_db_err;

/// Fetch an operation by id.
pub async fn get_request(
    conn: &mut SqliteConnection,
    id: &Uid,
) -> Result<GraphqlRequest, CoreError> {
    sqlx::query_as::<_, GraphqlRequest>("SELECT * FROM graphql_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("graphql_request", id))
}

/// All operations of a workspace, oldest first.
pub async fn list_requests_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<GraphqlRequest>, CoreError> {
    sqlx::query_as::<_, GraphqlRequest>(
        "SELECT * FROM graphql_requests WHERE workspace_id = ? ORDER BY id",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Insert an operation row.
pub async fn insert_request(
    conn: &mut SqliteConnection,
    req: &GraphqlRequest,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO graphql_requests \
         (id, workspace_id, name, url, query, variables_json, last_run_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&req.id)
    .bind(&req.workspace_id)
    .bind(&req.name)
    .bind(&req.url)
    .bind(&req.query)
    .bind(&req.variables_json)
    .bind(req.last_run_at)
    .bind(req.created_at)
    .bind(req.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update an operation's mutable columns.
pub async fn update_request(
    conn: &mut SqliteConnection,
    req: &GraphqlRequest,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE graphql_requests SET name = ?, url = ?, query = ?, variables_json = ?, \
         last_run_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&req.name)
    .bind(&req.url)
    .bind(&req.query)
    .bind(&req.variables_json)
    .bind(req.last_run_at)
    .bind(req.updated_at)
    .bind(&req.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("graphql_request", &req.id));
    }
    Ok(())
}

/// Delete an operation by id. Headers cascade declaratively; response
/// rows carry no foreign key and are cleared here.
pub async fn delete_request(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM responses WHERE request_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_err)?;
    sqlx::query("DELETE FROM graphql_requests WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch a header by id.
pub async fn get_header(conn: &mut SqliteConnection, id: &Uid) -> Result<GraphqlHeader, CoreError> {
    sqlx::query_as::<_, GraphqlHeader>("SELECT * FROM graphql_headers WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("graphql_header", id))
}

/// Headers of one operation, ascending display order.
pub async fn list_headers_by_request(
    conn: &mut SqliteConnection,
    graphql_id: &Uid,
) -> Result<Vec<GraphqlHeader>, CoreError> {
    sqlx::query_as::<_, GraphqlHeader>(
        "SELECT * FROM graphql_headers WHERE graphql_id = ? ORDER BY sort_priority, id",
    )
    .bind(graphql_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Headers of many operations in one statement.
pub async fn list_headers_by_requests(
    conn: &mut SqliteConnection,
    graphql_ids: &[Uid],
) -> Result<Vec<GraphqlHeader>, CoreError> {
    if graphql_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM graphql_headers WHERE graphql_id IN ({}) ORDER BY sort_priority, id",
        placeholders(graphql_ids.len())
    );
    let mut query = sqlx::query_as::<_, GraphqlHeader>(&sql);
    for id in graphql_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a header row.
pub async fn insert_header(
    conn: &mut SqliteConnection,
    header: &GraphqlHeader,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO graphql_headers \
         (id, graphql_id, key, value, enabled, sort_priority, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&header.id)
    .bind(&header.graphql_id)
    .bind(&header.key)
    .bind(&header.value)
    .bind(header.enabled)
    .bind(header.sort_priority)
    .bind(header.created_at)
    .bind(header.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a header's mutable columns.
pub async fn update_header(
    conn: &mut SqliteConnection,
    header: &GraphqlHeader,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE graphql_headers SET key = ?, value = ?, enabled = ?, sort_priority = ?, \
         updated_at = ? WHERE id = ?",
    )
    .bind(&header.key)
    .bind(&header.value)
    .bind(header.enabled)
    .bind(header.sort_priority)
    .bind(header.updated_at)
    .bind(&header.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("graphql_header", &header.id));
    }
    Ok(())
}

/// Delete a header by id.
pub async fn delete_header(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM graphql_headers WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
