//! HTTP request and child table queries.
//!
//! The four key/value child kinds (headers, params, form items,
//! url-encoded items) share one row shape and one set of statements,
//! parameterized by table name.

use sqlx::SqliteConnection;

use quiver_core::domain::model::{HttpAssert, HttpBodyRaw, HttpKv, HttpKvKind, HttpRequest};
use quiver_core::{CoreError, Uid};

use super::placeholders;
use crate::connection::map_db_err;

/// Fetch a request by id.
pub async fn get_request(conn: &mut SqliteConnection, id: &Uid) -> Result<HttpRequest, CoreError> {
    sqlx::query_as::<_, HttpRequest>("SELECT * FROM http_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("http_request", id))
}

/// All requests of a workspace, oldest first.
pub async fn list_requests_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<HttpRequest>, CoreError> {
    sqlx::query_as::<_, HttpRequest>(
        "SELECT * FROM http_requests WHERE workspace_id = ? ORDER BY id",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Delta entries whose base is one of the given requests.
pub async fn list_deltas_by_requests(
    conn: &mut SqliteConnection,
    base_ids: &[Uid],
) -> Result<Vec<HttpRequest>, CoreError> {
    if base_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM http_requests WHERE parent_http_id IN ({}) ORDER BY id",
        placeholders(base_ids.len())
    );
    let mut query = sqlx::query_as::<_, HttpRequest>(&sql);
    for id in base_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a request row.
pub async fn insert_request(
    conn: &mut SqliteConnection,
    req: &HttpRequest,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO http_requests \
         (id, workspace_id, name, url, method, body_kind, is_delta, parent_http_id, last_run_at, \
          created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&req.id)
    .bind(&req.workspace_id)
    .bind(&req.name)
    .bind(&req.url)
    .bind(&req.method)
    .bind(req.body_kind)
    .bind(req.is_delta)
    .bind(&req.parent_http_id)
    .bind(req.last_run_at)
    .bind(req.created_at)
    .bind(req.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a request's mutable columns.
pub async fn update_request(
    conn: &mut SqliteConnection,
    req: &HttpRequest,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE http_requests SET name = ?, url = ?, method = ?, body_kind = ?, \
         last_run_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&req.name)
    .bind(&req.url)
    .bind(&req.method)
    .bind(req.body_kind)
    .bind(req.last_run_at)
    .bind(req.updated_at)
    .bind(&req.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("http_request", &req.id));
    }
    Ok(())
}

/// Delete a request by id. Child tables cascade declaratively; response
/// rows carry no foreign key (they may also belong to GraphQL requests)
/// and are cleared here.
pub async fn delete_request(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM responses WHERE request_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_err)?;
    sqlx::query("DELETE FROM http_requests WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch a key/value child by id.
pub async fn get_kv(
    conn: &mut SqliteConnection,
    kind: HttpKvKind,
    id: &Uid,
) -> Result<HttpKv, CoreError> {
    let sql = format!("SELECT * FROM {} WHERE id = ?", kind.table());
    sqlx::query_as::<_, HttpKv>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found(kind.model_kind().as_str(), id))
}

/// Children of one request, ascending display order, id tiebreak.
pub async fn list_kv_by_request(
    conn: &mut SqliteConnection,
    kind: HttpKvKind,
    http_id: &Uid,
) -> Result<Vec<HttpKv>, CoreError> {
    let sql = format!(
        "SELECT * FROM {} WHERE http_id = ? ORDER BY sort_priority, id",
        kind.table()
    );
    sqlx::query_as::<_, HttpKv>(&sql)
        .bind(http_id)
        .fetch_all(conn)
        .await
        .map_err(map_db_err)
}

/// Children of many requests in one statement, for the cascade.
pub async fn list_kv_by_requests(
    conn: &mut SqliteConnection,
    kind: HttpKvKind,
    http_ids: &[Uid],
) -> Result<Vec<HttpKv>, CoreError> {
    if http_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM {} WHERE http_id IN ({}) ORDER BY sort_priority, id",
        kind.table(),
        placeholders(http_ids.len())
    );
    let mut query = sqlx::query_as::<_, HttpKv>(&sql);
    for id in http_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a key/value child row.
pub async fn insert_kv(conn: &mut SqliteConnection, kv: &HttpKv) -> Result<(), CoreError> {
    let sql = format!(
        "INSERT INTO {} \
         (id, http_id, kv_kind, key, value, enabled, sort_priority, is_delta, parent_id, \
          delta_key, delta_key_set, delta_value, delta_value_set, delta_enabled, \
          delta_enabled_set, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        kv.kv_kind.table()
    );
    sqlx::query(&sql)
        .bind(&kv.id)
        .bind(&kv.http_id)
        .bind(kv.kv_kind)
        .bind(&kv.key)
        .bind(&kv.value)
        .bind(kv.enabled)
        .bind(kv.sort_priority)
        .bind(kv.is_delta)
        .bind(&kv.parent_id)
        .bind(&kv.delta_key)
        .bind(kv.delta_key_set)
        .bind(&kv.delta_value)
        .bind(kv.delta_value_set)
        .bind(kv.delta_enabled)
        .bind(kv.delta_enabled_set)
        .bind(kv.created_at)
        .bind(kv.updated_at)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Update a key/value child's mutable columns.
pub async fn update_kv(conn: &mut SqliteConnection, kv: &HttpKv) -> Result<(), CoreError> {
    let sql = format!(
        "UPDATE {} SET key = ?, value = ?, enabled = ?, sort_priority = ?, \
         delta_key = ?, delta_key_set = ?, delta_value = ?, delta_value_set = ?, \
         delta_enabled = ?, delta_enabled_set = ?, updated_at = ? WHERE id = ?",
        kv.kv_kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(&kv.key)
        .bind(&kv.value)
        .bind(kv.enabled)
        .bind(kv.sort_priority)
        .bind(&kv.delta_key)
        .bind(kv.delta_key_set)
        .bind(&kv.delta_value)
        .bind(kv.delta_value_set)
        .bind(kv.delta_enabled)
        .bind(kv.delta_enabled_set)
        .bind(kv.updated_at)
        .bind(&kv.id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found(kv.kv_kind.model_kind().as_str(), &kv.id));
    }
    Ok(())
}

/// Delete a key/value child by id.
pub async fn delete_kv(
    conn: &mut SqliteConnection,
    kind: HttpKvKind,
    id: &Uid,
) -> Result<(), CoreError> {
    let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
    sqlx::query(&sql)
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch a raw body by id.
pub async fn get_body_raw(conn: &mut SqliteConnection, id: &Uid) -> Result<HttpBodyRaw, CoreError> {
    sqlx::query_as::<_, HttpBodyRaw>("SELECT * FROM http_body_raws WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("http_body_raw", id))
}

/// The raw body of one request, if any.
pub async fn body_raw_by_request(
    conn: &mut SqliteConnection,
    http_id: &Uid,
) -> Result<Option<HttpBodyRaw>, CoreError> {
    sqlx::query_as::<_, HttpBodyRaw>("SELECT * FROM http_body_raws WHERE http_id = ? LIMIT 1")
        .bind(http_id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)
}

/// Raw bodies of many requests in one statement.
pub async fn list_body_raws_by_requests(
    conn: &mut SqliteConnection,
    http_ids: &[Uid],
) -> Result<Vec<HttpBodyRaw>, CoreError> {
    if http_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM http_body_raws WHERE http_id IN ({}) ORDER BY id",
        placeholders(http_ids.len())
    );
    let mut query = sqlx::query_as::<_, HttpBodyRaw>(&sql);
    for id in http_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a raw body row.
pub async fn insert_body_raw(
    conn: &mut SqliteConnection,
    raw: &HttpBodyRaw,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO http_body_raws \
         (id, http_id, content, content_type, is_delta, parent_id, delta_content, \
          delta_content_set, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&raw.id)
    .bind(&raw.http_id)
    .bind(&raw.content)
    .bind(&raw.content_type)
    .bind(raw.is_delta)
    .bind(&raw.parent_id)
    .bind(&raw.delta_content)
    .bind(raw.delta_content_set)
    .bind(raw.created_at)
    .bind(raw.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a raw body's mutable columns.
pub async fn update_body_raw(
    conn: &mut SqliteConnection,
    raw: &HttpBodyRaw,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE http_body_raws SET content = ?, content_type = ?, delta_content = ?, \
         delta_content_set = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&raw.content)
    .bind(&raw.content_type)
    .bind(&raw.delta_content)
    .bind(raw.delta_content_set)
    .bind(raw.updated_at)
    .bind(&raw.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("http_body_raw", &raw.id));
    }
    Ok(())
}

/// Delete a raw body by id.
pub async fn delete_body_raw(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM http_body_raws WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch a template assertion by id.
pub async fn get_assert(conn: &mut SqliteConnection, id: &Uid) -> Result<HttpAssert, CoreError> {
    sqlx::query_as::<_, HttpAssert>("SELECT * FROM http_asserts WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("http_assert", id))
}

/// Assertions of one request, ascending display order.
pub async fn list_asserts_by_request(
    conn: &mut SqliteConnection,
    http_id: &Uid,
) -> Result<Vec<HttpAssert>, CoreError> {
    sqlx::query_as::<_, HttpAssert>(
        "SELECT * FROM http_asserts WHERE http_id = ? ORDER BY sort_priority, id",
    )
    .bind(http_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Assertions of many requests in one statement.
pub async fn list_asserts_by_requests(
    conn: &mut SqliteConnection,
    http_ids: &[Uid],
) -> Result<Vec<HttpAssert>, CoreError> {
    if http_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM http_asserts WHERE http_id IN ({}) ORDER BY sort_priority, id",
        placeholders(http_ids.len())
    );
    let mut query = sqlx::query_as::<_, HttpAssert>(&sql);
    for id in http_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a template assertion row.
pub async fn insert_assert(conn: &mut SqliteConnection, a: &HttpAssert) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO http_asserts \
         (id, http_id, expression, enabled, sort_priority, is_delta, parent_id, \
          delta_expression, delta_expression_set, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&a.id)
    .bind(&a.http_id)
    .bind(&a.expression)
    .bind(a.enabled)
    .bind(a.sort_priority)
    .bind(a.is_delta)
    .bind(&a.parent_id)
    .bind(&a.delta_expression)
    .bind(a.delta_expression_set)
    .bind(a.created_at)
    .bind(a.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a template assertion's mutable columns.
pub async fn update_assert(conn: &mut SqliteConnection, a: &HttpAssert) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE http_asserts SET expression = ?, enabled = ?, sort_priority = ?, \
         delta_expression = ?, delta_expression_set = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&a.expression)
    .bind(a.enabled)
    .bind(a.sort_priority)
    .bind(&a.delta_expression)
    .bind(a.delta_expression_set)
    .bind(a.updated_at)
    .bind(&a.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("http_assert", &a.id));
    }
    Ok(())
}

/// Delete a template assertion by id.
pub async fn delete_assert(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM http_asserts WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
