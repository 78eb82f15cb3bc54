//! Workspace table queries.

use sqlx::SqliteConnection;

use quiver_core::domain::model::Workspace;
use quiver_core::{CoreError, Uid};

use crate::connection::map_db_err;

/// Fetch by id.
pub async fn get(conn: &mut SqliteConnection, id: &Uid) -> Result<Workspace, CoreError> {
    sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("workspace", id))
}

/// Insert a new row.
pub async fn insert(conn: &mut SqliteConnection, ws: &Workspace) -> Result<(), CoreError> {
    sqlx::query("INSERT INTO workspaces (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
        .bind(&ws.id)
        .bind(&ws.name)
        .bind(ws.created_at)
        .bind(ws.updated_at)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Update mutable columns.
pub async fn update(conn: &mut SqliteConnection, ws: &Workspace) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE workspaces SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&ws.name)
        .bind(ws.updated_at)
        .bind(&ws.id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("workspace", &ws.id));
    }
    Ok(())
}

/// Delete by id. The engine's declarative cascade removes owned rows;
/// response rows carry no foreign key and are cleared here.
pub async fn delete(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM responses WHERE workspace_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_err)?;
    sqlx::query("DELETE FROM workspaces WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
