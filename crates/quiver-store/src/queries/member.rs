//! Workspace membership queries.

use sqlx::SqliteConnection;

use quiver_core::domain::model::WorkspaceMember;
use quiver_core::{CoreError, Uid};

use crate::connection::map_db_err;

/// Fetch by id.
pub async fn get(conn: &mut SqliteConnection, id: &Uid) -> Result<WorkspaceMember, CoreError> {
    sqlx::query_as::<_, WorkspaceMember>("SELECT * FROM workspace_members WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("workspace_member", id))
}

/// The membership row for (workspace, user), if any.
pub async fn find(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
    user_id: &Uid,
) -> Result<Option<WorkspaceMember>, CoreError> {
    sqlx::query_as::<_, WorkspaceMember>(
        "SELECT * FROM workspace_members WHERE workspace_id = ? AND user_id = ?",
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await
    .map_err(map_db_err)
}

/// All memberships of a workspace, oldest first.
pub async fn list_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<WorkspaceMember>, CoreError> {
    sqlx::query_as::<_, WorkspaceMember>(
        "SELECT * FROM workspace_members WHERE workspace_id = ? ORDER BY id",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Insert a new row.
pub async fn insert(conn: &mut SqliteConnection, m: &WorkspaceMember) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO workspace_members (id, workspace_id, user_id, role, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&m.id)
    .bind(&m.workspace_id)
    .bind(&m.user_id)
    .bind(m.role)
    .bind(m.created_at)
    .bind(m.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update mutable columns.
pub async fn update(conn: &mut SqliteConnection, m: &WorkspaceMember) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE workspace_members SET role = ?, updated_at = ? WHERE id = ?")
        .bind(m.role)
        .bind(m.updated_at)
        .bind(&m.id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("workspace_member", &m.id));
    }
    Ok(())
}

/// Delete by id.
pub async fn delete(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM workspace_members WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
