//! Navigational file record queries.

use sqlx::SqliteConnection;

use quiver_core::domain::model::WorkspaceFile;
use quiver_core::{CoreError, Uid};

use crate::connection::map_db_err;

/// Fetch a file record by id.
pub async fn get(conn: &mut SqliteConnection, id: &Uid) -> Result<WorkspaceFile, CoreError> {
    sqlx::query_as::<_, WorkspaceFile>("SELECT * FROM files WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("file", id))
}

/// All file records of a workspace, ascending display order.
pub async fn list_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<WorkspaceFile>, CoreError> {
    sqlx::query_as::<_, WorkspaceFile>(
        "SELECT * FROM files WHERE workspace_id = ? ORDER BY sort_priority, id",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// The file record pointing at a content entity, if one exists.
pub async fn for_content(
    conn: &mut SqliteConnection,
    content_id: &Uid,
) -> Result<Option<WorkspaceFile>, CoreError> {
    sqlx::query_as::<_, WorkspaceFile>("SELECT * FROM files WHERE content_id = ?")
        .bind(content_id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)
}

/// Insert a file record.
pub async fn insert(conn: &mut SqliteConnection, file: &WorkspaceFile) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO files \
         (id, workspace_id, content_id, content_kind, name, sort_priority, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&file.id)
    .bind(&file.workspace_id)
    .bind(&file.content_id)
    .bind(file.content_kind)
    .bind(&file.name)
    .bind(file.sort_priority)
    .bind(file.created_at)
    .bind(file.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a file record's mutable columns.
pub async fn update(conn: &mut SqliteConnection, file: &WorkspaceFile) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE files SET name = ?, sort_priority = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&file.name)
    .bind(file.sort_priority)
    .bind(file.updated_at)
    .bind(&file.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("file", &file.id));
    }
    Ok(())
}

/// Delete a file record by id.
pub async fn delete(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
