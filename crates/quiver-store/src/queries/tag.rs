//! Tag table queries.

use sqlx::SqliteConnection;

use quiver_core::domain::model::Tag;
use quiver_core::{CoreError, Uid};

use crate::connection::map_db_err;

/// Fetch by id.
pub async fn get(conn: &mut SqliteConnection, id: &Uid) -> Result<Tag, CoreError> {
    sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("tag", id))
}

/// All tags of a workspace, oldest first.
pub async fn list_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<Tag>, CoreError> {
    sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE workspace_id = ? ORDER BY id")
        .bind(workspace_id)
        .fetch_all(conn)
        .await
        .map_err(map_db_err)
}

/// Insert a new row.
pub async fn insert(conn: &mut SqliteConnection, tag: &Tag) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO tags (id, workspace_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&tag.id)
    .bind(&tag.workspace_id)
    .bind(&tag.name)
    .bind(tag.created_at)
    .bind(tag.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update mutable columns.
pub async fn update(conn: &mut SqliteConnection, tag: &Tag) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE tags SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&tag.name)
        .bind(tag.updated_at)
        .bind(&tag.id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("tag", &tag.id));
    }
    Ok(())
}

/// Delete by id.
pub async fn delete(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
