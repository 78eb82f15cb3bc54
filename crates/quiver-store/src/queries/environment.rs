//! Environment and variable table queries.

use sqlx::SqliteConnection;

use quiver_core::domain::model::{EnvVariable, Environment};
use quiver_core::{CoreError, Uid};

use super::placeholders;
use crate::connection::map_db_err;

/// Fetch by id.
pub async fn get(conn: &mut SqliteConnection, id: &Uid) -> Result<Environment, CoreError> {
    sqlx::query_as::<_, Environment>("SELECT * FROM environments WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("environment", id))
}

/// All environments of a workspace, oldest first.
pub async fn list_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<Environment>, CoreError> {
    sqlx::query_as::<_, Environment>(
        "SELECT * FROM environments WHERE workspace_id = ? ORDER BY id",
    )
    .bind(workspace_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// The workspace's designated global environment.
pub async fn global_for_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Environment, CoreError> {
    sqlx::query_as::<_, Environment>(
        "SELECT * FROM environments WHERE workspace_id = ? AND is_global = 1 ORDER BY id LIMIT 1",
    )
    .bind(workspace_id)
    .fetch_optional(conn)
    .await
    .map_err(map_db_err)?
    .ok_or_else(|| CoreError::not_found("global environment for workspace", workspace_id))
}

/// Insert a new row.
pub async fn insert(conn: &mut SqliteConnection, env: &Environment) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO environments (id, workspace_id, name, is_global, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&env.id)
    .bind(&env.workspace_id)
    .bind(&env.name)
    .bind(env.is_global)
    .bind(env.created_at)
    .bind(env.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update mutable columns.
pub async fn update(conn: &mut SqliteConnection, env: &Environment) -> Result<(), CoreError> {
    let result =
        sqlx::query("UPDATE environments SET name = ?, is_global = ?, updated_at = ? WHERE id = ?")
            .bind(&env.name)
            .bind(env.is_global)
            .bind(env.updated_at)
            .bind(&env.id)
            .execute(conn)
            .await
            .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("environment", &env.id));
    }
    Ok(())
}

/// Delete by id.
pub async fn delete(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM environments WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch a variable by id.
pub async fn get_variable(conn: &mut SqliteConnection, id: &Uid) -> Result<EnvVariable, CoreError> {
    sqlx::query_as::<_, EnvVariable>("SELECT * FROM env_variables WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("env_variable", id))
}

/// All variables of one environment, oldest first.
pub async fn list_variables(
    conn: &mut SqliteConnection,
    environment_id: &Uid,
) -> Result<Vec<EnvVariable>, CoreError> {
    sqlx::query_as::<_, EnvVariable>(
        "SELECT * FROM env_variables WHERE environment_id = ? ORDER BY id",
    )
    .bind(environment_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Enabled variables of one environment, oldest first. Duplicate-key
/// lookups resolve to the enabled row because disabled rows never appear
/// here.
pub async fn enabled_variables(
    conn: &mut SqliteConnection,
    environment_id: &Uid,
) -> Result<Vec<EnvVariable>, CoreError> {
    sqlx::query_as::<_, EnvVariable>(
        "SELECT * FROM env_variables WHERE environment_id = ? AND enabled = 1 ORDER BY id",
    )
    .bind(environment_id)
    .fetch_all(conn)
    .await
    .map_err(map_db_err)
}

/// Variables of many environments in one statement, for the cascade.
pub async fn list_variables_by_environments(
    conn: &mut SqliteConnection,
    environment_ids: &[Uid],
) -> Result<Vec<EnvVariable>, CoreError> {
    if environment_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM env_variables WHERE environment_id IN ({}) ORDER BY id",
        placeholders(environment_ids.len())
    );
    let mut query = sqlx::query_as::<_, EnvVariable>(&sql);
    for id in environment_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a variable row.
pub async fn insert_variable(
    conn: &mut SqliteConnection,
    var: &EnvVariable,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO env_variables (id, environment_id, key, value, enabled, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&var.id)
    .bind(&var.environment_id)
    .bind(&var.key)
    .bind(&var.value)
    .bind(var.enabled)
    .bind(var.created_at)
    .bind(var.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a variable's mutable columns.
pub async fn update_variable(
    conn: &mut SqliteConnection,
    var: &EnvVariable,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE env_variables SET key = ?, value = ?, enabled = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&var.key)
    .bind(&var.value)
    .bind(var.enabled)
    .bind(var.updated_at)
    .bind(&var.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("env_variable", &var.id));
    }
    Ok(())
}

/// Delete a variable by id.
pub async fn delete_variable(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM env_variables WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
