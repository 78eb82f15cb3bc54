//! Flow graph queries: flows, nodes, edges and flow variables.

use sqlx::SqliteConnection;

use quiver_core::domain::model::{Flow, FlowEdge, FlowNode, FlowVariable};
use quiver_core::{CoreError, Uid};

use super::placeholders;
use crate::connection::map_db_err;

/// Fetch a flow by id.
pub async fn get_flow(conn: &mut SqliteConnection, id: &Uid) -> Result<Flow, CoreError> {
    sqlx::query_as::<_, Flow>("SELECT * FROM flows WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("flow", id))
}

/// All flows of a workspace, oldest first.
pub async fn list_flows_by_workspace(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
) -> Result<Vec<Flow>, CoreError> {
    sqlx::query_as::<_, Flow>("SELECT * FROM flows WHERE workspace_id = ? ORDER BY id")
        .bind(workspace_id)
        .fetch_all(conn)
        .await
        .map_err(map_db_err)
}

/// Insert a flow row.
pub async fn insert_flow(conn: &mut SqliteConnection, flow: &Flow) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO flows (id, workspace_id, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&flow.id)
    .bind(&flow.workspace_id)
    .bind(&flow.name)
    .bind(flow.created_at)
    .bind(flow.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a flow's mutable columns.
pub async fn update_flow(conn: &mut SqliteConnection, flow: &Flow) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE flows SET name = ?, updated_at = ? WHERE id = ?")
        .bind(&flow.name)
        .bind(flow.updated_at)
        .bind(&flow.id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("flow", &flow.id));
    }
    Ok(())
}

/// Delete a flow by id.
pub async fn delete_flow(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM flows WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch a node by id.
pub async fn get_node(conn: &mut SqliteConnection, id: &Uid) -> Result<FlowNode, CoreError> {
    sqlx::query_as::<_, FlowNode>("SELECT * FROM flow_nodes WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("flow_node", id))
}

/// Nodes of many flows in one statement.
pub async fn list_nodes_by_flows(
    conn: &mut SqliteConnection,
    flow_ids: &[Uid],
) -> Result<Vec<FlowNode>, CoreError> {
    if flow_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM flow_nodes WHERE flow_id IN ({}) ORDER BY id",
        placeholders(flow_ids.len())
    );
    let mut query = sqlx::query_as::<_, FlowNode>(&sql);
    for id in flow_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a node row.
pub async fn insert_node(conn: &mut SqliteConnection, node: &FlowNode) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO flow_nodes (id, flow_id, node_kind, config_json, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&node.id)
    .bind(&node.flow_id)
    .bind(node.node_kind)
    .bind(&node.config_json)
    .bind(node.created_at)
    .bind(node.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update a node's mutable columns.
pub async fn update_node(conn: &mut SqliteConnection, node: &FlowNode) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE flow_nodes SET node_kind = ?, config_json = ?, updated_at = ? WHERE id = ?",
    )
    .bind(node.node_kind)
    .bind(&node.config_json)
    .bind(node.updated_at)
    .bind(&node.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("flow_node", &node.id));
    }
    Ok(())
}

/// Delete a node by id.
pub async fn delete_node(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM flow_nodes WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch an edge by id.
pub async fn get_edge(conn: &mut SqliteConnection, id: &Uid) -> Result<FlowEdge, CoreError> {
    sqlx::query_as::<_, FlowEdge>("SELECT * FROM flow_edges WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("flow_edge", id))
}

/// Edges of many flows in one statement.
pub async fn list_edges_by_flows(
    conn: &mut SqliteConnection,
    flow_ids: &[Uid],
) -> Result<Vec<FlowEdge>, CoreError> {
    if flow_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM flow_edges WHERE flow_id IN ({}) ORDER BY id",
        placeholders(flow_ids.len())
    );
    let mut query = sqlx::query_as::<_, FlowEdge>(&sql);
    for id in flow_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert an edge row.
pub async fn insert_edge(conn: &mut SqliteConnection, edge: &FlowEdge) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO flow_edges (id, flow_id, source_id, target_id, handle, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&edge.id)
    .bind(&edge.flow_id)
    .bind(&edge.source_id)
    .bind(&edge.target_id)
    .bind(edge.handle)
    .bind(edge.created_at)
    .bind(edge.updated_at)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    Ok(())
}

/// Update an edge's mutable columns.
pub async fn update_edge(conn: &mut SqliteConnection, edge: &FlowEdge) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE flow_edges SET source_id = ?, target_id = ?, handle = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&edge.source_id)
    .bind(&edge.target_id)
    .bind(edge.handle)
    .bind(edge.updated_at)
    .bind(&edge.id)
    .execute(conn)
    .await
    .map_err(map_db_err)?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found("flow_edge", &edge.id));
    }
    Ok(())
}

/// Delete an edge by id.
pub async fn delete_edge(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM flow_edges WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}

/// Fetch a flow variable by id.
pub async fn get_variable(
    conn: &mut SqliteConnection,
    id: &Uid,
) -> Result<FlowVariable, CoreError> {
    sqlx::query_as::<_, FlowVariable>("SELECT * FROM flow_variables WHERE id = ?")
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| CoreError::not_found("flow_variable", id))
}

/// Variables of many flows in one statement.
pub async fn list_variables_by_flows(
    conn: &mut SqliteConnection,
    flow_ids: &[Uid],
) -> Result<Vec<FlowVariable>, CoreError> {
    if flow_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM flow_variables WHERE flow_id IN ({}) ORDER BY id",
        placeholders(flow_ids.len())
    );
    let mut query = sqlx::query_as::<_, FlowVariable>(&sql);
    for id in flow_ids {
        query = query.bind(id);
    }
    query.fetch_all(conn).await.map_err(map_db_err)
}

/// Insert a flow variable row.
pub async fn insert_variable(
    conn: &mut SqliteConnection,
    var: &FlowVariable,
) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO flow_variables (id, flow_id, key, value, enabled, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&var.id)
    .bind(&var.flow_id)
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

/// Update a flow variable's mutable columns.
pub async fn update_variable(
    conn: &mut SqliteConnection,
    var: &FlowVariable,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        "UPDATE flow_variables SET key = ?, value = ?, enabled = ?, updated_at = ? WHERE id = ?",
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
        return Err(CoreError::not_found("flow_variable", &var.id));
    }
    Ok(())
}

/// Delete a flow variable by id.
pub async fn delete_variable(conn: &mut SqliteConnection, id: &Uid) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM flow_variables WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(map_db_err)?;
    Ok(())
}
