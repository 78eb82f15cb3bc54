//! Delete-event synthesis for parent entities.
//!
//! The storage engine removes child rows declaratively; the pipeline is
//! still responsible for telling subscribers about every one of them.
//! These helpers batch-read each child kind once per delete (so a parent
//! with N descendants costs O(child-kinds) reads), group the synthesized
//! events by parent, and append them to the pipeline's log with every
//! child event ahead of its parent's.

use std::collections::HashMap;

use sqlx::SqliteConnection;

use quiver_core::domain::model::{Environment, Flow, GraphqlRequest, HttpKvKind, HttpRequest};
use quiver_core::{CoreError, MutationEvent, Op, Uid};
use quiver_store::{queries, Model, Owner};

/// Build one event for a model, resolving parent linkage from its owner.
pub(crate) fn build_event<M: Model>(
    model: &M,
    op: Op,
    workspace_id: Uid,
    patch: Option<serde_json::Value>,
) -> Result<MutationEvent, CoreError> {
    let parent_id = match model.owner() {
        Owner::Parent(_, pid) => Some(pid),
        Owner::SelfWorkspace | Owner::Workspace(_) => None,
    };
    Ok(MutationEvent {
        kind: model.kind(),
        op,
        workspace_id,
        model_id: model.id().clone(),
        parent_id,
        is_delta: model.is_delta(),
        payload: serde_json::to_value(model)?,
        patch,
    })
}

fn delete_event<M: Model>(model: &M, workspace_id: &Uid) -> Result<MutationEvent, CoreError> {
    build_event(model, Op::Delete, workspace_id.clone(), None)
}

/// Delete events for captured responses of the given requests, grouped by
/// request id. Each response's header and assertion-record events precede
/// the response's own event.
async fn response_events_by_request(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
    request_ids: &[Uid],
) -> Result<HashMap<Uid, Vec<MutationEvent>>, CoreError> {
    let responses = queries::response::list_by_requests(conn, request_ids).await?;
    let response_ids: Vec<Uid> = responses.iter().map(|r| r.id.clone()).collect();

    let mut children: HashMap<Uid, Vec<MutationEvent>> = HashMap::new();
    for header in queries::response::list_headers_by_responses(conn, &response_ids).await? {
        let event = delete_event(&header, workspace_id)?;
        children.entry(header.response_id).or_default().push(event);
    }
    for record in queries::response::list_asserts_by_responses(conn, &response_ids).await? {
        let event = delete_event(&record, workspace_id)?;
        children.entry(record.response_id).or_default().push(event);
    }

    let mut by_request: HashMap<Uid, Vec<MutationEvent>> = HashMap::new();
    for response in responses {
        let slot = by_request.entry(response.request_id.clone()).or_default();
        if let Some(events) = children.remove(&response.id) {
            slot.extend(events);
        }
        slot.push(delete_event(&response, workspace_id)?);
    }
    Ok(by_request)
}

/// Append delete events for the given HTTP entries and everything they
/// own: key/value children, raw bodies, template assertions, captured
/// responses, and delta entries based on them (with their own children).
pub(crate) async fn http_delete_events(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
    bases: &[HttpRequest],
    log: &mut Vec<MutationEvent>,
) -> Result<(), CoreError> {
    let base_ids: Vec<Uid> = bases.iter().map(|r| r.id.clone()).collect();
    let deltas = queries::http::list_deltas_by_requests(conn, &base_ids).await?;

    let mut all_ids = base_ids;
    all_ids.extend(deltas.iter().map(|r| r.id.clone()));

    let mut children: HashMap<Uid, Vec<MutationEvent>> = HashMap::new();
    for kind in HttpKvKind::all() {
        for row in queries::http::list_kv_by_requests(conn, kind, &all_ids).await? {
            let event = delete_event(&row, workspace_id)?;
            children.entry(row.http_id).or_default().push(event);
        }
    }
    for row in queries::http::list_body_raws_by_requests(conn, &all_ids).await? {
        let event = delete_event(&row, workspace_id)?;
        children.entry(row.http_id).or_default().push(event);
    }
    for row in queries::http::list_asserts_by_requests(conn, &all_ids).await? {
        let event = delete_event(&row, workspace_id)?;
        children.entry(row.http_id).or_default().push(event);
    }
    for (request_id, events) in response_events_by_request(conn, workspace_id, &all_ids).await? {
        children.entry(request_id).or_default().extend(events);
    }

    let mut deltas_by_base: HashMap<Uid, Vec<HttpRequest>> = HashMap::new();
    for delta in deltas {
        if let Some(base_id) = delta.parent_http_id.clone() {
            deltas_by_base.entry(base_id).or_default().push(delta);
        }
    }

    for base in bases {
        for delta in deltas_by_base.remove(&base.id).unwrap_or_default() {
            if let Some(events) = children.remove(&delta.id) {
                log.extend(events);
            }
            log.push(delete_event(&delta, workspace_id)?);
        }
        if let Some(events) = children.remove(&base.id) {
            log.extend(events);
        }
        log.push(delete_event(base, workspace_id)?);
    }
    Ok(())
}

/// Append delete events for GraphQL operations, their headers and their
/// captured responses.
pub(crate) async fn graphql_delete_events(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
    requests: &[GraphqlRequest],
    log: &mut Vec<MutationEvent>,
) -> Result<(), CoreError> {
    let ids: Vec<Uid> = requests.iter().map(|r| r.id.clone()).collect();

    let mut children: HashMap<Uid, Vec<MutationEvent>> = HashMap::new();
    for header in queries::graphql::list_headers_by_requests(conn, &ids).await? {
        let event = delete_event(&header, workspace_id)?;
        children.entry(header.graphql_id).or_default().push(event);
    }
    for (request_id, events) in response_events_by_request(conn, workspace_id, &ids).await? {
        children.entry(request_id).or_default().extend(events);
    }

    for request in requests {
        if let Some(events) = children.remove(&request.id) {
            log.extend(events);
        }
        log.push(delete_event(request, workspace_id)?);
    }
    Ok(())
}

/// Append delete events for flows and their nodes, edges and variables.
pub(crate) async fn flow_delete_events(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
    flows: &[Flow],
    log: &mut Vec<MutationEvent>,
) -> Result<(), CoreError> {
    let ids: Vec<Uid> = flows.iter().map(|f| f.id.clone()).collect();

    let mut children: HashMap<Uid, Vec<MutationEvent>> = HashMap::new();
    for node in queries::flow::list_nodes_by_flows(conn, &ids).await? {
        let event = delete_event(&node, workspace_id)?;
        children.entry(node.flow_id).or_default().push(event);
    }
    for edge in queries::flow::list_edges_by_flows(conn, &ids).await? {
        let event = delete_event(&edge, workspace_id)?;
        children.entry(edge.flow_id).or_default().push(event);
    }
    for var in queries::flow::list_variables_by_flows(conn, &ids).await? {
        let event = delete_event(&var, workspace_id)?;
        children.entry(var.flow_id).or_default().push(event);
    }

    for flow in flows {
        if let Some(events) = children.remove(&flow.id) {
            log.extend(events);
        }
        log.push(delete_event(flow, workspace_id)?);
    }
    Ok(())
}

/// Append delete events for environments and their variables.
pub(crate) async fn environment_delete_events(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
    environments: &[Environment],
    log: &mut Vec<MutationEvent>,
) -> Result<(), CoreError> {
    let ids: Vec<Uid> = environments.iter().map(|e| e.id.clone()).collect();

    let mut children: HashMap<Uid, Vec<MutationEvent>> = HashMap::new();
    for var in queries::environment::list_variables_by_environments(conn, &ids).await? {
        let event = delete_event(&var, workspace_id)?;
        children
            .entry(var.environment_id.clone())
            .or_default()
            .push(event);
    }

    for environment in environments {
        if let Some(events) = children.remove(&environment.id) {
            log.extend(events);
        }
        log.push(delete_event(environment, workspace_id)?);
    }
    Ok(())
}

/// Append delete events for everything a workspace owns: the two-level
/// walk over first-class entries with per-kind recursion, then single
/// events for the leaf kinds (files, tags, memberships). The caller
/// appends the workspace's own event after these.
pub(crate) async fn workspace_delete_events(
    conn: &mut SqliteConnection,
    workspace_id: &Uid,
    log: &mut Vec<MutationEvent>,
) -> Result<(), CoreError> {
    let environments = queries::environment::list_by_workspace(conn, workspace_id).await?;
    environment_delete_events(conn, workspace_id, &environments, log).await?;

    // Delta entries ride along with their base in the per-kind cascade.
    let http_entries = queries::http::list_requests_by_workspace(conn, workspace_id).await?;
    let bases: Vec<HttpRequest> = http_entries.into_iter().filter(|r| !r.is_delta).collect();
    http_delete_events(conn, workspace_id, &bases, log).await?;

    let graphql_entries = queries::graphql::list_requests_by_workspace(conn, workspace_id).await?;
    graphql_delete_events(conn, workspace_id, &graphql_entries, log).await?;

    let flows = queries::flow::list_flows_by_workspace(conn, workspace_id).await?;
    flow_delete_events(conn, workspace_id, &flows, log).await?;

    for file in queries::file::list_by_workspace(conn, workspace_id).await? {
        log.push(delete_event(&file, workspace_id)?);
    }
    for tag in queries::tag::list_by_workspace(conn, workspace_id).await? {
        log.push(delete_event(&tag, workspace_id)?);
    }
    for member in queries::member::list_by_workspace(conn, workspace_id).await? {
        log.push(delete_event(&member, workspace_id)?);
    }
    Ok(())
}
