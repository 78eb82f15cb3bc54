//! Pipeline and cascade behavior against an in-memory database.

use serde_json::json;

use quiver_core::domain::model::{
    Environment, EnvVariable, FileContentKind, HttpKv, HttpKvKind, HttpRequest, MemberRole, Tag,
    Workspace, WorkspaceFile, WorkspaceMember,
};
use quiver_core::{Ctx, FieldPatch, ModelKind, MutationEvent, Op, Uid};
use quiver_store::Store;
use quiver_sync::MutationPipeline;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn pipeline() -> (Store, MutationPipeline) {
    init_tracing();
    let store = Store::in_memory().await.unwrap();
    let pipe = MutationPipeline::new(store.clone(), None, None);
    (store, pipe)
}

fn position(events: &[MutationEvent], kind: ModelKind, op: Op, id: &Uid) -> usize {
    events
        .iter()
        .position(|e| e.kind == kind && e.op == op && &e.model_id == id)
        .unwrap_or_else(|| panic!("no {:?} {:?} event for {}", kind, op, id))
}

/// Seed a workspace whose creator holds the owner role.
async fn seed_workspace(pipe: &mut MutationPipeline, user: &Uid) -> Workspace {
    let ctx = Ctx::for_user(user.clone());
    let ws = Workspace::new("cascade-ws");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &ws).await.unwrap();
    pipe.insert(
        &ctx,
        &WorkspaceMember::new(ws.id.clone(), user.clone(), MemberRole::Owner),
    )
    .await
    .unwrap();
    pipe.commit().await.unwrap();
    ws
}

#[tokio::test]
async fn test_workspace_cascade_orders_children_before_parents() {
    let (_store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let http = HttpRequest::new(ws.id.clone(), "list users", "GET", "http://srv/users");
    let h1 = HttpKv::new(http.id.clone(), HttpKvKind::Header, "Accept", "text/plain");
    let h2 = HttpKv::new(http.id.clone(), HttpKvKind::Header, "X-Token", "abc");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &http).await.unwrap();
    pipe.insert(&ctx, &h1).await.unwrap();
    pipe.insert(&ctx, &h2).await.unwrap();
    pipe.commit().await.unwrap();

    pipe.begin().await.unwrap();
    pipe.delete_workspace(&ctx, &ws.id).await.unwrap();
    let events = pipe.commit().await.unwrap();

    let p_h1 = position(&events, ModelKind::HttpHeader, Op::Delete, &h1.id);
    let p_h2 = position(&events, ModelKind::HttpHeader, Op::Delete, &h2.id);
    let p_http = position(&events, ModelKind::HttpRequest, Op::Delete, &http.id);
    let p_ws = position(&events, ModelKind::Workspace, Op::Delete, &ws.id);
    assert!(p_h1 < p_http && p_h2 < p_http, "headers precede their entry");
    assert!(p_http < p_ws, "entry precedes the workspace");
    assert_eq!(p_ws, events.len() - 1, "workspace event is last");

    // Every cascade child event carries the parent's workspace.
    assert!(events.iter().all(|e| e.workspace_id == ws.id));
}

#[tokio::test]
async fn test_file_owned_http_delete_routes_through_file() {
    let (store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let http = HttpRequest::new(ws.id.clone(), "owned", "GET", "http://srv/");
    let header = HttpKv::new(http.id.clone(), HttpKvKind::Header, "Accept", "*/*");
    let file = WorkspaceFile::new(
        ws.id.clone(),
        Some(http.id.clone()),
        FileContentKind::Http,
        "owned.http",
    );
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &http).await.unwrap();
    pipe.insert(&ctx, &header).await.unwrap();
    pipe.insert(&ctx, &file).await.unwrap();
    pipe.commit().await.unwrap();

    pipe.begin().await.unwrap();
    pipe.delete_http_request(&ctx, &http.id).await.unwrap();
    let events = pipe.commit().await.unwrap();

    let p_header = position(&events, ModelKind::HttpHeader, Op::Delete, &header.id);
    let p_http = position(&events, ModelKind::HttpRequest, Op::Delete, &http.id);
    let p_file = position(&events, ModelKind::File, Op::Delete, &file.id);
    assert!(p_header < p_http);
    assert!(p_http < p_file, "content event precedes the file's");

    assert!(store.file_for_content(&http.id).await.unwrap().is_none());
    assert!(store.get_http_request(&http.id).await.is_err());
}

#[tokio::test]
async fn test_batch_delete_groups_children_by_parent() {
    let (_store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let first = HttpRequest::new(ws.id.clone(), "first", "GET", "http://srv/1");
    let second = HttpRequest::new(ws.id.clone(), "second", "GET", "http://srv/2");
    let c1 = HttpKv::new(first.id.clone(), HttpKvKind::Param, "page", "1");
    let c2 = HttpKv::new(second.id.clone(), HttpKvKind::Param, "page", "2");
    pipe.begin().await.unwrap();
    pipe.insert_batch(&ctx, &[first.clone(), second.clone()])
        .await
        .unwrap();
    pipe.insert_batch(&ctx, &[c1.clone(), c2.clone()]).await.unwrap();
    pipe.commit().await.unwrap();

    pipe.begin().await.unwrap();
    pipe.delete_http_requests(&ctx, &[first.id.clone(), second.id.clone()])
        .await
        .unwrap();
    let events = pipe.commit().await.unwrap();

    let p_c1 = position(&events, ModelKind::HttpParam, Op::Delete, &c1.id);
    let p_first = position(&events, ModelKind::HttpRequest, Op::Delete, &first.id);
    let p_c2 = position(&events, ModelKind::HttpParam, Op::Delete, &c2.id);
    let p_second = position(&events, ModelKind::HttpRequest, Op::Delete, &second.id);
    assert!(p_c1 < p_first, "each parent follows its own children");
    assert!(p_c2 < p_second);
    assert!(p_first < p_c2, "batch is grouped per parent");
}

#[tokio::test]
async fn test_batch_delete_tags_events_per_entity_workspace() {
    let (store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws_a = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let ws_b = Workspace::new("other-ws");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &ws_b).await.unwrap();
    pipe.insert(
        &ctx,
        &WorkspaceMember::new(ws_b.id.clone(), user.clone(), MemberRole::Owner),
    )
    .await
    .unwrap();
    pipe.commit().await.unwrap();

    let in_a = HttpRequest::new(ws_a.id.clone(), "a", "GET", "http://srv/a");
    let in_b = HttpRequest::new(ws_b.id.clone(), "b", "GET", "http://srv/b");
    let child_b = HttpKv::new(in_b.id.clone(), HttpKvKind::Header, "Accept", "text/plain");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &in_a).await.unwrap();
    pipe.insert(&ctx, &in_b).await.unwrap();
    pipe.insert(&ctx, &child_b).await.unwrap();
    pipe.commit().await.unwrap();

    pipe.begin().await.unwrap();
    pipe.delete_http_requests(&ctx, &[in_a.id.clone(), in_b.id.clone()])
        .await
        .unwrap();
    let events = pipe.commit().await.unwrap();

    for event in &events {
        let expected = if event.model_id == in_a.id {
            &ws_a.id
        } else {
            &ws_b.id
        };
        assert_eq!(
            &event.workspace_id, expected,
            "{:?} {} must carry its own entity's workspace",
            event.kind, event.model_id
        );
    }
    let p_child = position(&events, ModelKind::HttpHeader, Op::Delete, &child_b.id);
    let p_b = position(&events, ModelKind::HttpRequest, Op::Delete, &in_b.id);
    assert!(p_child < p_b, "children still precede their entry");

    assert!(matches!(
        store.get_http_request(&in_b.id).await,
        Err(quiver_core::CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_environment_cascade_and_child_parent_tagging() {
    let (_store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let env = Environment::new(ws.id.clone(), "global", true);
    let var = EnvVariable::new(env.id.clone(), "token", "s3cret");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &env).await.unwrap();
    pipe.insert(&ctx, &var).await.unwrap();
    pipe.commit().await.unwrap();

    pipe.begin().await.unwrap();
    pipe.delete_environment(&ctx, &env.id).await.unwrap();
    let events = pipe.commit().await.unwrap();

    let p_var = position(&events, ModelKind::EnvVariable, Op::Delete, &var.id);
    let p_env = position(&events, ModelKind::Environment, Op::Delete, &env.id);
    assert!(p_var < p_env);
    assert_eq!(events[p_var].parent_id.as_ref(), Some(&env.id));
    assert_eq!(events[p_var].workspace_id, ws.id);
}

#[tokio::test]
async fn test_update_events_carry_post_image_and_patch() {
    let (_store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let mut tag = Tag::new(ws.id.clone(), "draft");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &tag).await.unwrap();
    tag.name = "review".to_string();
    pipe.update(&ctx, &mut tag, json!({"name": "review"}))
        .await
        .unwrap();
    tag.name = "done".to_string();
    pipe.update(&ctx, &mut tag, json!({"name": "done"}))
        .await
        .unwrap();
    let events = pipe.commit().await.unwrap();

    let updates: Vec<&MutationEvent> = events.iter().filter(|e| e.op == Op::Update).collect();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].payload["name"], "review");
    assert_eq!(updates[1].payload["name"], "done");
    assert_eq!(updates[0].patch.as_ref().unwrap()["name"], "review");
    assert_eq!(updates[1].patch.as_ref().unwrap()["name"], "done");
}

#[tokio::test]
async fn test_delta_override_update_emits_three_valued_patch() {
    let (_store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let http = HttpRequest::new(ws.id.clone(), "login", "POST", "http://srv/login");
    let base = HttpKv::new(http.id.clone(), HttpKvKind::Header, "Accept", "text/plain");
    let mut delta = HttpKv::new(http.id.clone(), HttpKvKind::Header, "", "");
    delta.is_delta = true;
    delta.parent_id = Some(base.id.clone());
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &http).await.unwrap();
    pipe.insert(&ctx, &base).await.unwrap();
    pipe.insert(&ctx, &delta).await.unwrap();
    pipe.commit().await.unwrap();

    pipe.begin().await.unwrap();
    let patch = delta.apply_overrides(
        FieldPatch::Keep,
        FieldPatch::Set("application/json".to_string()),
        FieldPatch::Clear,
    );
    pipe.update(&ctx, &mut delta, patch).await.unwrap();
    let events = pipe.commit().await.unwrap();

    let update = events
        .iter()
        .find(|e| e.op == Op::Update && e.model_id == delta.id)
        .unwrap();
    assert!(update.is_delta);
    let patch = update.patch.as_ref().unwrap();
    assert_eq!(patch["delta_value"], "application/json");
    assert_eq!(patch["delta_enabled"], json!(null));
    assert!(
        patch.get("delta_key").is_none(),
        "kept fields stay out of the patch"
    );
    assert_eq!(update.payload["delta_value"], "application/json");
}

#[tokio::test]
async fn test_insert_then_delete_in_one_transaction_emits_both() {
    let (_store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let tag = Tag::new(ws.id.clone(), "ephemeral");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &tag).await.unwrap();
    pipe.delete_tag(&ctx, &tag.id).await.unwrap();
    let events = pipe.commit().await.unwrap();

    let tag_events: Vec<&MutationEvent> =
        events.iter().filter(|e| e.model_id == tag.id).collect();
    assert_eq!(tag_events.len(), 2);
    assert_eq!(tag_events[0].op, Op::Insert);
    assert_eq!(tag_events[1].op, Op::Delete);
}

#[tokio::test]
async fn test_workspace_delete_requires_owner_role() {
    let (_store, mut pipe) = pipeline().await;
    let owner = Uid::generate();
    let ws = seed_workspace(&mut pipe, &owner).await;

    let viewer = Uid::generate();
    let ctx_owner = Ctx::for_user(owner.clone());
    pipe.begin().await.unwrap();
    pipe.insert(
        &ctx_owner,
        &WorkspaceMember::new(ws.id.clone(), viewer.clone(), MemberRole::Viewer),
    )
    .await
    .unwrap();
    pipe.commit().await.unwrap();

    let ctx_viewer = Ctx::for_user(viewer);
    pipe.begin().await.unwrap();
    let err = pipe.delete_workspace(&ctx_viewer, &ws.id).await.unwrap_err();
    assert!(matches!(err, quiver_core::CoreError::PermissionDenied(_)));
    pipe.rollback().await.unwrap();
}

#[tokio::test]
async fn test_rollback_drops_log_and_writes() {
    let (store, mut pipe) = pipeline().await;
    let ctx = Ctx::internal();

    let ws = Workspace::new("discarded");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &ws).await.unwrap();
    assert_eq!(pipe.log().len(), 1);
    pipe.rollback().await.unwrap();

    assert!(pipe.log().is_empty());
    assert!(store.get_workspace(&ws.id).await.is_err());
}

#[tokio::test]
async fn test_delta_entry_rides_its_base_cascade() {
    let (_store, mut pipe) = pipeline().await;
    let user = Uid::generate();
    let ws = seed_workspace(&mut pipe, &user).await;
    let ctx = Ctx::for_user(user.clone());

    let base = HttpRequest::new(ws.id.clone(), "base", "GET", "http://srv/");
    let mut delta = HttpRequest::new(ws.id.clone(), "base (delta)", "GET", "http://srv/");
    delta.is_delta = true;
    delta.parent_http_id = Some(base.id.clone());
    let delta_header = HttpKv::new(delta.id.clone(), HttpKvKind::Header, "Accept", "*/*");
    pipe.begin().await.unwrap();
    pipe.insert(&ctx, &base).await.unwrap();
    pipe.insert(&ctx, &delta).await.unwrap();
    pipe.insert(&ctx, &delta_header).await.unwrap();
    pipe.commit().await.unwrap();

    pipe.begin().await.unwrap();
    pipe.delete_http_request(&ctx, &base.id).await.unwrap();
    let events = pipe.commit().await.unwrap();

    let p_dh = position(&events, ModelKind::HttpHeader, Op::Delete, &delta_header.id);
    let p_delta = position(&events, ModelKind::HttpRequest, Op::Delete, &delta.id);
    let p_base = position(&events, ModelKind::HttpRequest, Op::Delete, &base.id);
    assert!(p_dh < p_delta, "delta's children precede the delta entry");
    assert!(p_delta < p_base, "delta entries precede their base");
    assert!(events[p_delta].is_delta);
}
