//! The mutation pipeline: one storage transaction, one event log, one
//! post-commit publication.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use quiver_core::domain::model::{
    FileContentKind, HttpKvKind, HttpRequest, MemberRole, WorkspaceFile,
};
use quiver_core::{CoreError, Ctx, MutationEvent, Op, Uid};
use quiver_store::{queries, Model, Owner, Store, StoreTx};

use crate::cascade;
use crate::recorder::ReplayRecorder;
use crate::streamer::EventStreamer;

/// Transaction-scoped mutation unit.
///
/// Typed operations write through the open transaction and append to the
/// event log; parent deletes synthesize child events via the cascade
/// helpers before their own. Nothing is published until [`commit`]
/// succeeds, and a publisher that cannot keep up never delays it.
///
/// [`commit`]: MutationPipeline::commit
pub struct MutationPipeline {
    store: Store,
    streamer: Option<Arc<EventStreamer>>,
    recorder: Option<ReplayRecorder>,
    tx: Option<StoreTx>,
    log: Vec<MutationEvent>,
}

impl MutationPipeline {
    /// New pipeline over a store, optionally publishing to a streamer and
    /// appending to a replay recorder on commit.
    pub fn new(
        store: Store,
        streamer: Option<Arc<EventStreamer>>,
        recorder: Option<ReplayRecorder>,
    ) -> Self {
        Self {
            store,
            streamer,
            recorder,
            tx: None,
            log: Vec::new(),
        }
    }

    /// Open the transaction. At most one may be open per pipeline.
    pub async fn begin(&mut self) -> Result<(), CoreError> {
        if self.tx.is_some() {
            return Err(CoreError::InvalidArgument(
                "transaction already open".to_string(),
            ));
        }
        self.tx = Some(self.store.begin().await?);
        Ok(())
    }

    fn tx(&mut self) -> Result<&mut StoreTx, CoreError> {
        self.tx
            .as_mut()
            .ok_or_else(|| CoreError::Internal("no open transaction".to_string()))
    }

    /// Transaction plus log, split so the cascade helpers can append
    /// while reading through the same connection.
    fn parts(&mut self) -> Result<(&mut StoreTx, &mut Vec<MutationEvent>), CoreError> {
        match self.tx.as_mut() {
            Some(tx) => Ok((tx, &mut self.log)),
            None => Err(CoreError::Internal("no open transaction".to_string())),
        }
    }

    /// Events collected so far, in call order.
    pub fn log(&self) -> &[MutationEvent] {
        &self.log
    }

    async fn workspace_for<M: Model>(&mut self, model: &M) -> Result<Uid, CoreError> {
        match model.owner() {
            Owner::SelfWorkspace => Ok(model.id().clone()),
            Owner::Workspace(ws) => Ok(ws),
            Owner::Parent(kind, pid) => queries::workspace_of(self.tx()?.conn(), kind, &pid).await,
        }
    }

    /// Insert a row and track an `Insert` event with the full post-image.
    pub async fn insert<M: Model>(&mut self, ctx: &Ctx, model: &M) -> Result<(), CoreError> {
        ctx.check_live()?;
        let workspace_id = self.workspace_for(model).await?;
        model.insert_row(self.tx()?.conn()).await?;
        self.log
            .push(cascade::build_event(model, Op::Insert, workspace_id, None)?);
        Ok(())
    }

    /// Insert several rows; events preserve submission order.
    pub async fn insert_batch<M: Model>(
        &mut self,
        ctx: &Ctx,
        models: &[M],
    ) -> Result<(), CoreError> {
        if models.is_empty() {
            return Err(CoreError::InvalidArgument("empty batch".to_string()));
        }
        for model in models {
            self.insert(ctx, model).await?;
        }
        Ok(())
    }

    /// Update a row and track an `Update` event carrying the post-image
    /// plus the caller's sparse patch. The patch reflects the caller's
    /// intent, so an update to the current value still propagates.
    pub async fn update<M: Model>(
        &mut self,
        ctx: &Ctx,
        model: &mut M,
        patch: serde_json::Value,
    ) -> Result<(), CoreError> {
        ctx.check_live()?;
        model.touch(Utc::now());
        let workspace_id = self.workspace_for(model).await?;
        model.update_row(self.tx()?.conn()).await?;
        self.log.push(cascade::build_event(
            model,
            Op::Update,
            workspace_id,
            Some(patch),
        )?);
        Ok(())
    }

    async fn delete_leaf<M: Model>(&mut self, ctx: &Ctx, model: &M) -> Result<(), CoreError> {
        ctx.check_live()?;
        let workspace_id = self.workspace_for(model).await?;
        model.delete_row(self.tx()?.conn()).await?;
        self.log
            .push(cascade::build_event(model, Op::Delete, workspace_id, None)?);
        Ok(())
    }

    /// Delete an environment variable.
    pub async fn delete_env_variable(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let var = queries::environment::get_variable(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &var).await
    }

    /// Delete an HTTP key/value child of the given kind.
    pub async fn delete_http_kv(
        &mut self,
        ctx: &Ctx,
        kind: HttpKvKind,
        id: &Uid,
    ) -> Result<(), CoreError> {
        let kv = queries::http::get_kv(self.tx()?.conn(), kind, id).await?;
        self.delete_leaf(ctx, &kv).await
    }

    /// Delete a raw body.
    pub async fn delete_http_body_raw(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let raw = queries::http::get_body_raw(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &raw).await
    }

    /// Delete a template assertion.
    pub async fn delete_http_assert(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let assert = queries::http::get_assert(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &assert).await
    }

    /// Delete a GraphQL header.
    pub async fn delete_graphql_header(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let header = queries::graphql::get_header(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &header).await
    }

    /// Delete a flow node.
    pub async fn delete_flow_node(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let node = queries::flow::get_node(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &node).await
    }

    /// Delete a flow edge.
    pub async fn delete_flow_edge(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let edge = queries::flow::get_edge(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &edge).await
    }

    /// Delete a flow variable.
    pub async fn delete_flow_variable(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let var = queries::flow::get_variable(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &var).await
    }

    /// Delete a tag.
    pub async fn delete_tag(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let tag = queries::tag::get(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &tag).await
    }

    /// Delete a workspace membership.
    pub async fn delete_member(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        let member = queries::member::get(self.tx()?.conn(), id).await?;
        self.delete_leaf(ctx, &member).await
    }

    /// Delete a captured response with its headers and assertion records.
    pub async fn delete_response(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        ctx.check_live()?;
        let response = queries::response::get(self.tx()?.conn(), id).await?;
        let workspace_id = response.workspace_id.clone();
        let headers =
            queries::response::list_headers_by_response(self.tx()?.conn(), &response.id).await?;
        for header in headers {
            self.log.push(cascade::build_event(
                &header,
                Op::Delete,
                workspace_id.clone(),
                None,
            )?);
        }
        let records =
            queries::response::list_asserts_by_response(self.tx()?.conn(), &response.id).await?;
        for record in records {
            self.log.push(cascade::build_event(
                &record,
                Op::Delete,
                workspace_id.clone(),
                None,
            )?);
        }
        response.delete_row(self.tx()?.conn()).await?;
        self.log.push(cascade::build_event(
            &response,
            Op::Delete,
            workspace_id,
            None,
        )?);
        Ok(())
    }

    /// Delete an environment and its variables.
    pub async fn delete_environment(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        ctx.check_live()?;
        let environment = queries::environment::get(self.tx()?.conn(), id).await?;
        let workspace_id = environment.workspace_id.clone();
        let (tx, log) = self.parts()?;
        cascade::environment_delete_events(
            tx.conn(),
            &workspace_id,
            std::slice::from_ref(&environment),
            log,
        )
        .await?;
        queries::environment::delete(self.tx()?.conn(), id).await?;
        Ok(())
    }

    /// Delete an HTTP entry. If a file record owns the entry the delete
    /// is rerouted through [`delete_file`], so the file disappears with
    /// its content.
    ///
    /// [`delete_file`]: MutationPipeline::delete_file
    pub async fn delete_http_request(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        ctx.check_live()?;
        if let Some(file) = queries::file::for_content(self.tx()?.conn(), id).await? {
            debug!(file_id = %file.id, "http delete rerouted through owning file");
            return self.delete_file(ctx, &file.id).await;
        }
        self.delete_http_content(id).await
    }

    /// Batch HTTP delete: file-owned entries route through their files,
    /// the rest share one set of cascade batch reads.
    pub async fn delete_http_requests(&mut self, ctx: &Ctx, ids: &[Uid]) -> Result<(), CoreError> {
        ctx.check_live()?;
        if ids.is_empty() {
            return Err(CoreError::InvalidArgument("empty batch".to_string()));
        }
        let mut direct = Vec::new();
        for id in ids {
            match queries::file::for_content(self.tx()?.conn(), id).await? {
                Some(file) => self.delete_file(ctx, &file.id).await?,
                None => direct.push(queries::http::get_request(self.tx()?.conn(), id).await?),
            }
        }
        if direct.is_empty() {
            return Ok(());
        }
        // Every event carries its own entity's workspace, so the shared
        // batch reads run once per workspace in first-seen order.
        let mut groups: Vec<(Uid, Vec<HttpRequest>)> = Vec::new();
        for request in direct {
            match groups.iter().position(|(ws, _)| ws == &request.workspace_id) {
                Some(i) => groups[i].1.push(request),
                None => groups.push((request.workspace_id.clone(), vec![request])),
            }
        }
        for (workspace_id, members) in &groups {
            let (tx, log) = self.parts()?;
            cascade::http_delete_events(tx.conn(), workspace_id, members, log).await?;
            for request in members {
                queries::http::delete_request(self.tx()?.conn(), &request.id).await?;
            }
        }
        Ok(())
    }

    // Content deletes are deliberately private: the file path calls into
    // them and they never call back out to the file path, so the cascade
    // cannot cycle.
    async fn delete_http_content(&mut self, id: &Uid) -> Result<(), CoreError> {
        let request = queries::http::get_request(self.tx()?.conn(), id).await?;
        let workspace_id = request.workspace_id.clone();
        let (tx, log) = self.parts()?;
        cascade::http_delete_events(
            tx.conn(),
            &workspace_id,
            std::slice::from_ref(&request),
            log,
        )
        .await?;
        queries::http::delete_request(self.tx()?.conn(), id).await?;
        Ok(())
    }

    async fn delete_flow_content(&mut self, id: &Uid) -> Result<(), CoreError> {
        let flow = queries::flow::get_flow(self.tx()?.conn(), id).await?;
        let workspace_id = flow.workspace_id.clone();
        let (tx, log) = self.parts()?;
        cascade::flow_delete_events(tx.conn(), &workspace_id, std::slice::from_ref(&flow), log)
            .await?;
        queries::flow::delete_flow(self.tx()?.conn(), id).await?;
        Ok(())
    }

    /// Delete a GraphQL entry with headers and captured responses.
    pub async fn delete_graphql_request(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        ctx.check_live()?;
        let request = queries::graphql::get_request(self.tx()?.conn(), id).await?;
        let workspace_id = request.workspace_id.clone();
        let (tx, log) = self.parts()?;
        cascade::graphql_delete_events(
            tx.conn(),
            &workspace_id,
            std::slice::from_ref(&request),
            log,
        )
        .await?;
        queries::graphql::delete_request(self.tx()?.conn(), id).await?;
        Ok(())
    }

    /// Delete a flow. File-owned flows are rerouted through their file.
    pub async fn delete_flow(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        ctx.check_live()?;
        if let Some(file) = queries::file::for_content(self.tx()?.conn(), id).await? {
            debug!(file_id = %file.id, "flow delete rerouted through owning file");
            return self.delete_file(ctx, &file.id).await;
        }
        self.delete_flow_content(id).await
    }

    /// Delete a file record. Content the file owns is deleted first (with
    /// its full cascade), then the file itself.
    pub async fn delete_file(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        ctx.check_live()?;
        let file = queries::file::get(self.tx()?.conn(), id).await?;
        if let Some(content_id) = &file.content_id {
            match file.content_kind {
                FileContentKind::Http | FileContentKind::HttpDelta => {
                    self.delete_http_content(content_id).await?;
                }
                FileContentKind::Flow => {
                    self.delete_flow_content(content_id).await?;
                }
                FileContentKind::Folder => {}
            }
        }
        self.delete_file_record(&file).await
    }

    async fn delete_file_record(&mut self, file: &WorkspaceFile) -> Result<(), CoreError> {
        queries::file::delete(self.tx()?.conn(), &file.id).await?;
        self.log.push(cascade::build_event(
            file,
            Op::Delete,
            file.workspace_id.clone(),
            None,
        )?);
        Ok(())
    }

    /// Delete a workspace and everything it owns. Requires the caller to
    /// hold the owner role, unless the context carries no user at all
    /// (internal maintenance paths).
    pub async fn delete_workspace(&mut self, ctx: &Ctx, id: &Uid) -> Result<(), CoreError> {
        ctx.check_live()?;
        let workspace = queries::workspace::get(self.tx()?.conn(), id).await?;
        if let Some(user_id) = &ctx.user_id {
            let member = queries::member::find(self.tx()?.conn(), id, user_id).await?;
            if !matches!(member, Some(ref m) if m.role == MemberRole::Owner) {
                return Err(CoreError::PermissionDenied(
                    "workspace delete requires the owner role".to_string(),
                ));
            }
        }
        let (tx, log) = self.parts()?;
        cascade::workspace_delete_events(tx.conn(), id, log).await?;
        queries::workspace::delete(self.tx()?.conn(), id).await?;
        self.log.push(cascade::build_event(
            &workspace,
            Op::Delete,
            workspace.id.clone(),
            None,
        )?);
        Ok(())
    }

    /// Commit: replay-recorder append, transaction commit, then event
    /// publication. A failed commit leaves the log in place for the
    /// caller to inspect; nothing is published. On success the published
    /// log is returned and the pipeline is ready for a new `begin`.
    pub async fn commit(&mut self) -> Result<Vec<MutationEvent>, CoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| CoreError::Internal("commit without open transaction".to_string()))?;
        if let Some(recorder) = &self.recorder {
            recorder.append(&self.log);
        }
        tx.commit().await?;
        info!(events = self.log.len(), "mutation committed");
        if let Some(streamer) = &self.streamer {
            streamer.publish(&self.log);
        }
        Ok(std::mem::take(&mut self.log))
    }

    /// Roll back: the transaction is discarded and the log dropped.
    pub async fn rollback(&mut self) -> Result<(), CoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| CoreError::Internal("rollback without open transaction".to_string()))?;
        tx.rollback().await?;
        self.log.clear();
        Ok(())
    }
}
