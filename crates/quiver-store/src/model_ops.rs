//! Uniform row operations over every entity type.
//!
//! The mutation pipeline works against [`Model`] so one generic insert
//! and one generic update serve all kinds. Per-type behavior lives in
//! the impls below, each delegating to its table's query functions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use quiver_core::domain::model::{
    EnvVariable, Environment, Flow, FlowEdge, FlowNode, FlowVariable, GraphqlHeader,
    GraphqlRequest, HttpAssert, HttpBodyRaw, HttpKv, HttpRequest, Response, ResponseAssert,
    ResponseHeader, Tag, Workspace, WorkspaceFile, WorkspaceMember,
};
use quiver_core::{CoreError, ModelKind, Uid};

use crate::queries;

/// How an entity hangs off the ownership tree, for workspace resolution
/// and event parent tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// The entity is itself a workspace.
    SelfWorkspace,
    /// The entity stores its workspace directly.
    Workspace(Uid),
    /// The entity's workspace is implied by a parent of the given kind.
    Parent(ModelKind, Uid),
}

/// Storage behavior shared by every entity type.
#[async_trait]
pub trait Model: Serialize + Send + Sync {
    /// Entity kind carried in events.
    fn kind(&self) -> ModelKind;

    /// Entity id.
    fn id(&self) -> &Uid;

    /// Ownership link used to resolve the workspace.
    fn owner(&self) -> Owner;

    /// Whether this row is a delta override of a base row.
    fn is_delta(&self) -> bool {
        false
    }

    /// Bump the mutation timestamp.
    fn touch(&mut self, at: DateTime<Utc>);

    /// Insert this row.
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError>;

    /// Update this row's mutable columns.
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError>;

    /// Delete this row.
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError>;
}

#[async_trait]
impl Model for Workspace {
    fn kind(&self) -> ModelKind {
        ModelKind::Workspace
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::SelfWorkspace
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::workspace::insert(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::workspace::update(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::workspace::delete(conn, &self.id).await
    }
}

#[async_trait]
impl Model for WorkspaceMember {
    fn kind(&self) -> ModelKind {
        ModelKind::WorkspaceMember
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::member::insert(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::member::update(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::member::delete(conn, &self.id).await
    }
}

#[async_trait]
impl Model for Tag {
    fn kind(&self) -> ModelKind {
        ModelKind::Tag
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::tag::insert(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::tag::update(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::tag::delete(conn, &self.id).await
    }
}

#[async_trait]
impl Model for Environment {
    fn kind(&self) -> ModelKind {
        ModelKind::Environment
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::environment::insert(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::environment::update(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::environment::delete(conn, &self.id).await
    }
}

#[async_trait]
impl Model for EnvVariable {
    fn kind(&self) -> ModelKind {
        ModelKind::EnvVariable
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::Environment, self.environment_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::environment::insert_variable(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::environment::update_variable(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::environment::delete_variable(conn, &self.id).await
    }
}

#[async_trait]
impl Model for HttpRequest {
    fn kind(&self) -> ModelKind {
        ModelKind::HttpRequest
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn is_delta(&self) -> bool {
        self.is_delta
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::insert_request(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::update_request(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::delete_request(conn, &self.id).await
    }
}

#[async_trait]
impl Model for HttpKv {
    fn kind(&self) -> ModelKind {
        self.kv_kind.model_kind()
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::HttpRequest, self.http_id.clone())
    }
    fn is_delta(&self) -> bool {
        self.is_delta
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::insert_kv(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::update_kv(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::delete_kv(conn, self.kv_kind, &self.id).await
    }
}

#[async_trait]
impl Model for HttpBodyRaw {
    fn kind(&self) -> ModelKind {
        ModelKind::HttpBodyRaw
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::HttpRequest, self.http_id.clone())
    }
    fn is_delta(&self) -> bool {
        self.is_delta
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::insert_body_raw(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::update_body_raw(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::delete_body_raw(conn, &self.id).await
    }
}

#[async_trait]
impl Model for HttpAssert {
    fn kind(&self) -> ModelKind {
        ModelKind::HttpAssert
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::HttpRequest, self.http_id.clone())
    }
    fn is_delta(&self) -> bool {
        self.is_delta
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::insert_assert(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::update_assert(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::http::delete_assert(conn, &self.id).await
    }
}

#[async_trait]
impl Model for GraphqlRequest {
    fn kind(&self) -> ModelKind {
        ModelKind::GraphqlRequest
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::graphql::insert_request(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::graphql::update_request(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::graphql::delete_request(conn, &self.id).await
    }
}

#[async_trait]
impl Model for GraphqlHeader {
    fn kind(&self) -> ModelKind {
        ModelKind::GraphqlHeader
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::GraphqlRequest, self.graphql_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::graphql::insert_header(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::graphql::update_header(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::graphql::delete_header(conn, &self.id).await
    }
}

#[async_trait]
impl Model for Flow {
    fn kind(&self) -> ModelKind {
        ModelKind::Flow
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::insert_flow(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::update_flow(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::delete_flow(conn, &self.id).await
    }
}

#[async_trait]
impl Model for FlowNode {
    fn kind(&self) -> ModelKind {
        ModelKind::FlowNode
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::Flow, self.flow_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::insert_node(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::update_node(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::delete_node(conn, &self.id).await
    }
}

#[async_trait]
impl Model for FlowEdge {
    fn kind(&self) -> ModelKind {
        ModelKind::FlowEdge
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::Flow, self.flow_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::insert_edge(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::update_edge(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::delete_edge(conn, &self.id).await
    }
}

#[async_trait]
impl Model for FlowVariable {
    fn kind(&self) -> ModelKind {
        ModelKind::FlowVariable
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Parent(ModelKind::Flow, self.flow_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::insert_variable(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::update_variable(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::flow::delete_variable(conn, &self.id).await
    }
}

#[async_trait]
impl Model for WorkspaceFile {
    fn kind(&self) -> ModelKind {
        ModelKind::File
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::file::insert(conn, self).await
    }
    async fn update_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::file::update(conn, self).await
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::file::delete(conn, &self.id).await
    }
}

#[async_trait]
impl Model for Response {
    fn kind(&self) -> ModelKind {
        ModelKind::Response
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::response::insert(conn, self).await
    }
    async fn update_row(&self, _conn: &mut SqliteConnection) -> Result<(), CoreError> {
        Err(CoreError::InvalidArgument(
            "responses are append-only".into(),
        ))
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::response::delete(conn, &self.id).await
    }
}

#[async_trait]
impl Model for ResponseHeader {
    fn kind(&self) -> ModelKind {
        ModelKind::ResponseHeader
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::response::insert_header(conn, self).await
    }
    async fn update_row(&self, _conn: &mut SqliteConnection) -> Result<(), CoreError> {
        Err(CoreError::InvalidArgument(
            "response headers are append-only".into(),
        ))
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::response::delete_header(conn, &self.id).await
    }
}

#[async_trait]
impl Model for ResponseAssert {
    fn kind(&self) -> ModelKind {
        ModelKind::ResponseAssert
    }
    fn id(&self) -> &Uid {
        &self.id
    }
    fn owner(&self) -> Owner {
        Owner::Workspace(self.workspace_id.clone())
    }
    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
    async fn insert_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::response::insert_assert(conn, self).await
    }
    async fn update_row(&self, _conn: &mut SqliteConnection) -> Result<(), CoreError> {
        Err(CoreError::InvalidArgument(
            "assertion records are append-only".into(),
        ))
    }
    async fn delete_row(&self, conn: &mut SqliteConnection) -> Result<(), CoreError> {
        queries::response::delete_assert(conn, &self.id).await
    }
}
