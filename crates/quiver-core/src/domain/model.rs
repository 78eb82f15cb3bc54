use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::ModelKind;
use crate::domain::id::Uid;
use crate::domain::patch::FieldPatch;

/// Body shape of a stored HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BodyKind {
    /// No request body
    NoBody,
    /// Raw bytes with an optional content type
    Raw,
    /// Multipart form items
    Form,
    /// URL-encoded key/value items
    UrlEncoded,
}

/// Which key/value child table an [`HttpKv`] row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum HttpKvKind {
    /// Request header
    Header,
    /// Query string parameter
    Param,
    /// Multipart form item
    FormItem,
    /// URL-encoded body item
    UrlEncodedItem,
}

impl HttpKvKind {
    /// The entity kind rows of this table carry in events.
    pub fn model_kind(&self) -> ModelKind {
        match self {
            HttpKvKind::Header => ModelKind::HttpHeader,
            HttpKvKind::Param => ModelKind::HttpParam,
            HttpKvKind::FormItem => ModelKind::HttpFormItem,
            HttpKvKind::UrlEncodedItem => ModelKind::HttpUrlEncodedItem,
        }
    }

    /// Storage table for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            HttpKvKind::Header => "http_headers",
            HttpKvKind::Param => "http_params",
            HttpKvKind::FormItem => "http_form_items",
            HttpKvKind::UrlEncodedItem => "http_url_encoded_items",
        }
    }

    /// All four kinds in cascade-schema order.
    pub fn all() -> [HttpKvKind; 4] {
        [
            HttpKvKind::Header,
            HttpKvKind::Param,
            HttpKvKind::FormItem,
            HttpKvKind::UrlEncodedItem,
        ]
    }
}

/// Variant of a flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum FlowNodeKind {
    /// No-op pass-through
    Noop,
    /// Run a stored HTTP request
    HttpCall,
    /// User-provided script
    Javascript,
    /// Counted loop
    ForCount,
    /// Iterate a sequence
    ForEach,
    /// Branch on a condition
    Condition,
}

/// Handle an edge leaves its source node through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EdgeHandle {
    /// Plain sequencing
    Default,
    /// Condition true branch
    Then,
    /// Condition false branch
    Else,
    /// Loop body entry
    Loop,
}

/// Content a file record points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FileContentKind {
    /// Pure folder, no content row
    Folder,
    /// HTTP request
    Http,
    /// HTTP delta request
    HttpDelta,
    /// Flow
    Flow,
}

/// Role of a user inside a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MemberRole {
    /// Full control, may delete the workspace
    Owner,
    /// May mutate content
    Editor,
    /// Read-only
    Viewer,
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Root of a tenancy. Owns everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    /// Entity id
    pub id: Uid,
    /// Display name
    pub name: String,
    /// Creation time, immutable
    pub created_at: DateTime<Utc>,
    /// Last mutation time, monotonically increasing
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    /// New workspace with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            name: name.into(),
            created_at: t,
            updated_at: t,
        }
    }
}

/// Named bag of variables scoped to a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Environment {
    /// Entity id
    pub id: Uid,
    /// Owning workspace
    pub workspace_id: Uid,
    /// Display name
    pub name: String,
    /// Whether this is the workspace's default ("global") environment
    pub is_global: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Environment {
    /// New environment with a fresh id.
    pub fn new(workspace_id: Uid, name: impl Into<String>, is_global: bool) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            workspace_id,
            name: name.into(),
            is_global,
            created_at: t,
            updated_at: t,
        }
    }
}

/// One (key, value, enabled) variable row inside an environment.
///
/// Keys are unique among enabled rows; on duplicate keys the enabled row
/// wins at lookup time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvVariable {
    /// Entity id
    pub id: Uid,
    /// Owning environment
    pub environment_id: Uid,
    /// Variable name
    pub key: String,
    /// Variable value
    pub value: String,
    /// Disabled rows are skipped when building variable maps
    pub enabled: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl EnvVariable {
    /// New enabled variable with a fresh id.
    pub fn new(environment_id: Uid, key: impl Into<String>, value: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            environment_id,
            key: key.into(),
            value: value.into(),
            enabled: true,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Stored HTTP request definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HttpRequest {
    /// Entity id
    pub id: Uid,
    /// Owning workspace
    pub workspace_id: Uid,
    /// Display name
    pub name: String,
    /// Request URL, may contain `{{ name }}` placeholders
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Body shape
    pub body_kind: BodyKind,
    /// Whether this entry is a delta override of another entry
    pub is_delta: bool,
    /// Base entry when `is_delta` is set
    pub parent_http_id: Option<Uid>,
    /// Time of the most recent execution
    pub last_run_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl HttpRequest {
    /// New request with a fresh id and no body.
    pub fn new(
        workspace_id: Uid,
        name: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            workspace_id,
            name: name.into(),
            url: url.into(),
            method: method.into(),
            body_kind: BodyKind::NoBody,
            is_delta: false,
            parent_http_id: None,
            last_run_at: None,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Key/value child of an HTTP request: header, query param, form item or
/// URL-encoded item, distinguished by [`HttpKvKind`].
///
/// Delta rows (`is_delta`) point at their base row via `parent_id` and
/// override fields through the three-valued `delta_*` column pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HttpKv {
    /// Entity id
    pub id: Uid,
    /// Owning HTTP request
    pub http_id: Uid,
    /// Which child table this row lives in
    pub kv_kind: HttpKvKind,
    /// Key
    pub key: String,
    /// Value
    pub value: String,
    /// Disabled rows are skipped when building outbound requests
    pub enabled: bool,
    /// Display order, sort ascending
    pub sort_priority: f64,
    /// Whether this row is a delta override
    pub is_delta: bool,
    /// Base row of the same kind when `is_delta` is set
    pub parent_id: Option<Uid>,
    /// Key override value
    pub delta_key: Option<String>,
    /// Whether the key override is set at all
    pub delta_key_set: bool,
    /// Value override value
    pub delta_value: Option<String>,
    /// Whether the value override is set at all
    pub delta_value_set: bool,
    /// Enabled override value
    pub delta_enabled: Option<bool>,
    /// Whether the enabled override is set at all
    pub delta_enabled_set: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl HttpKv {
    /// New enabled row with a fresh id and default ordering.
    pub fn new(
        http_id: Uid,
        kv_kind: HttpKvKind,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            http_id,
            kv_kind,
            key: key.into(),
            value: value.into(),
            enabled: true,
            sort_priority: 0.0,
            is_delta: false,
            parent_id: None,
            delta_key: None,
            delta_key_set: false,
            delta_value: None,
            delta_value_set: false,
            delta_enabled: None,
            delta_enabled_set: false,
            created_at: t,
            updated_at: t,
        }
    }

    /// Apply a three-valued override patch to this delta row and return
    /// the sparse patch object for its update event: touched fields
    /// appear with their new value, cleared overrides as `null`, kept
    /// fields not at all.
    pub fn apply_overrides(
        &mut self,
        key: FieldPatch<String>,
        value: FieldPatch<String>,
        enabled: FieldPatch<bool>,
    ) -> serde_json::Value {
        let mut patch = serde_json::Map::new();
        if !key.is_keep() {
            let (is_set, v) = key.into_columns();
            patch.insert(
                "delta_key".to_string(),
                v.clone().map_or(serde_json::Value::Null, Into::into),
            );
            self.delta_key_set = is_set;
            self.delta_key = v;
        }
        if !value.is_keep() {
            let (is_set, v) = value.into_columns();
            patch.insert(
                "delta_value".to_string(),
                v.clone().map_or(serde_json::Value::Null, Into::into),
            );
            self.delta_value_set = is_set;
            self.delta_value = v;
        }
        if !enabled.is_keep() {
            let (is_set, v) = enabled.into_columns();
            patch.insert(
                "delta_enabled".to_string(),
                v.map_or(serde_json::Value::Null, Into::into),
            );
            self.delta_enabled_set = is_set;
            self.delta_enabled = v;
        }
        serde_json::Value::Object(patch)
    }

    /// Resolve this delta row against its base: overridden fields win,
    /// kept fields inherit.
    pub fn resolved_against(&self, base: &HttpKv) -> (String, String, bool) {
        (
            FieldPatch::from_columns(self.delta_key_set, self.delta_key.clone())
                .apply(Some(base.key.clone()))
                .unwrap_or_default(),
            FieldPatch::from_columns(self.delta_value_set, self.delta_value.clone())
                .apply(Some(base.value.clone()))
                .unwrap_or_default(),
            FieldPatch::from_columns(self.delta_enabled_set, self.delta_enabled)
                .apply(Some(base.enabled))
                .unwrap_or(false),
        )
    }
}

/// Raw body attached to an HTTP request. At most one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HttpBodyRaw {
    /// Entity id
    pub id: Uid,
    /// Owning HTTP request
    pub http_id: Uid,
    /// Body text, may contain placeholders
    pub content: String,
    /// Content type sent with the body
    pub content_type: Option<String>,
    /// Whether this row is a delta override
    pub is_delta: bool,
    /// Base row when `is_delta` is set
    pub parent_id: Option<Uid>,
    /// Content override value
    pub delta_content: Option<String>,
    /// Whether the content override is set at all
    pub delta_content_set: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl HttpBodyRaw {
    /// New raw body with a fresh id.
    pub fn new(http_id: Uid, content: impl Into<String>, content_type: Option<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            http_id,
            content: content.into(),
            content_type,
            is_delta: false,
            parent_id: None,
            delta_content: None,
            delta_content_set: false,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Template assertion on an HTTP request, evaluated after every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HttpAssert {
    /// Entity id
    pub id: Uid,
    /// Owning HTTP request
    pub http_id: Uid,
    /// Assertion expression text
    pub expression: String,
    /// Disabled assertions are not evaluated
    pub enabled: bool,
    /// Display order, sort ascending
    pub sort_priority: f64,
    /// Whether this row is a delta override
    pub is_delta: bool,
    /// Base row when `is_delta` is set
    pub parent_id: Option<Uid>,
    /// Expression override value
    pub delta_expression: Option<String>,
    /// Whether the expression override is set at all
    pub delta_expression_set: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl HttpAssert {
    /// New enabled assertion with a fresh id.
    pub fn new(http_id: Uid, expression: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            http_id,
            expression: expression.into(),
            enabled: true,
            sort_priority: 0.0,
            is_delta: false,
            parent_id: None,
            delta_expression: None,
            delta_expression_set: false,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Stored GraphQL operation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraphqlRequest {
    /// Entity id
    pub id: Uid,
    /// Owning workspace
    pub workspace_id: Uid,
    /// Display name
    pub name: String,
    /// Endpoint URL, may contain placeholders
    pub url: String,
    /// Operation text
    pub query: String,
    /// Variables as a JSON object, if any
    pub variables_json: Option<String>,
    /// Time of the most recent execution
    pub last_run_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl GraphqlRequest {
    /// New operation with a fresh id.
    pub fn new(
        workspace_id: Uid,
        name: impl Into<String>,
        url: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            workspace_id,
            name: name.into(),
            url: url.into(),
            query: query.into(),
            variables_json: None,
            last_run_at: None,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Header row on a GraphQL operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct GraphqlHeader {
    /// Entity id
    pub id: Uid,
    /// Owning GraphQL operation
    pub graphql_id: Uid,
    /// Header name
    pub key: String,
    /// Header value
    pub value: String,
    /// Disabled rows are skipped
    pub enabled: bool,
    /// Display order, sort ascending
    pub sort_priority: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl GraphqlHeader {
    /// New enabled header with a fresh id.
    pub fn new(graphql_id: Uid, key: impl Into<String>, value: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            graphql_id,
            key: key.into(),
            value: value.into(),
            enabled: true,
            sort_priority: 0.0,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Named graph of nodes and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Flow {
    /// Entity id
    pub id: Uid,
    /// Owning workspace
    pub workspace_id: Uid,
    /// Display name
    pub name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    /// New flow with a fresh id.
    pub fn new(workspace_id: Uid, name: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            workspace_id,
            name: name.into(),
            created_at: t,
            updated_at: t,
        }
    }
}

/// Node inside a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FlowNode {
    /// Entity id
    pub id: Uid,
    /// Owning flow
    pub flow_id: Uid,
    /// Node variant
    pub node_kind: FlowNodeKind,
    /// Variant-specific payload as a JSON object
    pub config_json: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl FlowNode {
    /// New node with a fresh id.
    pub fn new(flow_id: Uid, node_kind: FlowNodeKind) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            flow_id,
            node_kind,
            config_json: None,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Edge inside a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FlowEdge {
    /// Entity id
    pub id: Uid,
    /// Owning flow
    pub flow_id: Uid,
    /// Source node
    pub source_id: Uid,
    /// Target node
    pub target_id: Uid,
    /// Branch/loop wiring handle
    pub handle: EdgeHandle,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl FlowEdge {
    /// New edge with a fresh id.
    pub fn new(flow_id: Uid, source_id: Uid, target_id: Uid, handle: EdgeHandle) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            flow_id,
            source_id,
            target_id,
            handle,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Flow-scoped variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FlowVariable {
    /// Entity id
    pub id: Uid,
    /// Owning flow
    pub flow_id: Uid,
    /// Variable name
    pub key: String,
    /// Variable value
    pub value: String,
    /// Disabled rows are skipped
    pub enabled: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl FlowVariable {
    /// New enabled variable with a fresh id.
    pub fn new(flow_id: Uid, key: impl Into<String>, value: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            flow_id,
            key: key.into(),
            value: value.into(),
            enabled: true,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Navigational file record. A content entity is owned by at most one
/// file; deleting either side cascades through the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceFile {
    /// Entity id
    pub id: Uid,
    /// Owning workspace
    pub workspace_id: Uid,
    /// Content entity this file points at, absent for folders
    pub content_id: Option<Uid>,
    /// Kind of the content entity
    pub content_kind: FileContentKind,
    /// Display name
    pub name: String,
    /// Display order, sort ascending
    pub sort_priority: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceFile {
    /// New file record with a fresh id.
    pub fn new(
        workspace_id: Uid,
        content_id: Option<Uid>,
        content_kind: FileContentKind,
        name: impl Into<String>,
    ) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            workspace_id,
            content_id,
            content_kind,
            name: name.into(),
            sort_priority: 0.0,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Workspace tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    /// Entity id
    pub id: Uid,
    /// Owning workspace
    pub workspace_id: Uid,
    /// Tag text
    pub name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    /// New tag with a fresh id.
    pub fn new(workspace_id: Uid, name: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            workspace_id,
            name: name.into(),
            created_at: t,
            updated_at: t,
        }
    }
}

/// Workspace membership row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkspaceMember {
    /// Entity id
    pub id: Uid,
    /// Workspace
    pub workspace_id: Uid,
    /// User
    pub user_id: Uid,
    /// Role within the workspace
    pub role: MemberRole,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceMember {
    /// New membership with a fresh id.
    pub fn new(workspace_id: Uid, user_id: Uid, role: MemberRole) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            workspace_id,
            user_id,
            role,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Captured response for one HTTP or GraphQL run. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Response {
    /// Entity id
    pub id: Uid,
    /// Request the run executed (HTTP or GraphQL entry)
    pub request_id: Uid,
    /// Workspace, denormalized for indexing and event routing
    pub workspace_id: Uid,
    /// HTTP status code
    pub status: i64,
    /// Response body bytes
    pub body: Option<Vec<u8>>,
    /// Wall-clock duration of the call in milliseconds
    pub duration_ms: i64,
    /// Body size in bytes
    pub size: i64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Response {
    /// New response row with a fresh id.
    pub fn new(request_id: Uid, workspace_id: Uid, status: i64, body: Vec<u8>) -> Self {
        let t = now();
        let size = body.len() as i64;
        Self {
            id: Uid::generate(),
            request_id,
            workspace_id,
            status,
            body: Some(body),
            duration_ms: 0,
            size,
            created_at: t,
            updated_at: t,
        }
    }
}

/// Header captured from a response. Multi-valued keys produce one row per
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResponseHeader {
    /// Entity id
    pub id: Uid,
    /// Owning response
    pub response_id: Uid,
    /// Workspace, denormalized for indexing and event routing
    pub workspace_id: Uid,
    /// Header name, case preserved
    pub key: String,
    /// Header value
    pub value: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl ResponseHeader {
    /// New header row with a fresh id.
    pub fn new(
        response_id: Uid,
        workspace_id: Uid,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            response_id,
            workspace_id,
            key: key.into(),
            value: value.into(),
            created_at: t,
            updated_at: t,
        }
    }
}

/// Immutable record of one assertion evaluation against a response.
///
/// Distinct from the template [`HttpAssert`]: carries either the evaluated
/// expression text or an `ERROR: <message>` string for failed evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ResponseAssert {
    /// Entity id
    pub id: Uid,
    /// Owning response
    pub response_id: Uid,
    /// Workspace, denormalized for indexing and event routing
    pub workspace_id: Uid,
    /// Expression text or `ERROR: <message>`
    pub expression: String,
    /// Whether the assertion held
    pub success: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl ResponseAssert {
    /// New evaluation record with a fresh id.
    pub fn new(
        response_id: Uid,
        workspace_id: Uid,
        expression: impl Into<String>,
        success: bool,
    ) -> Self {
        let t = now();
        Self {
            id: Uid::generate(),
            response_id,
            workspace_id,
            expression: expression.into(),
            success,
            created_at: t,
            updated_at: t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_kind_maps_to_model_kind_and_table() {
        for kind in HttpKvKind::all() {
            let table = kind.table();
            assert!(table.starts_with("http_"), "unexpected table {}", table);
        }
        assert_eq!(HttpKvKind::Header.model_kind(), ModelKind::HttpHeader);
        assert_eq!(
            HttpKvKind::UrlEncodedItem.model_kind(),
            ModelKind::HttpUrlEncodedItem
        );
    }

    #[test]
    fn test_kv_override_patch_and_resolution() {
        let base = HttpKv::new(Uid::generate(), HttpKvKind::Header, "Accept", "text/plain");
        let mut delta = HttpKv::new(base.http_id.clone(), HttpKvKind::Header, "", "");
        delta.is_delta = true;
        delta.parent_id = Some(base.id.clone());

        let patch = delta.apply_overrides(
            FieldPatch::Keep,
            FieldPatch::Set("application/json".to_string()),
            FieldPatch::Clear,
        );
        assert_eq!(
            patch,
            serde_json::json!({"delta_value": "application/json", "delta_enabled": null})
        );

        let (key, value, enabled) = delta.resolved_against(&base);
        assert_eq!(key, "Accept");
        assert_eq!(value, "application/json");
        assert!(!enabled, "cleared override does not inherit");
    }

    #[test]
    fn test_response_size_tracks_body() {
        let resp = Response::new(Uid::generate(), Uid::generate(), 200, b"hello".to_vec());
        assert_eq!(resp.size, 5);
    }

    #[test]
    fn test_enum_serde_tags() {
        assert_eq!(
            serde_json::to_string(&FlowNodeKind::ForEach).unwrap(),
            "\"for-each\""
        );
        assert_eq!(
            serde_json::to_string(&EdgeHandle::Loop).unwrap(),
            "\"loop\""
        );
        assert_eq!(
            serde_json::to_string(&FileContentKind::HttpDelta).unwrap(),
            "\"http_delta\""
        );
    }
}
