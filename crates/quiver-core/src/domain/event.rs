use serde::{Deserialize, Serialize};

use crate::domain::id::Uid;

/// Closed set of entity kinds known to the core.
///
/// The pair `(ModelKind, workspace_id)` forms a stream topic, and every
/// storage table corresponds to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Tenancy root
    Workspace,
    /// Named variable bag scoped to a workspace
    Environment,
    /// (key, value, enabled) row inside an environment
    EnvVariable,
    /// Stored HTTP request definition
    HttpRequest,
    /// HTTP request header row
    HttpHeader,
    /// HTTP query parameter row
    HttpParam,
    /// Multipart form body item
    HttpFormItem,
    /// URL-encoded body item
    HttpUrlEncodedItem,
    /// Raw body attached to an HTTP request
    HttpBodyRaw,
    /// Template assertion on an HTTP request
    HttpAssert,
    /// Stored GraphQL operation definition
    GraphqlRequest,
    /// Header row on a GraphQL operation
    GraphqlHeader,
    /// Multi-step flow
    Flow,
    /// Node inside a flow graph
    FlowNode,
    /// Edge inside a flow graph
    FlowEdge,
    /// Flow-scoped variable
    FlowVariable,
    /// Navigational file record
    File,
    /// Workspace tag
    Tag,
    /// Workspace membership row
    WorkspaceMember,
    /// Captured response for an HTTP or GraphQL run
    Response,
    /// Header captured from a response
    ResponseHeader,
    /// Immutable assertion evaluation record
    ResponseAssert,
}

impl ModelKind {
    /// Stable snake_case tag, used in topics, logs and the replay log.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Workspace => "workspace",
            ModelKind::Environment => "environment",
            ModelKind::EnvVariable => "env_variable",
            ModelKind::HttpRequest => "http_request",
            ModelKind::HttpHeader => "http_header",
            ModelKind::HttpParam => "http_param",
            ModelKind::HttpFormItem => "http_form_item",
            ModelKind::HttpUrlEncodedItem => "http_url_encoded_item",
            ModelKind::HttpBodyRaw => "http_body_raw",
            ModelKind::HttpAssert => "http_assert",
            ModelKind::GraphqlRequest => "graphql_request",
            ModelKind::GraphqlHeader => "graphql_header",
            ModelKind::Flow => "flow",
            ModelKind::FlowNode => "flow_node",
            ModelKind::FlowEdge => "flow_edge",
            ModelKind::FlowVariable => "flow_variable",
            ModelKind::File => "file",
            ModelKind::Tag => "tag",
            ModelKind::WorkspaceMember => "workspace_member",
            ModelKind::Response => "response",
            ModelKind::ResponseHeader => "response_header",
            ModelKind::ResponseAssert => "response_assert",
        }
    }
}

/// Mutation operation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Row created
    Insert,
    /// Row updated
    Update,
    /// Row removed
    Delete,
}

/// One entry of the mutation event log.
///
/// Payloads are opaque JSON post-images tagged by `(kind, op)`; stream
/// converters downcast them per subscription. Update events additionally
/// carry a sparse patch reflecting the caller's intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// Entity kind of the affected row
    pub kind: ModelKind,
    /// Operation performed
    pub op: Op,
    /// Workspace of the affected entity
    pub workspace_id: Uid,
    /// Identifier of the affected entity
    pub model_id: Uid,
    /// Parent entity id, for child-to-parent routing
    pub parent_id: Option<Uid>,
    /// Whether the affected row is a delta override
    pub is_delta: bool,
    /// Post-image of the row
    pub payload: serde_json::Value,
    /// Sparse three-valued patch, present on updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<serde_json::Value>,
}

impl MutationEvent {
    /// The topic this event publishes to.
    pub fn topic(&self) -> (ModelKind, &Uid) {
        (self.kind, &self.workspace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_tags_are_distinct() {
        use std::collections::HashSet;
        let kinds = [
            ModelKind::Workspace,
            ModelKind::Environment,
            ModelKind::EnvVariable,
            ModelKind::HttpRequest,
            ModelKind::HttpHeader,
            ModelKind::HttpParam,
            ModelKind::HttpFormItem,
            ModelKind::HttpUrlEncodedItem,
            ModelKind::HttpBodyRaw,
            ModelKind::HttpAssert,
            ModelKind::GraphqlRequest,
            ModelKind::GraphqlHeader,
            ModelKind::Flow,
            ModelKind::FlowNode,
            ModelKind::FlowEdge,
            ModelKind::FlowVariable,
            ModelKind::File,
            ModelKind::Tag,
            ModelKind::WorkspaceMember,
            ModelKind::Response,
            ModelKind::ResponseHeader,
            ModelKind::ResponseAssert,
        ];
        let tags: HashSet<&str> = kinds.iter().map(|k| k.as_str()).collect();
        assert_eq!(tags.len(), kinds.len());
    }

    #[test]
    fn test_event_round_trip() {
        let event = MutationEvent {
            kind: ModelKind::HttpHeader,
            op: Op::Update,
            workspace_id: Uid::generate(),
            model_id: Uid::generate(),
            parent_id: Some(Uid::generate()),
            is_delta: false,
            payload: json!({"key": "Accept", "value": "application/json"}),
            patch: Some(json!({"value": "application/json"})),
        };
        let text = serde_json::to_string(&event).unwrap();
        let back: MutationEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_patch_absent_when_none() {
        let event = MutationEvent {
            kind: ModelKind::Workspace,
            op: Op::Insert,
            workspace_id: Uid::generate(),
            model_id: Uid::generate(),
            parent_id: None,
            is_delta: false,
            payload: json!({}),
            patch: None,
        };
        let text = serde_json::to_string(&event).unwrap();
        assert!(!text.contains("\"patch\""));
    }
}
