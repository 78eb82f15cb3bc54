use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use quiver_core::domain::model::{
    Environment, EnvVariable, GraphqlHeader, GraphqlRequest, HttpAssert, HttpBodyRaw, HttpKv,
    HttpKvKind, HttpRequest, Response, Workspace, WorkspaceFile, WorkspaceMember,
};
use quiver_core::{CoreError, Uid};

use crate::queries;

/// Map a storage engine error into the core taxonomy.
///
/// Uniqueness and foreign-key violations become `ConstraintViolated` with
/// the engine's message (which names the offending columns); missing rows
/// become `NotFound`; everything else is opaque-internal.
pub fn map_db_err(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::RowNotFound => CoreError::NotFound("row".to_string()),
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => {
                    let columns = message
                        .split(':')
                        .nth(1)
                        .unwrap_or(&message)
                        .trim()
                        .to_string();
                    CoreError::ConstraintViolated { columns, message }
                }
                _ => CoreError::Internal(format!("storage: {}", message)),
            }
        }
        other => CoreError::Internal(format!("storage: {}", other)),
    }
}

/// Storage gateway over a SQLite pool.
///
/// Cheap to clone; all non-transactional reads go through here. Writes
/// only happen inside a [`StoreTx`] obtained from [`Store::begin`].
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (and migrate) a database at `url`, e.g. `sqlite://quiver.db`.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| CoreError::InvalidArgument(format!("bad database url: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await
            .map_err(map_db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .foreign_keys(true);
        // A single connection keeps every handle on the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(map_db_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), CoreError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(format!("migrations: {}", e)))?;
        Ok(())
    }

    /// Begin a transaction; all reads and writes on the returned view
    /// participate in it.
    pub async fn begin(&self) -> Result<StoreTx, CoreError> {
        let tx = self.pool.begin().await.map_err(map_db_err)?;
        Ok(StoreTx { tx })
    }

    async fn conn(&self) -> Result<sqlx::pool::PoolConnection<Sqlite>, CoreError> {
        self.pool.acquire().await.map_err(map_db_err)
    }

    // Non-transactional reads used by the executor and streamer.

    /// Fetch a workspace by id.
    pub async fn get_workspace(&self, id: &Uid) -> Result<Workspace, CoreError> {
        queries::workspace::get(&mut *self.conn().await?, id).await
    }

    /// Fetch an HTTP request by id.
    pub async fn get_http_request(&self, id: &Uid) -> Result<HttpRequest, CoreError> {
        queries::http::get_request(&mut *self.conn().await?, id).await
    }

    /// Fetch a GraphQL request by id.
    pub async fn get_graphql_request(&self, id: &Uid) -> Result<GraphqlRequest, CoreError> {
        queries::graphql::get_request(&mut *self.conn().await?, id).await
    }

    /// Key/value children of one HTTP request, display order.
    pub async fn list_http_kv(
        &self,
        kind: HttpKvKind,
        http_id: &Uid,
    ) -> Result<Vec<HttpKv>, CoreError> {
        queries::http::list_kv_by_request(&mut *self.conn().await?, kind, http_id).await
    }

    /// Raw body of one HTTP request, if any.
    pub async fn get_body_raw(&self, http_id: &Uid) -> Result<Option<HttpBodyRaw>, CoreError> {
        queries::http::body_raw_by_request(&mut *self.conn().await?, http_id).await
    }

    /// Template assertions of one HTTP request, display order.
    pub async fn list_http_asserts(&self, http_id: &Uid) -> Result<Vec<HttpAssert>, CoreError> {
        queries::http::list_asserts_by_request(&mut *self.conn().await?, http_id).await
    }

    /// Headers of one GraphQL request, display order.
    pub async fn list_graphql_headers(
        &self,
        graphql_id: &Uid,
    ) -> Result<Vec<GraphqlHeader>, CoreError> {
        queries::graphql::list_headers_by_request(&mut *self.conn().await?, graphql_id).await
    }

    /// The workspace's designated global environment.
    pub async fn global_environment(&self, workspace_id: &Uid) -> Result<Environment, CoreError> {
        queries::environment::global_for_workspace(&mut *self.conn().await?, workspace_id).await
    }

    /// Enabled variables of an environment. On duplicate keys the enabled
    /// row wins, which this query guarantees by only returning enabled
    /// rows, first-created first.
    pub async fn enabled_variables(
        &self,
        environment_id: &Uid,
    ) -> Result<Vec<EnvVariable>, CoreError> {
        queries::environment::enabled_variables(&mut *self.conn().await?, environment_id).await
    }

    /// Membership row for (workspace, user), if any.
    pub async fn find_member(
        &self,
        workspace_id: &Uid,
        user_id: &Uid,
    ) -> Result<Option<WorkspaceMember>, CoreError> {
        queries::member::find(&mut *self.conn().await?, workspace_id, user_id).await
    }

    /// Whether the user belongs to the workspace.
    pub async fn is_member(&self, workspace_id: &Uid, user_id: &Uid) -> Result<bool, CoreError> {
        Ok(self.find_member(workspace_id, user_id).await?.is_some())
    }

    /// Fetch a response row by id.
    pub async fn get_response(&self, id: &Uid) -> Result<Response, CoreError> {
        queries::response::get(&mut *self.conn().await?, id).await
    }

    /// The file owning a content entity, if any.
    pub async fn file_for_content(
        &self,
        content_id: &Uid,
    ) -> Result<Option<WorkspaceFile>, CoreError> {
        queries::file::for_content(&mut *self.conn().await?, content_id).await
    }
}

/// A transaction-bound view of the gateway.
///
/// Expose the raw connection via [`StoreTx::conn`]; query functions in
/// [`crate::queries`] run against it, which makes every in-transaction
/// read transactional by construction.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    /// The transaction's connection, for query functions.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit the transaction.
    pub async fn commit(self) -> Result<(), CoreError> {
        self.tx.commit().await.map_err(map_db_err)
    }

    /// Roll the transaction back.
    pub async fn rollback(self) -> Result<(), CoreError> {
        self.tx.rollback().await.map_err(map_db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Model;
    use quiver_core::domain::model::MemberRole;

    #[tokio::test]
    async fn test_migrate_and_round_trip() {
        let store = Store::in_memory().await.unwrap();
        let ws = Workspace::new("demo");

        let mut tx = store.begin().await.unwrap();
        ws.insert_row(tx.conn()).await.unwrap();
        tx.commit().await.unwrap();

        let back = store.get_workspace(&ws.id).await.unwrap();
        assert_eq!(back, ws);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = Store::in_memory().await.unwrap();
        let ws = Workspace::new("demo");

        let mut tx = store.begin().await.unwrap();
        ws.insert_row(tx.conn()).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(matches!(
            store.get_workspace(&ws.id).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_constraint() {
        let store = Store::in_memory().await.unwrap();
        let ws = Workspace::new("demo");
        let user = Uid::generate();

        let mut tx = store.begin().await.unwrap();
        ws.insert_row(tx.conn()).await.unwrap();
        WorkspaceMember::new(ws.id.clone(), user.clone(), MemberRole::Owner)
            .insert_row(tx.conn())
            .await
            .unwrap();
        let err = WorkspaceMember::new(ws.id.clone(), user.clone(), MemberRole::Viewer)
            .insert_row(tx.conn())
            .await
            .unwrap_err();
        match err {
            CoreError::ConstraintViolated { columns, .. } => {
                assert!(columns.contains("workspace_members"), "got {:?}", columns);
            }
            other => panic!("expected ConstraintViolated, got {:?}", other),
        }
    }
}
