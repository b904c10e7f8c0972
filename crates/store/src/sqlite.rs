//! SQLite backend for agents, executions, tool records, and credentials.
//!
//! One database file, four tables. Structured columns (agent config,
//! execution input/output, tool schemas, scopes) are stored as JSON text.
//! Timestamps are fixed-width RFC 3339 strings so they sort lexically.

use agentexec_core::agent::{Agent, AgentStatus};
use agentexec_core::credential::{Credential, CredentialStore};
use agentexec_core::error::StoreError;
use agentexec_core::execution::{Execution, ExecutionStatus};
use agentexec_core::store::{AgentStore, ExecutionQuery, ExecutionStore, Order, ToolRecordStore};
use agentexec_core::tool_record::{ToolKind, ToolRecord};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Accepts a file path, a `sqlite://` URL, or `":memory:"` for an
    /// in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database exists per connection
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "agents table",
                r#"
                CREATE TABLE IF NOT EXISTS agents (
                    id          TEXT PRIMARY KEY,
                    user_id     TEXT NOT NULL,
                    name        TEXT NOT NULL,
                    status      TEXT NOT NULL DEFAULT 'active',
                    config      TEXT NOT NULL DEFAULT '{}',
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "executions table",
                r#"
                CREATE TABLE IF NOT EXISTS executions (
                    iid            INTEGER PRIMARY KEY AUTOINCREMENT,
                    id             TEXT UNIQUE NOT NULL,
                    agent_id       TEXT NOT NULL,
                    user_id        TEXT NOT NULL,
                    input          TEXT NOT NULL,
                    output         TEXT,
                    session_id     TEXT,
                    status         TEXT NOT NULL,
                    duration_ms    INTEGER,
                    error_message  TEXT,
                    created_at     TEXT NOT NULL,
                    updated_at     TEXT NOT NULL
                )
                "#,
            ),
            (
                "executions agent index",
                "CREATE INDEX IF NOT EXISTS idx_executions_agent ON executions(agent_id, created_at)",
            ),
            (
                "executions user index",
                "CREATE INDEX IF NOT EXISTS idx_executions_user ON executions(user_id, created_at)",
            ),
            (
                "tool_records table",
                r#"
                CREATE TABLE IF NOT EXISTS tool_records (
                    id           TEXT PRIMARY KEY,
                    name         TEXT UNIQUE NOT NULL,
                    description  TEXT NOT NULL,
                    schema       TEXT NOT NULL DEFAULT '{}',
                    kind         TEXT NOT NULL,
                    version      INTEGER NOT NULL DEFAULT 1,
                    created_at   TEXT NOT NULL,
                    updated_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "credentials table",
                r#"
                CREATE TABLE IF NOT EXISTS credentials (
                    user_id        TEXT NOT NULL,
                    service        TEXT NOT NULL,
                    access_token   TEXT NOT NULL,
                    refresh_token  TEXT,
                    scopes         TEXT NOT NULL DEFAULT '[]',
                    expires_at     TEXT,
                    updated_at     TEXT NOT NULL,
                    PRIMARY KEY (user_id, service)
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    // ── Row parsing ──

    fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent, StoreError> {
        let status: String = column(row, "status")?;
        let config: String = column(row, "config")?;
        Ok(Agent {
            id: column(row, "id")?,
            user_id: column(row, "user_id")?,
            name: column(row, "name")?,
            status: AgentStatus::parse(&status).unwrap_or_default(),
            config: from_json(&config, "config")?,
            created_at: parse_ts(&column::<String>(row, "created_at")?),
            updated_at: parse_ts(&column::<String>(row, "updated_at")?),
        })
    }

    fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> Result<Execution, StoreError> {
        let status: String = column(row, "status")?;
        let input: String = column(row, "input")?;
        let output: Option<String> = column(row, "output")?;
        Ok(Execution {
            id: column(row, "id")?,
            agent_id: column(row, "agent_id")?,
            user_id: column(row, "user_id")?,
            input: from_json(&input, "input")?,
            output: output.as_deref().map(|o| from_json(o, "output")).transpose()?,
            session_id: column(row, "session_id")?,
            status: ExecutionStatus::parse(&status).ok_or_else(|| {
                StoreError::QueryFailed(format!("unknown execution status '{status}'"))
            })?,
            duration_ms: column(row, "duration_ms")?,
            error_message: column(row, "error_message")?,
            created_at: parse_ts(&column::<String>(row, "created_at")?),
            updated_at: parse_ts(&column::<String>(row, "updated_at")?),
        })
    }

    fn row_to_tool(row: &sqlx::sqlite::SqliteRow) -> Result<ToolRecord, StoreError> {
        let kind: String = column(row, "kind")?;
        let schema: String = column(row, "schema")?;
        let version: i64 = column(row, "version")?;
        Ok(ToolRecord {
            id: column(row, "id")?,
            name: column(row, "name")?,
            description: column(row, "description")?,
            schema: from_json(&schema, "schema")?,
            kind: ToolKind::parse(&kind)
                .ok_or_else(|| StoreError::QueryFailed(format!("unknown tool kind '{kind}'")))?,
            version: u32::try_from(version).unwrap_or(1),
            created_at: parse_ts(&column::<String>(row, "created_at")?),
            updated_at: parse_ts(&column::<String>(row, "updated_at")?),
        })
    }

    fn row_to_credential(row: &sqlx::sqlite::SqliteRow) -> Result<Credential, StoreError> {
        let scopes: String = column(row, "scopes")?;
        let expires_at: Option<String> = column(row, "expires_at")?;
        Ok(Credential {
            user_id: column(row, "user_id")?,
            service: column(row, "service")?,
            access_token: column(row, "access_token")?,
            refresh_token: column(row, "refresh_token")?,
            scopes: serde_json::from_str(&scopes).unwrap_or_default(),
            expires_at: expires_at.as_deref().map(parse_ts),
            updated_at: parse_ts(&column::<String>(row, "updated_at")?),
        })
    }
}

fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::QueryFailed(format!("{what} json: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage(format!("serialize: {e}")))
}

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn query_failed(e: sqlx::Error) -> StoreError {
    let unique = e
        .as_database_error()
        .is_some_and(|d| d.is_unique_violation());
    if unique {
        StoreError::Conflict(e.to_string())
    } else {
        StoreError::QueryFailed(e.to_string())
    }
}

#[async_trait]
impl AgentStore for SqliteStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_agent).transpose()
    }

    async fn put_agent(&self, agent: Agent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, user_id, name, status, config, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                name = excluded.name,
                status = excluded.status,
                config = excluded.config,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.user_id)
        .bind(&agent.name)
        .bind(agent.status.as_str())
        .bind(to_json(&agent.config)?)
        .bind(ts(&agent.created_at))
        .bind(ts(&agent.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn list_agents(&self, user_id: &str) -> Result<Vec<Agent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM agents WHERE user_id = ? AND status != 'deleted' ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        rows.iter().map(Self::row_to_agent).collect()
    }

    async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE agents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(ts(&Utc::now()))
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO executions
                (id, agent_id, user_id, input, output, session_id, status,
                 duration_ms, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.agent_id)
        .bind(&execution.user_id)
        .bind(to_json(&execution.input)?)
        .bind(execution.output.as_ref().map(to_json).transpose()?)
        .bind(&execution.session_id)
        .bind(execution.status.as_str())
        .bind(execution.duration_ms)
        .bind(&execution.error_message)
        .bind(ts(&execution.created_at))
        .bind(ts(&execution.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_execution).transpose()
    }

    async fn update_execution_if(
        &self,
        execution: &Execution,
        expected: ExecutionStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executions SET
                output = ?, session_id = ?, status = ?, duration_ms = ?,
                error_message = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(execution.output.as_ref().map(to_json).transpose()?)
        .bind(&execution.session_id)
        .bind(execution.status.as_str())
        .bind(execution.duration_ms)
        .bind(&execution.error_message)
        .bind(ts(&execution.updated_at))
        .bind(&execution.id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<Execution>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM executions WHERE 1 = 1");

        if let Some(agent_id) = &query.agent_id {
            builder.push(" AND agent_id = ").push_bind(agent_id.clone());
        }
        if let Some(user_id) = &query.user_id {
            builder.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(session_id) = &query.session_id {
            builder.push(" AND session_id = ").push_bind(session_id.clone());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }

        builder.push(match query.order {
            Order::OldestFirst => " ORDER BY created_at ASC, iid ASC",
            Order::NewestFirst => " ORDER BY created_at DESC, iid DESC",
        });

        // SQLite needs a LIMIT before OFFSET; -1 means unbounded
        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        builder.push(" LIMIT ").push_bind(limit);
        builder
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset).unwrap_or(i64::MAX));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_execution).collect()
    }
}

#[async_trait]
impl ToolRecordStore for SqliteStore {
    async fn get_tool_record(&self, id: &str) -> Result<Option<ToolRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM tool_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn find_tool_record(&self, name: &str) -> Result<Option<ToolRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM tool_records WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn list_tool_records(&self) -> Result<Vec<ToolRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tool_records ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn insert_tool_record(&self, record: &ToolRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tool_records
                (id, name, description, schema, kind, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.description)
        .bind(to_json(&record.schema)?)
        .bind(record.kind.as_str())
        .bind(i64::from(record.version))
        .bind(ts(&record.created_at))
        .bind(ts(&record.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn update_tool_record(&self, record: &ToolRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tool_records SET
                name = ?, description = ?, schema = ?, kind = ?, version = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.name)
        .bind(&record.description)
        .bind(to_json(&record.schema)?)
        .bind(record.kind.as_str())
        .bind(i64::from(record.version))
        .bind(ts(&record.updated_at))
        .bind(&record.id)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_tool_record(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tool_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get_credential(
        &self,
        user_id: &str,
        service: &str,
    ) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query("SELECT * FROM credentials WHERE user_id = ? AND service = ?")
            .bind(user_id)
            .bind(service)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_credential).transpose()
    }

    async fn put_credential(&self, credential: Credential) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO credentials
                (user_id, service, access_token, refresh_token, scopes, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, service) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                scopes = excluded.scopes,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credential.user_id)
        .bind(&credential.service)
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(to_json(&credential.scopes)?)
        .bind(credential.expires_at.as_ref().map(ts))
        .bind(ts(&credential.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str, service: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = ? AND service = ?")
            .bind(user_id)
            .bind(service)
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentexec_core::agent::AgentConfig;
    use agentexec_core::execution::ExecutionInput;
    use chrono::Duration;
    use serde_json::json;

    async fn test_store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn agent_round_trip_with_config() {
        let db = test_store().await;
        let mut config = AgentConfig::default();
        config.tools = vec!["gmail".into(), "csv".into()];
        config.mcp_servers.insert("docs".into(), json!({"url": "http://localhost:9000"}));
        let agent = Agent::new("u1", "Mailer", config);
        db.put_agent(agent.clone()).await.unwrap();

        let fetched = db.get_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Mailer");
        assert_eq!(fetched.config, agent.config);
        assert_eq!(fetched.status, AgentStatus::Active);
    }

    #[tokio::test]
    async fn soft_deleted_agents_are_not_listed() {
        let db = test_store().await;
        let agent = Agent::new("u1", "Temp", AgentConfig::default());
        db.put_agent(agent.clone()).await.unwrap();
        assert_eq!(db.list_agents("u1").await.unwrap().len(), 1);

        assert!(db.set_agent_status(&agent.id, AgentStatus::Deleted).await.unwrap());
        assert!(db.list_agents("u1").await.unwrap().is_empty());
        assert!(!db.set_agent_status("missing", AgentStatus::Active).await.unwrap());
    }

    #[tokio::test]
    async fn execution_round_trip() {
        let db = test_store().await;
        let mut input = ExecutionInput::default();
        input.input = "summarise my inbox".into();
        input.parameters.insert("max_steps".into(), json!(5));
        let mut exec = Execution::start("a1", "u1", input, Some("s1".into()));
        db.insert_execution(&exec).await.unwrap();

        exec.status = ExecutionStatus::Completed;
        exec.output = Some(json!({"output": "done", "tools_used": ["gmail"]}));
        exec.duration_ms = Some(1234);
        assert!(
            db.update_execution_if(&exec, ExecutionStatus::Running)
                .await
                .unwrap()
        );

        let fetched = db.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Completed);
        assert_eq!(fetched.input.input, "summarise my inbox");
        assert_eq!(fetched.input.parameters["max_steps"], 5);
        assert_eq!(fetched.output_text(), Some("done"));
        assert_eq!(fetched.duration_ms, Some(1234));
        assert_eq!(fetched.session_id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn terminal_write_does_not_overwrite_cancel() {
        let db = test_store().await;
        let exec = Execution::start("a1", "u1", ExecutionInput::default(), None);
        db.insert_execution(&exec).await.unwrap();

        let mut cancelled = exec.clone();
        cancelled.status = ExecutionStatus::Cancelled;
        assert!(
            db.update_execution_if(&cancelled, ExecutionStatus::Running)
                .await
                .unwrap()
        );

        let mut completed = exec.clone();
        completed.status = ExecutionStatus::Completed;
        assert!(
            !db.update_execution_if(&completed, ExecutionStatus::Running)
                .await
                .unwrap()
        );
        let stored = db.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn list_filters_orders_and_pages() {
        let db = test_store().await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut exec = Execution::start(
                "a1",
                "u1",
                ExecutionInput::default(),
                Some(if i % 2 == 0 { "even" } else { "odd" }.into()),
            );
            exec.created_at += Duration::seconds(i);
            if i < 3 {
                exec.status = ExecutionStatus::Completed;
            }
            db.insert_execution(&exec).await.unwrap();
            ids.push(exec.id);
        }
        db.insert_execution(&Execution::start("a2", "u1", ExecutionInput::default(), None))
            .await
            .unwrap();

        let all = db.list_executions(&ExecutionQuery::for_agent("a1")).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].id, ids[4]);

        let completed_oldest = db
            .list_executions(&ExecutionQuery {
                status: Some(ExecutionStatus::Completed),
                order: Order::OldestFirst,
                ..ExecutionQuery::for_agent("a1")
            })
            .await
            .unwrap();
        let got: Vec<&str> = completed_oldest.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(got, vec![ids[0].as_str(), ids[1].as_str(), ids[2].as_str()]);

        let page = db
            .list_executions(&ExecutionQuery {
                limit: Some(2),
                offset: 1,
                ..ExecutionQuery::for_agent("a1")
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[3]);

        let even = db
            .list_executions(&ExecutionQuery {
                session_id: Some("even".into()),
                ..ExecutionQuery::for_user("u1")
            })
            .await
            .unwrap();
        assert_eq!(even.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_tool_name_is_conflict() {
        let db = test_store().await;
        let record = ToolRecord::new(
            "json",
            "Read and write JSON files",
            json!({"required": ["action", "file_path"]}),
            ToolKind::Builtin,
        );
        db.insert_tool_record(&record).await.unwrap();

        let dup = ToolRecord::new("json", "dup", json!({}), ToolKind::Custom);
        assert!(matches!(
            db.insert_tool_record(&dup).await,
            Err(StoreError::Conflict(_))
        ));

        let fetched = db.find_tool_record("json").await.unwrap().unwrap();
        assert_eq!(fetched.schema["required"][1], "file_path");
        assert_eq!(fetched.kind, ToolKind::Builtin);
    }

    #[tokio::test]
    async fn tool_update_and_delete() {
        let db = test_store().await;
        let mut record = ToolRecord::new("lookup", "v1", json!({}), ToolKind::Custom);
        db.insert_tool_record(&record).await.unwrap();

        record.description = "v2".into();
        record.version = 2;
        assert!(db.update_tool_record(&record).await.unwrap());
        let fetched = db.get_tool_record(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.version, 2);
        assert_eq!(fetched.description, "v2");

        assert!(db.delete_tool_record(&record.id).await.unwrap());
        assert!(db.list_tool_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn credential_upsert() {
        let db = test_store().await;
        let mut cred = Credential {
            user_id: "u1".into(),
            service: "gmail".into(),
            access_token: "old".into(),
            refresh_token: Some("rt".into()),
            scopes: vec!["https://www.googleapis.com/auth/gmail.send".into()],
            expires_at: Some(Utc::now() + Duration::hours(1)),
            updated_at: Utc::now(),
        };
        db.put_credential(cred.clone()).await.unwrap();

        cred.access_token = "new".into();
        db.put_credential(cred).await.unwrap();

        let fetched = db.get_credential("u1", "gmail").await.unwrap().unwrap();
        assert_eq!(fetched.access_token, "new");
        assert_eq!(fetched.refresh_token.as_deref(), Some("rt"));
        assert_eq!(fetched.scopes.len(), 1);
        assert!(fetched.expires_at.is_some());

        assert!(db.delete_credential("u1", "gmail").await.unwrap());
        assert!(db.get_credential("u1", "gmail").await.unwrap().is_none());
    }
}
