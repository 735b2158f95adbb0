use super::traits::{
    ComparisonSummary, HistoryEntry, ModelPerformance, ResearchStore, StageAverage,
};
use crate::types::{
    AppError, HistoryFilter, ModelKind, ResearchResult, ResearchSession, Result, SessionType,
    SessionWithResults, StageTimings,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &[(&str, &str)] = &[
    (
        "research_sessions table",
        "CREATE TABLE IF NOT EXISTS research_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL UNIQUE,
            query TEXT NOT NULL CHECK (length(trim(query)) > 0),
            session_type TEXT NOT NULL CHECK (session_type IN ('individual', 'comparison')),
            timestamp INTEGER NOT NULL,
            user_feedback TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
    ),
    (
        "research_results table",
        "CREATE TABLE IF NOT EXISTS research_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            research_id TEXT NOT NULL UNIQUE,
            session_id TEXT NOT NULL
                REFERENCES research_sessions(session_id) ON DELETE CASCADE,
            model TEXT NOT NULL,
            duration REAL NOT NULL CHECK (duration >= 0),
            stage_timings TEXT NOT NULL DEFAULT '{}',
            sources_found INTEGER NOT NULL DEFAULT 0 CHECK (sources_found >= 0),
            word_count INTEGER NOT NULL DEFAULT 0 CHECK (word_count >= 0),
            success INTEGER NOT NULL CHECK (success IN (0, 1)),
            error TEXT,
            report_content TEXT NOT NULL DEFAULT '',
            supervisor_tools_used TEXT NOT NULL DEFAULT '[]',
            research_brief TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE (session_id, model),
            CHECK ((success = 1 AND error IS NULL) OR (success = 0 AND error IS NOT NULL))
        )",
    ),
    (
        "session timestamp index",
        "CREATE INDEX IF NOT EXISTS idx_research_sessions_timestamp
            ON research_sessions(timestamp DESC)",
    ),
    (
        "result created_at index",
        "CREATE INDEX IF NOT EXISTS idx_research_results_created_at
            ON research_results(created_at DESC)",
    ),
    (
        "result model index",
        "CREATE INDEX IF NOT EXISTS idx_research_results_model ON research_results(model)",
    ),
    (
        "result success index",
        "CREATE INDEX IF NOT EXISTS idx_research_results_success ON research_results(success)",
    ),
    (
        "result research_id index",
        "CREATE INDEX IF NOT EXISTS idx_research_results_research_id
            ON research_results(research_id)",
    ),
    (
        "result session_id index",
        "CREATE INDEX IF NOT EXISTS idx_research_results_session_id
            ON research_results(session_id)",
    ),
    (
        "model_performance_summary view",
        "CREATE VIEW IF NOT EXISTS model_performance_summary AS
         SELECT model,
                COUNT(*) AS total_runs,
                ROUND(AVG(duration), 2) AS avg_duration,
                MIN(duration) AS min_duration,
                MAX(duration) AS max_duration,
                ROUND(SUM(success) * 100.0 / COUNT(*), 2) AS success_rate,
                ROUND(AVG(sources_found), 1) AS avg_sources,
                ROUND(AVG(word_count), 0) AS avg_word_count,
                MAX(created_at) AS last_used
         FROM research_results
         GROUP BY model",
    ),
    (
        "comparison_history view",
        "CREATE VIEW IF NOT EXISTS comparison_history AS
         SELECT s.id AS row_id,
                s.session_id,
                s.query,
                s.timestamp,
                s.user_feedback,
                COUNT(r.research_id) AS models_compared,
                ROUND(AVG(r.duration), 2) AS avg_duration,
                MIN(r.duration) AS min_duration,
                MAX(r.duration) AS max_duration,
                COALESCE(SUM(r.success), 0) AS successful_runs
         FROM research_sessions s
         LEFT JOIN research_results r ON r.session_id = s.session_id
         WHERE s.session_type = 'comparison'
         GROUP BY s.session_id",
    ),
    (
        "research_history view",
        "CREATE VIEW IF NOT EXISTS research_history AS
         SELECT r.id AS row_id,
                r.research_id,
                r.session_id,
                s.query,
                s.session_type,
                r.model,
                r.duration,
                r.sources_found,
                r.word_count,
                r.success,
                r.error,
                r.created_at
         FROM research_results r
         JOIN research_sessions s ON s.session_id = r.session_id",
    ),
];

const SESSION_COLS: &str =
    "session_id, query, session_type, timestamp, user_feedback, created_at, updated_at";

const RESULT_COLS: &str = "research_id, session_id, model, duration, stage_timings, \
     sources_found, word_count, success, error, report_content, supervisor_tools_used, \
     research_brief, created_at";

const HISTORY_COLS: &str = "research_id, session_id, query, session_type, model, duration, \
     sources_found, word_count, success, error, created_at";

/// How long a file-backed connection waits on another writer's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// libsql-backed [`ResearchStore`].
///
/// File and remote databases open a fresh connection per operation, so
/// analytics reads do not queue behind writes. An in-memory database exists
/// only on the connection that created it, so that one connection is shared
/// behind an async mutex.
pub struct TursoClient {
    db: Database,
    connections: Connections,
}

enum Connections {
    Shared(Mutex<Connection>),
    PerOperation { local: bool },
}

/// A connection borrowed for one store operation.
enum Conn<'a> {
    Shared(MutexGuard<'a, Connection>),
    Owned(Connection),
}

impl Deref for Conn<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Conn::Shared(guard) => &**guard,
            Conn::Owned(conn) => conn,
        }
    }
}

impl TursoClient {
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open in-memory database: {}", e)))?;
        let conn = open_connection(&db, false).await?;
        initialize_schema(&conn).await?;
        Ok(Self {
            db,
            connections: Connections::Shared(Mutex::new(conn)),
        })
    }

    pub async fn new_local(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Database(format!("Failed to create database directory: {}", e))
            })?;
        }
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database {}: {}", path, e)))?;
        info!("Opened SQLite database at {}", path);
        Self::per_operation(db, true).await
    }

    #[cfg(feature = "turso")]
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Turso: {}", e)))?;
        Self::per_operation(db, false).await
    }

    async fn per_operation(db: Database, local: bool) -> Result<Self> {
        let conn = open_connection(&db, local).await?;
        initialize_schema(&conn).await?;
        Ok(Self {
            db,
            connections: Connections::PerOperation { local },
        })
    }

    async fn connection(&self) -> Result<Conn<'_>> {
        match &self.connections {
            Connections::Shared(conn) => Ok(Conn::Shared(conn.lock().await)),
            Connections::PerOperation { local } => {
                Ok(Conn::Owned(open_connection(&self.db, *local).await?))
            }
        }
    }
}

async fn open_connection(db: &Database, local: bool) -> Result<Connection> {
    let conn = db
        .connect()
        .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;

    // Foreign keys are per-connection in SQLite
    conn.execute("PRAGMA foreign_keys = ON", ())
        .await
        .map_err(|e| AppError::Database(format!("Failed to enable foreign keys: {}", e)))?;
    if local {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| AppError::Database(format!("Failed to set busy timeout: {}", e)))?;
    }
    Ok(conn)
}

async fn initialize_schema(conn: &Connection) -> Result<()> {
    for (what, sql) in SCHEMA {
        conn.execute(sql, ())
            .await
            .map_err(|e| AppError::Database(format!("Failed to create {}: {}", what, e)))?;
    }
    Ok(())
}

// ============= Row helpers =============

fn db_err(context: &'static str) -> impl Fn(libsql::Error) -> AppError {
    move |e| AppError::Database(format!("{}: {}", context, e))
}

fn get_string(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(db_err("Failed to read text column"))
}

fn get_opt_string(row: &Row, idx: i32) -> Result<Option<String>> {
    row.get::<Option<String>>(idx)
        .map_err(db_err("Failed to read nullable text column"))
}

fn get_i64(row: &Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx)
        .map_err(db_err("Failed to read integer column"))
}

fn get_u32(row: &Row, idx: i32) -> Result<u32> {
    let value = get_i64(row, idx)?;
    u32::try_from(value)
        .map_err(|_| AppError::Database(format!("Integer column out of range: {}", value)))
}

fn get_f64(row: &Row, idx: i32) -> Result<f64> {
    row.get::<f64>(idx).map_err(db_err("Failed to read real column"))
}

fn get_opt_f64(row: &Row, idx: i32) -> Result<Option<f64>> {
    row.get::<Option<f64>>(idx)
        .map_err(db_err("Failed to read nullable real column"))
}

fn get_time(row: &Row, idx: i32) -> Result<DateTime<Utc>> {
    let millis = get_i64(row, idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Database(format!("Invalid timestamp: {}", millis)))
}

fn get_model(row: &Row, idx: i32) -> Result<ModelKind> {
    let raw = get_string(row, idx)?;
    raw.parse()
        .map_err(|_| AppError::Database(format!("Unknown model in store: {}", raw)))
}

fn get_session_type(row: &Row, idx: i32) -> Result<SessionType> {
    let raw = get_string(row, idx)?;
    SessionType::parse(&raw)
        .ok_or_else(|| AppError::Database(format!("Unknown session type in store: {}", raw)))
}

fn get_json<T: serde::de::DeserializeOwned>(row: &Row, idx: i32) -> Result<T> {
    let raw = get_string(row, idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::Database(format!("Invalid JSON in column: {}", e)))
}

fn get_opt_json(row: &Row, idx: i32) -> Result<Option<serde_json::Value>> {
    match get_opt_string(row, idx)? {
        Some(raw) if !raw.is_empty() => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AppError::Database(format!("Invalid JSON in column: {}", e))),
        _ => Ok(None),
    }
}

fn row_to_session(row: &Row) -> Result<ResearchSession> {
    Ok(ResearchSession {
        session_id: get_string(row, 0)?,
        query: get_string(row, 1)?,
        session_type: get_session_type(row, 2)?,
        timestamp: get_time(row, 3)?,
        user_feedback: get_opt_json(row, 4)?,
        created_at: get_time(row, 5)?,
        updated_at: get_time(row, 6)?,
    })
}

fn row_to_result(row: &Row) -> Result<ResearchResult> {
    Ok(ResearchResult {
        research_id: get_string(row, 0)?,
        session_id: get_string(row, 1)?,
        model: get_model(row, 2)?,
        duration: get_f64(row, 3)?,
        stage_timings: get_json(row, 4)?,
        sources_found: get_u32(row, 5)?,
        word_count: get_u32(row, 6)?,
        success: get_i64(row, 7)? != 0,
        error: get_opt_string(row, 8)?,
        report_content: get_string(row, 9)?,
        supervisor_tools_used: get_json(row, 10)?,
        research_brief: get_opt_string(row, 11)?,
        created_at: get_time(row, 12)?,
    })
}

fn row_to_history(row: &Row) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
        research_id: get_string(row, 0)?,
        session_id: get_string(row, 1)?,
        query: get_string(row, 2)?,
        session_type: get_session_type(row, 3)?,
        model: get_model(row, 4)?,
        duration: get_f64(row, 5)?,
        sources_found: get_u32(row, 6)?,
        word_count: get_u32(row, 7)?,
        success: get_i64(row, 8)? != 0,
        error: get_opt_string(row, 9)?,
        created_at: get_time(row, 10)?,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to encode column JSON: {}", e)))
}

// ============= Queries on a locked connection =============

async fn fetch_session(conn: &Connection, session_id: &str) -> Result<Option<ResearchSession>> {
    let mut rows = conn
        .query(
            &format!("SELECT {SESSION_COLS} FROM research_sessions WHERE session_id = ?1"),
            [session_id],
        )
        .await
        .map_err(db_err("Failed to query session"))?;

    match rows.next().await.map_err(db_err("Failed to read session"))? {
        Some(row) => Ok(Some(row_to_session(&row)?)),
        None => Ok(None),
    }
}

async fn fetch_results(conn: &Connection, session_id: &str) -> Result<Vec<ResearchResult>> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {RESULT_COLS} FROM research_results
                 WHERE session_id = ?1 ORDER BY created_at ASC, id ASC"
            ),
            [session_id],
        )
        .await
        .map_err(db_err("Failed to query results"))?;

    let mut results = Vec::new();
    while let Some(row) = rows.next().await.map_err(db_err("Failed to read result"))? {
        results.push(row_to_result(&row)?);
    }
    Ok(results)
}

async fn exists(conn: &Connection, sql: &str, params: Vec<libsql::Value>) -> Result<bool> {
    let mut rows = conn
        .query(sql, libsql::params_from_iter(params))
        .await
        .map_err(db_err("Failed to run existence check"))?;
    Ok(rows
        .next()
        .await
        .map_err(db_err("Failed to read existence check"))?
        .is_some())
}

async fn create_session_tx(
    conn: &Connection,
    session_id: &str,
    query: &str,
    session_type: SessionType,
) -> Result<ResearchSession> {
    if let Some(existing) = fetch_session(conn, session_id).await? {
        if existing.query != query {
            return Err(AppError::Conflict(format!(
                "Session {} already exists for a different query",
                session_id
            )));
        }
        if existing.session_type != session_type {
            return Err(AppError::Conflict(format!(
                "Session {} already exists as a {} session",
                session_id,
                existing.session_type.as_str()
            )));
        }
        debug!(session_id, "Session already exists");
        return Ok(existing);
    }

    let now = Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO research_sessions
            (session_id, query, session_type, timestamp, user_feedback, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)",
        libsql::params![session_id, query, session_type.as_str(), now, now, now],
    )
    .await
    .map_err(db_err("Failed to create session"))?;

    fetch_session(conn, session_id)
        .await?
        .ok_or_else(|| AppError::Database("Session vanished after insert".to_string()))
}

async fn insert_result_tx(conn: &Connection, result: &ResearchResult) -> Result<()> {
    if exists(
        conn,
        "SELECT 1 FROM research_results WHERE research_id = ?1",
        vec![libsql::Value::Text(result.research_id.clone())],
    )
    .await?
    {
        return Err(AppError::Conflict(format!(
            "Result {} already exists",
            result.research_id
        )));
    }

    let session = fetch_session(conn, &result.session_id).await?.ok_or_else(|| {
        AppError::Referential(format!("Session {} does not exist", result.session_id))
    })?;

    match session.session_type {
        SessionType::Individual => {
            if exists(
                conn,
                "SELECT 1 FROM research_results WHERE session_id = ?1",
                vec![libsql::Value::Text(result.session_id.clone())],
            )
            .await?
            {
                return Err(AppError::Conflict(format!(
                    "Individual session {} already has a result",
                    result.session_id
                )));
            }
        }
        SessionType::Comparison => {
            if exists(
                conn,
                "SELECT 1 FROM research_results WHERE session_id = ?1 AND model = ?2",
                vec![
                    libsql::Value::Text(result.session_id.clone()),
                    libsql::Value::Text(result.model.as_str().to_string()),
                ],
            )
            .await?
            {
                return Err(AppError::Conflict(format!(
                    "Comparison session {} already has a {} result",
                    result.session_id, result.model
                )));
            }
        }
    }

    conn.execute(
        &format!(
            "INSERT INTO research_results ({RESULT_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        libsql::params![
            result.research_id.as_str(),
            result.session_id.as_str(),
            result.model.as_str(),
            result.duration,
            to_json(&result.stage_timings)?,
            result.sources_found as i64,
            result.word_count as i64,
            result.success as i64,
            result.error.as_deref(),
            result.report_content.as_str(),
            to_json(&result.supervisor_tools_used)?,
            result.research_brief.as_deref(),
            result.created_at.timestamp_millis(),
        ],
    )
    .await
    .map_err(db_err("Failed to insert result"))?;
    Ok(())
}

fn validate_result(result: &ResearchResult) -> Result<()> {
    if !result.duration.is_finite() || result.duration < 0.0 {
        return Err(AppError::InvalidInput(format!(
            "Invalid duration {} for result {}",
            result.duration, result.research_id
        )));
    }
    if result.success == result.error.is_some() {
        return Err(AppError::InvalidInput(
            "A result carries an error exactly when it failed".to_string(),
        ));
    }
    Ok(())
}

async fn delete_session_tx(conn: &Connection, session_id: &str) -> Result<bool> {
    conn.execute(
        "DELETE FROM research_results WHERE session_id = ?1",
        [session_id],
    )
    .await
    .map_err(db_err("Failed to delete results"))?;
    let removed = conn
        .execute(
            "DELETE FROM research_sessions WHERE session_id = ?1",
            [session_id],
        )
        .await
        .map_err(db_err("Failed to delete session"))?;
    Ok(removed > 0)
}

/// Write transactions take the lock up front, so a check-then-insert never
/// races another connection's write.
async fn begin(conn: &Connection) -> Result<Transaction> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .await
        .map_err(db_err("Failed to begin transaction"))
}

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Transaction, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(db_err("Failed to commit transaction"))?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback()
                .await
                .map_err(db_err("Failed to roll back transaction"))?;
            Err(e)
        }
    }
}

#[async_trait]
impl ResearchStore for TursoClient {
    async fn create_session(
        &self,
        session_id: &str,
        query: &str,
        session_type: SessionType,
    ) -> Result<ResearchSession> {
        if session_id.trim().is_empty() {
            return Err(AppError::InvalidInput("Session id cannot be empty".to_string()));
        }
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput("Query cannot be empty".to_string()));
        }
        let conn = self.connection().await?;
        let tx = begin(&conn).await?;
        let outcome = create_session_tx(&tx, session_id, query, session_type).await;
        finish(tx, outcome).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ResearchSession>> {
        let conn = self.connection().await?;
        fetch_session(&conn, session_id).await
    }

    async fn update_feedback(
        &self,
        session_id: &str,
        feedback: &serde_json::Value,
    ) -> Result<ResearchSession> {
        let encoded = to_json(feedback)?;
        let conn = self.connection().await?;
        let updated = conn
            .execute(
                "UPDATE research_sessions SET user_feedback = ?1, updated_at = ?2
                 WHERE session_id = ?3",
                libsql::params![encoded, Utc::now().timestamp_millis(), session_id],
            )
            .await
            .map_err(db_err("Failed to update feedback"))?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("Session {} not found", session_id)));
        }
        fetch_session(&conn, session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.connection().await?;
        let tx = begin(&conn).await?;
        let outcome = delete_session_tx(&tx, session_id).await;
        finish(tx, outcome).await
    }

    async fn list_sessions(&self, limit: u32) -> Result<Vec<SessionWithResults>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SESSION_COLS} FROM research_sessions
                     ORDER BY timestamp DESC, id DESC LIMIT ?1"
                ),
                [limit.clamp(1, HistoryFilter::MAX_LIMIT) as i64],
            )
            .await
            .map_err(db_err("Failed to list sessions"))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err("Failed to read session"))? {
            sessions.push(row_to_session(&row)?);
        }

        let mut listed = Vec::with_capacity(sessions.len());
        for session in sessions {
            let results = fetch_results(&conn, &session.session_id).await?;
            listed.push(SessionWithResults { session, results });
        }
        Ok(listed)
    }

    async fn insert_result(&self, result: &ResearchResult) -> Result<()> {
        validate_result(result)?;
        let conn = self.connection().await?;
        let tx = begin(&conn).await?;
        let outcome = insert_result_tx(&tx, result).await;
        finish(tx, outcome).await?;
        debug!(
            research_id = %result.research_id,
            session_id = %result.session_id,
            success = result.success,
            "Stored research result"
        );
        Ok(())
    }

    async fn get_result(&self, research_id: &str) -> Result<Option<ResearchResult>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {RESULT_COLS} FROM research_results WHERE research_id = ?1"),
                [research_id],
            )
            .await
            .map_err(db_err("Failed to query result"))?;
        match rows.next().await.map_err(db_err("Failed to read result"))? {
            Some(row) => Ok(Some(row_to_result(&row)?)),
            None => Ok(None),
        }
    }

    async fn results_for_session(&self, session_id: &str) -> Result<Vec<ResearchResult>> {
        let conn = self.connection().await?;
        fetch_results(&conn, session_id).await
    }

    async fn model_performance(&self) -> Result<Vec<ModelPerformance>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT model, total_runs, avg_duration, min_duration, max_duration,
                        success_rate, avg_sources, avg_word_count, last_used
                 FROM model_performance_summary ORDER BY model",
                (),
            )
            .await
            .map_err(db_err("Failed to query model performance"))?;

        let mut summaries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(db_err("Failed to read model performance"))?
        {
            summaries.push(ModelPerformance {
                model: get_model(&row, 0)?,
                total_runs: get_u32(&row, 1)?,
                avg_duration: get_f64(&row, 2)?,
                min_duration: get_f64(&row, 3)?,
                max_duration: get_f64(&row, 4)?,
                success_rate: get_f64(&row, 5)?,
                avg_sources: get_f64(&row, 6)?,
                avg_word_count: get_f64(&row, 7)?,
                last_used: get_time(&row, 8)?,
            });
        }
        Ok(summaries)
    }

    async fn comparison_history(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ComparisonSummary>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT session_id, query, timestamp, models_compared, avg_duration,
                        min_duration, max_duration, successful_runs, user_feedback
                 FROM comparison_history
                 ORDER BY timestamp DESC, row_id DESC
                 LIMIT ?1 OFFSET ?2",
                libsql::params![
                    limit.clamp(1, HistoryFilter::MAX_LIMIT) as i64,
                    offset as i64
                ],
            )
            .await
            .map_err(db_err("Failed to query comparison history"))?;

        let mut history = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(db_err("Failed to read comparison history"))?
        {
            history.push(ComparisonSummary {
                session_id: get_string(&row, 0)?,
                query: get_string(&row, 1)?,
                timestamp: get_time(&row, 2)?,
                models_compared: get_u32(&row, 3)?,
                avg_duration: get_opt_f64(&row, 4)?,
                min_duration: get_opt_f64(&row, 5)?,
                max_duration: get_opt_f64(&row, 6)?,
                successful_runs: get_u32(&row, 7)?,
                user_feedback: get_opt_json(&row, 8)?,
            });
        }
        Ok(history)
    }

    async fn research_history(
        &self,
        filter: &HistoryFilter,
        individual_only: bool,
    ) -> Result<Vec<HistoryEntry>> {
        let mut clauses = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();
        let mut idx = 1;

        if individual_only {
            clauses.push("session_type = 'individual'".to_string());
        }
        if let Some(model) = filter.model.as_deref() {
            let model: ModelKind = model.parse()?;
            params.push(libsql::Value::Text(model.as_str().to_string()));
            clauses.push(format!("model = ?{idx}"));
            idx += 1;
        }
        if let Some(success) = filter.success {
            params.push(libsql::Value::Integer(success as i64));
            clauses.push(format!("success = ?{idx}"));
            idx += 1;
        }
        if let Some(search) = filter.search.as_deref().map(str::trim)
            && !search.is_empty()
        {
            params.push(libsql::Value::Text(search.to_lowercase()));
            clauses.push(format!("instr(lower(query), ?{idx}) > 0"));
            idx += 1;
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        params.push(libsql::Value::Integer(filter.limit() as i64));
        params.push(libsql::Value::Integer(filter.offset() as i64));
        let sql = format!(
            "SELECT {HISTORY_COLS} FROM research_history {where_clause}
             ORDER BY created_at DESC, row_id DESC
             LIMIT ?{} OFFSET ?{}",
            idx,
            idx + 1
        );

        let conn = self.connection().await?;
        let mut rows = conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(db_err("Failed to query research history"))?;

        let mut history = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(db_err("Failed to read research history"))?
        {
            history.push(row_to_history(&row)?);
        }
        Ok(history)
    }

    async fn stage_averages(&self, model: ModelKind) -> Result<Vec<StageAverage>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT stage_timings FROM research_results WHERE model = ?1",
                [model.as_str()],
            )
            .await
            .map_err(db_err("Failed to query stage timings"))?;

        let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(db_err("Failed to read stage timings"))?
        {
            let timings: StageTimings = get_json(&row, 0)?;
            for (stage, seconds) in timings {
                let entry = totals.entry(stage).or_insert((0.0, 0));
                entry.0 += seconds;
                entry.1 += 1;
            }
        }

        Ok(totals
            .into_iter()
            .map(|(stage, (sum, count))| StageAverage {
                stage,
                avg_seconds: ((sum / count as f64) * 100.0).round() / 100.0,
            })
            .collect())
    }

    async fn recent_results(&self, model: ModelKind, limit: u32) -> Result<Vec<ResearchResult>> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RESULT_COLS} FROM research_results WHERE model = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                ),
                libsql::params![model.as_str(), limit.clamp(1, HistoryFilter::MAX_LIMIT) as i64],
            )
            .await
            .map_err(db_err("Failed to query recent results"))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err("Failed to read result"))? {
            results.push(row_to_result(&row)?);
        }
        Ok(results)
    }
}
