//! SQLite-backed alarm store
//!
//! Owns the canonical alarm records. Every write is a single atomic
//! statement; state changes go through a compare-and-set UPDATE so that
//! concurrent wake and stop callbacks serialize on the row itself.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::{AlarmRequest, AlarmState};
use crate::error::{Result, WakeError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alarms (
    id                   TEXT PRIMARY KEY,
    title                TEXT NOT NULL,
    fire_at_epoch_millis INTEGER NOT NULL,
    state                TEXT NOT NULL,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alarms_state_fire_at
    ON alarms (state, fire_at_epoch_millis, id);
";

/// Durable alarm store on a local SQLite file
pub struct SqliteAlarmStore {
    pool: SqlitePool,
}

impl SqliteAlarmStore {
    /// Open (or create) the store at `db_path`
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WakeError::Config(format!("cannot create data dir: {}", e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .journal_mode(SqliteJournalMode::Wal) // Enable WAL for concurrent reads
            .synchronous(SqliteSynchronous::Normal) // Balance performance and safety
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        info!("alarm store opened: {}", db_path.display());
        Ok(Self { pool })
    }

    /// Insert a new alarm; fails with `DuplicateId` if the id exists
    pub async fn put(&self, req: &AlarmRequest) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO alarms (id, title, fire_at_epoch_millis, state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&req.id)
        .bind(&req.title)
        .bind(req.fire_at_epoch_millis)
        .bind(req.state.as_str())
        .bind(req.created_at)
        .bind(req.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("stored alarm {} (fire at {})", req.id, req.fire_at_epoch_millis);
                Ok(())
            }
            Err(e) => {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return Err(WakeError::DuplicateId(req.id.clone()));
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Get an alarm by id
    pub async fn get(&self, id: &str) -> Result<AlarmRequest> {
        let row = sqlx::query("SELECT * FROM alarms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_alarm(&row),
            None => Err(WakeError::NotFound(id.to_string())),
        }
    }

    /// All Scheduled alarms, ordered by (fire time, id) ascending
    ///
    /// The id component is the deterministic tie-break for equal fire times.
    pub async fn list_pending(&self) -> Result<Vec<AlarmRequest>> {
        let rows = sqlx::query(
            "SELECT * FROM alarms WHERE state = ?
             ORDER BY fire_at_epoch_millis ASC, id ASC",
        )
        .bind(AlarmState::Scheduled.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_alarm).collect()
    }

    /// Transition an alarm from `from` to `to` and return the updated record
    ///
    /// The update is a compare-and-set on the current state: if the row is no
    /// longer in `from` the call fails with `InvalidTransition` carrying the
    /// actual state, and callers decide whether that race is benign.
    pub async fn update_state(
        &self,
        id: &str,
        from: AlarmState,
        to: AlarmState,
    ) -> Result<AlarmRequest> {
        if !from.can_transition(to) {
            return Err(WakeError::InvalidTransition { from, to });
        }

        let updated = sqlx::query(
            "UPDATE alarms SET state = ?, updated_at = ? WHERE id = ? AND state = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            // Row missing or already moved on; report what we actually found
            let current = self.get(id).await?;
            return Err(WakeError::InvalidTransition {
                from: current.state,
                to,
            });
        }

        debug!("alarm {} transitioned {} -> {}", id, from, to);
        self.get(id).await
    }

    /// Delete Stopped/Expired alarms last updated before `cutoff`
    ///
    /// Retention sweep for terminal records; returns the number removed.
    pub async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM alarms WHERE state IN (?, ?) AND updated_at < ?",
        )
        .bind(AlarmState::Stopped.as_str())
        .bind(AlarmState::Expired.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!("purged {} terminal alarms older than {}", purged, cutoff);
        }
        Ok(purged)
    }
}

fn row_to_alarm(row: &SqliteRow) -> Result<AlarmRequest> {
    let state: String = row.try_get("state")?;
    let state = state
        .parse::<AlarmState>()
        .map_err(WakeError::Internal)?;

    Ok(AlarmRequest {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        fire_at_epoch_millis: row.try_get("fire_at_epoch_millis")?,
        state,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}
