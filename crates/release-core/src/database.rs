//! SQLite-backed storage for releases and their approval trail.
//!
//! Connection/pool setup and the `Database` struct shape follow
//! `orchestrate-core/src/database.rs`. The original Python system has
//! no migration files in the retrieved pack, so the schema here is
//! declared inline rather than loaded via `include_str!` of `.sql`
//! assets; it reproduces the columns used by
//! `name-release-machine/internal/repo/release/query.py`.

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;

use crate::approval::{quorum_outcome, ApprovalVote, QuorumOutcome};
use crate::audit::{AuditAction, AuditEntry};
use crate::error::{Error, Result};
use crate::release::{NewRelease, Release, ReleaseStatus, ReleaseUpdate};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS releases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    service_name TEXT NOT NULL,
    release_tag TEXT NOT NULL,
    rollback_to_tag TEXT,
    status TEXT NOT NULL,
    initiated_by TEXT NOT NULL,
    github_run_id TEXT,
    github_action_link TEXT,
    github_ref TEXT,
    approved_list TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_releases_status ON releases(status);
CREATE INDEX IF NOT EXISTS idx_releases_service ON releases(service_name);

CREATE TABLE IF NOT EXISTS release_audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_id INTEGER NOT NULL REFERENCES releases(id),
    action TEXT NOT NULL,
    actor TEXT NOT NULL,
    detail TEXT,
    occurred_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    #[cfg(test)]
    pub(crate) pool: SqlitePool,
    #[cfg(not(test))]
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(path, DatabaseConfig::default()).await
    }

    pub async fn with_config(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// In-memory database for tests, one connection so `BEGIN
    /// IMMEDIATE` locking behaves the same as the on-disk case.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn create_table(&self) -> Result<()> {
        self.run_migrations().await
    }

    pub async fn drop_table(&self) -> Result<()> {
        sqlx::query("DROP TABLE IF EXISTS release_audit_log")
            .execute(&self.pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS releases")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_release(&self, new: NewRelease) -> Result<Release> {
        let row = sqlx::query(
            r#"
            INSERT INTO releases (
                service_name, release_tag, status, initiated_by,
                github_run_id, github_action_link, github_ref, approved_list
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, '[]')
            RETURNING *
            "#,
        )
        .bind(&new.service_name)
        .bind(&new.release_tag)
        .bind(ReleaseStatus::Initiated.as_str())
        .bind(&new.initiated_by)
        .bind(&new.github_run_id)
        .bind(&new.github_action_link)
        .bind(&new.github_ref)
        .fetch_one(&self.pool)
        .await?;

        let release = row_to_release(&row)?;
        self.record_audit(release.id, AuditAction::ReleaseCreated, &new.initiated_by, None)
            .await?;
        Ok(release)
    }

    pub async fn get_release_by_id(&self, release_id: i64) -> Result<Release> {
        let row = sqlx::query("SELECT * FROM releases WHERE id = ?")
            .bind(release_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::ReleaseNotFound(release_id))?;
        row_to_release(&row)
    }

    pub async fn get_active_releases(&self) -> Result<Vec<Release>> {
        self.get_releases_where(ReleaseStatus::is_active).await
    }

    pub async fn get_successful_releases(&self) -> Result<Vec<Release>> {
        self.get_releases_where(ReleaseStatus::is_successful).await
    }

    pub async fn get_failed_releases(&self) -> Result<Vec<Release>> {
        self.get_releases_where(ReleaseStatus::is_failed).await
    }

    /// The "last N successful" picker the rollback-target dialog uses
    /// (`success_release/getter.py`'s `RecentSuccessful` window):
    /// at most `limit` releases of `service_name`, newest first,
    /// excluding `exclude_id` (the release currently being rolled
    /// back).
    pub async fn get_recent_successful(
        &self,
        service_name: &str,
        limit: i64,
        exclude_id: i64,
    ) -> Result<Vec<Release>> {
        let mut releases: Vec<Release> = self
            .get_successful_releases()
            .await?
            .into_iter()
            .filter(|r| r.service_name == service_name && r.id != exclude_id)
            .collect();
        releases.truncate(limit.max(0) as usize);
        Ok(releases)
    }

    /// Matches the original's `query.py` bucket lookups: a literal
    /// `WHERE status IN (...)` over the statuses `pred` selects, not a
    /// full-table scan filtered in Rust.
    async fn get_releases_where(&self, pred: fn(ReleaseStatus) -> bool) -> Result<Vec<Release>> {
        let statuses: Vec<&'static str> = ReleaseStatus::ALL
            .iter()
            .copied()
            .filter(|s| pred(*s))
            .map(ReleaseStatus::as_str)
            .collect();

        let placeholders = std::iter::repeat("?")
            .take(statuses.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql =
            format!("SELECT * FROM releases WHERE status IN ({placeholders}) ORDER BY created_at DESC");

        let mut query = sqlx::query(&sql);
        for status in &statuses {
            query = query.bind(*status);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_release).collect()
    }

    pub async fn update_release(&self, release_id: i64, update: ReleaseUpdate) -> Result<Release> {
        let current = self.get_release_by_id(release_id).await?;

        // spec.md §8 round-trip law: an Update with no fields set is a
        // no-op — returns the current row, writes nothing.
        if update.status.is_none()
            && update.rollback_to_tag.is_none()
            && update.github_run_id.is_none()
            && update.github_action_link.is_none()
            && update.started_at.is_none()
            && update.completed_at.is_none()
        {
            return Ok(current);
        }

        if let Some(next) = update.status {
            if next != current.status && !current.status.can_transition_to(next) {
                return Err(Error::InvalidStateTransition(
                    current.status.as_str().to_string(),
                    next.as_str().to_string(),
                ));
            }
        }

        let status = update.status.unwrap_or(current.status);
        let rollback_to_tag = update.rollback_to_tag.or(current.rollback_to_tag);
        let github_run_id = update.github_run_id.or(current.github_run_id);
        let github_action_link = update.github_action_link.or(current.github_action_link);
        let started_at = update.started_at.or(current.started_at);
        // completed_at is set iff status is terminal (spec.md §3 invariant 4),
        // stamped here rather than trusted from the caller.
        let completed_at = if status.is_terminal() {
            current.completed_at.or(update.completed_at).or(Some(Utc::now()))
        } else {
            None
        };

        // spec.md §8 round-trip law: "Repeated Update(status=X) while
        // already in X is a no-op." Generalized to every resolved
        // field, not just status: if nothing the caller asked for
        // actually changes the row, skip the write and the audit
        // entry rather than restamping an identical state.
        if status == current.status
            && rollback_to_tag == current.rollback_to_tag
            && github_run_id == current.github_run_id
            && github_action_link == current.github_action_link
            && started_at == current.started_at
            && completed_at == current.completed_at
        {
            return Ok(current);
        }

        let row = sqlx::query(
            r#"
            UPDATE releases SET
                status = ?, rollback_to_tag = ?, github_run_id = ?,
                github_action_link = ?, started_at = ?, completed_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(&rollback_to_tag)
        .bind(&github_run_id)
        .bind(&github_action_link)
        .bind(started_at)
        .bind(completed_at)
        .bind(release_id)
        .fetch_one(&self.pool)
        .await?;

        let release = row_to_release(&row)?;
        let audit_action = match status {
            ReleaseStatus::Rollback => AuditAction::RollbackStarted,
            ReleaseStatus::RollbackDone => AuditAction::RollbackDone,
            ReleaseStatus::RollbackFailed => AuditAction::RollbackFailed,
            _ => AuditAction::ReleaseUpdated,
        };
        self.record_audit(
            release_id,
            audit_action,
            "system",
            Some(format!("status={}", status.as_str())),
        )
        .await?;
        Ok(release)
    }

    /// Applies one approval/reject vote inside a single `BEGIN
    /// IMMEDIATE` transaction so two concurrent approvers can never
    /// both observe an open quorum and both write the final approval
    /// — see `DESIGN.md`'s "Concurrent-approval lost-write
    /// prevention" entry.
    pub async fn record_approval_decision(
        &self,
        release_id: i64,
        approver: &str,
        vote: ApprovalVote,
        required_approvers: &[String],
    ) -> Result<(Release, QuorumOutcome)> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = async {
            let row = sqlx::query("SELECT * FROM releases WHERE id = ?")
                .bind(release_id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or(Error::ReleaseNotFound(release_id))?;
            let release = row_to_release(&row)?;

            if release.status != ReleaseStatus::ManualTesting {
                return Err(Error::NotAwaitingApproval(release_id));
            }
            if !required_approvers.iter().any(|a| a == approver) {
                return Err(Error::NotEligibleApprover {
                    approver: approver.to_string(),
                });
            }
            if matches!(vote, ApprovalVote::Approve)
                && release.approved_list.iter().any(|a| a == approver)
            {
                return Err(Error::AlreadyVoted {
                    release_id,
                    approver: approver.to_string(),
                });
            }

            let outcome = match vote {
                ApprovalVote::Reject => QuorumOutcome::Rejected,
                ApprovalVote::Approve => {
                    quorum_outcome(required_approvers, &release.approved_list, approver)
                }
            };

            let mut approved_list = release.approved_list.clone();
            if matches!(vote, ApprovalVote::Approve)
                && !approved_list.iter().any(|a| a == approver)
            {
                approved_list.push(approver.to_string());
            }
            let approved_json = serde_json::to_string(&approved_list)?;

            let next_status = outcome.resulting_status().unwrap_or(release.status);
            let completed_at = if next_status.is_terminal() {
                release.completed_at.or(Some(Utc::now()))
            } else {
                release.completed_at
            };

            let row = sqlx::query(
                "UPDATE releases SET approved_list = ?, status = ?, completed_at = ? WHERE id = ? RETURNING *",
            )
            .bind(&approved_json)
            .bind(next_status.as_str())
            .bind(completed_at)
            .bind(release_id)
            .fetch_one(&mut *conn)
            .await?;
            let updated = row_to_release(&row)?;

            sqlx::query(
                "INSERT INTO release_audit_log (release_id, action, actor, detail) VALUES (?, ?, ?, ?)",
            )
            .bind(release_id)
            .bind(match vote {
                ApprovalVote::Approve => AuditAction::Approved.as_str(),
                ApprovalVote::Reject => AuditAction::Rejected.as_str(),
            })
            .bind(approver)
            .bind(Option::<String>::None)
            .execute(&mut *conn)
            .await?;

            Ok((updated, outcome))
        }
        .await;

        match &result {
            Ok(_) => sqlx::query("COMMIT").execute(&mut *conn).await?,
            Err(_) => sqlx::query("ROLLBACK").execute(&mut *conn).await?,
        };
        result
    }

    async fn record_audit(
        &self,
        release_id: i64,
        action: AuditAction,
        actor: &str,
        detail: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO release_audit_log (release_id, action, actor, detail) VALUES (?, ?, ?, ?)",
        )
        .bind(release_id)
        .bind(action.as_str())
        .bind(actor)
        .bind(detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn audit_log_for(&self, release_id: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM release_audit_log WHERE release_id = ? ORDER BY occurred_at ASC",
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_audit_entry).collect()
    }

    /// The one reverse edge the state machine allows outside the
    /// forward graph in `ReleaseStatus::can_transition_to`: a rollback
    /// launch that never ran (SSH connect/upload/launch failure)
    /// reverts `ROLLBACK` back to `DEPLOYED` (spec.md §4.3/§7). Only
    /// valid while the release is still sat in `ROLLBACK` — if the
    /// remote plan already reported progress this is a no-op error,
    /// since the caller should not compensate a rollback that may
    /// already be running on the host.
    pub async fn compensate_rollback_to_deployed(&self, release_id: i64) -> Result<Release> {
        let current = self.get_release_by_id(release_id).await?;
        if current.status != ReleaseStatus::Rollback {
            return Err(Error::InvalidStateTransition(
                current.status.as_str().to_string(),
                ReleaseStatus::Deployed.as_str().to_string(),
            ));
        }
        let row = sqlx::query("UPDATE releases SET status = ? WHERE id = ? RETURNING *")
            .bind(ReleaseStatus::Deployed.as_str())
            .bind(release_id)
            .fetch_one(&self.pool)
            .await?;
        let release = row_to_release(&row)?;
        self.record_audit(
            release_id,
            AuditAction::RollbackFailed,
            "system",
            Some("rollback launch failed before anything ran; reverted to deployed".to_string()),
        )
        .await?;
        Ok(release)
    }
}

fn row_to_release(row: &sqlx::sqlite::SqliteRow) -> Result<Release> {
    let approved_list_raw: String = row.try_get("approved_list")?;
    let approved_list: Vec<String> = serde_json::from_str(&approved_list_raw)?;
    let status_raw: String = row.try_get("status")?;

    Ok(Release {
        id: row.try_get("id")?,
        service_name: row.try_get("service_name")?,
        release_tag: row.try_get("release_tag")?,
        rollback_to_tag: row.try_get("rollback_to_tag")?,
        status: ReleaseStatus::parse(&status_raw)?,
        initiated_by: row.try_get("initiated_by")?,
        github_run_id: row.try_get("github_run_id")?,
        github_action_link: row.try_get("github_action_link")?,
        github_ref: row.try_get("github_ref")?,
        approved_list,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn row_to_audit_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry> {
    let action_raw: String = row.try_get("action")?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        release_id: row.try_get("release_id")?,
        action: AuditAction::parse(&action_raw)?,
        actor: row.try_get("actor")?,
        detail: row.try_get("detail")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}
