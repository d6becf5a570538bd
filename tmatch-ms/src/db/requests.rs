//! Session request store
//!
//! Durable record of every instant session request. All mutation funnels
//! through `update_if`, a single conditional-update primitive: the UPDATE
//! only applies while the row's current status matches the caller's
//! expectation, and SQLite executes the statement atomically. That is the
//! entire concurrency story: no locks, no cross-request coordination.
//!
//! Rows are never deleted; terminal records are retained for history.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tmatch_common::model::SESSION_DURATION_MINUTES;
use tmatch_common::{time, Error, RequestStatus, Result, SessionRequest};
use uuid::Uuid;

use super::retry::retry_on_lock;

/// Field patch applied by `update_if`; `None` leaves a column untouched
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub tutor_id: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

/// Which party's join marker to stamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinParty {
    Tutor,
    Student,
}

/// SQLite-backed request store
#[derive(Clone)]
pub struct RequestStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl RequestStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new pending request, stamping `requested_at`
    pub async fn create(&self, student_id: Uuid, subject_id: Uuid) -> Result<SessionRequest> {
        let request = SessionRequest {
            id: Uuid::new_v4(),
            student_id,
            subject_id,
            duration_minutes: SESSION_DURATION_MINUTES,
            status: RequestStatus::Pending,
            tutor_id: None,
            meeting_url: None,
            requested_at: time::now(),
            accepted_at: None,
            tutor_joined_at: None,
            student_joined_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            expired_at: None,
            cancellation_reason: None,
        };

        let id = request.id.to_string();
        let student = student_id.to_string();
        let subject = subject_id.to_string();
        let requested_at = request.requested_at.to_rfc3339();

        retry_on_lock("create_request", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO session_requests
                    (id, student_id, subject_id, duration_minutes, status, requested_at)
                VALUES (?, ?, ?, ?, 'pending', ?)
                "#,
            )
            .bind(&id)
            .bind(&student)
            .bind(&subject)
            .bind(SESSION_DURATION_MINUTES)
            .bind(&requested_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        Ok(request)
    }

    /// Fetch one request by id
    pub async fn get(&self, id: Uuid) -> Result<SessionRequest> {
        let row = sqlx::query("SELECT * FROM session_requests WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_request(&row),
            None => Err(Error::NotFound(id)),
        }
    }

    /// Pending pool, oldest first, optionally restricted to one subject
    pub async fn list_pending(&self, subject_id: Option<Uuid>) -> Result<Vec<SessionRequest>> {
        let rows = match subject_id {
            Some(subject) => {
                sqlx::query(
                    "SELECT * FROM session_requests
                     WHERE status = 'pending' AND subject_id = ?
                     ORDER BY requested_at ASC",
                )
                .bind(subject.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM session_requests
                     WHERE status = 'pending'
                     ORDER BY requested_at ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_request).collect()
    }

    /// Pending requests older than `cutoff` (sweep input)
    ///
    /// RFC3339 UTC strings compare lexicographically in timestamp order, so
    /// the filter runs SQL-side.
    pub async fn list_pending_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<SessionRequest>> {
        let rows = sqlx::query(
            "SELECT * FROM session_requests
             WHERE status = 'pending' AND requested_at < ?
             ORDER BY requested_at ASC",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    /// Request history for a student, any status, newest first
    pub async fn list_by_student(&self, student_id: Uuid, limit: i64) -> Result<Vec<SessionRequest>> {
        let rows = sqlx::query(
            "SELECT * FROM session_requests
             WHERE student_id = ?
             ORDER BY requested_at DESC
             LIMIT ?",
        )
        .bind(student_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    /// Request history for a tutor, any status, newest first
    pub async fn list_by_tutor(&self, tutor_id: Uuid, limit: i64) -> Result<Vec<SessionRequest>> {
        let rows = sqlx::query(
            "SELECT * FROM session_requests
             WHERE tutor_id = ?
             ORDER BY requested_at DESC
             LIMIT ?",
        )
        .bind(tutor_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    /// The single mutation primitive: apply `patch` only if the current
    /// status is one of `expected`, atomically.
    ///
    /// Exactly one of N racing callers observes a matching status; the rest
    /// get `InvalidTransition` carrying the status that beat them (or
    /// `NotFound` for an unknown id). `action` names the attempted operation
    /// in the error.
    pub async fn update_if(
        &self,
        id: Uuid,
        expected: &[RequestStatus],
        patch: RequestPatch,
        action: &'static str,
    ) -> Result<SessionRequest> {
        let placeholders = vec!["?"; expected.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE session_requests SET
                status = COALESCE(?, status),
                tutor_id = COALESCE(?, tutor_id),
                accepted_at = COALESCE(?, accepted_at),
                started_at = COALESCE(?, started_at),
                completed_at = COALESCE(?, completed_at),
                cancelled_at = COALESCE(?, cancelled_at),
                expired_at = COALESCE(?, expired_at),
                cancellation_reason = COALESCE(?, cancellation_reason)
            WHERE id = ? AND status IN ({placeholders})
            "#
        );

        let id_str = id.to_string();
        let status = patch.status.map(|s| s.as_str());
        let tutor_id = patch.tutor_id.map(|u| u.to_string());
        let accepted_at = patch.accepted_at.map(|t| t.to_rfc3339());
        let started_at = patch.started_at.map(|t| t.to_rfc3339());
        let completed_at = patch.completed_at.map(|t| t.to_rfc3339());
        let cancelled_at = patch.cancelled_at.map(|t| t.to_rfc3339());
        let expired_at = patch.expired_at.map(|t| t.to_rfc3339());
        let reason = patch.cancellation_reason;

        let rows_affected = retry_on_lock(action, self.max_lock_wait_ms, || async {
            let mut query = sqlx::query(&sql)
                .bind(status)
                .bind(&tutor_id)
                .bind(&accepted_at)
                .bind(&started_at)
                .bind(&completed_at)
                .bind(&cancelled_at)
                .bind(&expired_at)
                .bind(&reason)
                .bind(&id_str);
            for expected_status in expected {
                query = query.bind(expected_status.as_str());
            }
            let result = query.execute(&self.pool).await.map_err(Error::Database)?;
            Ok(result.rows_affected())
        })
        .await?;

        if rows_affected == 1 {
            return self.get(id).await;
        }

        // Precondition failed: re-read to tell "gone" from "someone won"
        let current = self.get(id).await?;
        Err(Error::InvalidTransition {
            id,
            from: current.status,
            action,
        })
    }

    /// Guarded, first-writer-wins meeting URL persistence
    ///
    /// Writes only while the request is `accepted` and no URL exists yet. A
    /// lost race is success: the winner's URL is read back and returned,
    /// never overwritten.
    pub async fn set_meeting_url_if_unset(&self, id: Uuid, url: &str) -> Result<SessionRequest> {
        let id_str = id.to_string();

        let rows_affected = retry_on_lock("set_meeting_url", self.max_lock_wait_ms, || async {
            let result = sqlx::query(
                "UPDATE session_requests SET meeting_url = ?
                 WHERE id = ? AND status = 'accepted' AND meeting_url IS NULL",
            )
            .bind(url)
            .bind(&id_str)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(result.rows_affected())
        })
        .await?;

        let current = self.get(id).await?;
        if rows_affected == 1 || current.meeting_url.is_some() {
            return Ok(current);
        }

        Err(Error::InvalidTransition {
            id,
            from: current.status,
            action: "provision",
        })
    }

    /// Idempotent join-marker stamp; status is never changed
    ///
    /// Sets the party's joined-at only if currently unset and the session is
    /// `accepted` or `in_progress`. An already-set marker is a no-op success
    /// returning the unchanged row.
    pub async fn mark_joined(&self, id: Uuid, party: JoinParty) -> Result<SessionRequest> {
        let sql = match party {
            JoinParty::Tutor => {
                "UPDATE session_requests SET tutor_joined_at = ?
                 WHERE id = ? AND tutor_joined_at IS NULL
                   AND status IN ('accepted', 'in_progress')"
            }
            JoinParty::Student => {
                "UPDATE session_requests SET student_joined_at = ?
                 WHERE id = ? AND student_joined_at IS NULL
                   AND status IN ('accepted', 'in_progress')"
            }
        };

        let id_str = id.to_string();
        let joined_at = time::now().to_rfc3339();

        retry_on_lock("mark_joined", self.max_lock_wait_ms, || async {
            sqlx::query(sql)
                .bind(&joined_at)
                .bind(&id_str)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        let current = self.get(id).await?;
        let marker = match party {
            JoinParty::Tutor => current.tutor_joined_at,
            JoinParty::Student => current.student_joined_at,
        };

        if marker.is_some() {
            Ok(current)
        } else {
            Err(Error::InvalidTransition {
                id,
                from: current.status,
                action: "join",
            })
        }
    }
}

fn row_to_request(row: &SqliteRow) -> Result<SessionRequest> {
    Ok(SessionRequest {
        id: get_uuid(row, "id")?,
        student_id: get_uuid(row, "student_id")?,
        subject_id: get_uuid(row, "subject_id")?,
        duration_minutes: row.get("duration_minutes"),
        status: {
            let status: String = row.get("status");
            RequestStatus::parse(&status).ok_or_else(|| {
                Error::Internal(format!("Unknown status in database: {}", status))
            })?
        },
        tutor_id: get_opt_uuid(row, "tutor_id")?,
        meeting_url: row.get("meeting_url"),
        requested_at: get_timestamp(row, "requested_at")?,
        accepted_at: get_opt_timestamp(row, "accepted_at")?,
        tutor_joined_at: get_opt_timestamp(row, "tutor_joined_at")?,
        student_joined_at: get_opt_timestamp(row, "student_joined_at")?,
        started_at: get_opt_timestamp(row, "started_at")?,
        completed_at: get_opt_timestamp(row, "completed_at")?,
        cancelled_at: get_opt_timestamp(row, "cancelled_at")?,
        expired_at: get_opt_timestamp(row, "expired_at")?,
        cancellation_reason: row.get("cancellation_reason"),
    })
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.get(column);
    Uuid::parse_str(&value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let value: Option<String> = row.get(column);
    value
        .map(|s| {
            Uuid::parse_str(&s)
                .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
        })
        .transpose()
}

fn get_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.get(column);
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn get_opt_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(column);
    value
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
        })
        .transpose()
}
