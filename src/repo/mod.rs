/// Repository layer for database operations
use crate::domain::{NotificationKey, NotificationRecord, PathRow, Target, User};
use crate::errors::{ApiResult, SweepResult};
use crate::services::{NotificationLedger, TargetDirectory};
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

type TargetRow = (Uuid, i32, i32, f64, f64, Option<f64>, Option<f64>, i64);

fn target_from_row(
    (id, path, row, latitude, longitude, min_cloud_cover, max_cloud_cover, offset_seconds): TargetRow,
) -> Target {
    Target {
        id,
        path,
        row,
        latitude,
        longitude,
        min_cloud_cover,
        max_cloud_cover,
        notification_offset: Duration::seconds(offset_seconds),
    }
}

/// Users and their notification targets
#[derive(Clone)]
pub struct TargetRepo {
    pool: PgPool,
}

impl TargetRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a user account
    pub async fn create_user(&self, email: &str) -> ApiResult<User> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users(id, email) VALUES ($1, $2)")
            .bind(id)
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(User {
            id,
            email: email.to_string(),
        })
    }

    pub async fn get_user(&self, id: Uuid) -> ApiResult<Option<User>> {
        let row = sqlx::query_as::<_, (Uuid, String)>("SELECT id, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id, email)| User { id, email }))
    }

    /// Attach a target to a user, generating its id
    pub async fn add_target(&self, user_id: Uuid, target: &Target) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO targets(id, user_id, wrs_path, wrs_row, latitude, longitude,
                                 min_cloud_cover, max_cloud_cover, notification_offset_seconds)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(target.id)
        .bind(user_id)
        .bind(target.path)
        .bind(target.row)
        .bind(target.latitude)
        .bind(target.longitude)
        .bind(target.min_cloud_cover)
        .bind(target.max_cloud_cover)
        .bind(target.notification_offset.num_seconds())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_target(&self, id: Uuid) -> ApiResult<Option<Target>> {
        let row = sqlx::query_as::<_, TargetRow>(
            "SELECT id, wrs_path, wrs_row, latitude, longitude,
                    min_cloud_cover, max_cloud_cover, notification_offset_seconds
             FROM targets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(target_from_row))
    }

    /// Delete a target; returns whether a row existed
    pub async fn remove_target(&self, id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM targets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every path/row at least one target watches, deduplicated
    pub async fn registered_path_rows(&self) -> SweepResult<Vec<PathRow>> {
        let rows = sqlx::query_as::<_, (i32, i32)>(
            "SELECT DISTINCT wrs_path, wrs_row FROM targets ORDER BY wrs_path, wrs_row",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(path, row)| PathRow { path, row })
            .collect())
    }

    /// Users watching a path/row, each with their targets on it
    pub async fn users_and_targets(
        &self,
        path: i32,
        row: i32,
    ) -> SweepResult<Vec<(User, Vec<Target>)>> {
        let rows = sqlx::query_as::<_, (Uuid, String, Uuid, f64, f64, Option<f64>, Option<f64>, i64)>(
            "SELECT u.id, u.email, t.id, t.latitude, t.longitude,
                    t.min_cloud_cover, t.max_cloud_cover, t.notification_offset_seconds
             FROM targets t
             JOIN users u ON u.id = t.user_id
             WHERE t.wrs_path = $1 AND t.wrs_row = $2
             ORDER BY u.id",
        )
        .bind(path)
        .bind(row)
        .fetch_all(&self.pool)
        .await?;

        // Rows are sorted by user id, so grouping is a single pass.
        let mut grouped: Vec<(User, Vec<Target>)> = Vec::new();
        for (user_id, email, t_id, lat, lon, min_cc, max_cc, offset) in rows {
            let target = target_from_row((t_id, path, row, lat, lon, min_cc, max_cc, offset));
            match grouped.last_mut() {
                Some((user, targets)) if user.id == user_id => targets.push(target),
                _ => grouped.push((User { id: user_id, email }, vec![target])),
            }
        }

        Ok(grouped)
    }
}

impl TargetDirectory for TargetRepo {
    async fn list_registered_path_rows(&self) -> SweepResult<Vec<PathRow>> {
        self.registered_path_rows().await
    }

    async fn list_users_and_targets(
        &self,
        path: i32,
        row: i32,
    ) -> SweepResult<Vec<(User, Vec<Target>)>> {
        self.users_and_targets(path, row).await
    }
}

/// Notification dedup ledger
#[derive(Clone)]
pub struct NotificationRepo {
    pool: PgPool,
}

impl NotificationRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl NotificationLedger for NotificationRepo {
    /// Insert the row if this prediction instance is new, then read its flag.
    /// The insert-if-absent and the read are separate statements; the primary
    /// key makes concurrent inserts collapse into one row.
    async fn get_or_create(&self, key: &NotificationKey) -> SweepResult<NotificationRecord> {
        sqlx::query(
            "INSERT INTO notification_log(wrs_path, wrs_row, user_id, target_id, predicted_acquisition)
             VALUES ($1,$2,$3,$4,$5)
             ON CONFLICT DO NOTHING",
        )
        .bind(key.path)
        .bind(key.row)
        .bind(key.user_id)
        .bind(key.target_id)
        .bind(key.predicted_acquisition)
        .execute(&self.pool)
        .await?;

        let (has_been_notified,) = sqlx::query_as::<_, (bool,)>(
            "SELECT has_been_notified FROM notification_log
             WHERE wrs_path = $1 AND wrs_row = $2 AND user_id = $3
               AND target_id = $4 AND predicted_acquisition = $5",
        )
        .bind(key.path)
        .bind(key.row)
        .bind(key.user_id)
        .bind(key.target_id)
        .bind(key.predicted_acquisition)
        .fetch_one(&self.pool)
        .await?;

        Ok(NotificationRecord {
            key: *key,
            has_been_notified,
        })
    }

    async fn set_notified(&self, key: &NotificationKey, notified: bool) -> SweepResult<()> {
        sqlx::query(
            "UPDATE notification_log SET has_been_notified = $6
             WHERE wrs_path = $1 AND wrs_row = $2 AND user_id = $3
               AND target_id = $4 AND predicted_acquisition = $5",
        )
        .bind(key.path)
        .bind(key.row)
        .bind(key.user_id)
        .bind(key.target_id)
        .bind(key.predicted_acquisition)
        .bind(notified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Initialize database tables
pub async fn init_db(pool: &PgPool) -> ApiResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users(
            id UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    // ROW is reserved in Postgres, hence the wrs_ prefix.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS targets(
            id UUID PRIMARY KEY,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            wrs_path INT NOT NULL,
            wrs_row INT NOT NULL,
            latitude DOUBLE PRECISION NOT NULL,
            longitude DOUBLE PRECISION NOT NULL,
            min_cloud_cover DOUBLE PRECISION,
            max_cloud_cover DOUBLE PRECISION,
            notification_offset_seconds BIGINT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_targets_path_row
         ON targets(wrs_path, wrs_row)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS notification_log(
            wrs_path INT NOT NULL,
            wrs_row INT NOT NULL,
            user_id UUID NOT NULL,
            target_id UUID NOT NULL,
            predicted_acquisition TIMESTAMPTZ NOT NULL,
            has_been_notified BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (wrs_path, wrs_row, user_id, target_id, predicted_acquisition)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}
