use crate::models::admin_logs::AdminLog;

use sqlx::{types::Json, PgPool};

use super::StoreError;

/// Append-only: entries are never updated or deleted.
#[derive(Clone)]
pub struct AdminLogRepository {
    conn: PgPool,
}

impl AdminLogRepository {
    pub fn new(conn: PgPool) -> Self {
        AdminLogRepository { conn }
    }

    pub async fn append(&self, entry: &AdminLog) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO admin_logs (id, created_at, doc) VALUES ($1, $2, $3)")
            .bind(&entry.id)
            .bind(entry.timestamp)
            .bind(Json(entry))
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<AdminLog>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<AdminLog>>("SELECT doc FROM admin_logs ORDER BY created_at DESC")
            .fetch_all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(|Json(entry)| entry).collect())
    }
}
