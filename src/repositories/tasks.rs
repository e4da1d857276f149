use crate::models::tasks;

use sqlx::{types::Json, PgConnection, PgPool};

use super::StoreError;

#[derive(Clone)]
pub struct TaskRepository {
    conn: PgPool,
}

impl TaskRepository {
    pub fn new(conn: PgPool) -> Self {
        TaskRepository { conn }
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<tasks::Task>, StoreError> {
        let task = sqlx::query_scalar::<_, Json<tasks::Task>>("SELECT doc FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(task.map(|Json(task)| task))
    }

    pub async fn share_task(conn: &mut PgConnection, id: &str) -> Result<Option<tasks::Task>, StoreError> {
        let task = sqlx::query_scalar::<_, Json<tasks::Task>>("SELECT doc FROM tasks WHERE id = $1 FOR SHARE")
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(task.map(|Json(task)| task))
    }

    pub async fn list_tasks(&self) -> Result<Vec<tasks::Task>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<tasks::Task>>("SELECT doc FROM tasks ORDER BY id")
            .fetch_all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(|Json(task)| task).collect())
    }

    pub async fn upsert_task(&self, task: &tasks::Task) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO tasks (id, doc) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(&task.id)
        .bind(Json(task))
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    pub async fn delete_task(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
