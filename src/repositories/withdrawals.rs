use crate::models::withdrawals;

use sqlx::{types::Json, PgConnection, PgPool};

use super::StoreError;

#[derive(Clone)]
pub struct WithdrawalRepository {
    conn: PgPool,
}

impl WithdrawalRepository {
    pub fn new(conn: PgPool) -> Self {
        WithdrawalRepository { conn }
    }

    pub async fn list_withdrawals(&self, user_id: Option<&str>) -> Result<Vec<withdrawals::Withdrawal>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<withdrawals::Withdrawal>>(
            r#"SELECT doc FROM withdrawals
            WHERE $1::TEXT IS NULL OR user_id = $1
            ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows.into_iter().map(|Json(w)| w).collect())
    }

    pub async fn insert_withdrawal(
        conn: &mut PgConnection,
        withdrawal: &withdrawals::Withdrawal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO withdrawals (id, user_id, created_at, doc)
            VALUES ($1, $2, $3, $4)"#,
        )
        .bind(&withdrawal.id)
        .bind(&withdrawal.user_id)
        .bind(withdrawal.date)
        .bind(Json(withdrawal))
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn lock_withdrawal(
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<Option<withdrawals::Withdrawal>, StoreError> {
        let withdrawal = sqlx::query_scalar::<_, Json<withdrawals::Withdrawal>>(
            "SELECT doc FROM withdrawals WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(withdrawal.map(|Json(w)| w))
    }

    pub async fn write_withdrawal(
        conn: &mut PgConnection,
        withdrawal: &withdrawals::Withdrawal,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE withdrawals SET doc = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(&withdrawal.id)
            .bind(Json(withdrawal))
            .execute(conn)
            .await?;

        Ok(())
    }
}
