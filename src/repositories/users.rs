use crate::models::users;

use sqlx::{types::Json, PgConnection, PgPool};

use super::StoreError;

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn insert_user(&self, user: &users::User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
                INSERT INTO users (id, referral_code, doc)
                VALUES ($1, $2, $3)
            "#,
        )
        .bind(&user.uid)
        .bind(&user.referral_code)
        .bind(Json(user))
        .execute(&self.conn)
        .await?;

        Ok(())
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<users::User>, StoreError> {
        let user = sqlx::query_scalar::<_, Json<users::User>>("SELECT doc FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.conn)
            .await?;

        Ok(user.map(|Json(user)| user))
    }

    pub async fn list_users(&self) -> Result<Vec<users::User>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<users::User>>("SELECT doc FROM users ORDER BY id")
            .fetch_all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(|Json(user)| user).collect())
    }

    pub async fn referral_code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE referral_code = $1)")
            .bind(code)
            .fetch_one(&self.conn)
            .await?;

        Ok(exists)
    }

    /// Loads a user inside a transaction, holding its row lock until commit.
    pub async fn lock_user(conn: &mut PgConnection, user_id: &str) -> Result<Option<users::User>, StoreError> {
        let user = sqlx::query_scalar::<_, Json<users::User>>("SELECT doc FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(conn)
            .await?;

        Ok(user.map(|Json(user)| user))
    }

    /// Id of the account owning `code`, skipping `except_id`. Takes no lock.
    pub async fn find_id_by_referral_code(
        conn: &mut PgConnection,
        code: &str,
        except_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let id = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE referral_code = $1 AND id <> $2")
            .bind(code)
            .bind(except_id)
            .fetch_optional(conn)
            .await?;

        Ok(id)
    }

    /// Locks several users at once. Rows are locked in id order, so two
    /// transactions over the same accounts always queue instead of deadlocking.
    pub async fn lock_users(conn: &mut PgConnection, user_ids: &[String]) -> Result<Vec<users::User>, StoreError> {
        let rows = sqlx::query_scalar::<_, Json<users::User>>(
            "SELECT doc FROM users WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(user_ids)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(|Json(user)| user).collect())
    }

    pub async fn write_user(conn: &mut PgConnection, user: &users::User) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET doc = $2, referral_code = $3, updated_at = CURRENT_TIMESTAMP WHERE id = $1",
        )
        .bind(&user.uid)
        .bind(Json(user))
        .bind(&user.referral_code)
        .execute(conn)
        .await?;

        Ok(())
    }
}
