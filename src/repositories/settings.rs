use crate::models::settings::GlobalSettings;

use sqlx::{types::Json, PgPool};

use super::StoreError;

const SETTINGS_KEY: &str = "settings";

#[derive(Clone)]
pub struct SettingsRepository {
    conn: PgPool,
}

impl SettingsRepository {
    pub fn new(conn: PgPool) -> Self {
        SettingsRepository { conn }
    }

    pub async fn get_settings(&self) -> Result<Option<GlobalSettings>, StoreError> {
        let settings = sqlx::query_scalar::<_, Json<GlobalSettings>>("SELECT doc FROM globals WHERE id = $1")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.conn)
            .await?;

        Ok(settings.map(|Json(settings)| settings))
    }

    pub async fn save_settings(&self, settings: &GlobalSettings) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO globals (id, doc) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = CURRENT_TIMESTAMP"#,
        )
        .bind(SETTINGS_KEY)
        .bind(Json(settings))
        .execute(&self.conn)
        .await?;

        Ok(())
    }
}
