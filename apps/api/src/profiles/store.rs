use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::ProfileRow;

/// Sender details used when personalising outreach emails.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub email_signature: Option<String>,
}

/// Returns the caller's profile, creating an empty one on first access.
pub async fn get_or_create_profile(
    pool: &PgPool,
    user_id: Uuid,
    email: Option<&str>,
) -> Result<ProfileRow, AppError> {
    sqlx::query("INSERT INTO profiles (id, email) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
        .bind(user_id)
        .bind(email)
        .execute(pool)
        .await?;

    Ok(
        sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await?,
    )
}

pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    email: Option<&str>,
    patch: &ProfilePatch,
) -> Result<ProfileRow, AppError> {
    get_or_create_profile(pool, user_id, email).await?;
    Ok(sqlx::query_as::<_, ProfileRow>(
        r#"
        UPDATE profiles
        SET full_name = COALESCE($2, full_name),
            company = COALESCE($3, company),
            title = COALESCE($4, title),
            email_signature = COALESCE($5, email_signature),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&patch.full_name)
    .bind(&patch.company)
    .bind(&patch.title)
    .bind(&patch.email_signature)
    .fetch_one(pool)
    .await?)
}
