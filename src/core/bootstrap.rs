use sqlx::PgPool;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::UserRole;

/// Makes sure the configured administrator account exists and is usable.
/// Accounts come from the identity provider; this seed only guarantees that
/// a fresh deployment has someone who can manage courses.
pub(crate) async fn ensure_admin(pool: &PgPool, settings: &Settings) -> anyhow::Result<()> {
    let admin = settings.admin();
    if admin.first_admin_email.is_empty() {
        tracing::warn!("FIRST_ADMIN_EMAIL not configured; skipping admin creation");
        return Ok(());
    }

    let email = &admin.first_admin_email;
    let user = sqlx::query_as::<_, User>(
        "SELECT id, email, full_name, role, is_active, created_at, updated_at
         FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    let now = primitive_now_utc();

    if let Some(user) = user {
        if user.role == UserRole::Admin && user.is_active {
            tracing::info!("Default admin already up to date");
            return Ok(());
        }

        sqlx::query("UPDATE users SET role = $1, is_active = $2, updated_at = $3 WHERE id = $4")
            .bind(UserRole::Admin)
            .bind(true)
            .bind(now)
            .bind(&user.id)
            .execute(pool)
            .await?;

        tracing::info!("Promoted default admin {email}");
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO users (id, email, full_name, role, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email)
    .bind(&admin.first_admin_name)
    .bind(UserRole::Admin)
    .bind(true)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!("Created default admin {email}");
    Ok(())
}
