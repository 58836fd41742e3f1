//! PostgreSQL identity index
//!
//! Links live in the `sso_identity_links` table:
//!
//! ```sql
//! CREATE TABLE sso_identity_links (
//!     provider TEXT NOT NULL,
//!     external_id TEXT NOT NULL,
//!     user_id BIGINT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     PRIMARY KEY (provider, external_id)
//! );
//! ```
//!
//! The primary key enforces at most one local user per external identity, so
//! two processes racing on the same identity see exactly one winning insert.

use async_trait::async_trait;
use sqlx::PgPool;

use super::IdentityIndex;
use crate::error::{SsoError, SsoResult};
use crate::identity::LocalUserId;

const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS sso_identity_links (
        provider TEXT NOT NULL,
        external_id TEXT NOT NULL,
        user_id BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (provider, external_id)
    )
";

const CREATE_USER_INDEX: &str = r"
    CREATE INDEX IF NOT EXISTS idx_sso_identity_links_user_id
        ON sso_identity_links (user_id)
";

/// Identity index stored in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgIdentityIndex {
    pool: PgPool,
}

impl PgIdentityIndex {
    /// Wrap an existing connection pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the links table and its indexes if they do not exist
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the database query fails
    pub async fn migrate(&self) -> SsoResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_USER_INDEX).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityIndex for PgIdentityIndex {
    async fn lookup(&self, provider: &str, external_id: &str) -> SsoResult<Option<LocalUserId>> {
        let user_id = sqlx::query_scalar::<_, i64>(
            r"
            SELECT user_id
            FROM sso_identity_links
            WHERE provider = $1 AND external_id = $2
            ",
        )
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user_id)
    }

    async fn bind(
        &self,
        provider: &str,
        external_id: &str,
        user_id: LocalUserId,
    ) -> SsoResult<()> {
        let inserted = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO sso_identity_links (provider, external_id, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider, external_id) DO NOTHING
            RETURNING user_id
            ",
        )
        .bind(provider)
        .bind(external_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(());
        }

        // Lost the insert: either an idempotent re-bind or a conflict.
        match self.lookup(provider, external_id).await? {
            Some(existing) if existing == user_id => Ok(()),
            Some(existing) => Err(SsoError::Conflict {
                provider: provider.to_string(),
                external_id: external_id.to_string(),
                existing,
            }),
            None => Err(SsoError::StoreUnavailable(format!(
                "link {provider}:{external_id} vanished during bind"
            ))),
        }
    }

    async fn unbind(&self, provider: &str, external_id: &str) -> SsoResult<()> {
        sqlx::query(
            r"
            DELETE FROM sso_identity_links
            WHERE provider = $1 AND external_id = $2
            ",
        )
        .bind(provider)
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
