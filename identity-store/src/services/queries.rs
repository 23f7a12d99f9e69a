//! Row access layer: single-table primitives over Postgres.
//!
//! A [`Queries`] handle is bound either to the pool (each statement checks
//! out its own connection) or to one open transaction (every statement runs
//! on that transaction's connection).

use crate::error::StoreError;
use crate::models::{CreateIdentity, CreateUser, Identity, Membership, Namespace, User};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnection, PgPool, Postgres};
use std::ops::{Deref, DerefMut};
use tracing::instrument;
use uuid::Uuid;

/// Single-entity primitives the workflows are composed from.
///
/// Key lookups report a missing row as [`StoreError::NotFound`]; list
/// lookups return an empty vector instead.
#[async_trait]
pub trait RowAccess: Send {
    async fn create_user(&mut self, input: &CreateUser) -> Result<User, StoreError>;

    async fn create_identity(&mut self, input: &CreateIdentity) -> Result<Identity, StoreError>;

    async fn get_identity_by_type_and_value(
        &mut self,
        identity_type: &str,
        value: &str,
    ) -> Result<Identity, StoreError>;

    async fn get_user_by_id(&mut self, id: Uuid) -> Result<User, StoreError>;

    async fn get_memberships_by_user_id(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, StoreError>;

    async fn get_memberships_by_namespace_id(
        &mut self,
        namespace_id: Uuid,
    ) -> Result<Vec<Membership>, StoreError>;

    async fn get_namespace_by_id(&mut self, id: Uuid) -> Result<Namespace, StoreError>;
}

enum Source<'c> {
    Pool(&'c PgPool),
    Tx(&'c mut PgConnection),
}

/// Connection a single statement runs on.
enum Conn<'a> {
    Pooled(PoolConnection<Postgres>),
    Borrowed(&'a mut PgConnection),
}

impl Deref for Conn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Conn::Pooled(conn) => &**conn,
            Conn::Borrowed(conn) => &**conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Conn::Pooled(conn) => &mut **conn,
            Conn::Borrowed(conn) => &mut **conn,
        }
    }
}

/// Postgres implementation of [`RowAccess`].
pub struct Queries<'c> {
    source: Source<'c>,
}

impl<'c> Queries<'c> {
    pub fn from_pool(pool: &'c PgPool) -> Self {
        Self {
            source: Source::Pool(pool),
        }
    }

    /// Bind a handle to an open transaction's connection.
    pub fn from_tx(conn: &'c mut PgConnection) -> Self {
        Self {
            source: Source::Tx(conn),
        }
    }

    async fn conn(&mut self) -> Result<Conn<'_>, StoreError> {
        match &mut self.source {
            Source::Pool(pool) => pool
                .acquire()
                .await
                .map(Conn::Pooled)
                .map_err(|e| StoreError::from(e).context("failed to acquire connection")),
            Source::Tx(conn) => Ok(Conn::Borrowed(&mut **conn)),
        }
    }
}

#[async_trait]
impl RowAccess for Queries<'_> {
    #[instrument(skip(self, input))]
    async fn create_user(&mut self, input: &CreateUser) -> Result<User, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let mut conn = self.conn().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, password, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, password, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.password.as_deref())
        .bind(input.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| StoreError::from(e).context("failed to create user"))?;

        timer.observe_duration();

        Ok(user)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id, identity_type = %input.identity_type))]
    async fn create_identity(&mut self, input: &CreateIdentity) -> Result<Identity, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_identity"])
            .start_timer();

        let mut conn = self.conn().await?;
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            INSERT INTO identities (id, user_id, "type", value, verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, "type", value, verified, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.identity_type.as_str())
        .bind(&input.value)
        .bind(input.verified)
        .bind(input.created_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(format!(
                    "{} identity '{}' already exists",
                    input.identity_type, input.value
                ))
            }
            _ => StoreError::from(e)
                .context(format!("failed to create identity for user {}", input.user_id)),
        })?;

        timer.observe_duration();

        Ok(identity)
    }

    #[instrument(skip(self))]
    async fn get_identity_by_type_and_value(
        &mut self,
        identity_type: &str,
        value: &str,
    ) -> Result<Identity, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_identity_by_type_and_value"])
            .start_timer();

        let mut conn = self.conn().await?;
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            SELECT id, user_id, "type", value, verified, created_at
            FROM identities
            WHERE "type" = $1 AND value = $2
            "#,
        )
        .bind(identity_type)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::from(e).context(format!("failed to get identity {}:{}", identity_type, value))
        })?;

        timer.observe_duration();

        identity.ok_or_else(|| StoreError::not_found("identity", format!("{}:{}", identity_type, value)))
    }

    #[instrument(skip(self))]
    async fn get_user_by_id(&mut self, id: Uuid) -> Result<User, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user_by_id"])
            .start_timer();

        let mut conn = self.conn().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, password, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::from(e).context(format!("failed to get user {}", id)))?;

        timer.observe_duration();

        user.ok_or_else(|| StoreError::not_found("user", id))
    }

    #[instrument(skip(self))]
    async fn get_memberships_by_user_id(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_memberships_by_user_id"])
            .start_timer();

        let mut conn = self.conn().await?;
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, user_id, namespace_id, created_at
            FROM memberships
            WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::from(e).context(format!("failed to list memberships for user {}", user_id))
        })?;

        timer.observe_duration();

        Ok(memberships)
    }

    #[instrument(skip(self))]
    async fn get_memberships_by_namespace_id(
        &mut self,
        namespace_id: Uuid,
    ) -> Result<Vec<Membership>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_memberships_by_namespace_id"])
            .start_timer();

        let mut conn = self.conn().await?;
        let memberships = sqlx::query_as::<_, Membership>(
            r#"
            SELECT id, user_id, namespace_id, created_at
            FROM memberships
            WHERE namespace_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(namespace_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::from(e)
                .context(format!("failed to list memberships for namespace {}", namespace_id))
        })?;

        timer.observe_duration();

        Ok(memberships)
    }

    #[instrument(skip(self))]
    async fn get_namespace_by_id(&mut self, id: Uuid) -> Result<Namespace, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_namespace_by_id"])
            .start_timer();

        let mut conn = self.conn().await?;
        let namespace = sqlx::query_as::<_, Namespace>(
            r#"
            SELECT id, name, created_at
            FROM namespaces
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::from(e).context(format!("failed to get namespace {}", id)))?;

        timer.observe_duration();

        namespace.ok_or_else(|| StoreError::not_found("namespace", id))
    }
}
