//! Store facade: the transaction coordinator and the workflows composed on
//! top of the row access layer.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{
    CreateIdentity, CreateUser, CreateUserWithIdentity, Identity, IdentityType, Namespace, User,
};
use crate::services::database::{Database, PgDatabase, Transaction};
use crate::services::metrics::{ERRORS_TOTAL, TRANSACTIONS_TOTAL, USERS_PROVISIONED};
use crate::services::queries::RowAccess;
use chrono::Utc;
use futures::future::BoxFuture;
use service_core::error::AppError;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

fn record_error(operation: &str, err: &StoreError) {
    ERRORS_TOTAL
        .with_label_values(&[operation, err.kind()])
        .inc();
}

/// Data access entry point. The database handle is injected at
/// construction; nothing is read from global state.
#[derive(Clone)]
pub struct Store<D = PgDatabase> {
    db: D,
    tx_timeout: Option<Duration>,
}

impl Store<PgDatabase> {
    /// Connect to Postgres using `config` and apply its transaction timeout.
    pub async fn connect(config: &StoreConfig) -> Result<Self, AppError> {
        let db = PgDatabase::connect(&config.database).await?;
        let store = Self::new(db);
        Ok(match config.tx_timeout {
            Some(timeout) => store.with_tx_timeout(timeout),
            None => store,
        })
    }
}

impl<D: Database> Store<D> {
    pub fn new(db: D) -> Self {
        Self {
            db,
            tx_timeout: None,
        }
    }

    /// Bound every unit of work run by [`Store::exec_tx`]. A unit of work
    /// that overruns fails with [`StoreError::Timeout`] and is rolled back.
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    /// Pool-level row access for single-table reads.
    pub fn queries(&self) -> D::Queries<'_> {
        self.db.queries()
    }

    /// Run `unit_of_work` inside one transaction.
    ///
    /// The unit of work receives a handle bound to the new transaction and
    /// is invoked exactly once. On success the transaction is committed and a
    /// commit failure is returned as-is. On failure it is rolled back; if the
    /// rollback fails too, both errors are returned in
    /// [`StoreError::Rollback`]. The unit of work must not commit or roll
    /// back itself.
    #[instrument(skip_all)]
    pub async fn exec_tx<T, F>(&self, unit_of_work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'q> FnOnce(&'q mut dyn RowAccess) -> BoxFuture<'q, Result<T, StoreError>> + Send,
    {
        let mut tx = self.db.begin().await.inspect_err(|_| {
            TRANSACTIONS_TOTAL.with_label_values(&["begin_failed"]).inc();
        })?;

        let outcome = {
            let mut queries = tx.queries();
            let work = unit_of_work(&mut queries);
            match self.tx_timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or_else(|_| Err(StoreError::Timeout(limit))),
                None => work.await,
            }
        };

        match outcome {
            Ok(value) => match tx.commit().await {
                Ok(()) => {
                    TRANSACTIONS_TOTAL.with_label_values(&["committed"]).inc();
                    debug!("Transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    TRANSACTIONS_TOTAL.with_label_values(&["commit_failed"]).inc();
                    error!(error = %err, "Transaction commit failed");
                    Err(err)
                }
            },
            Err(err) => match tx.rollback().await {
                Ok(()) => {
                    TRANSACTIONS_TOTAL.with_label_values(&["rolled_back"]).inc();
                    warn!(error = %err, "Transaction rolled back");
                    Err(err)
                }
                Err(rollback) => {
                    TRANSACTIONS_TOTAL
                        .with_label_values(&["rollback_failed"])
                        .inc();
                    error!(error = %err, rollback_error = %rollback, "Transaction rollback failed");
                    Err(StoreError::Rollback {
                        original: Box::new(err),
                        rollback: Box::new(rollback),
                    })
                }
            },
        }
    }

    /// Create a user and its first identity atomically.
    ///
    /// `identity_type` must be exactly `email` or `username`; anything else
    /// fails before the database is touched. An identity that already
    /// exists for the same type and value is a conflict.
    #[instrument(
        skip(self, input),
        fields(identity_type = %input.identity_type, has_password = input.password.is_some())
    )]
    pub async fn create_user_with_identity(
        &self,
        input: CreateUserWithIdentity,
    ) -> Result<(User, Identity), StoreError> {
        let identity_type: IdentityType = input
            .identity_type
            .parse()
            .map_err(StoreError::InvalidArgument)
            .inspect_err(|e| record_error("create_user_with_identity", e))?;

        let CreateUserWithIdentity {
            identity_value,
            password,
            ..
        } = input;

        let (user, identity) = self
            .exec_tx(move |q| {
                Box::pin(async move {
                    match q
                        .get_identity_by_type_and_value(identity_type.as_str(), &identity_value)
                        .await
                    {
                        Ok(_) => {
                            return Err(StoreError::Conflict(format!(
                                "{} identity '{}' already exists",
                                identity_type, identity_value
                            )));
                        }
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e.context("could not check existing identity")),
                    }

                    let user = q
                        .create_user(&CreateUser {
                            password,
                            created_at: Utc::now(),
                        })
                        .await?;

                    let identity = q
                        .create_identity(&CreateIdentity::unverified(
                            user.id,
                            identity_type,
                            identity_value,
                        ))
                        .await?;

                    Ok((user, identity))
                })
            })
            .await
            .inspect_err(|e| record_error("create_user_with_identity", e))?;

        USERS_PROVISIONED
            .with_label_values(&[identity_type.as_str()])
            .inc();
        info!(user_id = %user.id, identity_id = %identity.id, "User provisioned");

        Ok((user, identity))
    }

    /// Resolve the user owning the identity `(identity_type, value)`.
    ///
    /// The type is passed through unvalidated.
    #[instrument(skip(self))]
    pub async fn get_user_by_identity(
        &self,
        identity_type: &str,
        value: &str,
    ) -> Result<User, StoreError> {
        let mut q = self.db.queries();

        let identity = q
            .get_identity_by_type_and_value(identity_type, value)
            .await
            .map_err(|e| e.context("could not get identity"))
            .inspect_err(|e| record_error("get_user_by_identity", e))?;

        q.get_user_by_id(identity.user_id)
            .await
            .inspect_err(|e| record_error("get_user_by_identity", e))
    }

    /// Namespaces `user_id` is a member of, in membership order.
    ///
    /// A membership pointing at a missing namespace fails the whole call.
    #[instrument(skip(self))]
    pub async fn get_user_namespaces(&self, user_id: Uuid) -> Result<Vec<Namespace>, StoreError> {
        let mut q = self.db.queries();

        let memberships = q
            .get_memberships_by_user_id(user_id)
            .await
            .inspect_err(|e| record_error("get_user_namespaces", e))?;

        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let mut namespaces = Vec::with_capacity(memberships.len());
        for membership in &memberships {
            let namespace = q
                .get_namespace_by_id(membership.namespace_id)
                .await
                .map_err(|e| e.context(format!("could not get namespace {}", membership.namespace_id)))
                .inspect_err(|e| record_error("get_user_namespaces", e))?;
            namespaces.push(namespace);
        }

        debug!(count = namespaces.len(), "Resolved user namespaces");

        Ok(namespaces)
    }

    /// Users that are members of `namespace_id`, in membership order.
    ///
    /// A membership pointing at a missing user fails the whole call.
    #[instrument(skip(self))]
    pub async fn get_namespace_members(&self, namespace_id: Uuid) -> Result<Vec<User>, StoreError> {
        let mut q = self.db.queries();

        let memberships = q
            .get_memberships_by_namespace_id(namespace_id)
            .await
            .inspect_err(|e| record_error("get_namespace_members", e))?;

        if memberships.is_empty() {
            return Ok(Vec::new());
        }

        let mut users = Vec::with_capacity(memberships.len());
        for membership in &memberships {
            let user = q
                .get_user_by_id(membership.user_id)
                .await
                .map_err(|e| e.context(format!("could not get user {}", membership.user_id)))
                .inspect_err(|e| record_error("get_namespace_members", e))?;
            users.push(user);
        }

        debug!(count = users.len(), "Resolved namespace members");

        Ok(users)
    }
}
