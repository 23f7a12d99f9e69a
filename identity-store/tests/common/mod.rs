//! Common test utilities for identity-store integration tests.
//!
//! [`MemoryDatabase`] is an in-memory [`Database`]: each transaction works
//! on a snapshot of the tables that replaces the committed state only on
//! commit. It counts every begin, commit, rollback and statement, and can be
//! told to fail at specific points.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use identity_store::models::{
    CreateIdentity, CreateUser, Identity, IdentityType, Membership, Namespace, User,
};
use identity_store::{Database, RowAccess, StoreError, Transaction};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,identity_store=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub users: Vec<User>,
    pub identities: Vec<Identity>,
    pub namespaces: Vec<Namespace>,
    pub memberships: Vec<Membership>,
}

/// Points at which the fake store reports a store failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub begin: bool,
    pub commit: bool,
    pub rollback: bool,
    pub create_identity: bool,
    pub identity_lookup: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub statements: usize,
}

#[derive(Default)]
struct State {
    tables: Tables,
    faults: Faults,
    counts: Counts,
}

/// The row an insert of `input` produces, under a fresh id.
pub fn user_row(input: CreateUser) -> User {
    User {
        id: Uuid::new_v4(),
        password: input.password,
        created_at: input.created_at,
    }
}

/// The row an insert of `input` produces, under a fresh id.
pub fn identity_row(input: CreateIdentity) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        user_id: input.user_id,
        identity_type: input.identity_type.as_str().to_string(),
        value: input.value,
        verified: input.verified,
        created_at: input.created_at,
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::from(sqlx::Error::Protocol(format!("injected {} failure", what)))
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("state lock poisoned")
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    pub fn tables(&self) -> Tables {
        self.lock().tables.clone()
    }

    pub fn seed_user(&self) -> User {
        let user = user_row(CreateUser {
            password: None,
            created_at: Utc::now(),
        });
        self.lock().tables.users.push(user.clone());
        user
    }

    /// Insert an identity without checking that its user exists.
    pub fn seed_identity(&self, user_id: Uuid, identity_type: IdentityType, value: &str) -> Identity {
        let identity = identity_row(CreateIdentity::unverified(
            user_id,
            identity_type,
            value.to_string(),
        ));
        self.lock().tables.identities.push(identity.clone());
        identity
    }

    pub fn seed_namespace(&self, name: &str) -> Namespace {
        let namespace = Namespace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.lock().tables.namespaces.push(namespace.clone());
        namespace
    }

    /// Insert a membership without checking either side exists.
    pub fn seed_membership(&self, user_id: Uuid, namespace_id: Uuid) -> Membership {
        let membership = Membership {
            id: Uuid::new_v4(),
            user_id,
            namespace_id,
            created_at: Utc::now(),
        };
        self.lock().tables.memberships.push(membership.clone());
        membership
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Tx = MemoryTransaction;

    type Queries<'a> = MemoryQueries<'a>
    where
        Self: 'a;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        let mut state = self.lock();
        state.counts.begins += 1;
        if state.faults.begin {
            return Err(StoreError::from(sqlx::Error::PoolTimedOut));
        }
        Ok(MemoryTransaction {
            db: self.clone(),
            staged: state.tables.clone(),
            finished: false,
        })
    }

    fn queries(&self) -> MemoryQueries<'_> {
        MemoryQueries::Pool(self)
    }
}

/// Dropping a transaction that was neither committed nor rolled back counts
/// as a rollback and discards its snapshot, like a dropped `sqlx`
/// transaction.
pub struct MemoryTransaction {
    db: MemoryDatabase,
    staged: Tables,
    finished: bool,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Ok(mut state) = self.db.state.lock() {
            state.counts.rollbacks += 1;
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    type Queries<'t> = MemoryQueries<'t>
    where
        Self: 't;

    fn queries(&mut self) -> MemoryQueries<'_> {
        MemoryQueries::Tx(self)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let mut state = self.db.lock();
        state.counts.commits += 1;
        if state.faults.commit {
            return Err(injected("commit"));
        }
        state.tables = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let mut state = self.db.lock();
        state.counts.rollbacks += 1;
        if state.faults.rollback {
            return Err(injected("rollback"));
        }
        Ok(())
    }
}

pub enum MemoryQueries<'a> {
    Pool(&'a MemoryDatabase),
    Tx(&'a mut MemoryTransaction),
}

impl MemoryQueries<'_> {
    /// Run one statement against the committed tables or the transaction's
    /// snapshot. The lock is never held across an await.
    fn statement<R>(&mut self, f: impl FnOnce(&mut Tables, Faults) -> R) -> R {
        match self {
            MemoryQueries::Pool(db) => {
                let mut state = db.lock();
                state.counts.statements += 1;
                let faults = state.faults;
                f(&mut state.tables, faults)
            }
            MemoryQueries::Tx(tx) => {
                let faults = {
                    let mut state = tx.db.lock();
                    state.counts.statements += 1;
                    state.faults
                };
                f(&mut tx.staged, faults)
            }
        }
    }
}

#[async_trait]
impl RowAccess for MemoryQueries<'_> {
    async fn create_user(&mut self, input: &CreateUser) -> Result<User, StoreError> {
        let user = user_row(input.clone());
        self.statement(|tables, _| tables.users.push(user.clone()));
        Ok(user)
    }

    async fn create_identity(&mut self, input: &CreateIdentity) -> Result<Identity, StoreError> {
        let input = input.clone();
        self.statement(|tables, faults| {
            if faults.create_identity {
                return Err(injected("create_identity"));
            }
            let duplicate = tables.identities.iter().any(|i| {
                i.identity_type == input.identity_type.as_str() && i.value == input.value
            });
            if duplicate {
                return Err(StoreError::Conflict(format!(
                    "{} identity '{}' already exists",
                    input.identity_type, input.value
                )));
            }
            let identity = identity_row(input);
            tables.identities.push(identity.clone());
            Ok(identity)
        })
    }

    async fn get_identity_by_type_and_value(
        &mut self,
        identity_type: &str,
        value: &str,
    ) -> Result<Identity, StoreError> {
        self.statement(|tables, faults| {
            if faults.identity_lookup {
                return Err(injected("identity lookup"));
            }
            tables
                .identities
                .iter()
                .find(|i| i.identity_type == identity_type && i.value == value)
                .cloned()
                .ok_or_else(|| {
                    StoreError::not_found("identity", format!("{}:{}", identity_type, value))
                })
        })
    }

    async fn get_user_by_id(&mut self, id: Uuid) -> Result<User, StoreError> {
        self.statement(|tables, _| {
            tables
                .users
                .iter()
                .find(|u| u.id == id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("user", id))
        })
    }

    async fn get_memberships_by_user_id(
        &mut self,
        user_id: Uuid,
    ) -> Result<Vec<Membership>, StoreError> {
        self.statement(|tables, _| {
            Ok(tables
                .memberships
                .iter()
                .filter(|m| m.user_id == user_id)
                .cloned()
                .collect())
        })
    }

    async fn get_memberships_by_namespace_id(
        &mut self,
        namespace_id: Uuid,
    ) -> Result<Vec<Membership>, StoreError> {
        self.statement(|tables, _| {
            Ok(tables
                .memberships
                .iter()
                .filter(|m| m.namespace_id == namespace_id)
                .cloned()
                .collect())
        })
    }

    async fn get_namespace_by_id(&mut self, id: Uuid) -> Result<Namespace, StoreError> {
        self.statement(|tables, _| {
            tables
                .namespaces
                .iter()
                .find(|n| n.id == id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("namespace", id))
        })
    }
}
