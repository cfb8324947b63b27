use super::transaction::{TransactionError, TransactionManager, UnitOfWork};
use crate::auth::error::RepositoryError;
use crate::auth::models::{CreateSessionParams, CreateUserParams, User};
use crate::auth::repository::AuthRepository;
use crate::auth::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Error)]
enum MemoryStoreError {
    #[error("storage is unavailable")]
    Unavailable,

    #[error("duplicate key value violates unique constraint \"{0}\"")]
    UniqueViolation(&'static str),

    #[error("insert violates foreign key constraint \"{0}\"")]
    ForeignKeyViolation(&'static str),

    #[error("savepoint \"{0}\" does not exist")]
    NoSuchSavepoint(String),

    #[error("session {0} references a missing user")]
    DanglingSession(Uuid),
}

#[derive(Debug, Clone)]
struct SessionRecord {
    id: Uuid,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    // Primary index: token -> session
    sessions: HashMap<String, SessionRecord>,
}

/// In-process store with the same transaction semantics as the relational
/// backend.
///
/// Transactions are serialized: `begin` waits until the previous unit is
/// committed or dropped, so a task must not hold two units at once.
#[derive(Clone, Default)]
pub struct MemoryTransactionManager {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every repository call fails with `RepositoryError::Unknown`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of committed users
    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }

    /// Number of committed sessions
    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }
}

#[async_trait]
impl TransactionManager for MemoryTransactionManager {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransactionError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            savepoints: Vec::new(),
            unavailable: Arc::clone(&self.unavailable),
        }))
    }
}

/// A transaction over a private working copy of the tables.
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    savepoints: Vec<(String, Tables)>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryUnitOfWork {
    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::unknown(MemoryStoreError::Unavailable));
        }
        Ok(())
    }

    fn savepoint(&mut self, name: &str) {
        self.savepoints.push((name.to_string(), self.working.clone()));
    }

    /// Restore the snapshot taken at `name`; the savepoint itself survives.
    fn rollback_to(&mut self, name: &str) -> Result<(), MemoryStoreError> {
        let position = self
            .savepoints
            .iter()
            .rposition(|(saved, _)| saved == name)
            .ok_or_else(|| MemoryStoreError::NoSuchSavepoint(name.to_string()))?;

        self.savepoints.truncate(position + 1);
        self.working = self.savepoints[position].1.clone();
        Ok(())
    }

    fn release(&mut self, name: &str) {
        if let Some(position) = self.savepoints.iter().rposition(|(saved, _)| saved == name) {
            self.savepoints.truncate(position);
        }
    }

    fn build_session(&self, token: &str, record: &SessionRecord) -> Result<Session, RepositoryError> {
        let user = self
            .working
            .users
            .get(&record.user_id)
            .cloned()
            .ok_or_else(|| RepositoryError::unknown(MemoryStoreError::DanglingSession(record.id)))?;

        Ok(Session {
            id: record.id,
            user,
            token: token.to_string(),
            expires_at: record.expires_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn repository(&mut self) -> &mut dyn AuthRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        // Dropping the guard discards the working copy
        Ok(())
    }
}

#[async_trait]
impl AuthRepository for MemoryUnitOfWork {
    async fn create_user(&mut self, params: CreateUserParams) -> Result<User, RepositoryError> {
        self.check_available()?;
        self.savepoint("create_user");

        let taken = self
            .working
            .users
            .values()
            .any(|user| user.username == params.username);

        if taken {
            self.rollback_to("create_user")
                .map_err(RepositoryError::unknown)?;
            self.release("create_user");
            return Err(RepositoryError::AlreadyExists);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: params.username,
            role: params.role,
            password_hash: params.password_hash,
            created_at: now,
            updated_at: now,
        };
        self.working.users.insert(user.id, user.clone());
        self.release("create_user");

        Ok(user)
    }

    async fn get_user_by_username(&mut self, username: &str) -> Result<User, RepositoryError> {
        self.check_available()?;

        self.working
            .users
            .values()
            .find(|user| user.username == username)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn create_session(
        &mut self,
        params: CreateSessionParams,
    ) -> Result<Session, RepositoryError> {
        self.check_available()?;

        if !self.working.users.contains_key(&params.user_id) {
            return Err(RepositoryError::unknown(
                MemoryStoreError::ForeignKeyViolation("sessions_user_id_fkey"),
            ));
        }
        if self.working.sessions.contains_key(&params.token) {
            return Err(RepositoryError::unknown(MemoryStoreError::UniqueViolation(
                "sessions_session_token_key",
            )));
        }

        let now = Utc::now();
        let record = SessionRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            expires_at: params.expires_at,
            created_at: now,
            updated_at: now,
        };
        self.working
            .sessions
            .insert(params.token.clone(), record.clone());

        self.build_session(&params.token, &record)
    }

    async fn get_session_by_token(&mut self, token: &str) -> Result<Session, RepositoryError> {
        self.check_available()?;

        let record = self
            .working
            .sessions
            .get(token)
            .ok_or(RepositoryError::NotFound)?;

        self.build_session(token, record)
    }

    async fn delete_session(&mut self, token: &str) -> Result<(), RepositoryError> {
        self.check_available()?;

        self.working.sessions.remove(token);
        Ok(())
    }

    async fn delete_expired_sessions(&mut self) -> Result<u64, RepositoryError> {
        self.check_available()?;

        let now = Utc::now();
        let before = self.working.sessions.len();
        self.working
            .sessions
            .retain(|_, record| record.expires_at >= now);

        Ok((before - self.working.sessions.len()) as u64)
    }
}
