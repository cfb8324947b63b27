//! PostgreSQL backend on sqlx.
//!
//! This is the only place that knows PostgreSQL error codes; everything
//! above it sees [`RepositoryError`].

use super::transaction::{TransactionError, TransactionManager, UnitOfWork};
use crate::auth::error::RepositoryError;
use crate::auth::models::{CreateSessionParams, CreateUserParams, User};
use crate::auth::repository::AuthRepository;
use crate::auth::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = "id, username, role, password_hash, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, session_token, expires_at, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StorageInitError {
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("failed to run database migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Transaction manager over an explicitly constructed connection pool.
#[derive(Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    /// Open the pool and verify the database answers
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageInitError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(StorageInitError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StorageInitError::Connect)?;

        info!("Connected to PostgreSQL (max {} connections)", max_connections);
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StorageInitError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransactionError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransactionError::Begin(e.into()))?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// Repository bound to one PostgreSQL transaction.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn repository(&mut self) -> &mut dyn AuthRepository {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), TransactionError> {
        self.tx
            .commit()
            .await
            .map_err(|e| TransactionError::Commit(e.into()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| TransactionError::Rollback(e.into()))
    }
}

/// A named rollback point inside the open transaction.
struct Savepoint(&'static str);

impl Savepoint {
    async fn create(conn: &mut PgConnection, name: &'static str) -> Result<Self, sqlx::Error> {
        sqlx::query(&format!("SAVEPOINT {}", name))
            .execute(&mut *conn)
            .await?;
        Ok(Self(name))
    }

    async fn rollback(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", self.0))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn release(self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("RELEASE SAVEPOINT {}", self.0))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    role: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            role: row.role.parse().map_err(RepositoryError::unknown)?,
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    session_token: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_session(self, user: User) -> Session {
        Session {
            id: self.id,
            user,
            token: self.session_token,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl PgUnitOfWork {
    async fn get_user_by_id(&mut self, id: Uuid) -> Result<User, RepositoryError> {
        let row: UserRow = sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(RepositoryError::unknown)?;

        row.try_into()
    }
}

#[async_trait]
impl AuthRepository for PgUnitOfWork {
    async fn create_user(&mut self, params: CreateUserParams) -> Result<User, RepositoryError> {
        let savepoint = Savepoint::create(&mut self.tx, "create_user")
            .await
            .map_err(RepositoryError::unknown)?;

        let inserted: Result<UserRow, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO users (id, username, role, password_hash) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&params.username)
        .bind(params.role.as_str())
        .bind(&params.password_hash)
        .fetch_one(&mut *self.tx)
        .await;

        match inserted {
            Ok(row) => {
                savepoint
                    .release(&mut self.tx)
                    .await
                    .map_err(RepositoryError::unknown)?;
                row.try_into()
            }
            Err(err) if is_unique_violation(&err) => {
                debug!("Username '{}' is taken, rolling back to savepoint", params.username);
                savepoint
                    .rollback(&mut self.tx)
                    .await
                    .map_err(RepositoryError::unknown)?;
                Err(RepositoryError::AlreadyExists)
            }
            Err(err) => Err(RepositoryError::unknown(err)),
        }
    }

    async fn get_user_by_username(&mut self, username: &str) -> Result<User, RepositoryError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(RepositoryError::unknown)?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn create_session(
        &mut self,
        params: CreateSessionParams,
    ) -> Result<Session, RepositoryError> {
        let row: SessionRow = sqlx::query_as(&format!(
            "INSERT INTO sessions (id, user_id, session_token, expires_at) VALUES ($1, $2, $3, $4) RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(params.user_id)
        .bind(&params.token)
        .bind(params.expires_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(RepositoryError::unknown)?;

        let user = self.get_user_by_id(row.user_id).await?;
        Ok(row.into_session(user))
    }

    async fn get_session_by_token(&mut self, token: &str) -> Result<Session, RepositoryError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE session_token = $1",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(RepositoryError::unknown)?;

        let row = row.ok_or(RepositoryError::NotFound)?;
        let user = self.get_user_by_id(row.user_id).await?;
        Ok(row.into_session(user))
    }

    async fn delete_session(&mut self, token: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sessions WHERE session_token = $1")
            .bind(token)
            .execute(&mut *self.tx)
            .await
            .map_err(RepositoryError::unknown)?;

        Ok(())
    }

    async fn delete_expired_sessions(&mut self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < NOW()")
            .execute(&mut *self.tx)
            .await
            .map_err(RepositoryError::unknown)?;

        Ok(result.rows_affected())
    }
}
