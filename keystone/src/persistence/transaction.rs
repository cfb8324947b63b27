use crate::auth::error::BoxError;
use crate::auth::repository::AuthRepository;
use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] BoxError),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] BoxError),

    #[error("failed to roll back transaction: {0}")]
    Rollback(#[source] BoxError),
}

/// One open database transaction.
///
/// Dropping a unit without calling `commit` discards its writes, which is
/// what happens when a panic unwinds through [`transactional`].
#[async_trait]
pub trait UnitOfWork: Send {
    /// The repository view of this transaction
    fn repository(&mut self) -> &mut dyn AuthRepository;

    async fn commit(self: Box<Self>) -> Result<(), TransactionError>;

    async fn rollback(self: Box<Self>) -> Result<(), TransactionError>;
}

/// Hands out units of work from a shared pool.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransactionError>;
}

/// Run `work` inside one transaction: commit when it returns `Ok`, roll back
/// when it returns `Err`.
///
/// ```rust,ignore
/// transactional(manager, move |repo| {
///     Box::pin(async move { auth.logout(repo, &token).await.map_err(ApiError::from) })
/// })
/// .await?;
/// ```
pub async fn transactional<T, E, F>(manager: &dyn TransactionManager, work: F) -> Result<T, E>
where
    F: for<'r> FnOnce(&'r mut dyn AuthRepository) -> BoxFuture<'r, Result<T, E>> + Send,
    E: From<TransactionError>,
{
    let mut unit = manager.begin().await?;

    let outcome = work(unit.repository()).await;

    match outcome {
        Ok(value) => {
            unit.commit().await?;
            Ok(value)
        }
        Err(err) => {
            // The work's own error wins over a failed rollback
            if let Err(rollback_err) = unit.rollback().await {
                warn!("Rollback after failed unit of work also failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::RepositoryError;
    use crate::auth::models::{CreateUserParams, Role};
    use crate::persistence::memory::MemoryTransactionManager;

    #[derive(Debug)]
    enum TestError {
        Repository(RepositoryError),
        Transaction(TransactionError),
        Aborted,
    }

    impl From<TransactionError> for TestError {
        fn from(err: TransactionError) -> Self {
            TestError::Transaction(err)
        }
    }

    fn params(username: &str) -> CreateUserParams {
        CreateUserParams {
            username: username.to_string(),
            password_hash: "hash".to_string(),
            role: Role::Reader,
        }
    }

    fn crash() {
        panic!("handler crashed");
    }

    #[tokio::test]
    async fn test_ok_commits() {
        let store = MemoryTransactionManager::new();

        let username = transactional(&store, |repo| {
            Box::pin(async move {
                let user = repo
                    .create_user(params("alice"))
                    .await
                    .map_err(TestError::Repository)?;
                Ok::<_, TestError>(user.username)
            })
        })
        .await
        .unwrap();

        assert_eq!(username, "alice");
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_err_rolls_back_every_write() {
        let store = MemoryTransactionManager::new();

        let result: Result<(), TestError> = transactional(&store, |repo| {
            Box::pin(async move {
                repo.create_user(params("alice"))
                    .await
                    .map_err(TestError::Repository)?;
                Err::<(), _>(TestError::Aborted)
            })
        })
        .await;

        assert!(matches!(result, Err(TestError::Aborted)));
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_panic_rolls_back_and_keeps_unwinding() {
        let store = MemoryTransactionManager::new();
        let manager = store.clone();

        let outcome = tokio::spawn(async move {
            let _: Result<(), TestError> = transactional(&manager, |repo| {
                Box::pin(async move {
                    repo.create_user(params("alice"))
                        .await
                        .map_err(TestError::Repository)?;
                    crash();
                    Ok::<(), TestError>(())
                })
            })
            .await;
        })
        .await;

        assert!(outcome.unwrap_err().is_panic());
        // The store is released and unchanged
        assert_eq!(store.user_count().await, 0);
        transactional(&store, |repo| {
            Box::pin(async move {
                repo.create_user(params("alice"))
                    .await
                    .map_err(TestError::Repository)
            })
        })
        .await
        .unwrap();
    }
}
