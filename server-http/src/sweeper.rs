use crate::error::ApiError;
use crate::state::AppState;
use keystone::persistence::transactional;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Spawn a task that deletes expired sessions every `interval`
pub fn spawn_session_sweeper(state: AppState, interval: Duration) -> JoinHandle<()> {
    info!("Session sweeper running every {:?}", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match sweep_once(&state).await {
                Ok(deleted) => debug!("Session sweep removed {} sessions", deleted),
                Err(e) => error!("Session sweep failed: {}", e),
            }
        }
    })
}

/// Run a single purge in its own transaction
pub async fn sweep_once(state: &AppState) -> Result<u64, ApiError> {
    let service = state.auth_service;
    transactional(state.tx_manager.as_ref(), move |repo| {
        Box::pin(async move {
            service
                .purge_expired_sessions(repo)
                .await
                .map_err(ApiError::from)
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};
    use keystone::auth::models::{CreateSessionParams, CreateUserParams, Role};
    use keystone::auth::AuthRepository;
    use keystone::persistence::{MemoryTransactionManager, TransactionManager};
    use std::sync::Arc;

    async fn seed_sessions(store: &MemoryTransactionManager) {
        let mut unit = store.begin().await.unwrap();
        let repo = unit.repository();
        let user = repo
            .create_user(CreateUserParams {
                username: "alice".to_string(),
                password_hash: "hash".to_string(),
                role: Role::Reader,
            })
            .await
            .unwrap();
        for (token, expires_at) in [
            ("old", Utc::now() - TimeDelta::hours(2)),
            ("older", Utc::now() - TimeDelta::days(2)),
            ("live", Utc::now() + TimeDelta::hours(2)),
        ] {
            repo.create_session(CreateSessionParams {
                user_id: user.id,
                token: token.to_string(),
                expires_at,
            })
            .await
            .unwrap();
        }
        unit.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_once_removes_only_expired() {
        let store = MemoryTransactionManager::new();
        seed_sessions(&store).await;
        let state = AppState::new(Arc::new(store.clone()), Duration::from_secs(60));

        assert_eq!(sweep_once(&state).await.unwrap(), 2);
        assert_eq!(store.session_count().await, 1);
        assert_eq!(sweep_once(&state).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_task_purges_in_background() {
        let store = MemoryTransactionManager::new();
        seed_sessions(&store).await;
        let state = AppState::new(Arc::new(store.clone()), Duration::from_secs(60));

        // The first tick fires immediately
        let handle = spawn_session_sweeper(state, Duration::from_secs(3600));
        for _ in 0..100 {
            if store.session_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(store.session_count().await, 1);
    }
}
