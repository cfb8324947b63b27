use keystone::auth::AuthService;
use keystone::persistence::TransactionManager;
use std::sync::Arc;
use std::time::Duration;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tx_manager: Arc<dyn TransactionManager>,
    pub auth_service: AuthService,
    /// Lifetime of new sessions and of the session cookie
    pub session_ttl: Duration,
}

impl AppState {
    pub fn new(tx_manager: Arc<dyn TransactionManager>, session_ttl: Duration) -> Self {
        Self {
            tx_manager,
            auth_service: AuthService::new(),
            session_ttl,
        }
    }
}
