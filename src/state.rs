use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::messaging::MessagingProvider;
use crate::services::Engine;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub engine: Engine,
    pub messaging: Arc<dyn MessagingProvider>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, messaging: Arc<dyn MessagingProvider>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            engine: Engine::new(config.rules.clone()),
            config,
            messaging,
        }
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("database lock poisoned".to_string()))
    }

    /// Current time on the club's wall clock.
    pub fn now(&self) -> NaiveDateTime {
        self.config.local_now()
    }
}
