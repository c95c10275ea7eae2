//! Client configuration.

use std::env;
use std::time::Duration;

use crate::constants::DEFAULT_DATABASE_ID;
use crate::error::{invalid_argument, FirestoreResult};
use crate::model::DatabaseId;

pub const PROJECT_ID_ENV: &str = "FIRESTORE_PROJECT_ID";
pub const DATABASE_ID_ENV: &str = "FIRESTORE_DATABASE_ID";
pub const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";
pub const ACCESS_TOKEN_ENV: &str = "FIRESTORE_ACCESS_TOKEN";

/// Connection settings for a [`Firestore`](crate::api::Firestore) handle.
#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreSettings {
    pub project_id: Option<String>,
    pub database_id: String,
    /// `host:port` of a local emulator. Requests then go over plain HTTP
    /// and need no credentials.
    pub emulator_host: Option<String>,
    /// OAuth2 bearer token sent with every request.
    pub access_token: Option<String>,
    pub retry: RetrySettings,
}

impl Default for FirestoreSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            database_id: DEFAULT_DATABASE_ID.to_string(),
            emulator_host: None,
            access_token: None,
            retry: RetrySettings::default(),
        }
    }
}

impl FirestoreSettings {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Default::default()
        }
    }

    /// Reads `FIRESTORE_PROJECT_ID`, `FIRESTORE_DATABASE_ID`,
    /// `FIRESTORE_EMULATOR_HOST` and `FIRESTORE_ACCESS_TOKEN`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            project_id: read(PROJECT_ID_ENV),
            database_id: read(DATABASE_ID_ENV).unwrap_or_else(|| DEFAULT_DATABASE_ID.to_string()),
            emulator_host: read(EMULATOR_HOST_ENV),
            access_token: read(ACCESS_TOKEN_ENV),
            retry: RetrySettings::default(),
        }
    }

    pub fn with_database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }

    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.emulator_host = Some(host.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> FirestoreResult<()> {
        match self.project_id.as_deref() {
            Some(project) if !project.trim().is_empty() => {}
            _ => return Err(invalid_argument("Firestore settings are missing a project id")),
        }
        if self.database_id.trim().is_empty() {
            return Err(invalid_argument("Firestore settings have an empty database id"));
        }
        if self.database_id.contains('/') || self.project_id.as_deref().unwrap_or("").contains('/') {
            return Err(invalid_argument(
                "Project and database ids must not contain '/'",
            ));
        }
        Ok(())
    }

    pub fn database(&self) -> FirestoreResult<DatabaseId> {
        self.validate()?;
        let project = self.project_id.clone().unwrap_or_default();
        Ok(DatabaseId::new(project, self.database_id.clone()))
    }

    pub fn uses_emulator(&self) -> bool {
        self.emulator_host.is_some()
    }
}

/// Backoff policy for requests whose failure is known to be transient.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 1.5,
            max_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl RetrySettings {
    /// A single attempt, no backoff.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let delay = self.initial_delay.mul_f64(factor);
        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    pub fn has_attempts_left(&self, attempt: usize) -> bool {
        attempt + 1 < self.max_attempts
    }
}
