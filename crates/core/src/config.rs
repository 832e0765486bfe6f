//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the client
//! and the development ledger. Nothing in this crate reads environment variables while
//! an operation is running; binaries read them and hand the raw values to the helpers
//! below.

use crate::constants::{
    DEFAULT_ACCESS_PURPOSE, DEFAULT_CONTENT_DIR, DEFAULT_GRANT_DURATION_DAYS,
    DEFAULT_RECORD_CATEGORY,
};
use crate::{ClientError, ClientResult};
use medrec_types::{Address, NonEmptyText};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    record_category: String,
    access_request_purpose: String,
    default_grant_duration_days: u32,
    content_store_dir: PathBuf,
    ledger_state_path: Option<PathBuf>,
    confirmation_delay: Duration,
    admin: Option<Address>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if `default_grant_duration_days` is zero.
    pub fn new(
        record_category: NonEmptyText,
        access_request_purpose: NonEmptyText,
        default_grant_duration_days: u32,
        content_store_dir: PathBuf,
    ) -> ClientResult<Self> {
        if default_grant_duration_days == 0 {
            return Err(ClientError::Config(
                "default grant duration must be at least one day".into(),
            ));
        }

        Ok(Self {
            record_category: record_category.into_string(),
            access_request_purpose: access_request_purpose.into_string(),
            default_grant_duration_days,
            content_store_dir,
            ledger_state_path: None,
            confirmation_delay: Duration::ZERO,
            admin: None,
        })
    }

    /// Persist development ledger state to `path` after every confirmed transaction.
    pub fn with_ledger_state_path(mut self, path: PathBuf) -> Self {
        self.ledger_state_path = Some(path);
        self
    }

    /// Simulated block time applied before a development ledger transaction confirms.
    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// Admin identity for a freshly created development ledger.
    pub fn with_admin(mut self, admin: Option<Address>) -> Self {
        self.admin = admin;
        self
    }

    pub fn record_category(&self) -> &str {
        &self.record_category
    }

    pub fn access_request_purpose(&self) -> &str {
        &self.access_request_purpose
    }

    pub fn default_grant_duration_days(&self) -> u32 {
        self.default_grant_duration_days
    }

    pub fn content_store_dir(&self) -> &Path {
        &self.content_store_dir
    }

    pub fn ledger_state_path(&self) -> Option<&Path> {
        self.ledger_state_path.as_deref()
    }

    pub fn confirmation_delay(&self) -> Duration {
        self.confirmation_delay
    }

    pub fn admin(&self) -> Option<Address> {
        self.admin
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            record_category: DEFAULT_RECORD_CATEGORY.to_owned(),
            access_request_purpose: DEFAULT_ACCESS_PURPOSE.to_owned(),
            default_grant_duration_days: DEFAULT_GRANT_DURATION_DAYS,
            content_store_dir: PathBuf::from(DEFAULT_CONTENT_DIR),
            ledger_state_path: None,
            confirmation_delay: Duration::ZERO,
            admin: None,
        }
    }
}

/// Parse a confirmation delay in milliseconds from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns zero.
pub fn confirmation_delay_from_env_value(value: Option<String>) -> ClientResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(Duration::ZERO),
        Some(v) => v.parse::<u64>().map(Duration::from_millis).map_err(|_| {
            ClientError::Config(format!(
                "confirmation delay must be a whole number of milliseconds, got '{}'",
                v
            ))
        }),
    }
}

/// Parse an optional admin address.
///
/// If `value` is `None` or empty/whitespace, returns `None`.
pub fn admin_from_env_value(value: Option<String>) -> ClientResult<Option<Address>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    value
        .map(|v| Address::parse(&v))
        .transpose()
        .map_err(|e| ClientError::Config(format!("invalid admin address: {}", e)))
}

/// Parse an optional grant duration in days, falling back to `default` when unset or blank.
pub fn grant_duration_from_env_value(value: Option<String>, default: u32) -> ClientResult<u32> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(default),
        Some(v) => match v.parse::<u32>() {
            Ok(days) if days > 0 => Ok(days),
            _ => Err(ClientError::Config(format!(
                "grant duration must be a positive number of days, got '{}'",
                v
            ))),
        },
    }
}

/// Parse an optional text setting, falling back to `default` when unset or blank.
pub fn text_from_env_value(value: Option<String>, default: &str) -> ClientResult<NonEmptyText> {
    let value = value.filter(|v| !v.trim().is_empty());
    NonEmptyText::new(value.as_deref().unwrap_or(default))
        .map_err(|e| ClientError::Config(e.to_string()))
}
