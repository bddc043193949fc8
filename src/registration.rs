//! Registration store: links a Telegram user id to a claimed wallet address.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub user_id: u64,
    pub wallet_address: String,
    /// When the user first registered
    pub registered_at: DateTime<Utc>,
    /// When the wallet address was last submitted
    pub updated_at: DateTime<Utc>,
}

/// Storage for registrations, keyed by user id.
///
/// Implementations must keep at most one record per user id. `upsert`
/// overwrites the wallet address of an existing record in place.
pub trait RegistrationStore: Send + Sync {
    fn get(&self, user_id: u64) -> Option<Registration>;

    fn upsert(&self, user_id: u64, wallet_address: &str) -> Registration;

    fn exists(&self, user_id: u64) -> bool {
        self.get(user_id).is_some()
    }

    /// Number of registered users
    fn count(&self) -> usize;
}

/// Process-local registration table
#[derive(Debug, Default)]
pub struct InMemoryRegistrationStore {
    registrations: Mutex<HashMap<u64, Registration>>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<u64, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn get(&self, user_id: u64) -> Option<Registration> {
        self.table().get(&user_id).cloned()
    }

    fn upsert(&self, user_id: u64, wallet_address: &str) -> Registration {
        let now = Utc::now();
        let mut table = self.table();

        let registration = table
            .entry(user_id)
            .and_modify(|existing| {
                debug!(user_id, "Updating wallet address of existing registration");
                existing.wallet_address = wallet_address.to_string();
                existing.updated_at = now;
            })
            .or_insert_with(|| {
                info!(user_id, "Creating new registration");
                Registration {
                    user_id,
                    wallet_address: wallet_address.to_string(),
                    registered_at: now,
                    updated_at: now,
                }
            });

        registration.clone()
    }

    fn exists(&self, user_id: u64) -> bool {
        self.table().contains_key(&user_id)
    }

    fn count(&self) -> usize {
        self.table().len()
    }
}
