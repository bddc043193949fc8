//! Per-user conversation sessions.
//!
//! Sessions are keyed by user id rather than chat id, and a step must read and
//! write the session under one lock, so they live in [`SessionStore`] instead
//! of teloxide's `InMemStorage` dialogue storage, which has no atomic
//! read-modify-write.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// What the bot currently expects from a user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The next photo is a meal submission
    pub awaiting_photo: bool,
    /// The next text message is a wallet address
    pub awaiting_wallet: bool,
    /// Command that produced this state, kept for diagnostics
    pub last_command: Option<String>,
}

impl Session {
    /// Session expecting a wallet address, as set by `/start` and `/wallet`
    pub fn awaiting_wallet(command: &str) -> Self {
        Self {
            awaiting_photo: false,
            awaiting_wallet: true,
            last_command: Some(command.to_string()),
        }
    }

    pub fn mode(&self) -> SessionMode {
        if self.awaiting_wallet {
            SessionMode::AwaitingWallet
        } else if self.awaiting_photo {
            SessionMode::AwaitingPhoto
        } else {
            SessionMode::Idle
        }
    }
}

/// Session state derived from the flags of a [`Session`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionMode {
    New,
    AwaitingWallet,
    AwaitingPhoto,
    Idle,
}

impl SessionMode {
    pub fn of(session: Option<&Session>) -> Self {
        session.map_or(SessionMode::New, Session::mode)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionMode::New => "new",
            SessionMode::AwaitingWallet => "awaiting_wallet",
            SessionMode::AwaitingPhoto => "awaiting_photo",
            SessionMode::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Storage for sessions, keyed by user id.
///
/// `update` runs a whole state-machine step while the store is locked, so two
/// events for the same user never observe each other's half-applied state.
pub trait SessionStore: Send + Sync {
    fn get(&self, user_id: u64) -> Option<Session>;

    /// Passes the current session to `step`. A returned session replaces the
    /// stored one; `None` leaves the store untouched.
    fn update(&self, user_id: u64, step: &mut dyn FnMut(Option<Session>) -> Option<Session>);
}

/// Process-local session table. Sessions are never evicted.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<u64, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<u64, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, user_id: u64) -> Option<Session> {
        self.table().get(&user_id).cloned()
    }

    fn update(&self, user_id: u64, step: &mut dyn FnMut(Option<Session>) -> Option<Session>) {
        let mut table = self.table();
        let current = table.get(&user_id).cloned();
        if let Some(next) = step(current) {
            table.insert(user_id, next);
        }
    }
}
