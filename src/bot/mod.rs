//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `message_handler`: Converts incoming messages into events and executes outcomes
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards for rich replies

pub mod callback_handler;
pub mod message_handler;
pub mod ui_builder;

use std::sync::Arc;

use crate::analysis::{AnalysisError, Analyzer};
use crate::config::BotConfig;
use crate::dispatcher::{DispatchOptions, Dispatcher};
use crate::registration::InMemoryRegistrationStore;
use crate::session::InMemorySessionStore;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

/// State shared by all update handlers
pub struct BotState {
    pub config: BotConfig,
    pub dispatcher: Dispatcher,
    pub analyzer: Analyzer,
}

impl BotState {
    /// Build the handler state with empty in-memory stores
    pub fn new(config: BotConfig) -> Result<Self, AnalysisError> {
        let analyzer = Analyzer::from_config(&config)?;
        let dispatcher = Dispatcher::new(
            DispatchOptions::from(&config),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(InMemoryRegistrationStore::new()),
        );

        Ok(Self {
            config,
            dispatcher,
            analyzer,
        })
    }

    /// Username used to match `/command@username` mentions
    pub fn command_username(&self) -> &str {
        self.config.bot_username.as_deref().unwrap_or("")
    }
}
