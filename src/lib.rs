//! # Calories.fun Telegram Bot
//!
//! A Telegram bot for a calorie mining game: users link a wallet address,
//! submit meal photos and receive a calorie estimate with a token reward
//! message.

pub mod analysis;
pub mod bot;
pub mod config;
pub mod dispatcher;
pub mod localization;
pub mod referral;
pub mod registration;
pub mod session;
pub mod wallet;
pub mod webhook;
