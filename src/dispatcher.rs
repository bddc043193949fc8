//! Command dispatcher and per-user session state machine.
//!
//! The dispatcher is transport-neutral: the `bot` module converts Telegram
//! updates into [`InboundEvent`]s and executes the returned [`Outcome`].
//! A step never performs I/O; photo analysis is requested as an [`Effect`].

use std::sync::Arc;

use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

use crate::analysis::{select_photo, PhotoVariant};
use crate::config::{AnalysisMode, BotConfig};
use crate::localization::{t, t_args};
use crate::referral::{parse_referrer, referral_link};
use crate::registration::RegistrationStore;
use crate::session::{Session, SessionMode, SessionStore};
use crate::wallet::is_valid_wallet;

/// Callback data of the "Mine now" welcome button
pub const MINE_NOW_CALLBACK: &str = "mine_now";

/// Commands understood by the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot and register")]
    Start(String),
    #[command(description = "Show this help message")]
    Help,
    #[command(description = "Link your wallet")]
    Wallet,
    #[command(description = "Submit a meal photo")]
    Submit,
    #[command(description = "Get your referral link")]
    Referral,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start(_) => "start",
            Command::Help => "help",
            Command::Wallet => "wallet",
            Command::Submit => "submit",
            Command::Referral => "referral",
        }
    }
}

/// Kind-specific payload of an inbound event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    /// Plain text, including commands the bot does not know
    Text(String),
    /// Photo resolutions in the order Telegram sent them
    Photo(Vec<PhotoVariant>),
    /// Inline keyboard button press
    Callback(String),
    /// Anything else (stickers, documents, ...)
    Other,
}

/// An update reduced to what the state machine needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: Option<u64>,
    pub chat_id: i64,
    pub kind: EventKind,
}

/// Message to send back to the chat
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Welcome image with the "Mine now" / website keyboard
    WelcomeCard { caption: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) => text,
            Reply::WelcomeCard { caption } => caption,
        }
    }
}

/// I/O requested by a step, executed by the transport adapter after the replies
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    AnalyzePhoto {
        chat_id: i64,
        user_id: u64,
        photo: PhotoVariant,
    },
}

/// Result of handling one event
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub replies: Vec<Reply>,
    pub effect: Option<Effect>,
}

impl Outcome {
    fn reply(text: String) -> Self {
        Self {
            replies: vec![Reply::Text(text)],
            effect: None,
        }
    }
}

/// Result of a state-machine step: the session to store (`None` keeps the
/// current one) and the outcome to execute
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub session: Option<Session>,
    pub outcome: Outcome,
}

impl Transition {
    fn unchanged(outcome: Outcome) -> Self {
        Self {
            session: None,
            outcome,
        }
    }

    fn to(session: Session, outcome: Outcome) -> Self {
        Self {
            session: Some(session),
            outcome,
        }
    }
}

/// Behaviour switches of the dispatcher
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOptions {
    /// `/submit` and `/referral` require a registration
    pub require_registration: bool,
    /// `/start` answers with the welcome card instead of plain text
    pub rich_welcome: bool,
    /// Send "Photo received" before the analysis result
    pub acknowledge_photos: bool,
    pub bot_username: String,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            require_registration: true,
            rich_welcome: false,
            acknowledge_photos: true,
            bot_username: crate::referral::PLACEHOLDER_BOT_USERNAME.to_string(),
        }
    }
}

impl From<&BotConfig> for DispatchOptions {
    fn from(config: &BotConfig) -> Self {
        Self {
            require_registration: config.require_registration,
            rich_welcome: config.rich_welcome,
            // The forwarding service answers the user itself
            acknowledge_photos: matches!(config.analysis, AnalysisMode::Stub),
            bot_username: config.referral_username().to_string(),
        }
    }
}

pub struct Dispatcher {
    options: DispatchOptions,
    sessions: Arc<dyn SessionStore>,
    registrations: Arc<dyn RegistrationStore>,
}

impl Dispatcher {
    pub fn new(
        options: DispatchOptions,
        sessions: Arc<dyn SessionStore>,
        registrations: Arc<dyn RegistrationStore>,
    ) -> Self {
        Self {
            options,
            sessions,
            registrations,
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    pub fn session(&self, user_id: u64) -> Option<Session> {
        self.sessions.get(user_id)
    }

    pub fn mode(&self, user_id: u64) -> SessionMode {
        SessionMode::of(self.sessions.get(user_id).as_ref())
    }

    pub fn registrations(&self) -> &Arc<dyn RegistrationStore> {
        &self.registrations
    }

    /// Handle one event: run the state-machine step for its user and store
    /// the resulting session
    pub fn handle(&self, event: &InboundEvent) -> Outcome {
        if event.kind == EventKind::Other {
            debug!(chat_id = event.chat_id, "Ignoring unsupported event");
            return Outcome::default();
        }

        let Some(user_id) = event.user_id else {
            warn!(chat_id = event.chat_id, "Event without a user id");
            return Outcome::reply(t("unidentified-user"));
        };

        let mut outcome = Outcome::default();
        self.sessions.update(user_id, &mut |session| {
            let before = SessionMode::of(session.as_ref());
            let transition = self.step(user_id, event.chat_id, &event.kind, session);
            if let Some(next) = &transition.session {
                debug!(user_id, from = %before, to = %next.mode(), "Session transition");
            }
            outcome = transition.outcome;
            transition.session
        });
        outcome
    }

    /// Compute the transition for `kind` given the user's current session
    pub fn step(
        &self,
        user_id: u64,
        chat_id: i64,
        kind: &EventKind,
        session: Option<Session>,
    ) -> Transition {
        match kind {
            EventKind::Command(command) => {
                info!(user_id, command = command.name(), "Received command");
                match command {
                    Command::Start(payload) => self.start(user_id, payload, self.options.rich_welcome),
                    Command::Help => Transition::unchanged(Outcome::reply(t("help-text"))),
                    Command::Wallet => Transition::to(
                        Session::awaiting_wallet("wallet"),
                        Outcome::reply(t("wallet-prompt")),
                    ),
                    Command::Submit => self.submit(user_id, session),
                    Command::Referral => self.referral(user_id),
                }
            }
            EventKind::Text(text) => self.text(user_id, text, session),
            EventKind::Photo(variants) => self.photo(user_id, chat_id, variants, session),
            EventKind::Callback(data) if data == MINE_NOW_CALLBACK => {
                info!(user_id, "Mine now button pressed");
                self.start(user_id, "", false)
            }
            EventKind::Callback(data) => {
                debug!(user_id, data = %data, "Ignoring unknown callback");
                Transition::unchanged(Outcome::default())
            }
            EventKind::Other => Transition::unchanged(Outcome::default()),
        }
    }

    fn is_allowed(&self, user_id: u64) -> bool {
        !self.options.require_registration || self.registrations.exists(user_id)
    }

    fn start(&self, user_id: u64, payload: &str, rich: bool) -> Transition {
        if let Some(referrer) = parse_referrer(payload).filter(|referrer| *referrer != user_id) {
            info!(user_id, referrer, "User arrived through a referral link");
        }

        if self.registrations.exists(user_id) {
            return Transition::unchanged(Outcome::reply(t("welcome-back")));
        }

        let reply = if rich {
            Reply::WelcomeCard {
                caption: t("welcome-card"),
            }
        } else {
            Reply::Text(t("welcome-new"))
        };

        Transition::to(
            Session::awaiting_wallet("start"),
            Outcome {
                replies: vec![reply],
                effect: None,
            },
        )
    }

    fn submit(&self, user_id: u64, session: Option<Session>) -> Transition {
        if !self.is_allowed(user_id) {
            return Transition::unchanged(Outcome::reply(t("register-first")));
        }

        // Other flags are kept, only the photo flag is raised
        let next = Session {
            awaiting_photo: true,
            last_command: Some("submit".to_string()),
            ..session.unwrap_or_default()
        };
        Transition::to(next, Outcome::reply(t("submit-prompt")))
    }

    fn referral(&self, user_id: u64) -> Transition {
        if !self.is_allowed(user_id) {
            return Transition::unchanged(Outcome::reply(t("register-first")));
        }

        let link = referral_link(&self.options.bot_username, user_id);
        Transition::unchanged(Outcome::reply(t_args("referral-link", &[("link", link.as_str())])))
    }

    fn text(&self, user_id: u64, text: &str, session: Option<Session>) -> Transition {
        let Some(session) = session.filter(|session| session.awaiting_wallet) else {
            return Transition::unchanged(Outcome::reply(t_args("text-echo", &[("text", text)])));
        };

        if !is_valid_wallet(text) {
            debug!(user_id, length = text.chars().count(), "Rejected wallet address");
            return Transition::unchanged(Outcome::reply(t("wallet-invalid")));
        }

        let registration = self.registrations.upsert(user_id, text);
        info!(
            user_id,
            wallet = %registration.wallet_address,
            "Wallet address registered"
        );

        Transition::to(
            Session {
                awaiting_photo: false,
                awaiting_wallet: false,
                ..session
            },
            Outcome::reply(t_args("wallet-registered", &[("address", text)])),
        )
    }

    fn photo(
        &self,
        user_id: u64,
        chat_id: i64,
        variants: &[PhotoVariant],
        session: Option<Session>,
    ) -> Transition {
        let Some(session) = session.filter(|session| session.awaiting_photo) else {
            return Transition::unchanged(Outcome::reply(t("photo-not-expected")));
        };

        info!(user_id, variants = variants.len(), "Received meal photo");
        let next = Session {
            awaiting_photo: false,
            ..session
        };

        let Some(photo) = select_photo(variants) else {
            return Transition::to(next, Outcome::reply(t("photo-missing")));
        };

        let mut replies = Vec::new();
        if self.options.acknowledge_photos {
            replies.push(Reply::Text(t("photo-received")));
        }

        Transition::to(
            next,
            Outcome {
                replies,
                effect: Some(Effect::AnalyzePhoto {
                    chat_id,
                    user_id,
                    photo: photo.clone(),
                }),
            },
        )
    }
}

/// Reply carrying a calorie estimate
pub fn estimate_reply(calories: u32) -> Reply {
    let calories = calories.to_string();
    Reply::Text(t_args("photo-estimate", &[("calories", calories.as_str())]))
}

/// Reply sent when analysing a photo failed
pub fn analysis_failed_reply() -> Reply {
    Reply::Text(t("photo-analysis-failed"))
}
