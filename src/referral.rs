/// Username used in referral links when the bot's own username is unknown
pub const PLACEHOLDER_BOT_USERNAME: &str = "your_bot_username";

/// Build the deep link that starts the bot with `user_id` as the start parameter
pub fn referral_link(bot_username: &str, user_id: u64) -> String {
    let username = bot_username.trim_start_matches('@');
    let username = if username.is_empty() {
        PLACEHOLDER_BOT_USERNAME
    } else {
        username
    };
    format!("https://t.me/{username}?start={user_id}")
}

/// Parse the payload of `/start <payload>` as the referring user's id
pub fn parse_referrer(payload: &str) -> Option<u64> {
    payload.trim().parse().ok()
}
