//! UI Builder module for creating keyboards

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use crate::dispatcher::MINE_NOW_CALLBACK;
use crate::localization::t;

/// Create the inline keyboard attached to the welcome card
pub fn create_welcome_keyboard(website_url: &str) -> InlineKeyboardMarkup {
    let mut row = vec![InlineKeyboardButton::callback(
        t("welcome-button-mine"),
        MINE_NOW_CALLBACK,
    )];

    match reqwest::Url::parse(website_url) {
        Ok(url) => row.push(InlineKeyboardButton::url(t("welcome-button-website"), url)),
        Err(e) => warn!(website_url, error = %e, "Invalid website URL, omitting link button"),
    }

    InlineKeyboardMarkup::new(vec![row])
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_welcome_keyboard_has_two_buttons() {
        let keyboard = create_welcome_keyboard("https://calories.fun");
        assert_eq!(keyboard.inline_keyboard.len(), 1);

        let row = &keyboard.inline_keyboard[0];
        assert_eq!(row.len(), 2);
        assert!(matches!(
            &row[0].kind,
            InlineKeyboardButtonKind::CallbackData(data) if data == MINE_NOW_CALLBACK
        ));
        assert!(matches!(&row[1].kind, InlineKeyboardButtonKind::Url(_)));
    }

    #[test]
    fn test_welcome_keyboard_skips_invalid_url() {
        let keyboard = create_welcome_keyboard("not a url");
        assert_eq!(keyboard.inline_keyboard[0].len(), 1);
    }
}
