use std::sync::Arc;

use anyhow::Result;
use calories::analysis::{file_download_url, STUB_CALORIE_RANGE};
use calories::bot::message_handler::{event_from_message, photo_variant};
use calories::bot::{callback_handler, message_handler, BotState};
use calories::config::{AnalysisMode, BotConfig};
use calories::dispatcher::{Command, EventKind};
use serde_json::json;
use teloxide::types::{CallbackQuery, Message};
use teloxide::Bot;
use wiremock::matchers::{body_json, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TOKEN: &str = "1:abc";
const CHAT_ID: i64 = 250918540;
const ANALYSIS_FAILED: &str =
    "Sorry, we encountered an error while analyzing your photo. Please try again with /submit.";

#[cfg(test)]
mod tests {
    use super::*;

    fn message(extra: serde_json::Value) -> Message {
        serde_json::from_value(message_json(extra)).expect("valid message json")
    }

    fn message_json(extra: serde_json::Value) -> serde_json::Value {
        let mut value = json!({
            "message_id": 198283,
            "from": {
                "id": 250918540,
                "is_bot": false,
                "first_name": "Alex",
                "username": "alex",
                "language_code": "en"
            },
            "chat": {
                "id": 250918540,
                "first_name": "Alex",
                "username": "alex",
                "type": "private"
            },
            "date": 1567927221
        });
        if let (Some(target), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (key, field) in extra {
                target.insert(key.clone(), field.clone());
            }
        }
        value
    }

    fn photo_message() -> Message {
        message(json!({
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "file_size": 1000, "width": 90, "height": 60 },
                { "file_id": "large", "file_unique_id": "l", "file_size": 20000, "width": 800, "height": 533 }
            ]
        }))
    }

    fn sent_message() -> serde_json::Value {
        json!({
            "message_id": 1,
            "date": 1567927221,
            "chat": { "id": CHAT_ID, "first_name": "Alex", "type": "private" },
            "text": "ok"
        })
    }

    /// Answer `api_method` calls on the mocked Bot API with `result`
    async fn mount_api(server: &MockServer, api_method: &str, result: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path_regex(format!("(?i)^/bot[^/]+/{api_method}$")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result })))
            .mount(server)
            .await;
    }

    async fn mount_api_error(server: &MockServer, api_method: &str) {
        Mock::given(method("POST"))
            .and(path_regex(format!("(?i)^/bot[^/]+/{api_method}$")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: something went wrong"
            })))
            .mount(server)
            .await;
    }

    /// Bot API calls of one method, in the order they were made
    async fn api_calls(server: &MockServer, api_method: &str) -> Vec<Request> {
        let suffix = format!("/{}", api_method.to_ascii_lowercase());
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path().to_ascii_lowercase().ends_with(&suffix))
            .collect()
    }

    fn sent_text(request: &Request) -> String {
        let body: serde_json::Value = serde_json::from_slice(&request.body).expect("json body");
        assert_eq!(body["chat_id"], json!(CHAT_ID));
        body["text"].as_str().unwrap_or_default().to_string()
    }

    fn mock_bot(telegram: &MockServer) -> Result<Bot> {
        Ok(Bot::new(TOKEN).set_api_url(telegram.uri().parse()?))
    }

    fn bot_state(telegram: &MockServer, config: BotConfig) -> Result<Arc<BotState>> {
        Ok(Arc::new(BotState::new(BotConfig {
            bot_token: TOKEN.to_string(),
            telegram_api_url: telegram.uri(),
            require_registration: false,
            ..config
        })?))
    }

    fn forwarding_config(analysis: &MockServer) -> BotConfig {
        BotConfig {
            analysis: AnalysisMode::Forward {
                base_url: analysis.uri(),
            },
            ..Default::default()
        }
    }

    async fn mount_get_file(telegram: &MockServer) {
        mount_api(
            telegram,
            "GetFile",
            json!({
                "file_id": "large",
                "file_unique_id": "l",
                "file_size": 20000,
                "file_path": "photos/file_3.jpg"
            }),
        )
        .await;
    }

    /// Send `/submit` followed by a meal photo through the message handler
    async fn submit_photo(bot: &Bot, state: &Arc<BotState>) -> Result<()> {
        message_handler(bot.clone(), message(json!({ "text": "/submit" })), state.clone()).await?;
        message_handler(bot.clone(), photo_message(), state.clone()).await
    }

    #[test]
    fn test_command_message_becomes_command_event() {
        let msg = message(json!({ "text": "/start 12345", "entities": [] }));
        let event = event_from_message(&msg, "calories_bot");

        assert_eq!(event.user_id, Some(250918540));
        assert_eq!(event.chat_id, 250918540);
        assert_eq!(
            event.kind,
            EventKind::Command(Command::Start("12345".to_string()))
        );
    }

    #[test]
    fn test_unknown_command_becomes_text() {
        let msg = message(json!({ "text": "/mine", "entities": [] }));
        let event = event_from_message(&msg, "calories_bot");
        assert_eq!(event.kind, EventKind::Text("/mine".to_string()));
    }

    #[test]
    fn test_photo_message_keeps_variant_order() {
        let msg = message(json!({
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "file_size": 1000, "width": 90, "height": 60 },
                { "file_id": "medium", "file_unique_id": "m", "file_size": 5000, "width": 320, "height": 213 },
                { "file_id": "large", "file_unique_id": "l", "file_size": 20000, "width": 800, "height": 533 }
            ]
        }));

        let event = event_from_message(&msg, "calories_bot");
        match event.kind {
            EventKind::Photo(variants) => {
                let ids: Vec<_> = variants.iter().map(|v| v.file_id.as_str()).collect();
                assert_eq!(ids, ["small", "medium", "large"]);
                assert_eq!(variants[2].width, 800);
                assert_eq!(variants[2].file_size, Some(20000));
            }
            other => panic!("unexpected event kind {other:?}"),
        }

        let photos = msg.photo().unwrap();
        assert_eq!(photo_variant(&photos[0]).file_unique_id, "s");
    }

    #[test]
    fn test_bot_state_from_config() {
        let state = BotState::new(BotConfig {
            bot_token: "123:abc".to_string(),
            analysis: AnalysisMode::Forward {
                base_url: "https://calories.fun".to_string(),
            },
            ..Default::default()
        })
        .unwrap();

        assert_eq!(state.command_username(), "");
        assert!(!state.dispatcher.options().acknowledge_photos);
        assert!(state.dispatcher.options().require_registration);
    }

    #[tokio::test]
    async fn test_stub_photo_is_acknowledged_then_estimated() -> Result<()> {
        let telegram = MockServer::start().await;
        mount_api(&telegram, "SendMessage", sent_message()).await;

        let bot = mock_bot(&telegram)?;
        let state = bot_state(&telegram, BotConfig::default())?;
        submit_photo(&bot, &state).await?;

        let sent = api_calls(&telegram, "SendMessage").await;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent_text(&sent[1]), "Photo received! Analyzing your meal...");

        let estimate = sent_text(&sent[2]);
        let calories = estimate
            .split_whitespace()
            .find_map(|word| word.parse::<u32>().ok())
            .expect("estimate carries a number");
        assert!(STUB_CALORIE_RANGE.contains(&calories));
        assert!(api_calls(&telegram, "GetFile").await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_forwarded_photo_sends_no_reply() -> Result<()> {
        let telegram = MockServer::start().await;
        let analysis = MockServer::start().await;
        mount_api(&telegram, "SendMessage", sent_message()).await;
        mount_get_file(&telegram).await;

        Mock::given(method("POST"))
            .and(path("/api/get-calories-from-photo"))
            .and(body_json(json!({
                "message": {
                    "chat": { "id": CHAT_ID },
                    "from": { "id": CHAT_ID },
                    "photo": {
                        "file_id": "large",
                        "file_unique_id": "l",
                        "width": 800,
                        "height": 533,
                        "file_size": 20000
                    },
                    "fileUrl": file_download_url(&telegram.uri(), TOKEN, "photos/file_3.jpg")
                }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&analysis)
            .await;

        let bot = mock_bot(&telegram)?;
        let state = bot_state(&telegram, forwarding_config(&analysis))?;
        submit_photo(&bot, &state).await?;

        let get_file = api_calls(&telegram, "GetFile").await;
        assert_eq!(get_file.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&get_file[0].body)?;
        assert_eq!(body["file_id"], "large");

        // Only the /submit prompt
        let sent = api_calls(&telegram, "SendMessage").await;
        assert_eq!(sent.len(), 1);
        assert!(sent_text(&sent[0]).starts_with("Please send a photo of your meal"));

        analysis.verify().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_analysis_service_error_sends_generic_reply() -> Result<()> {
        let telegram = MockServer::start().await;
        let analysis = MockServer::start().await;
        mount_api(&telegram, "SendMessage", sent_message()).await;
        mount_get_file(&telegram).await;

        Mock::given(method("POST"))
            .and(path("/api/get-calories-from-photo"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&analysis)
            .await;

        let bot = mock_bot(&telegram)?;
        let state = bot_state(&telegram, forwarding_config(&analysis))?;
        submit_photo(&bot, &state).await?;

        let sent = api_calls(&telegram, "SendMessage").await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent_text(&sent[1]), ANALYSIS_FAILED);

        analysis.verify().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_get_file_error_sends_generic_reply() -> Result<()> {
        let telegram = MockServer::start().await;
        let analysis = MockServer::start().await;
        mount_api(&telegram, "SendMessage", sent_message()).await;
        mount_api_error(&telegram, "GetFile").await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&analysis)
            .await;

        let bot = mock_bot(&telegram)?;
        let state = bot_state(&telegram, forwarding_config(&analysis))?;
        submit_photo(&bot, &state).await?;

        assert_eq!(api_calls(&telegram, "GetFile").await.len(), 1);
        let sent = api_calls(&telegram, "SendMessage").await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent_text(&sent[1]), ANALYSIS_FAILED);

        analysis.verify().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_rich_welcome_sends_photo_with_keyboard() -> Result<()> {
        let telegram = MockServer::start().await;
        mount_api(
            &telegram,
            "SendPhoto",
            json!({
                "message_id": 2,
                "date": 1567927221,
                "chat": { "id": CHAT_ID, "first_name": "Alex", "type": "private" },
                "photo": [
                    { "file_id": "welcome", "file_unique_id": "w", "file_size": 100, "width": 10, "height": 10 }
                ],
                "caption": "Welcome"
            }),
        )
        .await;

        let bot = mock_bot(&telegram)?;
        let state = bot_state(
            &telegram,
            BotConfig {
                rich_welcome: true,
                welcome_image_url: "https://calories.fun/welcome.png".to_string(),
                website_url: "https://calories.fun".to_string(),
                ..Default::default()
            },
        )?;
        message_handler(bot, message(json!({ "text": "/start" })), state).await?;

        let photos = api_calls(&telegram, "SendPhoto").await;
        assert_eq!(photos.len(), 1);
        let body = String::from_utf8_lossy(&photos[0].body);
        assert!(body.contains("https://calories.fun/welcome.png"));
        assert!(body.contains("Snap your meals, mine calories and earn tokens."));
        assert!(body.contains("reply_markup"));
        assert!(body.contains("mine_now"));
        assert!(api_calls(&telegram, "SendMessage").await.is_empty());
        Ok(())
    }

    fn mine_now_query() -> CallbackQuery {
        serde_json::from_value(json!({
            "id": "4382bfdwdsb323b2d9",
            "from": {
                "id": CHAT_ID,
                "is_bot": false,
                "first_name": "Alex",
                "username": "alex",
                "language_code": "en"
            },
            "message": message_json(json!({ "text": "Welcome" })),
            "chat_instance": "-4561234",
            "data": "mine_now"
        }))
        .expect("valid callback query json")
    }

    #[tokio::test]
    async fn test_mine_now_callback_replies_and_answers() -> Result<()> {
        let telegram = MockServer::start().await;
        mount_api(&telegram, "SendMessage", sent_message()).await;
        mount_api(&telegram, "AnswerCallbackQuery", json!(true)).await;

        let bot = mock_bot(&telegram)?;
        let state = bot_state(&telegram, BotConfig::default())?;
        callback_handler(bot, mine_now_query(), state).await?;

        let sent = api_calls(&telegram, "SendMessage").await;
        assert_eq!(sent.len(), 1);
        assert!(sent_text(&sent[0]).starts_with("Welcome to Calories.fun!"));

        let answers = api_calls(&telegram, "AnswerCallbackQuery").await;
        assert_eq!(answers.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&answers[0].body)?;
        assert_eq!(body["callback_query_id"], "4382bfdwdsb323b2d9");
        Ok(())
    }

    #[tokio::test]
    async fn test_callback_is_answered_when_reply_fails() -> Result<()> {
        let telegram = MockServer::start().await;
        mount_api_error(&telegram, "SendMessage").await;
        mount_api(&telegram, "AnswerCallbackQuery", json!(true)).await;

        let bot = mock_bot(&telegram)?;
        let state = bot_state(&telegram, BotConfig::default())?;
        let result = callback_handler(bot, mine_now_query(), state).await;

        assert!(result.is_err());
        assert_eq!(api_calls(&telegram, "SendMessage").await.len(), 1);
        assert_eq!(api_calls(&telegram, "AnswerCallbackQuery").await.len(), 1);
        Ok(())
    }
}
