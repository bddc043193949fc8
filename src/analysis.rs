//! # Meal Photo Analysis Module
//!
//! Photos are either estimated locally with a random placeholder value or
//! forwarded to an external analysis service, which answers the user itself.
//! No image processing happens in the bot.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{AnalysisMode, BotConfig};

/// Path of the analysis endpoint, relative to the configured base URL
pub const ANALYSIS_ENDPOINT_PATH: &str = "/api/get-calories-from-photo";

/// Bounds of the placeholder estimate, inclusive
pub const STUB_CALORIE_RANGE: RangeInclusive<u32> = 200..=800;

/// One resolution of a submitted photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoVariant {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u32>,
}

/// Pick the photo to analyse.
///
/// Telegram lists resolutions in ascending order, so the last variant is the
/// largest. The list is deliberately not re-sorted by dimensions.
pub fn select_photo(variants: &[PhotoVariant]) -> Option<&PhotoVariant> {
    variants.last()
}

/// Errors raised while analysing a photo
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to analysis service failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("analysis service answered with status {0}")]
    Status(u16),
    #[error("could not resolve download URL for file {file_id}: {reason}")]
    FileUrl { file_id: String, reason: String },
}

/// A photo accepted for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoSubmission {
    pub chat_id: i64,
    pub user_id: u64,
    pub photo: PhotoVariant,
    /// Download URL of the photo file
    pub file_url: String,
}

/// JSON body posted to the analysis service, shaped like a Telegram update
#[derive(Debug, Serialize)]
pub struct ForwardPayload<'a> {
    pub message: ForwardMessage<'a>,
}

#[derive(Debug, Serialize)]
pub struct ForwardMessage<'a> {
    pub chat: IdField<i64>,
    pub from: IdField<u64>,
    pub photo: &'a PhotoVariant,
    #[serde(rename = "fileUrl")]
    pub file_url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct IdField<T> {
    pub id: T,
}

pub fn forward_payload(submission: &PhotoSubmission) -> ForwardPayload<'_> {
    ForwardPayload {
        message: ForwardMessage {
            chat: IdField {
                id: submission.chat_id,
            },
            from: IdField {
                id: submission.user_id,
            },
            photo: &submission.photo,
            file_url: &submission.file_url,
        },
    }
}

/// Download URL of a file stored on Telegram's servers
pub fn file_download_url(api_url: &str, bot_token: &str, file_path: &str) -> String {
    format!(
        "{}/file/bot{}/{}",
        api_url.trim_end_matches('/'),
        bot_token,
        file_path
    )
}

/// Placeholder estimate drawn from `rng`
pub fn estimate_calories_with<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(STUB_CALORIE_RANGE)
}

/// Placeholder estimate for `photo`; the photo itself is not inspected
pub fn simulate_calorie_analysis(photo: &PhotoVariant) -> u32 {
    let calories = estimate_calories_with(&mut rand::thread_rng());
    debug!(file_id = %photo.file_id, calories, "Simulated calorie analysis");
    calories
}

/// HTTP client for the external analysis service
#[derive(Debug, Clone)]
pub struct ForwardingClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ForwardingClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AnalysisError::Client)?;

        Ok(Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), ANALYSIS_ENDPOINT_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post the submission to the analysis service. The response body is ignored.
    pub async fn forward(&self, submission: &PhotoSubmission) -> Result<(), AnalysisError> {
        debug!(
            user_id = submission.user_id,
            endpoint = %self.endpoint,
            "Forwarding photo to analysis service"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .json(&forward_payload(submission))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Status(status.as_u16()));
        }

        info!(
            user_id = submission.user_id,
            status = status.as_u16(),
            "Photo forwarded to analysis service"
        );
        Ok(())
    }
}

/// Photo analysis backend selected by configuration
#[derive(Debug, Clone)]
pub enum Analyzer {
    Stub,
    Forward(ForwardingClient),
}

impl Analyzer {
    pub fn from_config(config: &BotConfig) -> Result<Self, AnalysisError> {
        match &config.analysis {
            AnalysisMode::Stub => Ok(Analyzer::Stub),
            AnalysisMode::Forward { base_url } => Ok(Analyzer::Forward(ForwardingClient::new(
                base_url,
                config.analysis_timeout,
            )?)),
        }
    }
}
