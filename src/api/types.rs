use serde::{Deserialize, Serialize};

use crate::config::GenerationParameters;
use crate::prompt::{ChatMessage, UserProfile};

const CHAT_MAX_NEW_TOKENS: usize = 512;
const CHAT_TEMPERATURE: f64 = 0.7;
const CHAT_TOP_P: f64 = 0.9;

const EMERGENCY_MAX_NEW_TOKENS: usize = 768;
const EMERGENCY_TEMPERATURE: f64 = 0.3;
const EMERGENCY_TOP_P: f64 = 0.7;

/// General medical chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

impl ChatRequest {
    pub fn parameters(&self) -> GenerationParameters {
        GenerationParameters {
            max_new_tokens: self.max_new_tokens.unwrap_or(CHAT_MAX_NEW_TOKENS),
            temperature: self.temperature.unwrap_or(CHAT_TEMPERATURE),
            top_p: self.top_p.unwrap_or(CHAT_TOP_P),
        }
    }
}

/// Emergency first-aid request: a single prompt summarising the situation, no history
#[derive(Debug, Clone, Deserialize)]
pub struct EmergencyAssessmentRequest {
    pub prompt: String,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
    #[serde(default)]
    pub max_new_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

impl EmergencyAssessmentRequest {
    pub fn parameters(&self) -> GenerationParameters {
        GenerationParameters {
            max_new_tokens: self.max_new_tokens.unwrap_or(EMERGENCY_MAX_NEW_TOKENS),
            temperature: self.temperature.unwrap_or(EMERGENCY_TEMPERATURE),
            top_p: self.top_p.unwrap_or(EMERGENCY_TOP_P),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub answer: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_status: String,
    pub model_id: String,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_defaults_fill_missing_and_null_parameters() {
        let chat: ChatRequest =
            serde_json::from_str(r#"{"prompt": "hi", "temperature": null}"#).unwrap();
        assert!(chat.history.is_empty());
        assert_eq!(
            chat.parameters(),
            GenerationParameters {
                max_new_tokens: 512,
                temperature: 0.7,
                top_p: 0.9,
            }
        );

        let emergency: EmergencyAssessmentRequest =
            serde_json::from_str(r#"{"prompt": "choking", "top_p": 1.0}"#).unwrap();
        assert_eq!(
            emergency.parameters(),
            GenerationParameters {
                max_new_tokens: 768,
                temperature: 0.3,
                top_p: 1.0,
            }
        );
    }

    #[test]
    fn prompt_is_required() {
        assert!(serde_json::from_str::<ChatRequest>(r#"{"history": []}"#).is_err());
        assert!(serde_json::from_str::<EmergencyAssessmentRequest>("{}").is_err());
    }
}
