//! # Secondary Validator
//!
//! Collaborator consulted when the inventory cannot decide: the whole batch when
//! no inventory is loaded, or a single name whose lookup failed. Implementations
//! take an ordered list of candidate names and return the accepted or corrected
//! names. Callers treat any error as "keep the input unchanged".

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, RecoveryConfig, SecondaryValidatorConfig};
use crate::errors::error_logging;
use crate::observability;
use crate::recovery_parser;
use crate::retry::{retry_with_backoff, RetryError};

/// Errors returned by a secondary validator
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatorError {
    /// Transport-level failure (connection, TLS, client timeout)
    Request(String),
    /// Non-success HTTP status other than 429
    Status { code: u16, body: String },
    /// HTTP 429
    RateLimited,
    /// Reply did not contain a usable name list
    MalformedResponse(String),
    /// Bounded retry gave up
    RetriesExhausted { attempts: u32, last_error: String },
    /// Last attempt exceeded the operation timeout
    Timeout { attempts: u32, timeout_secs: u64 },
}

impl ValidatorError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ValidatorError::Request(_) | ValidatorError::RateLimited => true,
            ValidatorError::Status { code, .. } => *code >= 500,
            ValidatorError::MalformedResponse(_)
            | ValidatorError::RetriesExhausted { .. }
            | ValidatorError::Timeout { .. } => false,
        }
    }
}

impl fmt::Display for ValidatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorError::Request(msg) => write!(f, "request failed: {}", msg),
            ValidatorError::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            ValidatorError::RateLimited => write!(f, "rate limited"),
            ValidatorError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
            ValidatorError::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "gave up after {} attempts: {}", attempts, last_error),
            ValidatorError::Timeout {
                attempts,
                timeout_secs,
            } => write!(f, "attempt {} timed out after {}s", attempts, timeout_secs),
        }
    }
}

impl std::error::Error for ValidatorError {}

impl From<RetryError<ValidatorError>> for ValidatorError {
    fn from(err: RetryError<ValidatorError>) -> Self {
        match err {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => ValidatorError::RetriesExhausted {
                attempts,
                last_error: last_error.to_string(),
            },
            RetryError::TimedOut {
                attempts,
                timeout_secs,
            } => ValidatorError::Timeout {
                attempts,
                timeout_secs,
            },
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Collaborator that confirms or corrects candidate medicine names
#[async_trait]
pub trait SecondaryValidator: Send + Sync {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &'static str;

    async fn validate_names(&self, names: &[String]) -> Result<Vec<String>, ValidatorError>;
}

/// Validator that accepts every name as given
#[derive(Debug, Clone, Default)]
pub struct PassthroughValidator;

#[async_trait]
impl SecondaryValidator for PassthroughValidator {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn validate_names(&self, names: &[String]) -> Result<Vec<String>, ValidatorError> {
        Ok(names.to_vec())
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Build the instruction sent with a batch of candidate names
pub fn build_prompt(names: &[String]) -> String {
    let listed = Value::from(names.to_vec()).to_string();
    format!(
        "You check medicine names transcribed from a prescription. \
         For each candidate below, return the correct medicine name, fixing spelling \
         and expanding abbreviations. Drop candidates that are not medicines. \
         Keep the input order. Reply with JSON only, in the form {{\"medicines\": [\"name\", ...]}}.\n\
         Candidates: {}",
        listed
    )
}

/// Pull the generated text out of a `generateContent` reply
fn extract_text(body: &str) -> Result<String, ValidatorError> {
    let reply: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ValidatorError::MalformedResponse(e.to_string()))?;

    reply
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .find_map(|part| part.text)
        .ok_or_else(|| ValidatorError::MalformedResponse("no text in candidates".to_string()))
}

/// Recover the name list from the model's text, tolerating fences and trailing prose
pub fn names_from_reply(text: &str) -> Result<Vec<String>, ValidatorError> {
    let payload = recovery_parser::parse(text)
        .map_err(|e| ValidatorError::MalformedResponse(e.to_string()))?;
    payload
        .detected_names()
        .map_err(|e| ValidatorError::MalformedResponse(e.to_string()))
}

/// Validator backed by the Gemini `generateContent` API
pub struct GeminiValidator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    recovery: RecoveryConfig,
}

impl fmt::Debug for GeminiValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiValidator")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl GeminiValidator {
    pub fn new(
        api_key: String,
        config: &SecondaryValidatorConfig,
        recovery: &RecoveryConfig,
    ) -> Result<Self, ValidatorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| ValidatorError::Request(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            recovery: recovery.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn request_once(&self, names: &[String]) -> Result<Vec<String>, ValidatorError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_prompt(names)),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ValidatorError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ValidatorError::RateLimited);
        }
        let text = response
            .text()
            .await
            .map_err(|e| ValidatorError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(ValidatorError::Status {
                code: status.as_u16(),
                body: text,
            });
        }

        let generated = extract_text(&text)?;
        debug!(
            model = %self.model,
            reply_len = %generated.len(),
            "Secondary validator replied"
        );
        names_from_reply(&generated)
    }
}

#[async_trait]
impl SecondaryValidator for GeminiValidator {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn validate_names(&self, names: &[String]) -> Result<Vec<String>, ValidatorError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let start = std::time::Instant::now();
        let result = retry_with_backoff(
            "secondary_validate",
            &self.recovery,
            ValidatorError::is_retryable,
            |_| self.request_once(names),
        )
        .await
        .map_err(ValidatorError::from);

        observability::record_validator_call(self.name(), result.is_ok(), start.elapsed());
        if let Err(e) = &result {
            let attempts = match e {
                ValidatorError::RetriesExhausted { attempts, .. }
                | ValidatorError::Timeout { attempts, .. } => Some(*attempts),
                _ => None,
            };
            error_logging::log_validator_error(e, "validate_names", names.len(), attempts);
        }
        result
    }
}

/// Pick the validator for this configuration: Gemini when an API key is set
pub fn build_validator(config: &AppConfig) -> Arc<dyn SecondaryValidator> {
    match &config.secondary.api_key {
        Some(key) => match GeminiValidator::new(key.clone(), &config.secondary, &config.recovery) {
            Ok(validator) => {
                info!(model = %config.secondary.model, "Using Gemini secondary validator");
                Arc::new(validator)
            }
            Err(e) => {
                warn!(error = %e, "Could not build Gemini client, falling back to pass-through validator");
                Arc::new(PassthroughValidator)
            }
        },
        None => {
            info!("No API key configured, using pass-through secondary validator");
            Arc::new(PassthroughValidator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_returns_input() {
        let names = vec!["Foo".to_string(), "Bar".to_string()];
        let validated = PassthroughValidator.validate_names(&names).await;
        assert_eq!(validated, Ok(names));
    }

    #[test]
    fn test_prompt_lists_candidates_in_order() {
        let prompt = build_prompt(&["Amoxil".to_string(), "Doliprane".to_string()]);
        assert!(prompt.contains(r#"["Amoxil","Doliprane"]"#));
        assert!(prompt.contains(r#"{"medicines": ["name", ...]}"#));
    }

    #[test]
    fn test_extract_text_from_reply() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "{\"medicines\": [\"Amoxicillin\"]}"}], "role": "model"}}
            ]
        }"#;
        assert_eq!(
            extract_text(body),
            Ok(r#"{"medicines": ["Amoxicillin"]}"#.to_string())
        );

        assert!(matches!(
            extract_text(r#"{"candidates": []}"#),
            Err(ValidatorError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_text("not json"),
            Err(ValidatorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_names_from_fenced_reply() {
        let text = "```json\n{\"medicines\": [\"Paracetamol\", \"Ibuprofen\"]}\n```";
        assert_eq!(
            names_from_reply(text),
            Ok(vec!["Paracetamol".to_string(), "Ibuprofen".to_string()])
        );
        assert!(names_from_reply("I could not read these names.").is_err());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ValidatorError::RateLimited.is_retryable());
        assert!(ValidatorError::Request("reset".to_string()).is_retryable());
        assert!(ValidatorError::Status {
            code: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ValidatorError::Status {
            code: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!ValidatorError::MalformedResponse("x".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_error_conversion() {
        let err: ValidatorError = RetryError::Exhausted {
            attempts: 2,
            last_error: ValidatorError::RateLimited,
        }
        .into();
        assert_eq!(
            err,
            ValidatorError::RetriesExhausted {
                attempts: 2,
                last_error: "rate limited".to_string()
            }
        );

        let err: ValidatorError = RetryError::Aborted {
            attempts: 1,
            error: ValidatorError::Status {
                code: 403,
                body: "denied".to_string(),
            },
        }
        .into();
        assert!(matches!(err, ValidatorError::Status { code: 403, .. }));
    }

    #[test]
    fn test_build_validator_without_key_is_passthrough() {
        let config = AppConfig::default();
        assert_eq!(build_validator(&config).name(), "passthrough");
    }

    #[test]
    fn test_build_validator_with_key_is_gemini() {
        let mut config = AppConfig::default();
        config.secondary.api_key = Some("test-key".to_string());
        assert_eq!(build_validator(&config).name(), "gemini");
    }
}
