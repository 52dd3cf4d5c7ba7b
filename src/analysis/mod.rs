//! Privacy classification of extracted or native text.
//!
//! [`PrivacyAnalyzer::analyze`] never fails: transport errors and replies that stay malformed
//! after the retry budget are folded into an [`AnalysisResult`] with [`RiskLevel::Error`].

mod prompt;

pub use prompt::{PRIVACY_SYSTEM_PROMPT, user_prompt};

use crate::llm::structured::{QueryFailure, query_with_retry};
use crate::llm::{CompletionOptions, LanguageModelClient};
use crate::store::payload::current_timestamp_rfc3339;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const ANALYSIS_TEMPERATURE: f32 = 0.3;
const ANALYSIS_MAX_TOKENS: u32 = 1500;
const FAILED_RECOMMENDATION: &str = "Analysis failed - manual review required";

/// Ordinal privacy-sensitivity classification.
///
/// `None < Low < Medium < High < Critical`; `Error` marks a failed analysis and sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No sensitive information.
    None,
    /// Minor concern.
    Low,
    /// Moderate risk.
    Medium,
    /// Serious privacy concern.
    High,
    /// Immediate security threat.
    Critical,
    /// Analysis could not be completed.
    Error,
}

impl RiskLevel {
    /// Every level, in ascending order.
    pub const ALL: [RiskLevel; 6] = [
        Self::None,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Critical,
        Self::Error,
    ];

    /// Lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Error => "error",
        }
    }

    /// Whether the level warrants attention in the summary.
    pub fn is_severe(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| format!("unknown risk level '{s}'"))
    }
}

/// Accepts any casing; a model may not claim the `error` level for itself.
fn deserialize_model_risk<'de, D>(deserializer: D) -> Result<RiskLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let label = String::deserialize(deserializer)?;
    match label.parse::<RiskLevel>() {
        Ok(RiskLevel::Error) | Err(_) => Err(serde::de::Error::custom(format!(
            "invalid risk level '{label}'"
        ))),
        Ok(level) => Ok(level),
    }
}

/// Reply shape requested by [`PRIVACY_SYSTEM_PROMPT`].
#[derive(Debug, Deserialize)]
struct ModelVerdict {
    #[serde(default)]
    contains_sensitive_info: bool,
    #[serde(deserialize_with = "deserialize_model_risk")]
    risk_level: RiskLevel,
    #[serde(default)]
    detected_categories: Vec<String>,
    #[serde(default)]
    specific_findings: Vec<String>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Risk classification for one document or image. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// Whether any sensitive content was found.
    #[serde(rename = "contains_sensitive_info")]
    pub contains_sensitive: bool,
    /// Overall risk.
    pub risk_level: RiskLevel,
    /// Category labels detected.
    #[serde(rename = "detected_categories")]
    pub categories: Vec<String>,
    /// Free-text findings.
    #[serde(rename = "specific_findings")]
    pub findings: Vec<String>,
    /// Suggested actions.
    pub recommendations: Vec<String>,
    /// Model's self-reported confidence label.
    pub confidence: Option<String>,
    /// Characters of text analyzed.
    pub analyzed_chars: usize,
    /// RFC 3339 time of analysis.
    pub timestamp: String,
}

impl AnalysisResult {
    /// Result recorded when analysis could not complete.
    pub fn failed(detail: impl fmt::Display, analyzed_chars: usize) -> Self {
        Self {
            contains_sensitive: false,
            risk_level: RiskLevel::Error,
            categories: Vec::new(),
            findings: vec![format!("Error: {detail}")],
            recommendations: vec![FAILED_RECOMMENDATION.to_string()],
            confidence: None,
            analyzed_chars,
            timestamp: current_timestamp_rfc3339(),
        }
    }

    /// Result for blank text; nothing to send to the model.
    pub fn blank() -> Self {
        Self {
            contains_sensitive: false,
            risk_level: RiskLevel::None,
            categories: Vec::new(),
            findings: Vec::new(),
            recommendations: Vec::new(),
            confidence: None,
            analyzed_chars: 0,
            timestamp: current_timestamp_rfc3339(),
        }
    }

    fn from_verdict(verdict: ModelVerdict, analyzed_chars: usize) -> Self {
        Self {
            contains_sensitive: verdict.contains_sensitive_info,
            risk_level: verdict.risk_level,
            categories: verdict.detected_categories,
            findings: verdict.specific_findings,
            recommendations: verdict.recommendations,
            confidence: verdict.confidence,
            analyzed_chars,
            timestamp: current_timestamp_rfc3339(),
        }
    }
}

/// Where the analyzed text came from; shown to the model as context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisContext {
    /// Text recognized from an image.
    OcrExtraction,
    /// Native text or markdown file.
    NativeText,
}

impl AnalysisContext {
    fn label(self) -> &'static str {
        match self {
            Self::OcrExtraction => "OCR extracted from image",
            Self::NativeText => "Native text file",
        }
    }
}

/// Classifies text through a language model with bounded self-repair retries.
pub struct PrivacyAnalyzer {
    client: Arc<dyn LanguageModelClient>,
    max_retries: usize,
    options: CompletionOptions,
}

impl PrivacyAnalyzer {
    /// Build an analyzer; `model` is forwarded with each completion when set.
    pub fn new(
        client: Arc<dyn LanguageModelClient>,
        max_retries: usize,
        model: Option<String>,
    ) -> Self {
        Self {
            client,
            max_retries,
            options: CompletionOptions {
                model,
                temperature: ANALYSIS_TEMPERATURE,
                max_tokens: ANALYSIS_MAX_TOKENS,
            },
        }
    }

    /// Whether the underlying model server is reachable.
    pub async fn is_available(&self) -> bool {
        self.client.check_status().await
    }

    /// Classify `text`. Failures become an [`RiskLevel::Error`] result.
    pub async fn analyze(
        &self,
        text: &str,
        file_name: &str,
        context: AnalysisContext,
    ) -> AnalysisResult {
        let analyzed_chars = text.chars().count();
        let prompt = user_prompt(text, file_name, context.label());

        let outcome = query_with_retry::<ModelVerdict>(
            self.client.as_ref(),
            &prompt,
            Some(PRIVACY_SYSTEM_PROMPT),
            self.max_retries,
            &self.options,
        )
        .await;

        match outcome {
            Ok(verdict) => {
                let result = AnalysisResult::from_verdict(verdict, analyzed_chars);
                tracing::debug!(file = file_name, risk = %result.risk_level, "Analysis complete");
                result
            }
            Err(failure) => {
                match &failure {
                    QueryFailure::MalformedResponse { raw_response, .. } => tracing::warn!(
                        file = file_name,
                        error = %failure,
                        raw_len = raw_response.len(),
                        "Analysis reply stayed malformed"
                    ),
                    QueryFailure::Transport(_) => {
                        tracing::warn!(file = file_name, error = %failure, "Analysis request failed")
                    }
                }
                AnalysisResult::failed(failure, analyzed_chars)
            }
        }
    }
}
