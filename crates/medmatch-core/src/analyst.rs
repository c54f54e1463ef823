use reqwest::Url;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::AnalystConfig;
use crate::error::{MedMatchError, Result};
use crate::models::{AnalysisSource, Priority, QueryAnalysis};
use crate::normalize;

/// Boundary to the external analysis collaborator: free text in, a
/// structured `QueryAnalysis` out. Implementations must not panic; any
/// failure is a `Collaborator` error the pipeline degrades around.
pub trait QueryAnalyst: Send + Sync {
    fn analyze(&self, query: &str) -> Result<QueryAnalysis>;
}

const SYSTEM_PROMPT: &str = "You are a medical services assistant. For the \
user's request, identify the catalog category to search, concrete search \
terms, a short context note, and a priority. Respond with exactly one JSON \
object: {\"category\": string, \"search_terms\": [string], \"context\": \
string, \"priority\": \"routine\"|\"urgent\"|\"emergency\"}.";

/// Language-model collaborator over a chat-style HTTP endpoint. The
/// request timeout is fixed at client construction, so a slow model can
/// never stall the pipeline past the configured bound.
pub struct HttpAnalyst {
    client: Client,
    endpoint: Url,
    model: String,
}

impl std::fmt::Debug for HttpAnalyst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalyst").finish_non_exhaustive()
    }
}

impl HttpAnalyst {
    pub fn new(config: &AnalystConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|err| {
            MedMatchError::Validation(format!("invalid analyst endpoint: {err}"))
        })?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
        })
    }
}

impl QueryAnalyst for HttpAnalyst {
    fn analyze(&self, query: &str) -> Result<QueryAnalysis> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": query}
            ],
            "stream": false,
            "options": {"temperature": 0.3}
        });
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .map_err(|err| MedMatchError::Collaborator(format!("request failed: {err}")))?;
        if !response.status().is_success() {
            return Err(MedMatchError::Collaborator(format!(
                "non-success status: {}",
                response.status()
            )));
        }
        let value = response
            .json::<Value>()
            .map_err(|err| MedMatchError::Collaborator(format!("invalid json body: {err}")))?;
        parse_analysis_response(&value)
    }
}

/// Loose deserialization target for collaborator bodies; the model does
/// not always respect field casing or optionality.
#[derive(Debug, serde::Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    category: String,
    #[serde(default)]
    search_terms: Vec<String>,
    #[serde(default)]
    context: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    relations: Vec<crate::models::RelationObservation>,
}

/// Pulls the assistant text out of the common chat-completion body
/// shapes, then parses the embedded JSON object into an analysis.
pub(crate) fn parse_analysis_response(value: &Value) -> Result<QueryAnalysis> {
    let content = response_content(value).ok_or_else(|| {
        MedMatchError::Collaborator("response carries no message content".to_string())
    })?;
    let fragment = json_fragment(&content).ok_or_else(|| {
        MedMatchError::Collaborator("response content has no JSON object".to_string())
    })?;
    let raw = serde_json::from_str::<RawAnalysis>(&fragment)
        .map_err(|err| MedMatchError::Collaborator(format!("invalid analysis: {err}")))?;

    let category = raw.category.trim().to_string();
    let search_terms: Vec<String> = raw
        .search_terms
        .iter()
        .map(|term| normalize::normalize(term))
        .filter(|term| !term.is_empty())
        .collect();
    if category.is_empty() || search_terms.is_empty() {
        return Err(MedMatchError::Collaborator(
            "analysis names no category or search terms".to_string(),
        ));
    }
    Ok(QueryAnalysis {
        category,
        search_terms,
        context: raw.context,
        priority: raw
            .priority
            .as_deref()
            .map(Priority::parse)
            .unwrap_or_default(),
        source: AnalysisSource::Collaborator,
        relations: raw.relations,
    })
}

fn response_content(value: &Value) -> Option<String> {
    if let Some(content) = value
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }
    if let Some(content) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content.to_string());
    }
    value
        .get("response")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn json_fragment(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// One row of the keyword classification table: hits on any keyword vote
/// for the category with the given weight.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub category: &'static str,
    pub keywords: &'static [&'static str],
    pub weight: i64,
    pub seed_terms: &'static [&'static str],
}

/// The deterministic fallback classification table. Declarative on
/// purpose: every keyword that steers a query toward a category lives
/// here, not in scattered string checks.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: "RADIOLOGY",
        keywords: &[
            "x-ray", "scan", "ct", "mri", "ultrasound", "imaging", "radiograph", "chest",
            "lung", "thorax",
        ],
        weight: 2,
        seed_terms: &["x-ray", "scan"],
    },
    CategoryRule {
        category: "LABORATORY",
        keywords: &[
            "blood", "urine", "culture", "swab", "sugar", "liver", "haemoglobin", "lab",
        ],
        weight: 2,
        seed_terms: &["blood test"],
    },
    CategoryRule {
        category: "GENERAL",
        keywords: &[
            "consultation", "consult", "checkup", "check-up", "examination", "exam",
            "review", "clinic",
        ],
        weight: 1,
        seed_terms: &["consultation", "examination"],
    },
];

const URGENT_MARKERS: &[&str] = &["urgent", "asap", "immediately"];
const EMERGENCY_MARKERS: &[&str] = &["emergency", "severe", "unbearable", "accident"];

const STOPWORDS: &[&str] = &[
    "i", "a", "an", "the", "my", "me", "for", "of", "and", "to", "need", "needs", "want",
    "cost", "price", "how", "much", "is", "what",
];

/// Keyword-table analyst: the degraded path when the collaborator fails,
/// and a standalone analyst when no collaborator is configured. Pure and
/// deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyst;

impl KeywordAnalyst {
    /// Infallible classification; the trait impl wraps this in `Ok`.
    #[must_use]
    pub fn classify(query: &str) -> QueryAnalysis {
        let normalized = normalize::normalize(query);
        let tokens = normalize::tokenize(&normalized);

        // Keywords hit whole tokens only; substring checks would route
        // "doctor" to imaging via "ct".
        let mut best: Option<(&CategoryRule, i64)> = None;
        for rule in CATEGORY_RULES {
            let hits = rule
                .keywords
                .iter()
                .filter(|keyword| tokens.iter().any(|token| token == *keyword))
                .count();
            let score = i64::try_from(hits).unwrap_or(i64::MAX) * rule.weight;
            if score > 0 && best.is_none_or(|(_, current)| score > current) {
                best = Some((rule, score));
            }
        }

        let mut search_terms: Vec<String> = tokens
            .into_iter()
            .filter(|token| token.len() > 2 && !STOPWORDS.contains(&token.as_str()))
            .collect();
        search_terms.insert(0, normalized.clone());

        let (category, context) = match best {
            Some((rule, _)) => {
                for seed in rule.seed_terms {
                    if !search_terms.iter().any(|term| term == seed) {
                        search_terms.push((*seed).to_string());
                    }
                }
                (
                    rule.category.to_string(),
                    format!("keyword classification: {}", rule.category),
                )
            }
            None => (
                "GENERAL".to_string(),
                "keyword classification: no category keywords matched".to_string(),
            ),
        };

        QueryAnalysis {
            category,
            search_terms,
            context,
            priority: detect_priority(&normalized),
            source: AnalysisSource::Fallback,
            relations: Vec::new(),
        }
    }
}

impl QueryAnalyst for KeywordAnalyst {
    fn analyze(&self, query: &str) -> Result<QueryAnalysis> {
        Ok(Self::classify(query))
    }
}

fn detect_priority(normalized: &str) -> Priority {
    if EMERGENCY_MARKERS.iter().any(|m| normalized.contains(m)) {
        return Priority::Emergency;
    }
    if URGENT_MARKERS.iter().any(|m| normalized.contains(m)) {
        return Priority::Urgent;
    }
    Priority::Routine
}
