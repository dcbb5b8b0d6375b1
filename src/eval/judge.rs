//! LLM-as-judge reply handling.
//!
//! Judges answer either with a JSON object carrying a score and reasoning or
//! with a bare verdict such as `Y`/`N`. Both shapes are captured by
//! [`JudgeResult`] and mapped to a canonical [`Evaluation`] by
//! [`JudgeResult::normalize`].

use crate::error::{EvalError, Result};
use crate::llm::LlmClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Backend that answers grading prompts with raw text.
pub trait Judge {
    fn grade(&self, system: &str, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

impl Judge for LlmClient {
    async fn grade(&self, system: &str, prompt: &str) -> Result<String> {
        self.complete(Some(system), prompt).await
    }
}

/// A judge reply, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JudgeResult {
    /// Reply carried a score (already clamped to `[0, 1]`) and reasoning.
    Structured { score: f64, reasoning: String },
    /// Reply was a bare verdict token.
    Binary { verdict: String },
}

/// Canonical per-criterion outcome: a score in `[0, 1]` and its rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    pub rationale: String,
}

impl Evaluation {
    /// Outcome recorded when the judge could not produce a usable score.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            score: 0.0,
            rationale: format!("judge response could not be scored: {}", reason),
        }
    }
}

/// Map a verdict token to a score: affirmative tokens are `1.0`, everything else `0.0`.
pub fn verdict_score(verdict: &str) -> f64 {
    match verdict.trim().to_uppercase().as_str() {
        "Y" | "YES" | "TRUE" | "1" | "CORRECT" => 1.0,
        _ => 0.0,
    }
}

impl JudgeResult {
    /// Collapse either reply shape into a score and a non-empty rationale.
    pub fn normalize(self) -> Evaluation {
        match self {
            JudgeResult::Structured { score, reasoning } => {
                let rationale = if reasoning.trim().is_empty() {
                    "judge gave no reasoning".to_string()
                } else {
                    reasoning.trim().to_string()
                };
                Evaluation {
                    score: score.clamp(0.0, 1.0),
                    rationale,
                }
            }
            JudgeResult::Binary { verdict } => Evaluation {
                score: verdict_score(&verdict),
                rationale: format!("binary response detected: {}", verdict),
            },
        }
    }
}

/// Coerce a JSON value into a score, if it represents one.
fn coerce_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => v,
            Err(_) => match s.trim().to_uppercase().as_str() {
                "Y" | "YES" | "TRUE" | "CORRECT" => 1.0,
                "N" | "NO" | "FALSE" | "INCORRECT" => 0.0,
                _ => return None,
            },
        },
        _ => return None,
    };

    if score.is_finite() {
        Some(score.clamp(0.0, 1.0))
    } else {
        None
    }
}

/// Parse a criterion judge reply.
pub fn parse_judge_response(response: &str) -> Result<JudgeResult> {
    let json_str = extract_json(response);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&json_str) {
        let raw_score = map.get("score").or_else(|| map.get("value"));
        let reasoning = map
            .get("reasoning")
            .or_else(|| map.get("explanation"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        return match raw_score.and_then(coerce_score) {
            Some(score) => Ok(JudgeResult::Structured { score, reasoning }),
            None => Err(EvalError::JudgeParse(format!(
                "no usable score in JSON reply: {}",
                json_str
            ))),
        };
    }

    if let Some((score, reasoning)) = trailing_score(response) {
        return Ok(JudgeResult::Structured { score, reasoning });
    }

    match trailing_verdict(response) {
        Some(verdict) => Ok(JudgeResult::Binary { verdict }),
        None => Err(EvalError::JudgeParse(format!(
            "reply is neither JSON nor a verdict: {}",
            response.trim()
        ))),
    }
}

/// Parse a QA grader reply ending in `GRADE: CORRECT|INCORRECT`.
pub fn parse_qa_grade(response: &str) -> Result<JudgeResult> {
    let lines: Vec<&str> = response.lines().collect();

    let grade_line = lines.iter().rposition(|line| {
        line.trim_start()
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("GRADE:"))
    });

    if let Some(idx) = grade_line {
        let verdict = lines[idx].trim_start()[6..]
            .trim()
            .trim_end_matches('.')
            .to_uppercase();
        let score = match verdict.as_str() {
            "CORRECT" => 1.0,
            "INCORRECT" => 0.0,
            other => {
                return Err(EvalError::JudgeParse(format!(
                    "unknown QA grade '{}'",
                    other
                )));
            }
        };
        let reasoning = lines[..idx].join("\n").trim().to_string();
        return Ok(JudgeResult::Structured { score, reasoning });
    }

    parse_judge_response(response)
}

/// Last non-empty line read as a number, optionally prefixed with `score:`.
/// Earlier lines become the reasoning.
fn trailing_score(response: &str) -> Option<(f64, String)> {
    let lines: Vec<&str> = response.lines().collect();
    let idx = lines.iter().rposition(|l| !l.trim().is_empty())?;

    let mut last = lines[idx].trim();
    if last
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("score:"))
    {
        last = last[6..].trim();
    }

    let score = last.parse::<f64>().ok().filter(|v| v.is_finite())?;
    let reasoning = lines[..idx].join("\n").trim().to_string();
    Some((score.clamp(0.0, 1.0), reasoning))
}

/// Last non-empty line, when it is a single verdict-like token.
fn trailing_verdict(response: &str) -> Option<String> {
    let last = response.lines().rev().find(|l| !l.trim().is_empty())?;
    let token = last.trim().trim_end_matches('.');
    if !token.is_empty()
        && !token.contains(char::is_whitespace)
        && token.chars().all(|c| c.is_ascii_alphanumeric())
    {
        Some(token.to_string())
    } else {
        None
    }
}

/// Extract JSON from a reply that may be wrapped in prose or code fences.
fn extract_json(response: &str) -> String {
    let response = response.trim();

    if response.starts_with("```json") {
        if let Some(end) = response.rfind("```") {
            let start = "```json".len();
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    if response.starts_with("```") {
        if let Some(end) = response.rfind("```") {
            let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    response.to_string()
}
