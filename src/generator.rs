//! Answer generators: the chatbot under evaluation.
//!
//! The RAG chain itself lives outside this crate. [`ChainGenerator`] calls it
//! over HTTP with the chain's `invoke` payload; [`LlmGenerator`] asks the LLM
//! directly and is meant for smoke-testing the harness.

use crate::config::{Config, LlmConfig};
use crate::error::{EvalError, Result};
use crate::llm::{LlmClient, Prompts};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Produces an answer for a question.
pub trait AnswerGenerator {
    fn generate(&self, question: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Request body of the chain's `invoke` endpoint.
#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    question: &'a str,
    /// Always empty: evaluation is single-turn.
    chat_history: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InvokeResponse {
    Direct { answer: String },
    Wrapped { output: InvokeOutput },
}

#[derive(Debug, Deserialize)]
struct InvokeOutput {
    answer: String,
}

impl InvokeResponse {
    fn into_answer(self) -> String {
        match self {
            InvokeResponse::Direct { answer } => answer,
            InvokeResponse::Wrapped { output } => output.answer,
        }
    }
}

/// Calls a remote RAG chain: `POST {"question", "chat_history": []} -> {"answer"}`.
#[derive(Clone)]
pub struct ChainGenerator {
    client: Client,
    endpoint: String,
}

impl ChainGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn parse_body(body: &str) -> Result<String> {
        let parsed: InvokeResponse = serde_json::from_str(body).map_err(|e| {
            EvalError::Generation(format!("chain response has no answer field: {}", e))
        })?;
        non_empty_answer(parsed.into_answer())
    }
}

impl AnswerGenerator for ChainGenerator {
    async fn generate(&self, question: &str) -> Result<String> {
        let request = InvokeRequest {
            question,
            chat_history: Vec::new(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EvalError::Generation(format!("chain request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EvalError::Generation(format!("chain response unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(EvalError::Generation(format!(
                "chain returned {}: {}",
                status, body
            )));
        }

        Self::parse_body(&body)
    }
}

/// Answers with a plain LLM completion, without retrieval.
#[derive(Clone)]
pub struct LlmGenerator {
    client: LlmClient,
}

impl LlmGenerator {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: LlmClient::new(config),
        }
    }
}

impl AnswerGenerator for LlmGenerator {
    async fn generate(&self, question: &str) -> Result<String> {
        let prompt = Prompts::fill(Prompts::direct_answer(), &[("question", question)]);
        let answer = self
            .client
            .complete(None, &prompt)
            .await
            .map_err(|e| EvalError::Generation(e.to_string()))?;
        non_empty_answer(answer)
    }
}

/// Generator selected from configuration.
#[derive(Clone)]
pub enum Generator {
    Chain(ChainGenerator),
    Llm(LlmGenerator),
}

impl Generator {
    /// Use the chain endpoint when configured, the bare LLM otherwise.
    pub fn from_config(config: &Config) -> Self {
        match &config.generator.endpoint {
            Some(endpoint) => Generator::Chain(ChainGenerator::new(
                endpoint.clone(),
                Duration::from_secs(config.llm.timeout_secs),
            )),
            None => Generator::Llm(LlmGenerator::new(config.llm.clone())),
        }
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Generator::Chain(chain) => format!("chain at {}", chain.endpoint()),
            Generator::Llm(_) => "direct LLM (no retrieval)".to_string(),
        }
    }
}

impl AnswerGenerator for Generator {
    async fn generate(&self, question: &str) -> Result<String> {
        match self {
            Generator::Chain(chain) => chain.generate(question).await,
            Generator::Llm(llm) => llm.generate(question).await,
        }
    }
}

fn non_empty_answer(answer: String) -> Result<String> {
    let answer = answer.trim().to_string();
    if answer.is_empty() {
        Err(EvalError::Generation("generator returned an empty answer".to_string()))
    } else {
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_request_shape() {
        let request = InvokeRequest {
            question: "Q1",
            chat_history: Vec::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"question": "Q1", "chat_history": []}));
    }

    #[test]
    fn test_parse_direct_and_wrapped_answers() {
        assert_eq!(
            ChainGenerator::parse_body(r#"{"answer": " G1 ", "source_documents": []}"#).unwrap(),
            "G1"
        );
        assert_eq!(
            ChainGenerator::parse_body(r#"{"output": {"answer": "G2"}, "metadata": {}}"#)
                .unwrap(),
            "G2"
        );
    }

    #[test]
    fn test_parse_rejects_missing_or_empty_answer() {
        assert!(matches!(
            ChainGenerator::parse_body(r#"{"result": "G1"}"#),
            Err(EvalError::Generation(_))
        ));
        assert!(matches!(
            ChainGenerator::parse_body(r#"{"answer": ""}"#),
            Err(EvalError::Generation(_))
        ));
    }

    #[test]
    fn test_from_config_selects_generator() {
        let mut config = Config::default();
        assert!(matches!(Generator::from_config(&config), Generator::Llm(_)));

        config.generator.endpoint = Some("http://localhost:8000/rag/invoke".to_string());
        let generator = Generator::from_config(&config);
        assert!(matches!(generator, Generator::Chain(_)));
        assert!(generator.describe().contains("localhost:8000"));
    }
}
