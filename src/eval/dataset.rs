//! Question/answer dataset loading.
//!
//! Expected format is a JSON array of pairs:
//! ```json
//! [
//!   {"question": "What is the bearing capacity of ...?", "answer": "About ..."},
//!   {"question": "...", "answer": "..."}
//! ]
//! ```

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A question with the answer the chatbot is expected to give.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    /// The question to ask.
    pub question: String,
    /// Ground truth answer.
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// An ordered collection of evaluation pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset name (file stem when loaded from disk).
    pub name: String,
    /// Pairs in file order.
    pub items: Vec<QaPair>,
}

impl Dataset {
    /// Create a new empty dataset.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
        }
    }

    /// Add an item to the dataset.
    pub fn add_item(&mut self, item: QaPair) {
        self.items.push(item);
    }

    /// Number of items in the dataset.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Load from a JSON file. The whole file is read before any run starts.
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EvalError::Dataset(format!(
                "dataset file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("dataset");

        Self::from_json_str(name, &content)
    }

    /// Parse and validate dataset JSON.
    pub fn from_json_str(name: &str, content: &str) -> Result<Self> {
        let items: Vec<QaPair> = serde_json::from_str(content)
            .map_err(|e| EvalError::Dataset(format!("malformed dataset JSON: {}", e)))?;

        if items.is_empty() {
            return Err(EvalError::Dataset("dataset contains no pairs".to_string()));
        }

        if let Some(pos) = items.iter().position(|p| p.question.trim().is_empty()) {
            return Err(EvalError::Dataset(format!(
                "item {} has an empty question",
                pos + 1
            )));
        }

        Ok(Self {
            name: name.to_string(),
            items,
        })
    }
}

/// Create a small sample dataset for smoke runs.
pub fn create_sample_dataset() -> Dataset {
    let mut dataset = Dataset::new("sample");

    dataset.add_item(QaPair::new(
        "What does the Standard Penetration Test (SPT) N-value measure?",
        "The N-value is the number of blows of a 63.5 kg hammer falling 760 mm needed to drive the split-spoon sampler the last 300 mm of a 450 mm penetration. It indicates the relative density of granular soils and the consistency of cohesive soils.",
    ));
    dataset.add_item(QaPair::new(
        "What is the plasticity index of a soil and how is it obtained?",
        "The plasticity index is the liquid limit minus the plastic limit. Both are Atterberg limits measured on the fraction passing the No. 40 sieve, and the index gives the range of water content over which the soil behaves plastically.",
    ));
    dataset.add_item(QaPair::new(
        "Why do saturated clays keep settling long after a load is applied?",
        "Low permeability makes excess pore water pressure dissipate slowly, so primary consolidation proceeds over time as water drains. Secondary compression from creep of the soil skeleton continues after that.",
    ));

    dataset
}
