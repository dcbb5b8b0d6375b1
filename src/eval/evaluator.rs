//! Criterion evaluator service.
//!
//! Built once per batch and handed to the runner. It holds no per-question
//! state, so the same instance scores every question.

use super::criteria::Criterion;
use super::judge::{Evaluation, Judge, parse_judge_response, parse_qa_grade};
use crate::error::{EvalError, Result};
use crate::llm::Prompts;
use tracing::{debug, warn};

/// Scores answers against named criteria with an LLM judge.
pub struct Evaluator<J> {
    judge: J,
    criteria: Vec<Criterion>,
}

impl<J: Judge> Evaluator<J> {
    /// Create an evaluator for the given criteria.
    pub fn new(judge: J, criteria: Vec<Criterion>) -> Self {
        Self { judge, criteria }
    }

    /// Criteria scored for every question, in recording order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Score one answer on one criterion.
    ///
    /// Only input violations are errors. Judge call failures and unparseable
    /// replies are recovered as a `0.0` score with a rationale saying why.
    pub async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        reference: &str,
        criterion: &Criterion,
    ) -> Result<Evaluation> {
        check_non_empty("question", question)?;
        check_non_empty("generated answer", answer)?;
        if criterion.requires_reference && reference.trim().is_empty() {
            return Err(EvalError::InvalidInput(format!(
                "criterion '{}' requires a reference answer",
                criterion.name
            )));
        }

        let reference_section = if reference.trim().is_empty() {
            String::new()
        } else {
            Prompts::fill(Prompts::reference_section(), &[("reference", reference)])
        };

        let prompt = Prompts::fill(
            Prompts::criterion_judge(),
            &[
                ("criterion", &criterion.name),
                ("criterion_question", &criterion.question),
                ("input", question),
                ("prediction", answer),
                ("reference_section", &reference_section),
            ],
        );

        let evaluation = match self.judge.grade(Prompts::system_judge(), &prompt).await {
            Ok(reply) => match parse_judge_response(&reply) {
                Ok(result) => result.normalize(),
                Err(e) => {
                    warn!(criterion = %criterion.name, error = %e, "judge reply not parseable, scoring 0");
                    Evaluation::failed(e)
                }
            },
            Err(e) => {
                warn!(criterion = %criterion.name, error = %e, "judge call failed, scoring 0");
                Evaluation::failed(e)
            }
        };

        debug!(criterion = %criterion.name, score = evaluation.score, "criterion scored");
        Ok(evaluation)
    }

    /// Grade factual correctness against the reference answer.
    ///
    /// Produces the unnamed overall QA score; same failure contract as
    /// [`Evaluator::evaluate`].
    pub async fn evaluate_qa(
        &self,
        question: &str,
        answer: &str,
        reference: &str,
    ) -> Result<Evaluation> {
        check_non_empty("question", question)?;
        check_non_empty("generated answer", answer)?;
        check_non_empty("reference answer", reference)?;

        let prompt = Prompts::fill(
            Prompts::qa_grader(),
            &[("query", question), ("result", answer), ("reference", reference)],
        );

        let evaluation = match self.judge.grade(Prompts::system_judge(), &prompt).await {
            Ok(reply) => match parse_qa_grade(&reply) {
                Ok(result) => result.normalize(),
                Err(e) => {
                    warn!(error = %e, "QA grade not parseable, scoring 0");
                    Evaluation::failed(e)
                }
            },
            Err(e) => {
                warn!(error = %e, "QA grader call failed, scoring 0");
                Evaluation::failed(e)
            }
        };

        Ok(evaluation)
    }
}

fn check_non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(EvalError::InvalidInput(format!("{} must not be empty", what)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::criteria::default_criteria;
    use crate::test_utils::ScriptedJudge;

    fn criterion(name: &str) -> Criterion {
        default_criteria()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap()
    }

    #[tokio::test]
    async fn test_structured_score() {
        let judge = ScriptedJudge::new(r#"{"score": 1, "reasoning": "matches reference"}"#);
        let evaluator = Evaluator::new(judge, default_criteria());

        let eval = evaluator
            .evaluate("Q1", "G1", "A1", &criterion("correctness"))
            .await
            .unwrap();
        assert_eq!(eval.score, 1.0);
        assert_eq!(eval.rationale, "matches reference");
    }

    #[tokio::test]
    async fn test_binary_verdict() {
        let judge = ScriptedJudge::new("N");
        let evaluator = Evaluator::new(judge, default_criteria());

        let eval = evaluator
            .evaluate("Q1", "G1", "", &criterion("toxicity"))
            .await
            .unwrap();
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.rationale, "binary response detected: N");
    }

    #[tokio::test]
    async fn test_fail_soft_on_garbage_and_errors() {
        let judge =
            ScriptedJudge::new("I refuse to grade this.").fail_when("[Criteria]: coherence");
        let evaluator = Evaluator::new(judge, default_criteria());

        let eval = evaluator
            .evaluate("Q1", "G1", "A1", &criterion("relevance"))
            .await
            .unwrap();
        assert_eq!(eval.score, 0.0);
        assert!(eval.rationale.contains("could not be scored"));

        let eval = evaluator
            .evaluate("Q1", "G1", "A1", &criterion("coherence"))
            .await
            .unwrap();
        assert_eq!(eval.score, 0.0);
        assert!(eval.rationale.contains("could not be scored"));
    }

    #[tokio::test]
    async fn test_input_constraints() {
        let evaluator = Evaluator::new(ScriptedJudge::new("Y"), default_criteria());

        assert!(matches!(
            evaluator.evaluate("", "G1", "A1", &criterion("coherence")).await,
            Err(EvalError::InvalidInput(_))
        ));
        assert!(matches!(
            evaluator.evaluate("Q1", " ", "A1", &criterion("coherence")).await,
            Err(EvalError::InvalidInput(_))
        ));
        assert!(matches!(
            evaluator.evaluate("Q1", "G1", "", &criterion("correctness")).await,
            Err(EvalError::InvalidInput(_))
        ));
        assert!(
            evaluator
                .evaluate("Q1", "G1", "", &criterion("harmfulness"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_prompt_includes_reference_only_when_given() {
        let judge = ScriptedJudge::new("Y");
        let evaluator = Evaluator::new(judge.clone(), default_criteria());

        evaluator
            .evaluate("Q1", "G1", "A1", &criterion("correctness"))
            .await
            .unwrap();
        evaluator
            .evaluate("Q1", "G1", "", &criterion("toxicity"))
            .await
            .unwrap();

        let prompts = judge.prompts();
        assert!(prompts[0].contains("[Reference]: A1"));
        assert!(!prompts[1].contains("[Reference]"));
    }

    #[tokio::test]
    async fn test_user_text_is_not_substituted() {
        let judge = ScriptedJudge::new("Y");
        let evaluator = Evaluator::new(judge.clone(), default_criteria());

        evaluator
            .evaluate(
                "Explain {prediction}",
                "See {reference_section} and {criterion}",
                "Ref {input}",
                &criterion("correctness"),
            )
            .await
            .unwrap();
        evaluator
            .evaluate_qa("Q {result}", "G {reference}", "A {query}")
            .await
            .unwrap();

        let prompts = judge.prompts();
        assert!(prompts[0].contains("[Input]: Explain {prediction}\n"));
        assert!(prompts[0].contains("[Submission]: See {reference_section} and {criterion}\n"));
        assert!(prompts[0].contains("[Reference]: Ref {input}\n"));
        assert!(prompts[1].contains("QUESTION: Q {result}\n"));
        assert!(prompts[1].contains("STUDENT ANSWER: G {reference}\n"));
        assert!(prompts[1].contains("TRUE ANSWER: A {query}\n"));
    }

    #[tokio::test]
    async fn test_qa_score() {
        let judge = ScriptedJudge::new("Same facts.\nGRADE: CORRECT");
        let evaluator = Evaluator::new(judge, default_criteria());

        let eval = evaluator.evaluate_qa("Q1", "G1", "A1").await.unwrap();
        assert_eq!(eval.score, 1.0);
        assert_eq!(eval.rationale, "Same facts.");

        assert!(evaluator.evaluate_qa("Q1", "G1", "").await.is_err());
    }
}
