//! LLM prompts used by the judge and the direct answer generator.

/// Collection of prompts used for grading and answering.
pub struct Prompts;

impl Prompts {
    /// System prompt shared by every grading call.
    pub fn system_judge() -> &'static str {
        "You are an impartial evaluator of chatbot answers. You grade one criterion at a time and always respond with valid JSON when requested."
    }

    /// Prompt to grade a submission on a single named criterion.
    ///
    /// Placeholders: `{criterion}`, `{criterion_question}`, `{input}`,
    /// `{prediction}`, `{reference_section}`.
    pub fn criterion_judge() -> &'static str {
        r#"You are assessing a submitted answer on a given task or input based on a set of criteria.

[BEGIN DATA]
***
[Input]: {input}
***
[Submission]: {prediction}
***{reference_section}
[Criteria]: {criterion}: {criterion_question}
***
[END DATA]

Does the submission meet the criterion? Think step by step, then reply in the following JSON format:
{
    "reasoning": <step by step explanation of your verdict>,
    "score": <1 if the criterion is met, 0 if it is not; fractional values between 0 and 1 are allowed for partial credit>
}

Directly return the final JSON structure. Do not output anything else."#
    }

    /// Reference block spliced into [`Prompts::criterion_judge`] when a ground truth exists.
    pub fn reference_section() -> &'static str {
        "\n[Reference]: {reference}\n***"
    }

    /// Prompt to grade an answer against a reference answer (QA correctness).
    ///
    /// Placeholders: `{query}`, `{reference}`, `{result}`.
    pub fn qa_grader() -> &'static str {
        r#"You are a teacher grading a quiz.
You are given a question, the student's answer, and the true answer, and are asked to score the student answer as either CORRECT or INCORRECT.
Grade the student answers based ONLY on their factual accuracy. Ignore differences in punctuation and phrasing between the student answer and true answer. It is OK if the student answer contains more information than the true answer, as long as it does not contain any conflicting statements.

QUESTION: {query}
STUDENT ANSWER: {result}
TRUE ANSWER: {reference}

Write one sentence explaining your grade, then finish with a final line of the form:
GRADE: CORRECT or INCORRECT"#
    }

    /// Prompt used by the direct generator when no chain endpoint is configured.
    pub fn direct_answer() -> &'static str {
        r#"Answer the following question concisely and accurately. If you do not know the answer, say so.

Question: {question}

Answer:"#
    }

    /// Substitute `{name}` placeholders in one pass over `template`.
    ///
    /// Substituted text is never scanned again, so values may themselves
    /// contain placeholder-like text. Unknown `{...}` spans are kept as is.
    pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after.find('}').and_then(|close| {
                let name = &after[..close];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, close))
            });
            match value {
                Some((value, close)) => {
                    out.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_are_not_empty() {
        assert!(!Prompts::system_judge().is_empty());
        assert!(!Prompts::criterion_judge().is_empty());
        assert!(!Prompts::qa_grader().is_empty());
        assert!(!Prompts::direct_answer().is_empty());
    }

    #[test]
    fn test_placeholders_present() {
        let judge = Prompts::criterion_judge();
        for placeholder in [
            "{criterion}",
            "{criterion_question}",
            "{input}",
            "{prediction}",
            "{reference_section}",
        ] {
            assert!(judge.contains(placeholder), "missing {}", placeholder);
        }
        assert!(Prompts::reference_section().contains("{reference}"));
        assert!(Prompts::qa_grader().contains("GRADE:"));
    }

    #[test]
    fn test_fill_is_single_pass() {
        let filled = Prompts::fill(
            "[Input]: {input}\n[Submission]: {prediction}",
            &[("input", "what is {prediction}?"), ("prediction", "{input}")],
        );
        assert_eq!(filled, "[Input]: what is {prediction}?\n[Submission]: {input}");
    }

    #[test]
    fn test_fill_keeps_unknown_braces() {
        let filled = Prompts::fill(Prompts::criterion_judge(), &[("input", "Q1")]);
        assert!(filled.contains("[Input]: Q1"));
        assert!(filled.contains("{prediction}"));
        assert!(filled.contains("\"score\": <1 if"));
        assert_eq!(Prompts::fill("{ {a} }", &[("a", "x")]), "{ x }");
        assert_eq!(Prompts::fill("open { only", &[("a", "x")]), "open { only");
    }
}
