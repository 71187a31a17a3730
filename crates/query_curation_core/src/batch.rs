//! crates/query_curation_core/src/batch.rs
//!
//! The sequential bulk-answer engine: a fold over the work list with one
//! in-flight generation call at a time. Progress is pushed through a callback
//! after every completion so any frontend can render a counter; per-item
//! failures are recorded and the batch moves on. There is no cancellation
//! mid-batch and no retry.

use std::future::Future;

use crate::domain::{GeneratedAnswer, TokenUsage};
use crate::generation::AnswerDedup;
use crate::ports::PortError;

/// One unit of bulk-answer work.
#[derive(Debug, Clone)]
pub struct AnswerWorkItem {
    pub query_id: String,
    pub text: String,
}

/// Counter state emitted after each item finishes (success or failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub done: usize,
    pub total: usize,
}

/// What happened to one work item.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Answered {
        answer: String,
        usage: Option<TokenUsage>,
    },
    Failed {
        message: String,
    },
}

/// The per-item result list plus the final counters.
#[derive(Debug)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub outcomes: Vec<(AnswerWorkItem, AnswerOutcome)>,
}

/// Runs answer generation over `items` strictly in order.
///
/// `generate` performs one provider call; an answer that exactly repeats an
/// earlier one (case-insensitive) comes back with the duplicate marker
/// appended. `on_progress` fires once per item, after it settles.
pub async fn run_answer_batch<F, Fut>(
    items: Vec<AnswerWorkItem>,
    mut generate: F,
    mut on_progress: impl FnMut(BatchProgress),
) -> BatchSummary
where
    F: FnMut(AnswerWorkItem) -> Fut,
    Fut: Future<Output = Result<GeneratedAnswer, PortError>>,
{
    let total = items.len();
    let mut dedup = AnswerDedup::new();
    let mut outcomes = Vec::with_capacity(total);
    let mut completed = 0usize;
    let mut failed = 0usize;

    for (done, item) in items.into_iter().enumerate() {
        let outcome = match generate(item.clone()).await {
            Ok(answer) => {
                completed += 1;
                AnswerOutcome::Answered {
                    answer: dedup.mark(answer.text),
                    usage: answer.usage,
                }
            }
            Err(e) => {
                failed += 1;
                AnswerOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };
        outcomes.push((item, outcome));
        on_progress(BatchProgress {
            done: done + 1,
            total,
        });
    }

    BatchSummary {
        total,
        completed,
        failed,
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::DUPLICATE_ANSWER_MARKER;

    fn work(id: &str, text: &str) -> AnswerWorkItem {
        AnswerWorkItem {
            query_id: id.to_string(),
            text: text.to_string(),
        }
    }

    fn answer(text: &str) -> GeneratedAnswer {
        GeneratedAnswer {
            text: text.to_string(),
            usage: None,
        }
    }

    #[tokio::test]
    async fn progress_fires_after_every_item() {
        let items = vec![work("a", "one"), work("b", "two"), work("c", "three")];
        let mut seen = Vec::new();

        let summary = run_answer_batch(
            items,
            |item| async move { Ok(answer(&format!("answer to {}", item.text))) },
            |p| seen.push(p),
        )
        .await;

        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            seen,
            vec![
                BatchProgress { done: 1, total: 3 },
                BatchProgress { done: 2, total: 3 },
                BatchProgress { done: 3, total: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn repeated_answers_are_marked_across_the_batch() {
        let items = vec![work("a", "q1"), work("b", "q2"), work("c", "q3")];

        let summary = run_answer_batch(
            items,
            |item| async move {
                // q1 and q3 produce the same answer text, differing in case.
                match item.query_id.as_str() {
                    "a" => Ok(answer("Same answer.")),
                    "b" => Ok(answer("Something else.")),
                    _ => Ok(answer("same answer.")),
                }
            },
            |_| {},
        )
        .await;

        let answers: Vec<&str> = summary
            .outcomes
            .iter()
            .map(|(_, o)| match o {
                AnswerOutcome::Answered { answer, .. } => answer.as_str(),
                AnswerOutcome::Failed { .. } => panic!("unexpected failure"),
            })
            .collect();

        assert_eq!(answers[0], "Same answer.");
        assert_eq!(answers[1], "Something else.");
        assert_eq!(answers[2], format!("same answer.{DUPLICATE_ANSWER_MARKER}"));
    }

    #[tokio::test]
    async fn a_failed_item_does_not_stop_the_batch() {
        let items = vec![work("a", "ok"), work("b", "boom"), work("c", "ok too")];

        let summary = run_answer_batch(
            items,
            |item| async move {
                if item.text == "boom" {
                    Err(PortError::RateLimited("slow down".to_string()))
                } else {
                    Ok(answer(&item.text))
                }
            },
            |_| {},
        )
        .await;

        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert!(matches!(
            summary.outcomes[1].1,
            AnswerOutcome::Failed { .. }
        ));
    }
}
