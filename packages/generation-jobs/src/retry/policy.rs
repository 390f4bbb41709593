//! Retry escalation ladder.
//!
//! A failed attempt escalates through a fixed ladder, keyed on the number of
//! the attempt that just failed:
//!
//! | failed attempt | next attempt changes                    |
//! |----------------|-----------------------------------------|
//! | 1              | same model and size, hardened prompt    |
//! | 2              | chunk size times the reduction factor   |
//! | 3 and later    | model replaced by its configured fallback |
//!
//! Once `attempt >= max_retries` no further attempt is made.

use serde::{Deserialize, Serialize};

use crate::types::config::RetryConfig;

/// Decision for the attempt after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryContext {
    /// Number of the next attempt
    pub attempt: u32,

    pub model: String,

    pub chunk_size: usize,

    /// False means stop and surface the failure
    pub should_retry: bool,

    /// Ask the generator for strict structured output
    pub harden_output: bool,

    /// What changed, for logs only
    pub retry_reason: String,
}

/// Pure retry decision function over an immutable [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Configured attempt limit.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Decide what attempt `attempt + 1` looks like after `attempt` failed.
    ///
    /// Deterministic: identical inputs always yield an identical context.
    pub fn decide(
        &self,
        attempt: u32,
        model: &str,
        chunk_size: usize,
        max_retries: u32,
    ) -> RetryContext {
        let next = attempt.saturating_add(1);

        if attempt >= max_retries {
            return RetryContext {
                attempt: next,
                model: model.to_string(),
                chunk_size,
                should_retry: false,
                harden_output: false,
                retry_reason: "max retries exceeded".to_string(),
            };
        }

        let (model, chunk_size, retry_reason) = match attempt {
            0 | 1 => (
                model.to_string(),
                chunk_size,
                "adding output-format enforcement".to_string(),
            ),
            2 => {
                let reduced = self.reduce(chunk_size);
                (
                    model.to_string(),
                    reduced,
                    format!("reducing chunk size to {}", reduced),
                )
            }
            _ => {
                let fallback = self.config.fallback_for(model).to_string();
                let reason = format!("falling back to model {}", fallback);
                (fallback, chunk_size, reason)
            }
        };

        RetryContext {
            attempt: next,
            model,
            chunk_size,
            should_retry: true,
            harden_output: next > 1,
            retry_reason,
        }
    }

    fn reduce(&self, chunk_size: usize) -> usize {
        let reduced = (chunk_size as f64 * self.config.chunk_reduction_factor).round() as usize;
        reduced.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_fallback("model-A", "model-B")
                .with_fallback_model("model-cheap"),
        )
    }

    #[test]
    fn test_ladder() {
        let policy = policy();

        struct Case {
            attempt: u32,
            model: &'static str,
            chunk_size: usize,
            max_retries: u32,
            expect_retry: bool,
            expect_model: &'static str,
            expect_size: usize,
        }

        let cases = [
            // 1 -> 2 keeps model and size
            Case {
                attempt: 1,
                model: "model-A",
                chunk_size: 1000,
                max_retries: 4,
                expect_retry: true,
                expect_model: "model-A",
                expect_size: 1000,
            },
            // 2 -> 3 shrinks size
            Case {
                attempt: 2,
                model: "model-A",
                chunk_size: 1000,
                max_retries: 4,
                expect_retry: true,
                expect_model: "model-A",
                expect_size: 600,
            },
            // 3 -> 4 falls back
            Case {
                attempt: 3,
                model: "model-A",
                chunk_size: 1000,
                max_retries: 4,
                expect_retry: true,
                expect_model: "model-B",
                expect_size: 1000,
            },
            // unknown model falls back to the terminal model
            Case {
                attempt: 3,
                model: "other",
                chunk_size: 1000,
                max_retries: 4,
                expect_retry: true,
                expect_model: "model-cheap",
                expect_size: 1000,
            },
            // limit reached
            Case {
                attempt: 2,
                model: "model-A",
                chunk_size: 1000,
                max_retries: 2,
                expect_retry: false,
                expect_model: "model-A",
                expect_size: 1000,
            },
            Case {
                attempt: 3,
                model: "model-A",
                chunk_size: 1000,
                max_retries: 3,
                expect_retry: false,
                expect_model: "model-A",
                expect_size: 1000,
            },
            Case {
                attempt: 9,
                model: "model-A",
                chunk_size: 1000,
                max_retries: 2,
                expect_retry: false,
                expect_model: "model-A",
                expect_size: 1000,
            },
        ];

        for case in cases {
            let ctx = policy.decide(case.attempt, case.model, case.chunk_size, case.max_retries);
            assert_eq!(ctx.should_retry, case.expect_retry, "attempt {}", case.attempt);
            assert_eq!(ctx.model, case.expect_model, "attempt {}", case.attempt);
            assert_eq!(ctx.chunk_size, case.expect_size, "attempt {}", case.attempt);
            assert_eq!(ctx.attempt, case.attempt + 1);
        }
    }

    #[test]
    fn test_reasons() {
        let policy = policy();
        assert_eq!(
            policy.decide(1, "model-A", 1000, 4).retry_reason,
            "adding output-format enforcement"
        );
        assert_eq!(
            policy.decide(2, "model-A", 1000, 4).retry_reason,
            "reducing chunk size to 600"
        );
        assert_eq!(
            policy.decide(3, "model-A", 1000, 4).retry_reason,
            "falling back to model model-B"
        );
        assert_eq!(
            policy.decide(2, "model-A", 1000, 2).retry_reason,
            "max retries exceeded"
        );
    }

    #[test]
    fn test_hardening_flag_on_retries() {
        let ctx = policy().decide(1, "model-A", 1000, 2);
        assert!(ctx.should_retry);
        assert!(ctx.harden_output);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let policy = policy();
        for attempt in 0..6 {
            assert_eq!(
                policy.decide(attempt, "model-A", 777, 5),
                policy.decide(attempt, "model-A", 777, 5)
            );
        }
    }

    #[test]
    fn test_shrink_never_reaches_zero() {
        let policy = policy();
        assert_eq!(policy.decide(2, "m", 1, 4).chunk_size, 1);
    }
}
