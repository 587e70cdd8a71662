//! Judges for the three model-assessed checks.
//!
//! | Judge | Backing |
//! |-------|---------|
//! | [`HeuristicJudge`] | deterministic lexicons from `guardian-core` |
//! | [`ProviderJudge`] | any [`LlmProvider`](crate::providers::LlmProvider) |
//! | [`CachedJudge`](crate::cache::CachedJudge) | decorator over either |

mod heuristic;
mod provider;
mod traits;

pub use heuristic::HeuristicJudge;
pub use provider::{parse_verdict, ProviderJudge};
pub use traits::{Judge, JudgeError, JudgeRequest};
