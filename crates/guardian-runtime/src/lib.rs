//! # guardian-runtime
//!
//! Judge dispatch and the stage-graph engine for Guardian.
//!
//! `guardian-core` decides everything that can be decided with patterns.
//! This crate adds the parts that wait on something:
//! - [`Judge`] implementations for toxicity, hallucination and tone
//! - The [`JudgeDispatcher`], which runs the judges concurrently under one
//!   shared deadline
//! - Per-kind [`CircuitBreaker`] and optional verdict cache
//! - The [`Guardian`] engine, which walks the static stage graph
//!
//! ## Important
//!
//! No LLM client ships with this crate. Without one, [`HeuristicJudge`]
//! answers from deterministic lexicons. Wrap a client in [`LlmProvider`] and
//! hand a [`ProviderJudge`] to the builder to use a model instead.
//!
//! ## Example
//!
//! ```rust,ignore
//! use guardian_core::{ModerationMode, ValidateConfig, ValidationRequest};
//! use guardian_runtime::Guardian;
//!
//! let guardian = Guardian::builder().build()?;
//! let request = ValidationRequest::new("Contact me at a@b.com")
//!     .with_mode(ModerationMode::Moderate)
//!     .with_config(ValidateConfig::all_enabled());
//!
//! let response = guardian.validate(&request).await?;
//! assert!(response.validation_passed);
//! ```

pub mod cache;
pub mod dispatcher;
pub mod engine;
pub mod judges;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use cache::CachedJudge;
pub use dispatcher::JudgeDispatcher;
pub use engine::{Guardian, GuardianBuilder, Node, PipelineRun};
pub use judges::{HeuristicJudge, Judge, JudgeError, JudgeRequest, ProviderJudge};
pub use providers::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, Role};
pub use resilience::{CircuitBreaker, CircuitState};

pub use tokio_util::sync::CancellationToken;
