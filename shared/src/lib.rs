//! Shared library for the occupancy assistant Lambda functions.
//!
//! This crate provides the question pipeline and the clients used across
//! all Lambda functions: the Supabase backend, the Bedrock model, and the
//! forecast cross-invoker.

pub mod backend;
pub mod config;
pub mod documents;
pub mod error;
pub mod forecast;
pub mod http;
pub mod inference;
pub mod intent;
pub mod invoker;
pub mod models;
pub mod pipeline;
pub mod prompt;

pub use backend::{fetch_context, require, Backend, ContextMap, ContextRequest, SupabaseClient};
pub use config::Config;
pub use error::{Error, Result};
pub use forecast::{parse_forecast, ForecastParseError};
pub use inference::{BedrockModel, InvokeOptions, TextModel, APOLOGY};
pub use intent::{classify, Intent};
pub use invoker::{ForecastClient, ForecastInvoker, ForecastOutcome};
pub use models::{AnswerResponse, ForecastResponse, PredictionRecord, QuestionRequest};
pub use pipeline::{answer_question, generate_forecast, Answer, ForecastResult};
