//! Configuration management for Lambda functions.

use std::env;

use crate::{Error, Result};

/// Default Bedrock model used when `BEDROCK_MODEL_ID` is not set.
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// Application configuration loaded from environment variables at cold start.
#[derive(Debug, Clone)]
pub struct Config {
    /// Supabase project URL
    pub supabase_url: String,
    /// Supabase service key (required; missing key is a fatal startup error)
    pub supabase_key: String,
    /// Bedrock model identifier
    pub model_id: String,
    /// Name of the forecast Lambda invoked from the ask handler
    pub forecast_function: String,
    /// URL of the reference schedule document, if deployed
    pub schedule_doc_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let supabase_url = env::var("SUPABASE_URL")
            .map_err(|_| Error::Config("SUPABASE_URL environment variable is not set".into()))?;
        let supabase_key = env::var("SUPABASE_KEY")
            .map_err(|_| Error::Config("SUPABASE_KEY environment variable is not set".into()))?;

        Ok(Self {
            supabase_url,
            supabase_key,
            model_id: env::var("BEDROCK_MODEL_ID").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string()),
            forecast_function: env::var("FORECAST_FUNCTION_NAME")
                .unwrap_or_else(|_| "occupancy-forecast".to_string()),
            schedule_doc_url: env::var("SCHEDULE_DOC_URL").ok(),
        })
    }
}
