//! The recommendation generation pipeline: request body in, JSON envelope out.
//!
//! Each stage returns a `Result`; the first failure is logged with its stage
//! and the profile id, then folded into a `{success: false}` envelope. At most
//! one document write happens, and only after the model answered.

use std::{fmt, rc::Rc};

use candid::CandidType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::ConfigError,
    entities::{Profile, ProfilePatch, ProfileStore, StoreError},
    knowledge,
    model::{CompletionModel, ModelError},
};

pub const FALLBACK_RECOMMENDATION: &str = "No recommendation generated";

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 500;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("{0}")]
    Validation(String),
    #[error("profile {id} not found")]
    NotFound { id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Configure,
    Validate,
    Fetch,
    Generate,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configure => "configure",
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Generate => "generate",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct Failure {
    stage: Stage,
    profile_id: Option<String>,
    error: PipelineError,
}

impl Failure {
    fn at(stage: Stage, profile_id: Option<&str>) -> impl FnOnce(PipelineError) -> Failure + '_ {
        move |error| Failure {
            stage,
            profile_id: profile_id.map(str::to_string),
            error,
        }
    }
}

/// Request body of the function call.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
}

impl GenerationRequest {
    pub fn for_profile(id: impl Into<String>) -> Self {
        Self {
            profile_id: Some(id.into()),
        }
    }

    /// Parses the body and returns the profile id it names.
    pub fn parse(body: &str) -> Result<String, PipelineError> {
        let request: GenerationRequest = serde_json::from_str(body).map_err(|_| {
            PipelineError::Validation(
                "Invalid request body. Expected JSON with profileId".to_string(),
            )
        })?;
        request
            .profile_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PipelineError::Validation("Missing profileId".to_string()))
    }
}

/// Response envelope: `{success, recommendation}` or `{success, error}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GenerationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn succeeded(recommendation: impl Into<String>) -> Self {
        Self {
            success: true,
            recommendation: Some(recommendation.into()),
            error: None,
        }
    }

    pub fn failed(error: &PipelineError) -> Self {
        Self {
            success: false,
            recommendation: None,
            error: Some(error.to_string()),
        }
    }

    pub fn status_code(&self) -> u16 {
        if self.success {
            STATUS_OK
        } else {
            STATUS_FAILED
        }
    }
}

/// What the function transport hands back to the caller.
#[derive(CandidType, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub status_code: u16,
    pub response: String,
}

impl From<GenerationResult> for Execution {
    fn from(result: GenerationResult) -> Self {
        let response = serde_json::to_string(&result).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"failed to encode response: {e}"}}"#)
        });
        Self {
            status_code: result.status_code(),
            response,
        }
    }
}

pub struct GenerationPipeline<S, M> {
    store: Rc<S>,
    model: M,
}

impl<S: ProfileStore, M: CompletionModel> GenerationPipeline<S, M> {
    pub fn new(store: Rc<S>, model: M) -> Self {
        Self { store, model }
    }

    /// Runs the pipeline for one request body. Never fails: errors become
    /// a `success: false` result.
    pub async fn generate(&self, body: &str) -> GenerationResult {
        match self.run(body).await {
            Ok(recommendation) => GenerationResult::succeeded(recommendation),
            Err(failure) => {
                log::error!(
                    "generation failed at stage {} for profile {}: {}",
                    failure.stage,
                    failure.profile_id.as_deref().unwrap_or("<none>"),
                    failure.error
                );
                GenerationResult::failed(&failure.error)
            }
        }
    }

    async fn run(&self, body: &str) -> Result<String, Failure> {
        let profile_id = GenerationRequest::parse(body).map_err(Failure::at(Stage::Validate, None))?;
        let id = Some(profile_id.as_str());

        log::info!("fetching profile document {profile_id}");
        let profile = self.fetch(&profile_id).map_err(Failure::at(Stage::Fetch, id))?;

        let prompt = knowledge::profile_prompt(&profile);
        log::info!(
            "requesting recommendation for profile {profile_id} ({} prompt bytes)",
            prompt.len()
        );
        let completion = self
            .model
            .complete(&prompt)
            .await
            .map_err(|e| Failure::at(Stage::Generate, id)(e.into()))?;
        let recommendation = match completion.first_content() {
            Some(text) => text.to_string(),
            None => {
                log::warn!("model returned no content for profile {profile_id}");
                FALLBACK_RECOMMENDATION.to_string()
            }
        };

        log::info!("storing recommendation on profile {profile_id}");
        self.store
            .update(&profile_id, ProfilePatch::Recommendation(recommendation.clone()))
            .map_err(|e| Failure::at(Stage::Persist, id)(e.into()))?;
        Ok(recommendation)
    }

    fn fetch(&self, profile_id: &str) -> Result<Profile, PipelineError> {
        self.store
            .get(profile_id)?
            .ok_or_else(|| PipelineError::NotFound {
                id: profile_id.to_string(),
            })
    }
}

/// Entry point for the function transport. A model that could not be
/// built from configuration short-circuits into a failed envelope.
pub async fn execute<S, M>(store: Rc<S>, model: Result<M, ConfigError>, body: &str) -> Execution
where
    S: ProfileStore,
    M: CompletionModel,
{
    let result = match model {
        Ok(model) => GenerationPipeline::new(store, model).generate(body).await,
        Err(err) => {
            log::error!("generation failed at stage {}: {err}", Stage::Configure);
            GenerationResult::failed(&err.into())
        }
    };
    result.into()
}
