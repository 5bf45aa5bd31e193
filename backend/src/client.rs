//! Client-side presentation logic for the dashboard and the profile form.
//!
//! The dashboard state is derived from the last fetched document only, plus
//! a transient `generating` flag. Rendering is left to whatever UI drives
//! these types through a [`MentorBackend`].

use std::cell::{Cell, RefCell};

use candid::CandidType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    entities::{Profile, ProfileInput},
    pipeline::{Execution, GenerationRequest, GenerationResult},
};

pub const GENERATION_ALERT: &str =
    "Error: Could not generate recommendation. Please check the function logs.";
pub const SAVE_ERROR: &str = "Error saving profile. Please try again.";

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ClientError {
    #[error("backend call failed: {0}")]
    Backend(String),
    #[error("Function returned an empty response.")]
    EmptyResponse,
    #[error("malformed function response: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    Generation(String),
}

/// Collaborators the presentation layer talks to.
#[allow(async_fn_in_trait)]
pub trait MentorBackend {
    /// The caller's profile, found by owner.
    async fn own_profile(&self) -> Result<Option<Profile>, ClientError>;
    async fn profile(&self, id: &str) -> Result<Profile, ClientError>;
    async fn save_profile(&self, input: ProfileInput) -> Result<Profile, ClientError>;
    /// Runs the generation function with a JSON request body.
    async fn execute(&self, body: String) -> Result<Execution, ClientError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DashboardState {
    Loading,
    NoProfile,
    Draft(Profile),
    Recommended(Profile),
}

impl DashboardState {
    pub fn from_document(document: Option<Profile>) -> Self {
        match document {
            None => DashboardState::NoProfile,
            Some(profile) => match profile.recommendation.as_deref() {
                Some(text) if !text.trim().is_empty() => DashboardState::Recommended(profile),
                _ => DashboardState::Draft(profile),
            },
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            DashboardState::Draft(profile) | DashboardState::Recommended(profile) => Some(profile),
            DashboardState::Loading | DashboardState::NoProfile => None,
        }
    }

    pub fn view(&self, generating: bool) -> DashboardView {
        match self {
            DashboardState::Loading => DashboardView::Loading,
            DashboardState::NoProfile => DashboardView::CreateProfile,
            DashboardState::Draft(_) => DashboardView::GeneratePlan { generating },
            DashboardState::Recommended(profile) => DashboardView::Recommendation {
                text: profile.recommendation.clone().unwrap_or_default(),
                generating,
            },
        }
    }
}

/// What the dashboard shows.
#[derive(CandidType, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum DashboardView {
    Loading,
    /// Prompt to build a profile.
    CreateProfile,
    /// The generate action; disabled while `generating`.
    GeneratePlan { generating: bool },
    /// The stored plan, with the regenerate action disabled while `generating`.
    Recommendation { text: String, generating: bool },
}

pub struct Dashboard<B> {
    backend: B,
    state: RefCell<DashboardState>,
    generating: Cell<bool>,
    alert: RefCell<Option<String>>,
}

impl<B: MentorBackend> Dashboard<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: RefCell::new(DashboardState::Loading),
            generating: Cell::new(false),
            alert: RefCell::new(None),
        }
    }

    pub fn state(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    pub fn view(&self) -> DashboardView {
        self.state.borrow().view(self.generating.get())
    }

    pub fn is_generating(&self) -> bool {
        self.generating.get()
    }

    /// Message of the last failed generation, cleared on the next attempt.
    pub fn alert(&self) -> Option<String> {
        self.alert.borrow().clone()
    }

    /// Fetches the caller's profile. A failed fetch is shown as `NoProfile`.
    pub async fn load(&self) {
        let document = match self.backend.own_profile().await {
            Ok(document) => document,
            Err(err) => {
                log::error!("failed to fetch profile: {err}");
                None
            }
        };
        self.state.replace(DashboardState::from_document(document));
    }

    /// Triggers generation for the loaded profile. Does nothing without a
    /// profile or while another generation from this dashboard is running.
    /// On failure the state is left as it was and an alert is raised.
    pub async fn generate(&self) -> Result<(), ClientError> {
        let Some(profile_id) = self.state.borrow().profile().map(|p| p.id.clone()) else {
            return Ok(());
        };
        if self.generating.replace(true) {
            return Ok(());
        }
        self.alert.replace(None);

        let outcome = self.request_generation(&profile_id).await;
        self.generating.set(false);

        match outcome {
            Ok(profile) => {
                self.state.replace(DashboardState::from_document(Some(profile)));
                Ok(())
            }
            Err(err) => {
                log::error!("failed to generate recommendation for {profile_id}: {err}");
                self.alert.replace(Some(GENERATION_ALERT.to_string()));
                Err(err)
            }
        }
    }

    async fn request_generation(&self, profile_id: &str) -> Result<Profile, ClientError> {
        let body = serde_json::to_string(&GenerationRequest::for_profile(profile_id))
            .map_err(|e| ClientError::Backend(e.to_string()))?;
        let execution = self.backend.execute(body).await?;
        if execution.response.trim().is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        let result: GenerationResult = serde_json::from_str(&execution.response)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;
        if !result.success {
            return Err(ClientError::Generation(
                result
                    .error
                    .unwrap_or_else(|| "Function returned an error.".to_string()),
            ));
        }
        self.backend.profile(profile_id).await
    }
}

/// The profile-edit surface.
pub struct ProfileForm<B> {
    backend: B,
    profile_id: Option<String>,
    pub input: ProfileInput,
    error: Option<String>,
}

impl<B: MentorBackend> ProfileForm<B> {
    /// Prefills the form from the caller's profile. A failed fetch leaves it empty.
    pub async fn load(backend: B) -> Self {
        let existing = match backend.own_profile().await {
            Ok(existing) => existing,
            Err(err) => {
                log::error!("failed to fetch profile: {err}");
                None
            }
        };
        Self {
            backend,
            profile_id: existing.as_ref().map(|p| p.id.clone()),
            input: existing.as_ref().map(ProfileInput::from).unwrap_or_default(),
            error: None,
        }
    }

    pub fn profile_id(&self) -> Option<&str> {
        self.profile_id.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub async fn submit(&mut self) -> Result<Profile, ClientError> {
        match self.backend.save_profile(self.input.clone()).await {
            Ok(profile) => {
                self.profile_id = Some(profile.id.clone());
                self.error = None;
                Ok(profile)
            }
            Err(err) => {
                log::error!("failed to save profile: {err}");
                self.error = Some(SAVE_ERROR.to_string());
                Err(err)
            }
        }
    }
}
