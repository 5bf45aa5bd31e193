use std::cell::RefCell;

use candid::{CandidType, Principal};
use ic_llm::Model;
use ic_stable_structures::{Memory, StableCell};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{self, Memo, RawDocument, CONFIG_MEMORY_ID};

/// Model name sent to the LLM canister unless a controller overrides it.
pub fn default_model() -> String {
    Model::Llama3_1_8B.to_string()
}

/// Runtime settings for the generation pipeline, supplied at install time
/// or by a controller through `configure`.
#[derive(CandidType, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MentorConfig {
    /// Canister serving the LLM chat interface.
    pub llm_canister: Principal,
    pub model: String,
}

impl MentorConfig {
    pub fn new(llm_canister: Principal) -> Self {
        Self {
            llm_canister,
            model: default_model(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_canister == Principal::anonymous() {
            return Err(ConfigError::Invalid {
                field: "llm_canister",
                reason: "anonymous principal".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model",
                reason: "empty model name".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("mentor configuration has not been set")]
    Missing,
    #[error("configuration field `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to access stored configuration: {0}")]
    Storage(String),
}

/// Configuration persisted in a stable cell. An empty cell means "not configured".
pub struct ConfigStore<M: Memory> {
    cell: RefCell<StableCell<RawDocument, M>>,
}

impl<M: Memory> ConfigStore<M> {
    pub fn init(memory: M) -> Result<Self, ConfigError> {
        let cell = StableCell::init(memory, RawDocument::default())
            .map_err(|e| ConfigError::Storage(format!("{e:?}")))?;
        Ok(Self {
            cell: RefCell::new(cell),
        })
    }

    pub fn load(&self) -> Result<MentorConfig, ConfigError> {
        let cell = self.cell.borrow();
        let raw = cell.get();
        if raw.is_empty() {
            return Err(ConfigError::Missing);
        }
        let config: MentorConfig = raw
            .decode("config")
            .map_err(|e| ConfigError::Storage(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &MentorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let raw = RawDocument::encode(config).map_err(|e| ConfigError::Storage(e.to_string()))?;
        self.cell
            .borrow_mut()
            .set(raw)
            .map_err(|e| ConfigError::Storage(format!("{e:?}")))?;
        Ok(())
    }
}

thread_local! {
    static CONFIG: ConfigStore<Memo> = ConfigStore::init(entities::memory(CONFIG_MEMORY_ID))
        .expect("failed to init CONFIG");
}

/// The configuration currently installed on this canister.
pub fn current() -> Result<MentorConfig, ConfigError> {
    CONFIG.with(|store| store.load())
}

pub fn install(config: &MentorConfig) -> Result<(), ConfigError> {
    CONFIG.with(|store| store.save(config))
}
