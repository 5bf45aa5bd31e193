use std::rc::Rc;

use crate::entities::{Profile, ProfileFilter, ProfileInput, ProfilePatch, ProfileStore};
use errors::ServiceError;

pub mod errors {
    use candid::CandidType;
    use serde::Deserialize;
    use thiserror::Error;

    use crate::{config::ConfigError, entities::StoreError};

    #[derive(Error, CandidType, Deserialize, Debug, PartialEq, Eq, Clone)]
    pub enum ServiceError {
        #[error("anonymous callers have no profile")]
        Anonymous,
        #[error("caller {identity} is not a controller")]
        NotController { identity: String },
        #[error("profile {id} cannot be found")]
        ProfileNotFound { id: String },
        #[error("{0}")]
        Store(String),
        #[error("{0}")]
        Configuration(String),
    }

    impl From<StoreError> for ServiceError {
        fn from(err: StoreError) -> Self {
            ServiceError::Store(err.to_string())
        }
    }

    impl From<ConfigError> for ServiceError {
        fn from(err: ConfigError) -> Self {
            ServiceError::Configuration(err.to_string())
        }
    }
}

pub mod context {
    #[cfg(all(test, not(rust_analyzer)))]
    use crate::utils::mock_ic0::caller;
    use candid::Principal;
    #[cfg(any(not(test), rust_analyzer))]
    use ic_cdk::caller;

    use super::errors::ServiceError;

    /// Who is calling. The anonymous principal means there is no session.
    #[derive(Clone, Debug)]
    pub struct MentorCtx {
        caller: Principal,
    }

    impl Default for MentorCtx {
        fn default() -> Self {
            Self {
                caller: Principal::anonymous(),
            }
        }
    }

    impl MentorCtx {
        pub fn get() -> Self {
            Self { caller: caller() }
        }

        pub fn caller(&self) -> Principal {
            self.caller
        }

        /// Owner id used on profile documents.
        pub fn owner_id(&self) -> Result<String, ServiceError> {
            if self.caller == Principal::anonymous() {
                return Err(ServiceError::Anonymous);
            }
            Ok(self.caller.to_text())
        }
    }

}

/// The profile-edit surface over the document store.
pub struct ProfileService<S> {
    store: Rc<S>,
}

impl<S: ProfileStore> ProfileService<S> {
    pub fn new(store: Rc<S>) -> Self {
        Self { store }
    }

    /// First profile owned by `owner_id`, if any.
    pub fn own_profile(&self, owner_id: &str) -> Result<Option<Profile>, ServiceError> {
        let profiles = self
            .store
            .list(&ProfileFilter::Owner(owner_id.to_string()))?;
        if profiles.len() > 1 {
            log::warn!("owner {owner_id} has {} profiles, using the first", profiles.len());
        }
        Ok(profiles.into_iter().next())
    }

    /// Profile `id` as seen by `owner_id`. Another owner's document reads as
    /// not found.
    pub fn profile(&self, owner_id: &str, id: &str) -> Result<Profile, ServiceError> {
        self.store
            .get(id)?
            .filter(|profile| profile.owner_id == owner_id)
            .ok_or_else(|| ServiceError::ProfileNotFound { id: id.to_string() })
    }

    /// Creates the owner's profile on first save, updates it in place afterwards.
    /// Never clears a stored recommendation.
    pub fn save_profile(&self, owner_id: &str, input: ProfileInput) -> Result<Profile, ServiceError> {
        let saved = match self.own_profile(owner_id)? {
            Some(existing) => self.store.update(&existing.id, ProfilePatch::Fields(input))?,
            None => {
                let created = self.store.create(owner_id, input)?;
                log::info!("created profile {} for {owner_id}", created.id);
                created
            }
        };
        Ok(saved)
    }
}
