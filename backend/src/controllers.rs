use candid::Principal;
use ic_cdk::{init, post_upgrade, query, update};
use log::LevelFilter;

use crate::{
    client::{DashboardState, DashboardView},
    config::{self, MentorConfig},
    entities::{profile_repository, Memo, Profile, ProfileInput, ProfileRepository},
    logging,
    model::LlmCanister,
    pipeline::{self, Execution},
    service::{context::MentorCtx, errors::ServiceError, ProfileService},
};

fn install(config: Option<MentorConfig>) {
    logging::init(LevelFilter::Info);
    match config {
        Some(config) => match config::install(&config) {
            Ok(()) => log::info!("configured LLM canister {}", config.llm_canister),
            Err(err) => log::error!("ignoring install configuration: {err}"),
        },
        None if config::current().is_err() => {
            log::warn!("no configuration installed, generation will fail until `configure` is called")
        }
        None => {}
    }
}

#[init]
fn init(config: Option<MentorConfig>) {
    install(config);
}

#[post_upgrade]
fn post_upgrade(config: Option<MentorConfig>) {
    install(config);
}

fn profiles() -> ProfileService<ProfileRepository<Memo>> {
    ProfileService::new(profile_repository())
}

#[update]
fn configure(config: MentorConfig) -> Result<(), ServiceError> {
    let ctx = MentorCtx::get();
    if !ic_cdk::api::is_controller(&ctx.caller()) {
        return Err(ServiceError::NotController {
            identity: ctx.caller().to_text(),
        });
    }
    config::install(&config)?;
    log::info!("configured LLM canister {}", config.llm_canister);
    Ok(())
}

#[query]
fn whoami() -> Principal {
    MentorCtx::get().caller()
}

#[query]
fn my_profile() -> Result<Option<Profile>, ServiceError> {
    let owner_id = MentorCtx::get().owner_id()?;
    profiles().own_profile(&owner_id)
}

#[query]
fn get_profile(id: String) -> Result<Profile, ServiceError> {
    let owner_id = MentorCtx::get().owner_id()?;
    profiles().profile(&owner_id, &id)
}

#[update]
fn save_profile(input: ProfileInput) -> Result<Profile, ServiceError> {
    let owner_id = MentorCtx::get().owner_id()?;
    profiles().save_profile(&owner_id, input)
}

#[query]
fn dashboard() -> Result<DashboardView, ServiceError> {
    let owner_id = MentorCtx::get().owner_id()?;
    let document = profiles().own_profile(&owner_id)?;
    Ok(DashboardState::from_document(document).view(false))
}

/// Function transport for the generation pipeline: JSON body in, JSON envelope out.
#[update]
async fn generate_recommendation(body: String) -> Execution {
    let model = config::current().map(|config| LlmCanister::from_config(&config));
    pipeline::execute(profile_repository(), model, &body).await
}
