pub mod client;
pub mod config;
pub mod controllers;
pub mod entities;
pub use entities::*;
pub mod knowledge;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod service;
pub use service::*;
pub use utils::*;

#[cfg(test)]
mod fixtures;

use candid::Principal;
use client::DashboardView;
use config::MentorConfig;
use pipeline::Execution;
use service::errors::ServiceError;

// Export the interface for the smart contract.
ic_cdk::export_candid!();
