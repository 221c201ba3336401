//! Identifier types shared across the webhook, credential and dispatch layers.

pub mod ids;

pub use ids::{DeliveryId, InstallationId, RepoId};
