//! Webhook Workers - routes GitHub webhook events to declarative workers.
//!
//! A worker manifest describes which events each worker reacts to. The
//! dispatcher verifies a delivery, matches it against the manifest, mints a
//! short-lived installation token, and launches one isolated task per
//! matching worker. The manifest itself travels to the dispatcher as chunked
//! stack parameters, deployed by the `stack` state machine.

pub mod cli;
pub mod cloud;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod github;
pub mod manifest;
pub mod routing;
pub mod server;
pub mod stack;
pub mod types;
pub mod webhooks;
pub mod workers;

#[cfg(test)]
pub mod test_utils;
