//! Cloud provider adapters.
//!
//! The core only sees the [`SecretStore`](crate::credentials::SecretStore),
//! [`TaskLauncher`](crate::dispatch::TaskLauncher) and
//! [`StackClient`](crate::stack::StackClient) ports. [`AwsCli`] implements
//! all three by shelling out through a [`CommandRunner`].

pub mod aws;
pub mod runner;

pub use aws::{AwsCli, AwsCliError};
pub use runner::{
    CommandError, CommandOutput, CommandRunner, DEFAULT_COMMAND_TIMEOUT, TokioCommandRunner,
};
