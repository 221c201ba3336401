//! Worker contract: the declarative rules that pair an event trigger with a
//! task prompt and runtime policy.
//!
//! Raw definitions (from files or a decoded manifest) enter through
//! [`parse`], which validates them fail-fast into [`WorkerDefinition`]s.

pub mod contract;
pub mod load;
pub mod validate;

pub use contract::{
    Agent, Provider, RuntimeMode, TriggerFilter, WorkerDefinition, WorkerManifest,
    WorkerMetadata, WorkerRuntime, WorkerTrigger,
};
pub use load::{LoadError, load_dir, load_file};
pub use validate::{ValidationError, parse};
