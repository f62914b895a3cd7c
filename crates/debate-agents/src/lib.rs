//! Model providers, prompt templates, configuration, and file storage for
//! running debates with `debate-scheduler`.

pub mod config;
pub mod console;
pub mod prompts;
pub mod providers;
pub mod store;

pub use config::{AgentsConfig, DebateFile, DebateFileError, ProviderEndpoint};
pub use providers::{build_registry, dry_run_registry};
pub use store::JsonFileStore;
