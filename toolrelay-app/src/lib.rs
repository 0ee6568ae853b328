pub mod cli;
pub mod config;
pub mod credentials;

pub use cli::{parse_args, Command, RunOptions, USAGE};
pub use config::{config_path, Catalog};
pub use credentials::EnvCredentials;
