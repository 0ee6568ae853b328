pub mod custom;
pub mod openai;
pub mod rest;
pub mod webhook;

pub use custom::{CustomPluginAdapter, FAILURE_MARKER};
pub use openai::OpenAiAdapter;
pub use rest::RestAdapter;
pub use webhook::WebhookAdapter;
