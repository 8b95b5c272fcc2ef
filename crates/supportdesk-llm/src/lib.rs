pub mod providers;
pub mod retry;

use supportdesk_core::config::ModelConfig;
use supportdesk_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create the LLM client for a model config, wrapped in retries when configured.
///
/// Every provider is reached through the OpenAI-compatible chat endpoint.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    let client: Box<dyn LlmClient> = Box::new(OpenAiClient::new());
    match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, retry.clone())),
        None => client,
    }
}
