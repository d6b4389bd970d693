pub mod api;
pub mod config;
pub mod extract;
pub mod files;
pub mod openai;
pub mod orchestrator;
pub mod session;
pub mod thread;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{AssistantApi, FileMetadata, FILE_PURPOSE};
pub use config::{ConfigOverrides, PollSettings, RelayConfig};
pub use extract::{AssistantReply, ResponseExtractor};
pub use files::RemoteFileStore;
pub use openai::OpenAiAssistantsClient;
pub use orchestrator::{TurnOrchestrator, NO_TEXT_PLACEHOLDER};
pub use session::Session;
pub use thread::{ConversationThread, RunEvent};
