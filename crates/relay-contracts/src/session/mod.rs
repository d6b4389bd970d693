mod summary;
mod transcript;

pub use summary::{write_summary, SessionSummary};
pub use transcript::{Role, Transcript, Turn, TurnImage};
