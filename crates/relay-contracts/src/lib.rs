pub mod chat;
pub mod content;
pub mod error;
pub mod events;
pub mod rules;
pub mod runs;
pub mod session;

pub use error::{RelayError, RelayResult};
