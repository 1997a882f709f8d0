//! Client-facing network endpoints.

mod push;
mod query;

pub use push::PushServer;
pub use query::{QueryServer, MAX_HISTORY_LIMIT};
