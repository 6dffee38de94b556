pub mod auth;
pub mod errors;
pub mod events;
pub mod id;

pub use auth::AuthSession;
pub use errors::SynapseError;
pub use events::{Event, EventBus};
pub use id::{new_id, new_request_id, SessionId};

pub type Result<T> = std::result::Result<T, SynapseError>;
