pub mod config;
pub mod delivery;
pub mod relay;
pub mod telegram;
pub mod validator;

pub use delivery::{ChatSink, DeliveryError};
pub use relay::{Command, Failure, Outcome, Relay};
