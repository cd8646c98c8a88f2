use thiserror::Error;

mod auth;
mod database;
mod logging;
mod notifications;
mod push;
mod relay;
mod server;

pub use auth::Auth;
pub use database::Database;
pub use logging::{Logging, LoggingStyle};
pub use notifications::Notifications;
pub use push::Push;
pub use relay::Relay;
pub use server::Server;

#[derive(Debug, Error)]
#[error("Failed to load configuration")]
pub struct ParseError;

/// Turns a constant into a non-zero value at compile time. Required
/// by serde's `default = "..."` attributes.
macro_rules! non_zero {
    ($ty:ident, $value:expr) => {
        match std::num::$ty::new($value) {
            Some(n) => n,
            None => panic!("default value is accidentally set to 0"),
        }
    };
}

pub(crate) use non_zero;
