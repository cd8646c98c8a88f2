pub mod actor;
pub mod controllers;
pub mod error;
pub mod jwt;

pub use actor::Actor;
pub use controllers::configure;
pub use error::Error;
pub use jwt::Jwt;
