pub mod app;
pub mod config;
pub mod database;
pub mod http;
pub mod notify;
pub mod outbox;
pub mod push;
pub mod relay;
pub mod schema;
pub mod store;
pub mod sweeper;
pub mod telemetry;
pub mod types;
pub mod util;

pub use app::App;

pub(crate) mod internal;
