pub mod figment;
pub mod sensitive;
pub mod signal;
pub mod time;
pub mod validator;

pub use self::sensitive::Sensitive;
