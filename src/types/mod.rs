pub mod cursor;
pub mod error;
pub mod form;
pub mod id;

pub use cursor::Cursor;
pub use error::Error;
