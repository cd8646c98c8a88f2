/// Prevents types outside of this crate from implementing
/// traits that are meant to be closed.
pub trait Sealed {}
