pub mod dispatch;
pub mod error;

pub use dispatch::Handlers;
pub use error::{HandlerError, Result};
