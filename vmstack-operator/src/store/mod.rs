//! Resource store abstraction and the status persistence path.

mod error;
mod status;
mod traits;

pub use error::{Result, StoreError};
pub use status::{RetryPolicy, StatusChange, StatusWriter, TerminalState};
pub use traits::ResourceStore;
