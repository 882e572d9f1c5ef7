//! Service Layer
//!
//! The dispatcher and its workers, plus the call/observable front door.

pub mod call;
pub mod dispatcher;
mod observers;
pub mod reconnect;
pub mod scheduler;

pub use call::{Call, Observable, RrClient};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use reconnect::ReconnectGuard;
pub use scheduler::{TimeoutHandler, TimeoutScheduler};
