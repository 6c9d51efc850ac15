//! Turns queue messages into store writes.

mod dispatcher;
pub mod handlers;
mod supervisor;

pub use dispatcher::{Dispatcher, EventHandler, HandlerRegistry};
pub use supervisor::ConsumerSupervisor;
