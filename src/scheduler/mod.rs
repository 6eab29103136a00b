pub mod command;
pub mod handler;
pub mod tailer;

pub use command::Command;
pub use handler::Scheduler;
