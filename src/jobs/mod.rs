pub mod poller;
pub mod sweeper;
