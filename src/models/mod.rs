pub mod approval;
pub mod event;
