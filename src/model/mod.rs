pub mod config;
pub mod envelope;
pub mod instruments;
pub mod pattern;
pub mod pitch;
pub mod request;
