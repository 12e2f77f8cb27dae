pub mod api;
pub mod config;
pub mod deadletter;
pub mod envelope;
pub mod humanize;
pub mod messaging;
pub mod observability;
pub mod storage;
pub mod transform;
