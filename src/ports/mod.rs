//! Port traits the domain depends on.

pub mod cache_port;
pub mod config_port;
pub mod data_port;
pub mod feature_port;
pub mod report_port;
pub mod selector_port;
