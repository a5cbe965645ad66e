//! Utility modules

pub mod device_id;
pub mod rate_limit;
pub mod time;
