pub mod channel;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod map;
pub mod polling;
pub mod tracking;
pub mod utils;
