pub mod error_handler;
pub mod events;
pub mod memory;
pub mod ports;
