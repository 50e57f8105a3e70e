pub mod cache;
pub mod session_store;
