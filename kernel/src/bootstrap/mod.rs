pub mod bootstrapper;
pub mod cipher_keys;
pub mod config;
pub mod databases;
pub mod directories;
pub mod error;
pub mod kernel;
pub mod services;
pub mod validator;
