pub mod cache;
pub mod crypto;
pub mod db;
pub mod logging;
pub mod mailer;
pub mod sessions;
pub mod translator;
