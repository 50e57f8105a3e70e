pub mod forms;
pub mod xsrf;

pub use forms::{Forms, ObfuscatedForm};
pub use xsrf::{Xsrf, XsrfError};
