// Module layout
// - bootstrap: bootstrapper, configuration, directories and the kernel
// - application: error log, events, run-time memory and ports
// - infrastructure: database/cache/mail/session/translation adapters
// - presentation: HTTP controllers and the command-line runner
// - domain: sessions and user-facing messages

pub mod application;
pub mod bootstrap;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
