//! Command-line entry: kernel flags, script lookup and the triggered-error report.

pub mod scripts;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;

use crate::application::error_handler::{ErrorHandler, ErrorMsg};
use crate::bootstrap::bootstrapper::Bootstrapper;
use crate::bootstrap::error::KernelError;
use crate::bootstrap::kernel::{AppKernel, VERSION};

#[derive(Debug, Clone, Parser)]
#[command(name = "app-kernel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs an application script inside a bootstrapped kernel")]
pub struct Cli {
    /// Configuration environment (`<config>/env/<env>.yml`)
    #[arg(long, default_value = "cli")]
    pub env: String,

    /// Development mode: every captured error is shown
    #[arg(long)]
    pub dev: bool,

    /// Skip the cached configuration and parse YAML
    #[arg(long = "noCache", alias = "no-cache")]
    pub no_cache: bool,

    /// Project root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Script to run
    pub script: Option<String>,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Applies the kernel flags on top of `bs`.
    pub fn configure(&self, bs: Bootstrapper) -> Result<Bootstrapper, KernelError> {
        Ok(bs
            .env(&self.env)?
            .dev(self.dev)
            .load_cached_config(!self.no_cache))
    }
}

/// A named job run from the command line with a bootstrapped kernel.
#[async_trait]
pub trait AppScript: Send + Sync {
    fn name(&self) -> &'static str;

    async fn exec(&self, kernel: Arc<AppKernel>, errors: &ErrorHandler, args: &[String]) -> anyhow::Result<()>;
}

/// Bootstraps the kernel from `cli`, runs the requested script and prints
/// what it triggered.
pub async fn run<F>(cli: Cli, bootstrapper: F, scripts: &[Box<dyn AppScript>]) -> ExitCode
where
    F: FnOnce(&Cli) -> Result<Bootstrapper, KernelError>,
{
    let kernel = match bootstrapper(&cli)
        .and_then(|bs| cli.configure(bs))
        .and_then(AppKernel::bootstrap)
    {
        Ok(kernel) => kernel,
        Err(e) => {
            eprintln!("[{}] {e}", e.kind());
            return ExitCode::FAILURE;
        }
    };

    println!("{}", kernel.name());
    println!("App Kernel v{VERSION}");
    println!();

    let Some(name) = cli.script.as_deref() else {
        println!("No script specified; available: {}", names(scripts));
        return ExitCode::FAILURE;
    };
    let Some(script) = scripts.iter().find(|s| s.name().eq_ignore_ascii_case(name)) else {
        println!("Script \"{name}\" not found; available: {}", names(scripts));
        return ExitCode::FAILURE;
    };

    println!("Loading script \"{}\"...", script.name());
    let errors = kernel.error_handler().scoped();
    let result = script.exec(kernel.clone(), &errors, &cli.args).await;

    let mut triggered = kernel.error_handler().errors().triggered().to_vec();
    triggered.extend(errors.errors().triggered().to_vec());
    println!();
    print_errors(&triggered);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Script \"{}\" failed: {e:#}", script.name());
            ExitCode::FAILURE
        }
    }
}

fn names(scripts: &[Box<dyn AppScript>]) -> String {
    scripts.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
}

fn print_errors(errors: &[ErrorMsg]) {
    if errors.is_empty() {
        println!("No triggered errors!");
        return;
    }
    println!("Triggered errors:");
    for e in errors {
        println!("[{}] {} in {} on line {}", e.level, e.message, e.file, e.line);
    }
}
