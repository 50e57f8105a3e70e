use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;

use app_kernel::bootstrap::bootstrapper::Bootstrapper;
use app_kernel::infrastructure::logging;
use app_kernel::presentation::cli::{self, Cli, scripts};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    let logs = cli.root.join("logs");
    let _guard = match logging::init(logs.is_dir().then_some(logs.as_path())) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialise logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let scripts = scripts::builtin();
    cli::run(cli, |cli| Bootstrapper::new(&cli.root), &scripts).await
}
