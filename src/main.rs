use std::process::ExitCode;

use clap::Parser;
use conformance::cli::{self, Cli, EXIT_USAGE};
use conformance::logging::{setup_logging, should_use_json};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse().into_config();

    let env = |key: &str| std::env::var(key).ok();
    setup_logging(cli.json_logs || should_use_json(env), &cli.log_level);

    let config = match cli::resolve_config(&cli, env) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            eprintln!("error: {err}");
            return exit(EXIT_USAGE);
        }
    };

    let suite = match cli::load(&cli) {
        Ok(suite) => suite,
        Err(err) => {
            tracing::error!(path = %cli.suite_path.display(), error = %err, "cannot load suite");
            eprintln!("error: {err}");
            return exit(EXIT_USAGE);
        }
    };

    match cli::execute(&cli, &config, &suite).await {
        Ok(report) => {
            print!("{}", cli::render(&report, cli.output_format));
            exit(cli::exit_code(&report))
        }
        Err(err) => {
            eprintln!("error: {err}");
            exit(EXIT_USAGE)
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
