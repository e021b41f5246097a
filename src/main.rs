use clap::{CommandFactory, Parser};
use sqlpilot::cli::{self, Args, Command};
use sqlpilot::commands;
use sqlpilot::config::Config;
use sqlpilot::logging;
use std::error::Error as StdError;
use std::io;
use std::process::ExitCode;
use tracing::debug;

fn write_completions(shell: cli::Shell) {
    let mut cmd = Args::command();
    let out = &mut io::stdout();
    match shell {
        cli::Shell::Bash => clap_complete::generate(clap_complete::shells::Bash, &mut cmd, "sqlpilot", out),
        cli::Shell::Zsh => clap_complete::generate(clap_complete::shells::Zsh, &mut cmd, "sqlpilot", out),
        cli::Shell::Fish => clap_complete::generate(clap_complete::shells::Fish, &mut cmd, "sqlpilot", out),
        cli::Shell::PowerShell => {
            clap_complete::generate(clap_complete::shells::PowerShell, &mut cmd, "sqlpilot", out)
        }
        cli::Shell::Elvish => {
            clap_complete::generate(clap_complete::shells::Elvish, &mut cmd, "sqlpilot", out)
        }
    }
}

async fn async_main(args: Args) -> Result<ExitCode, Box<dyn StdError>> {
    if let Command::Completions { shell } = args.command {
        write_completions(shell);
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(model) = &args.model {
        config.ai_sql.model = model.clone();
    }

    let _log_guard = logging::init(&config.logging, args.log_level.map(Into::into))?;
    debug!("sqlpilot started with {:?}", args.command);

    match commands::run(&args.command, &config).await {
        Ok(output) => {
            println!("{}", output.render(args.json));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            debug!("Command failed: {:?}", e);
            eprintln!("{}", e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match async_main(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
