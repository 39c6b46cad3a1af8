mod cli;

use std::{
    fs,
    io::{self, Read, Write},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use scriptrun::{
    config::Config,
    connector::validation::{INTERPRETER, PARAMETER, SCRIPT},
    validate_and_execute, Connector, ConnectorError, InputParameters, ScriptExecutor,
    ShellConnector,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const VALIDATION_EXIT_CODE: i32 = 2;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);

    let cfg = Config::load();

    // Script source: --script, --file, or piped stdin
    let script = if let Some(text) = args.script.clone() {
        text
    } else if let Some(path) = &args.file {
        fs::read_to_string(path)
            .with_context(|| format!("reading script file: {}", path.display()))?
    } else if !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading script from stdin")?;
        buf
    } else {
        String::new()
    };

    let mut params = InputParameters::new();
    params.insert(
        INTERPRETER.into(),
        Value::String(args.interpreter.clone().unwrap_or_else(|| cfg.interpreter())),
    );
    params.insert(
        PARAMETER.into(),
        Value::String(args.parameter.clone().unwrap_or_else(|| cfg.parameter())),
    );
    params.insert(SCRIPT.into(), Value::String(script));

    let mut settings = cfg.executor_settings();
    if let Some(secs) = args.timeout {
        settings.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    tracing::debug!(config = %cfg.config_path.display(), ?settings, "configuration loaded");

    let executor = Arc::new(ScriptExecutor::new(settings));
    let mut connector = ShellConnector::new(executor);
    match validate_and_execute(&mut connector, params).await {
        Ok(()) => {}
        Err(ConnectorError::Validation(e)) => {
            for message in &e.messages {
                eprintln!("{}", message.red());
            }
            std::process::exit(VALIDATION_EXIT_CODE);
        }
        Err(e) => return Err(anyhow::Error::new(e).context("script execution failed")),
    }

    let exit_status = connector.exit_status().unwrap_or(-1);
    let mut stdout = io::stdout().lock();
    if args.json {
        let body = serde_json::to_string_pretty(connector.output_parameters())?;
        writeln!(stdout, "{}", body)?;
    } else {
        write!(stdout, "{}", connector.result().unwrap_or_default())?;
    }
    stdout.flush()?;
    drop(stdout);

    std::process::exit(process_exit_code(exit_status));
}

/// Maps the script's exit status onto this process's exit code.
///
/// Windows exit codes are full 32-bit values and pass through. Unix keeps only
/// the low byte, so anything outside 0..=255 becomes a generic failure rather
/// than a misleading value such as 0.
#[cfg(windows)]
fn process_exit_code(status: i64) -> i32 {
    i32::try_from(status).unwrap_or(1)
}

#[cfg(not(windows))]
fn process_exit_code(status: i64) -> i32 {
    u8::try_from(status).map_or(1, i32::from)
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}
