// Entrypoint for the CLI application.
// - Keeps `main` small: resolve settings, build the HTTP transport and hand
//   the arguments to the dispatcher.
// - The only place that turns an error into an exit status.

use anyhow::Context;
use gdrive_console::commands;
use gdrive_console::config::Settings;
use gdrive_console::http::HttpTransport;
use gdrive_console::ui::{self, TerminalPrompt};
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Logs go to stderr; stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::report_fatal(&format!("{err:#}"));
            let code = err
                .downcast_ref::<gdrive_console::Error>()
                .map_or(1, gdrive_console::Error::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid environment configuration")?;
    let transport = HttpTransport::new().context("unable to build HTTP client")?;

    let stdout = io::stdout();
    commands::dispatch(
        std::env::args().skip(1),
        &settings,
        transport,
        &TerminalPrompt,
        &mut stdout.lock(),
    )?;
    Ok(())
}
