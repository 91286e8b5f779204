// UI layer: everything that talks to the operator's terminal.
//
// The authorization code prompt is the only place the program waits for a
// human. Spinners go to stderr so stdout only carries command output.

use crossterm::style::Stylize;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, IsTerminal};
use std::time::Duration;
use url::Url;

/// Source of the one-time authorization code.
pub trait CodePrompt {
    /// Show `consent_url` to the operator and block until a code is entered.
    fn prompt_for_code(&self, consent_url: &Url) -> io::Result<String>;
}

/// Reads the code from the controlling terminal, or from the first word of
/// the next stdin line when input is piped.
pub struct TerminalPrompt;

impl CodePrompt for TerminalPrompt {
    fn prompt_for_code(&self, consent_url: &Url) -> io::Result<String> {
        println!(
            "Go to the following link in your browser then type the authorization code: \n{}",
            consent_url.as_str().underlined()
        );

        if io::stdin().is_terminal() {
            let code: String = Input::new()
                .with_prompt("Authorization code")
                .interact_text()?;
            return Ok(code.trim().to_string());
        }

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(first_word(&line).to_string())
    }
}

fn first_word(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

/// Spinner on stderr for a blocking network call. Hidden when stderr is
/// not a terminal.
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Run `f` with a spinner showing `message`, clearing it afterwards.
pub fn with_spinner<T>(message: &str, f: impl FnOnce() -> T) -> T {
    let spinner = spinner(message);
    let result = f();
    spinner.finish_and_clear();
    result
}

/// Single diagnostic line for a fatal error.
pub fn report_fatal(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}
