// Library root
// -----------
// This crate exposes the building blocks of the `gdrive-console` binary.
//
// Module responsibilities:
// - `config`: secrets directory, API base URL and the OAuth2 client
//   registration read from `credentials.json`.
// - `token`: the OAuth2 token and its single-file cache.
// - `http`: the `Transport` seam and the blocking reqwest implementation.
// - `oauth`: consent URL, code exchange, refresh and the transport
//   decorator that signs and refreshes.
// - `credentials`: ties cache and consent flow together into an
//   authenticated transport.
// - `api`: Drive file operations on top of any transport.
// - `commands`: command line scanning and dispatch.
// - `ui`: operator prompts, spinners and fatal diagnostics.
pub mod api;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod oauth;
pub mod token;
pub mod ui;

pub use error::{Error, Result};
