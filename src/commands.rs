// Command dispatcher: scans the command line, validates it and runs the
// matching file operation. Operations return errors instead of exiting;
// `main` decides the exit status.

use crate::api::{DriveClient, DriveFile};
use crate::config::Settings;
use crate::credentials::CredentialManager;
use crate::error::{Error, Result, UsageError};
use crate::http::Transport;
use crate::ui::{self, CodePrompt};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Raw values picked out of the command line. Anything not given is empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub file: String,
    pub id: String,
}

impl Invocation {
    /// Pick `-c`, `-f` and `-id` values out of `args`. Every other argument
    /// is ignored. A flag at the very end gets an empty value.
    pub fn scan<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut invocation = Invocation::default();
        for (index, arg) in args.iter().enumerate() {
            let slot = match arg.as_str() {
                "-c" => &mut invocation.command,
                "-f" => &mut invocation.file,
                "-id" => &mut invocation.id,
                _ => continue,
            };
            *slot = args.get(index + 1).cloned().unwrap_or_default();
        }
        invocation
    }

    /// Resolve to a runnable operation. Fails before anything is read from
    /// disk or sent over the network.
    pub fn operation(&self) -> Result<Operation, UsageError> {
        match self.command.as_str() {
            "fileGet" => Ok(Operation::Get {
                file: self.require("fileGet", "-f", &self.file)?,
                id: self.require("fileGet", "-id", &self.id)?,
            }),
            "fileUpdate" => Ok(Operation::Update {
                file: self.require("fileUpdate", "-f", &self.file)?,
                id: self.require("fileUpdate", "-id", &self.id)?,
            }),
            "fileCreate" => Ok(Operation::Create {
                file: self.require("fileCreate", "-f", &self.file)?,
            }),
            "fileList" => Ok(Operation::List),
            other => Err(UsageError::UnknownCommand(other.to_string())),
        }
    }

    fn require(
        &self,
        command: &'static str,
        flag: &'static str,
        value: &str,
    ) -> Result<String, UsageError> {
        if value.is_empty() {
            return Err(UsageError::MissingArgument { command, flag });
        }
        Ok(value.to_string())
    }
}

/// One validated request from the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get { file: String, id: String },
    Update { file: String, id: String },
    Create { file: String },
    List,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get { .. } => "fileGet",
            Operation::Update { .. } => "fileUpdate",
            Operation::Create { .. } => "fileCreate",
            Operation::List => "fileList",
        }
    }
}

/// Run `operation` against `drive`, writing the result for the operator to
/// `out`.
pub fn execute<T: Transport>(
    operation: &Operation,
    drive: &DriveClient<T>,
    out: &mut dyn Write,
) -> Result<()> {
    let stdout = |e| Error::local_io("<stdout>", e);
    match operation {
        Operation::Get { file, id } => {
            ui::with_spinner("Downloading...", || drive.download(id, &PathBuf::from(file)))?;
            writeln!(out, "Download is ok").map_err(stdout)?;
        }
        Operation::Update { file, id } => {
            let updated =
                ui::with_spinner("Uploading...", || drive.update(id, &PathBuf::from(file)))?;
            print_file(out, &updated).map_err(stdout)?;
        }
        Operation::Create { file } => {
            let created = ui::with_spinner("Uploading...", || drive.create(&PathBuf::from(file)))?;
            print_file(out, &created).map_err(stdout)?;
        }
        Operation::List => {
            let files = ui::with_spinner("Listing files...", || drive.list())?;
            writeln!(out, "Files:").map_err(stdout)?;
            if files.is_empty() {
                writeln!(out, "No files found.").map_err(stdout)?;
            }
            for file in &files {
                writeln!(out, "  name -> {} id -> {} ", file.name, file.id).map_err(stdout)?;
            }
        }
    }
    Ok(())
}

fn print_file(out: &mut dyn Write, file: &DriveFile) -> std::io::Result<()> {
    writeln!(out, "{}, {}, {}", file.name, file.id, file.mime_type)
}

/// Scan `args`, authenticate and run the requested operation.
///
/// Argument validation happens first, so a bad command line never touches
/// the secrets directory or the network.
pub fn dispatch<I, S, T>(
    args: I,
    settings: &Settings,
    transport: T,
    prompt: &dyn CodePrompt,
    out: &mut dyn Write,
) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    T: Transport,
{
    let operation = Invocation::scan(args).operation()?;
    info!(command = operation.name(), "running command");

    let manager = CredentialManager::from_secret_dir(&settings.secret_dir)?;
    let client = manager.authenticated_client(transport, prompt)?;
    let drive = DriveClient::new(client, settings.api_url.clone());
    execute(&operation, &drive, out)
}
