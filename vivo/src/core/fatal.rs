use std::io;
use std::path::PathBuf;
use std::process;

use thiserror::Error;

use crate::core::logging::error;

/// Conditions the runtime cannot recover from. Script failures never end up
/// here; they move the interpreter into its error state instead.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("could not access script `{}': {source}", .path.display())]
    ScriptInaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not access watched file `{}': {source}", .path.display())]
    WatchedFileInaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no load path set")]
    NoLoadPath,
}

impl FatalError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ScriptInaccessible { .. } => 1,
            Self::WatchedFileInaccessible { .. } => 1,
            Self::NoLoadPath => 2,
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::ScriptInaccessible { .. } => {
                "Check that the file exists and is readable"
            }
            Self::WatchedFileInaccessible { .. } => {
                "A watched file was moved or deleted while running"
            }
            Self::NoLoadPath => {
                "Set VIVO_PATH, pass -I, or allow the default library path"
            }
        }
    }

    /// Reports the condition and terminates the process with its exit code.
    pub fn exit(self) -> ! {
        error!("{}", self);
        eprintln!("FATAL ERROR: {}. vivo must quit.", self);
        eprintln!("  {}", self.hint());
        process::exit(self.exit_code())
    }
}
