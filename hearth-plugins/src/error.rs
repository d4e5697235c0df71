use std::path::PathBuf;

use hearth_core::alloc::AllocError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Invalid plugin path {path}: {source}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open library {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Symbol '{symbol}' not found in {path}")]
    MissingSymbol { symbol: String, path: PathBuf },

    #[error("Plugin {path} returned a null instance")]
    CreateFailed { path: PathBuf },

    #[error("Allocation failed: {0}")]
    Alloc(#[from] AllocError),
}

pub type PluginResult<T> = Result<T, PluginError>;
