use core::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::PluginState;

/// Fatal device plugin errors
#[derive(Debug, derive_more::Display)]
pub enum PluginError {
    #[display("failed to remove stale socket {}: {source}", path.display())]
    SocketCleanup { path: PathBuf, source: io::Error },
    #[display("failed to listen on {}: {source}", path.display())]
    Listen { path: PathBuf, source: io::Error },
    #[display("failed to connect to kubelet at {}: {source}", path.display())]
    Dial {
        path: PathBuf,
        source: tonic::transport::Error,
    },
    #[display("timed out after {timeout:?} connecting to kubelet at {}", path.display())]
    DialTimeout { path: PathBuf, timeout: Duration },
    #[display("registration failed: {source}")]
    Register { source: tonic::Status },
    #[display("cannot {operation} device plugin in state {state}")]
    InvalidState {
        operation: &'static str,
        state: PluginState,
    },
}

impl Error for PluginError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SocketCleanup { source, .. } | Self::Listen { source, .. } => Some(source),
            Self::Dial { source, .. } => Some(source),
            Self::Register { source } => Some(source),
            Self::DialTimeout { .. } | Self::InvalidState { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
