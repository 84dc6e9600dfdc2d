//! Error handling module for fwboot
//!
//! Every failure in the boot engine is fatal except one: discovery treats a
//! transport failure as "agent not present". The kinds below let callers
//! tell that case apart from the ones that must stop the session.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Common error type used throughout fwboot
#[derive(Debug, Error)]
pub enum Error {
    /// Bus command failed or transferred the wrong number of bytes
    #[error("transport error: `{command}` failed: {diagnostic}")]
    Transport { command: String, diagnostic: String },

    /// Host binary is not a usable ELF image
    #[error("invalid binary {path}: {reason}")]
    Binary { path: String, reason: String },

    /// Symbol missing from the binary's symbol table
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    /// Virtual address outside every loadable region
    #[error("address {0:#x} is not covered by any loadable segment")]
    UnmappedAddress(u64),

    /// Safety check on the target failed
    #[error("protocol assertion failed: {0}")]
    ProtocolAssertion(Assertion),

    /// Boot manifest could not be parsed
    #[error("manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    /// Address does not fit the 32-bit multiboot layout
    #[error("address {0:#x} does not fit in 32 bits")]
    AddressOutOfRange(u64),

    /// Operation issued in the wrong builder state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Configuration file could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

/// Target-side conditions that abort a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Assertion {
    /// Node does not carry the boot agent's signature
    #[error("not the expected agent (vendor {vendor:#08x}, model {model:#08x})")]
    NotAgent { vendor: u32, model: u32 },
    /// Control block already lists modules
    #[error("already booted ({modules} modules present)")]
    AlreadyBooted { modules: u32 },
    /// Agent was not started by a multiboot loader
    #[error("multiboot magic missing (agent published no control block)")]
    MultibootMagicMissing,
    /// Nothing to boot
    #[error("no modules to boot")]
    NoModules,
}

/// Reasons a manifest file is rejected
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unreadable: {0}")]
    Unreadable(#[from] io::Error),
    #[error("include cycle through {0}")]
    IncludeCycle(PathBuf),
    #[error("invalid load address `{0}`")]
    InvalidAddress(String),
}

impl Error {
    /// Transport failure with the command line that produced it
    pub fn transport(command: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Error::Transport {
            command: command.into(),
            diagnostic: diagnostic.into(),
        }
    }

    /// Transport failure for a transfer that moved the wrong byte count
    pub fn short_transfer(op: &str, address: u64, expected: usize, actual: usize) -> Self {
        Error::transport(
            format!("{op} {address:#x}"),
            format!("expected {expected} bytes, got {actual}"),
        )
    }

    pub fn binary(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Binary {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn manifest(path: impl Into<PathBuf>, source: ManifestError) -> Self {
        Error::Manifest {
            path: path.into(),
            source,
        }
    }

    /// Convert to a stable numeric code for logs and exit reporting
    pub fn as_error_code(&self) -> u32 {
        match self {
            Error::Transport { .. } => 0x1000,
            Error::Binary { .. } => 0x2000,
            Error::SymbolNotFound(_) => 0x2001,
            Error::UnmappedAddress(_) => 0x2002,
            Error::ProtocolAssertion(Assertion::NotAgent { .. }) => 0x3000,
            Error::ProtocolAssertion(Assertion::AlreadyBooted { .. }) => 0x3001,
            Error::ProtocolAssertion(Assertion::MultibootMagicMissing) => 0x3002,
            Error::ProtocolAssertion(Assertion::NoModules) => 0x3003,
            Error::Manifest { .. } => 0x4000,
            Error::AddressOutOfRange(_) => 0x5000,
            Error::InvalidState(_) => 0x5001,
            Error::Config(_) => 0x6000,
        }
    }

    /// Check if the condition may clear up on its own (target not up yet)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

impl From<Assertion> for Error {
    fn from(assertion: Assertion) -> Self {
        Error::ProtocolAssertion(assertion)
    }
}

/// Result type used throughout fwboot
pub type Result<T> = std::result::Result<T, Error>;
