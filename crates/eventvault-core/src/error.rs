//! Error taxonomy for the indexing pipeline.

use thiserror::Error;

/// Errors that can occur while maintaining the event history.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Missing or invalid required configuration. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// All RPC endpoints unreachable or erroring for a call. Aborts the
    /// current cycle without mutating persisted state.
    #[error("transport error: {0}")]
    Transport(String),

    /// A log payload could not be decoded into an event record.
    #[error("log decode error: {0}")]
    Decode(String),

    /// Store read failed.
    #[error("store error: {0}")]
    Store(String),

    /// Store commit failed after exhausting every retry attempt. Fatal:
    /// continuing with stale persisted state risks event loss on restart.
    #[error("commit failed after {attempts} attempts: {reason}")]
    CommitExhausted { attempts: u32, reason: String },

    /// Snapshot export failed. Logged and swallowed; the store commit is the
    /// authoritative state.
    #[error("snapshot export error: {0}")]
    Export(String),
}

impl IndexError {
    /// Returns `true` if the error must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::CommitExhausted { .. })
    }

    /// Returns `true` if the error is scoped to a single cycle and the next
    /// trigger may simply retry.
    pub fn is_transient(&self) -> bool {
        !self.is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split() {
        assert!(IndexError::Config("missing CHAIN_ID".into()).is_fatal());
        assert!(IndexError::CommitExhausted { attempts: 5, reason: "io".into() }.is_fatal());
        assert!(IndexError::Transport("all endpoints failed".into()).is_transient());
        assert!(IndexError::Store("read".into()).is_transient());
        assert!(IndexError::Export("disk full".into()).is_transient());
    }
}
