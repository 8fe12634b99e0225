//! Error types for team operations.

use crate::remote::RemoteError;
use crate::store::StoreError;
use crate::team_code::{TeamCode, TeamCodeError};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, TeamSyncError>;

/// Broad category of a failure, used by hosts to decide how to present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or remote-store failure. Logged; the operation was abandoned.
    Transport,
    /// The requested team does not exist.
    NotFound,
    /// Rejected before any network call.
    Precondition,
    /// Code generation collided twice.
    Collision,
    /// The user declined a confirmation.
    Declined,
    /// The local store failed.
    Storage,
}

/// Errors surfaced by `TeamSync` operations.
///
/// `Display` strings are written to be shown to the user as-is.
#[derive(Debug, Error)]
pub enum TeamSyncError {
    #[error("Still connecting to cloud. Please wait a moment and try again.")]
    NotSignedIn,

    #[error(transparent)]
    InvalidCode(#[from] TeamCodeError),

    #[error("Team not found. Check the code and try again.")]
    TeamNotFound(TeamCode),

    #[error("You are already a member of team {0}.")]
    AlreadyMember(TeamCode),

    #[error("You are not a member of team {0}.")]
    NotMember(TeamCode),

    #[error("Error generating team code. Please try again.")]
    CodeCollision,

    #[error("Cancelled.")]
    Declined,

    #[error("Failed to reach the cloud. Check your connection and try again. ({0})")]
    Remote(#[from] RemoteError),

    #[error("Could not load team {team}: {source}")]
    Hydration {
        team: TeamCode,
        #[source]
        source: RemoteError,
    },

    #[error("Local storage error: {0}")]
    Store(#[from] StoreError),
}

impl TeamSyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TeamSyncError::Remote(_) | TeamSyncError::Hydration { .. } => ErrorKind::Transport,
            TeamSyncError::TeamNotFound(_) => ErrorKind::NotFound,
            TeamSyncError::NotSignedIn
            | TeamSyncError::InvalidCode(_)
            | TeamSyncError::AlreadyMember(_)
            | TeamSyncError::NotMember(_) => ErrorKind::Precondition,
            TeamSyncError::CodeCollision => ErrorKind::Collision,
            TeamSyncError::Declined => ErrorKind::Declined,
            TeamSyncError::Store(_) => ErrorKind::Storage,
        }
    }
}
