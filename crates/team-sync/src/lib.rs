//! team-sync: keeps a device-local key/value store in sync with a shared
//! document store, one team at a time.
//!
//! This crate provides:
//! - A store interceptor that mirrors tracked-key writes to the active team
//! - Hydration (pull-or-push reconciliation) when a team becomes active
//! - Live subscriptions applying other devices' changes without echoes
//! - Team membership: create, join, leave, switch, legacy migration, and
//!   cross-device recovery through the user's profile
//! - LocalStore and RemoteStore trait abstractions with in-memory doubles

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hooks;
pub mod hydration;
pub mod identity;
pub mod interceptor;
pub mod mapper;
pub mod membership;
pub mod profile;
pub mod remote;
pub mod store;
pub mod subscriptions;
pub mod team_code;
pub mod tracked;

pub use backup::{Backup, BackupError};
pub use config::SyncConfig;
pub use engine::{LeaveOutcome, TeamSync};
pub use error::{ErrorKind, TeamSyncError};
pub use events::{EventBus, Subscription, SyncEvent};
pub use hooks::{AutoConfirm, ConfirmPrompt, NoUi, RefreshHooks, SettingsUi};
pub use hydration::HydrationOutcome;
pub use identity::{IdentityCell, IdentityProvider, StaticIdentity, UserIdentity};
pub use interceptor::{SyncedStore, WriteOrigin};
pub use mapper::{RecordLocation, RemoteMapper};
pub use membership::{Membership, MembershipList};
pub use remote::{
    BatchOp, CollectionPath, DocumentPath, DocumentWatch, InMemoryRemote, RemoteError, RemoteStore,
    WriteBatch,
};
pub use store::{InMemoryStore, LocalStore, StoreError};
pub use team_code::{CodeGenerator, FixedCodes, RandomCodes, TeamCode, TeamCodeError};
pub use tracked::TrackedKey;
