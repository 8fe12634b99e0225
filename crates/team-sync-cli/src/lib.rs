//! team-sync-cli library: the native host pieces behind the `teamsync` binary.
//!
//! Exposed as a library so integration tests can assemble devices from the
//! same parts the binary uses.

pub mod config;
pub mod dir_remote;
pub mod file_store;
pub mod ui;
pub mod watcher;

pub use config::{Config, UserConfig};
pub use dir_remote::DirectoryRemote;
pub use file_store::JsonFileStore;
pub use ui::TerminalUi;
pub use watcher::DocumentWatcher;
