//! Outward-facing hooks: domain refresh callbacks and the settings UI.

use crate::membership::Membership;
use crate::team_code::TeamCode;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, RwLock};
use tracing::debug;

type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// Named, no-argument callbacks the engine invokes after hydration or after
/// applying a remote change, so presentation code can re-read the store.
///
/// Invoking a name that was never registered is a no-op.
#[derive(Default)]
pub struct RefreshHooks {
    hooks: RwLock<Vec<(String, RefreshHook)>>,
}

impl RefreshHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the hook called `name`.
    pub fn register(&self, name: impl Into<String>, hook: impl Fn() + Send + Sync + 'static) {
        let name = name.into();
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.retain(|(n, _)| *n != name);
        hooks.push((name, Arc::new(hook)));
    }

    pub fn unregister(&self, name: &str) {
        self.hooks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(n, _)| n != name);
    }

    /// Invoke one hook. Returns false if no hook has that name.
    pub fn invoke(&self, name: &str) -> bool {
        // Clone out of the lock so a hook may register other hooks
        let hook = self
            .hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, h)| Arc::clone(h));

        match hook {
            Some(hook) => {
                hook();
                true
            }
            None => {
                debug!("No refresh hook registered for {}", name);
                false
            }
        }
    }

    /// Invoke every named hook in order.
    pub fn invoke_all<S: AsRef<str>>(&self, names: &[S]) {
        for name in names {
            self.invoke(name.as_ref());
        }
    }
}

/// Question the engine needs a user to answer before a destructive step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmPrompt {
    /// Joining replaces local roster and games with the team's data.
    JoinTeam { code: TeamCode, team_name: String },
    /// Leaving keeps local data but stops syncing it.
    LeaveTeam { code: TeamCode, team_name: String },
}

impl Display for ConfirmPrompt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmPrompt::JoinTeam { team_name, .. } => write!(
                f,
                "Join team \"{}\"? Your local roster and game history will be replaced \
                 with the team's data.",
                team_name
            ),
            ConfirmPrompt::LeaveTeam { team_name, .. } => write!(
                f,
                "Leave team \"{}\"? Your data will stay on your device but will no longer sync.",
                team_name
            ),
        }
    }
}

/// Settings screen integration.
///
/// Every method has a default, so hosts implement only what they show.
/// Without an answer from a real user, confirmations are declined.
pub trait SettingsUi: Send + Sync {
    /// Redraw the membership list and the active-team indicator.
    fn render_memberships(&self, _memberships: &[Membership], _active: Option<&TeamCode>) {}

    /// Ask the user to confirm a destructive step.
    fn confirm(&self, _prompt: &ConfirmPrompt) -> bool {
        false
    }
}

/// UI used when the host registers none.
pub struct NoUi;

impl SettingsUi for NoUi {}

/// UI that accepts every confirmation and ignores rendering.
pub struct AutoConfirm;

impl SettingsUi for AutoConfirm {
    fn confirm(&self, _prompt: &ConfirmPrompt) -> bool {
        true
    }
}
