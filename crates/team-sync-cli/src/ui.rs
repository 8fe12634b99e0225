//! Terminal settings UI: membership listing and y/N confirmations.

use std::io::{self, BufRead, Write};
use team_sync::{ConfirmPrompt, Membership, SettingsUi, TeamCode};
use tracing::debug;

pub struct TerminalUi {
    assume_yes: bool,
}

impl TerminalUi {
    /// With `assume_yes`, every confirmation is accepted without prompting.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

/// One line per membership, the active one marked with `*`.
pub fn format_memberships(memberships: &[Membership], active: Option<&TeamCode>) -> String {
    if memberships.is_empty() {
        return "No teams. Create one or join with a code.".to_string();
    }
    memberships
        .iter()
        .map(|m| {
            let marker = if Some(&m.code) == active { '*' } else { ' ' };
            format!("{} {}  {}", marker, m.code, m.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl SettingsUi for TerminalUi {
    fn render_memberships(&self, memberships: &[Membership], active: Option<&TeamCode>) {
        debug!("Memberships:\n{}", format_memberships(memberships, active));
    }

    fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        if self.assume_yes {
            return true;
        }

        print!("{} [y/N] ", prompt);
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_marks_active() {
        let hawks = Membership::new("HAWK23".parse().unwrap(), "Hawks");
        let bears = Membership::new("BEAR45".parse().unwrap(), "Bears");
        let out = format_memberships(&[hawks.clone(), bears], Some(&hawks.code));

        assert_eq!(out, "* HAWK23  Hawks\n  BEAR45  Bears");
        assert!(format_memberships(&[], None).starts_with("No teams"));
    }

    #[test]
    fn test_assume_yes_confirms() {
        let prompt = ConfirmPrompt::LeaveTeam {
            code: "HAWK23".parse().unwrap(),
            team_name: "Hawks".into(),
        };
        assert!(TerminalUi::new(true).confirm(&prompt));
    }
}
