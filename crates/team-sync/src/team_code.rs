//! TeamCode: the short, shareable identifier naming a team's dataset.
//!
//! Codes are read aloud and copied by hand between staff members, so the
//! alphabet leaves out characters that are easily confused (`I`, `L`, `O`,
//! `0`, `1`).

use rand::Rng;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Characters a generated code may contain.
pub const CODE_ALPHABET: &str = "ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of every team code.
pub const CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeamCodeError {
    #[error("Please enter a 6-character team code (got {0} characters).")]
    InvalidLength(usize),
    #[error("Team codes cannot contain '{0}'.")]
    InvalidCharacter(char),
}

/// A validated team code, always upper-case.
///
/// # Examples
/// ```
/// use team_sync::TeamCode;
///
/// let code: TeamCode = " abc234 ".parse().unwrap();
/// assert_eq!(code.as_str(), "ABC234");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeamCode(String);

impl TeamCode {
    /// Generate a new random code using the thread-local RNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::rng())
    }

    /// Generate a code from a caller-supplied RNG.
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let alphabet = CODE_ALPHABET.as_bytes();
        let code = (0..CODE_LENGTH)
            .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TeamCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TeamCode {
    type Err = TeamCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let len = normalized.chars().count();
        if len != CODE_LENGTH {
            return Err(TeamCodeError::InvalidLength(len));
        }
        if let Some(bad) = normalized.chars().find(|c| !CODE_ALPHABET.contains(*c)) {
            return Err(TeamCodeError::InvalidCharacter(bad));
        }
        Ok(Self(normalized))
    }
}

impl serde::Serialize for TeamCode {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for TeamCode {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Source of candidate codes for team creation.
///
/// The engine asks for at most two codes per creation attempt.
pub trait CodeGenerator: Send {
    fn next_code(&mut self) -> TeamCode;
}

/// Default generator: uniformly random codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn next_code(&mut self) -> TeamCode {
        TeamCode::generate()
    }
}

/// Generator that hands out a fixed sequence, then falls back to random codes.
#[derive(Debug, Default)]
pub struct FixedCodes {
    codes: std::collections::VecDeque<TeamCode>,
}

impl FixedCodes {
    pub fn new(codes: impl IntoIterator<Item = TeamCode>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }
}

impl CodeGenerator for FixedCodes {
    fn next_code(&mut self) -> TeamCode {
        self.codes.pop_front().unwrap_or_else(TeamCode::generate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_use_alphabet() {
        for _ in 0..500 {
            let code = TeamCode::generate();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().chars().all(|c| CODE_ALPHABET.contains(c)));
        }
    }

    #[test]
    fn test_alphabet_excludes_ambiguous_characters() {
        for c in ['I', 'L', 'O', '0', '1'] {
            assert!(!CODE_ALPHABET.contains(c), "{} should be excluded", c);
        }
    }

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let code: TeamCode = "  x7k9pq\n".parse().unwrap();
        assert_eq!(code.to_string(), "X7K9PQ");
    }

    #[test]
    fn test_reject_wrong_length() {
        assert_eq!(
            "ABC23".parse::<TeamCode>(),
            Err(TeamCodeError::InvalidLength(5))
        );
        assert_eq!(
            "ABC2345".parse::<TeamCode>(),
            Err(TeamCodeError::InvalidLength(7))
        );
        assert_eq!("".parse::<TeamCode>(), Err(TeamCodeError::InvalidLength(0)));
    }

    #[test]
    fn test_reject_ambiguous_characters() {
        assert_eq!(
            "ABC0EF".parse::<TeamCode>(),
            Err(TeamCodeError::InvalidCharacter('0'))
        );
        assert_eq!(
            "abclef".parse::<TeamCode>(),
            Err(TeamCodeError::InvalidCharacter('L'))
        );
    }

    #[test]
    fn test_serde_rejects_invalid_code() {
        let parsed: TeamCode = serde_json::from_str("\"HJK234\"").unwrap();
        assert_eq!(parsed.as_str(), "HJK234");
        assert!(serde_json::from_str::<TeamCode>("\"HJK2O4\"").is_err());
    }

    #[test]
    fn test_fixed_codes_then_random() {
        let first: TeamCode = "AAAAAA".parse().unwrap();
        let mut codes = FixedCodes::new([first.clone()]);
        assert_eq!(codes.next_code(), first);
        assert_eq!(codes.next_code().as_str().len(), CODE_LENGTH);
    }
}
