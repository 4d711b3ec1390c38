use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::runner::RunnerError;

/// Capability the target program guards behind a permission prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionType {
    /// Filesystem read access.
    Read,
    /// Filesystem write access.
    Write,
    /// Environment variable access.
    Env,
    /// Network access.
    Net,
    /// Subprocess execution.
    Run,
}

impl PermissionType {
    /// Every permission type, in matrix order.
    pub const ALL: [Self; 5] = [Self::Read, Self::Write, Self::Env, Self::Net, Self::Run];

    /// Lowercase name as used in flags and case names (`read`, `net`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Env => "env",
            Self::Net => "net",
            Self::Run => "run",
        }
    }

    fn capitalized(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Env => "Env",
            Self::Net => "Net",
            Self::Run => "Run",
        }
    }

    /// The `--allow-<type>` flag that preauthorizes this permission.
    #[must_use]
    pub fn allow_flag(self) -> String {
        format!("--allow-{}", self.as_str())
    }

    /// Scenario selector argument, e.g. `needsRead` for prefix `needs`.
    #[must_use]
    pub fn selector(self, prefix: &str) -> String {
        format!("{prefix}{}", self.capitalized())
    }

    /// Inverse of [`selector`](Self::selector).
    #[must_use]
    pub fn from_selector(selector: &str, prefix: &str) -> Option<Self> {
        let suffix = selector.strip_prefix(prefix)?;
        Self::ALL
            .into_iter()
            .find(|permission| permission.capitalized() == suffix)
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionType {
    type Err = RunnerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|permission| permission.as_str() == value)
            .ok_or_else(|| {
                RunnerError::config(
                    format!("unknown permission type '{value}'"),
                    serde_json::json!({
                        "received": value,
                        "supported": Self::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
                    }),
                )
            })
    }
}

/// What the target program does with one prompt answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptOutcome {
    /// Allowed for this check only; the next check prompts again.
    GrantOnce,
    /// Denied for this check only; the next check prompts again.
    DenyOnce,
    /// Allowed for the rest of the process.
    GrantAlways,
    /// Denied for the rest of the process.
    DenyAlways,
    /// Answer not understood; the program prompts again.
    Reprompt,
}

/// One scripted keystroke answering a permission prompt.
///
/// The vocabulary belongs to the target program; the harness only uses it
/// to build input scripts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    /// `y`
    Yes,
    /// `n`
    No,
    /// `a`
    Always,
    /// `d`
    Deny,
    /// Any other character. A vocabulary character held here behaves like
    /// its named response; build values with [`Response::from_token`].
    Other(char),
}

impl Response {
    /// Map a typed character onto the vocabulary.
    #[must_use]
    pub fn from_token(token: char) -> Self {
        match token {
            'y' => Self::Yes,
            'n' => Self::No,
            'a' => Self::Always,
            'd' => Self::Deny,
            other => Self::Other(other),
        }
    }

    /// The character typed for this response.
    #[must_use]
    pub fn token(self) -> char {
        match self {
            Self::Yes => 'y',
            Self::No => 'n',
            Self::Always => 'a',
            Self::Deny => 'd',
            Self::Other(other) => other,
        }
    }

    #[must_use]
    pub fn outcome(self) -> PromptOutcome {
        match self {
            Self::Yes => PromptOutcome::GrantOnce,
            Self::No => PromptOutcome::DenyOnce,
            Self::Always => PromptOutcome::GrantAlways,
            Self::Deny => PromptOutcome::DenyAlways,
            Self::Other(token) => match Self::from_token(token) {
                Self::Other(_) => PromptOutcome::Reprompt,
                known => known.outcome(),
            },
        }
    }
}

/// Encode responses as keystrokes: each token followed by a newline.
///
/// An empty script yields no bytes at all.
#[must_use]
pub fn encode_responses(responses: &[Response]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(responses.len() * 2);
    for response in responses {
        let mut utf8 = [0u8; 4];
        bytes.extend_from_slice(response.token().encode_utf8(&mut utf8).as_bytes());
        bytes.push(b'\n');
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_capitalizes_permission() {
        assert_eq!(PermissionType::Read.selector("needs"), "needsRead");
        assert_eq!(PermissionType::Net.selector("needs"), "needsNet");
        assert_eq!(
            PermissionType::from_selector("needsEnv", "needs"),
            Some(PermissionType::Env)
        );
        assert_eq!(PermissionType::from_selector("needsenv", "needs"), None);
        assert_eq!(PermissionType::from_selector("wantsEnv", "needs"), None);
    }

    #[test]
    fn allow_flag_uses_lowercase_name() {
        assert_eq!(PermissionType::Run.allow_flag(), "--allow-run");
    }

    #[test]
    fn parse_rejects_unknown_permission() {
        assert_eq!("write".parse::<PermissionType>().ok(), Some(PermissionType::Write));
        let err = "hrtime".parse::<PermissionType>().err();
        assert!(err.is_some());
    }

    #[test]
    fn vocabulary_maps_tokens_to_outcomes() {
        assert_eq!(Response::from_token('y').outcome(), PromptOutcome::GrantOnce);
        assert_eq!(Response::from_token('n').outcome(), PromptOutcome::DenyOnce);
        assert_eq!(Response::from_token('a').outcome(), PromptOutcome::GrantAlways);
        assert_eq!(Response::from_token('d').outcome(), PromptOutcome::DenyAlways);
        assert_eq!(Response::from_token('e').outcome(), PromptOutcome::Reprompt);
        assert_eq!(Response::from_token('e').token(), 'e');
    }

    #[test]
    fn other_holding_a_vocabulary_token_keeps_its_meaning() {
        assert_eq!(Response::Other('y').outcome(), PromptOutcome::GrantOnce);
        assert_eq!(Response::Other('d').outcome(), PromptOutcome::DenyAlways);
        assert_eq!(Response::Other('x').outcome(), PromptOutcome::Reprompt);
    }

    #[test]
    fn encode_terminates_each_response() {
        assert_eq!(encode_responses(&[]), b"");
        assert_eq!(encode_responses(&[Response::Yes, Response::No]), b"y\nn\n");
        assert_eq!(
            encode_responses(&[Response::Other('e'), Response::Always]),
            b"e\na\n"
        );
    }
}
