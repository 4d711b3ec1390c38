use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::permission::{encode_responses, PermissionType, Response};
use crate::runner::RunnerError;

/// Flag that disables prompting in the target program.
pub const NO_PROMPT_FLAG: &str = "--no-prompt";

/// Named prompt interaction pattern: scripted answers plus CLI flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseScenario {
    /// Preauthorized with `--allow-<type>`; no input.
    AllowFlag,
    /// `y`, `y`
    YesYes,
    /// `y`, `n`
    YesNo,
    /// `n`, `n`
    NoNo,
    /// `n`, `y`
    NoYes,
    /// `a`
    Allow,
    /// `d`
    Deny,
    /// `e`, `a`
    UnrecognizedOption,
    /// `--no-prompt` without the allow flag.
    NoPrompt,
    /// `--no-prompt` together with `--allow-<type>`.
    NoPromptAllow,
}

impl ResponseScenario {
    /// Every scenario, in matrix order.
    pub const ALL: [Self; 10] = [
        Self::AllowFlag,
        Self::YesYes,
        Self::YesNo,
        Self::NoNo,
        Self::NoYes,
        Self::Allow,
        Self::Deny,
        Self::UnrecognizedOption,
        Self::NoPrompt,
        Self::NoPromptAllow,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllowFlag => "allow_flag",
            Self::YesYes => "yes_yes",
            Self::YesNo => "yes_no",
            Self::NoNo => "no_no",
            Self::NoYes => "no_yes",
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::UnrecognizedOption => "unrecognized_option",
            Self::NoPrompt => "no_prompt",
            Self::NoPromptAllow => "no_prompt_allow",
        }
    }

    /// Keystrokes typed into the prompt, in order.
    #[must_use]
    pub fn responses(self) -> Vec<Response> {
        match self {
            Self::AllowFlag | Self::NoPrompt | Self::NoPromptAllow => Vec::new(),
            Self::YesYes => vec![Response::Yes, Response::Yes],
            Self::YesNo => vec![Response::Yes, Response::No],
            Self::NoNo => vec![Response::No, Response::No],
            Self::NoYes => vec![Response::No, Response::Yes],
            Self::Allow => vec![Response::Always],
            Self::Deny => vec![Response::Deny],
            Self::UnrecognizedOption => vec![Response::Other('e'), Response::Always],
        }
    }

    /// Extra flags appended after the scenario selector.
    #[must_use]
    pub fn flags(self, permission: PermissionType) -> Vec<String> {
        match self {
            Self::AllowFlag => vec![permission.allow_flag()],
            Self::NoPrompt => vec![NO_PROMPT_FLAG.to_string()],
            Self::NoPromptAllow => vec![NO_PROMPT_FLAG.to_string(), permission.allow_flag()],
            _ => Vec::new(),
        }
    }

    /// Exit code and marker presence the target must produce.
    #[must_use]
    pub fn expectations(self) -> Expectations {
        let (exit_code, prompt, first_check_failed, denied) = match self {
            Self::AllowFlag | Self::NoPromptAllow => (0, false, false, false),
            Self::YesYes | Self::Allow | Self::UnrecognizedOption => (0, true, false, false),
            Self::YesNo => (1, true, false, true),
            Self::NoNo | Self::Deny => (1, true, true, true),
            Self::NoYes => (0, true, true, false),
            Self::NoPrompt => (1, false, true, true),
        };
        Expectations {
            exit_code,
            prompt,
            first_check_failed,
            denied,
            unrecognized: (self == Self::UnrecognizedOption).then_some(true),
        }
    }
}

impl fmt::Display for ResponseScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseScenario {
    type Err = RunnerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == value)
            .ok_or_else(|| {
                RunnerError::config(
                    format!("unknown scenario '{value}'"),
                    serde_json::json!({
                        "received": value,
                        "supported": Self::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
                    }),
                )
            })
    }
}

/// Expected exit code and marker presence for one case.
///
/// `unrecognized` is only asserted when set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectations {
    pub exit_code: i32,
    pub prompt: bool,
    pub first_check_failed: bool,
    pub denied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrecognized: Option<bool>,
}

/// One permission type crossed with one response scenario.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// `test_<permission>_<scenario>`
    pub name: String,
    pub permission: PermissionType,
    pub scenario: ResponseScenario,
    pub responses: Vec<Response>,
    pub flags: Vec<String>,
    pub expect: Expectations,
}

impl TestCase {
    #[must_use]
    pub fn new(permission: PermissionType, scenario: ResponseScenario) -> Self {
        Self {
            name: format!("test_{}_{}", permission.as_str(), scenario.as_str()),
            permission,
            scenario,
            responses: scenario.responses(),
            flags: scenario.flags(permission),
            expect: scenario.expectations(),
        }
    }

    /// Bytes written to the child's stdin right after launch.
    #[must_use]
    pub fn input(&self) -> Vec<u8> {
        encode_responses(&self.responses)
    }

    /// Arguments after the executable:
    /// `<entry> <selector> [flags...]`.
    #[must_use]
    pub fn args(&self, entry: &str, selector_prefix: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(2 + self.flags.len());
        args.push(entry.to_string());
        args.push(self.permission.selector(selector_prefix));
        args.extend(self.flags.iter().cloned());
        args
    }
}

/// Cross every selected permission with every selected scenario.
///
/// Permission-major order: all scenarios of the first permission run first.
#[must_use]
pub fn build_matrix(
    permissions: &[PermissionType],
    scenarios: &[ResponseScenario],
) -> Vec<TestCase> {
    permissions
        .iter()
        .flat_map(|permission| {
            scenarios
                .iter()
                .map(move |scenario| TestCase::new(*permission, *scenario))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_matrix_has_fifty_cases_in_permission_major_order() {
        let cases = build_matrix(&PermissionType::ALL, &ResponseScenario::ALL);
        assert_eq!(cases.len(), 50);
        assert_eq!(cases.first().map(|c| c.name.as_str()), Some("test_read_allow_flag"));
        assert_eq!(
            cases.get(10).map(|c| c.name.as_str()),
            Some("test_write_allow_flag")
        );
        assert_eq!(
            cases.last().map(|c| c.name.as_str()),
            Some("test_run_no_prompt_allow")
        );
    }

    #[test]
    fn args_follow_entry_selector_flags_shape() {
        let case = TestCase::new(PermissionType::Net, ResponseScenario::NoPromptAllow);
        assert_eq!(
            case.args("tools/permission_prompt_test.ts", "needs"),
            vec![
                "tools/permission_prompt_test.ts",
                "needsNet",
                "--no-prompt",
                "--allow-net"
            ]
        );
    }

    #[test]
    fn input_scripts_match_scenarios() {
        let input = |scenario| TestCase::new(PermissionType::Read, scenario).input();
        assert_eq!(input(ResponseScenario::AllowFlag), b"");
        assert_eq!(input(ResponseScenario::YesYes), b"y\ny\n");
        assert_eq!(input(ResponseScenario::YesNo), b"y\nn\n");
        assert_eq!(input(ResponseScenario::NoNo), b"n\nn\n");
        assert_eq!(input(ResponseScenario::NoYes), b"n\ny\n");
        assert_eq!(input(ResponseScenario::Allow), b"a\n");
        assert_eq!(input(ResponseScenario::Deny), b"d\n");
        assert_eq!(input(ResponseScenario::UnrecognizedOption), b"e\na\n");
        assert_eq!(input(ResponseScenario::NoPrompt), b"");
    }

    #[test]
    fn expectations_table() {
        let expect = ResponseScenario::expectations;
        assert_eq!(expect(ResponseScenario::AllowFlag).exit_code, 0);
        assert!(!expect(ResponseScenario::AllowFlag).prompt);

        let yes_no = expect(ResponseScenario::YesNo);
        assert_eq!(yes_no.exit_code, 1);
        assert!(yes_no.prompt && yes_no.denied && !yes_no.first_check_failed);

        let no_yes = expect(ResponseScenario::NoYes);
        assert_eq!(no_yes.exit_code, 0);
        assert!(no_yes.first_check_failed && !no_yes.denied);

        let deny = expect(ResponseScenario::Deny);
        assert!(deny.first_check_failed && deny.denied);

        let no_prompt = expect(ResponseScenario::NoPrompt);
        assert!(!no_prompt.prompt && no_prompt.first_check_failed && no_prompt.denied);

        assert_eq!(expect(ResponseScenario::UnrecognizedOption).unrecognized, Some(true));
        assert_eq!(expect(ResponseScenario::YesYes).unrecognized, None);
    }

    #[test]
    fn scenario_names_round_trip_through_from_str() {
        for scenario in ResponseScenario::ALL {
            assert_eq!(scenario.as_str().parse::<ResponseScenario>().ok(), Some(scenario));
        }
        assert!("maybe".parse::<ResponseScenario>().is_err());
    }
}
