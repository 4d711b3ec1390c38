//! Fixture: a permission-prompting program for matrix tests.
//!
//! Performs two independent checks of one permission. The first check
//! failing prints the first-check marker on stdout; the second failing
//! prints the denial marker on stderr and exits 1.
//!
//! Usage:
//!   permprobe-prompt-fixture <entry> needs<Permission> [--allow-<permission>] [--no-prompt]
//!
//! Prompts only when stdin and stderr are terminals, like a real CLI.

// Test fixtures require special allowances - they are not production code
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use permprobe::model::{Markers, PermissionType, PromptOutcome, Response, DEFAULT_SELECTOR_PREFIX};
use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;

struct Prompter {
    permission: PermissionType,
    preauthorized: bool,
    can_prompt: bool,
    /// Sticky answer from `a` or `d`.
    always: Option<bool>,
    markers: Markers,
}

impl Prompter {
    fn check(&mut self) -> io::Result<bool> {
        if self.preauthorized {
            return Ok(true);
        }
        if let Some(granted) = self.always {
            return Ok(granted);
        }
        if !self.can_prompt {
            return Ok(false);
        }
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        loop {
            write!(
                stderr,
                "┌ {} {} access.\r\n└ Allow? [y/n/a/d] ",
                self.markers.prompt, self.permission
            )?;
            stderr.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF counts as a denial
                return Ok(false);
            }
            let token = line.trim().chars().next().unwrap_or(' ');
            match Response::from_token(token).outcome() {
                PromptOutcome::GrantOnce => return Ok(true),
                PromptOutcome::DenyOnce => return Ok(false),
                PromptOutcome::GrantAlways => {
                    self.always = Some(true);
                    return Ok(true);
                }
                PromptOutcome::DenyAlways => {
                    self.always = Some(false);
                    return Ok(false);
                }
                PromptOutcome::Reprompt => {
                    writeln!(stderr, "{} '{token}' [y/n/a/d]", self.markers.unrecognized)?;
                }
            }
        }
    }
}

fn main() -> io::Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(selector) = args.get(1) else {
        eprintln!("usage: permprobe-prompt-fixture <entry> needs<Permission> [flags...]");
        return Ok(ExitCode::from(2));
    };
    let Some(permission) = PermissionType::from_selector(selector, DEFAULT_SELECTOR_PREFIX) else {
        eprintln!("unknown selector '{selector}'");
        return Ok(ExitCode::from(2));
    };
    let flags = args.get(2..).unwrap_or_default();
    let allow_flag = permission.allow_flag();

    let mut prompter = Prompter {
        permission,
        preauthorized: flags.iter().any(|flag| *flag == allow_flag),
        can_prompt: !flags.iter().any(|flag| flag == "--no-prompt")
            && io::stdin().is_terminal()
            && io::stderr().is_terminal(),
        always: None,
        markers: Markers::default(),
    };

    if !prompter.check()? {
        println!("{}", prompter.markers.first_check_failed);
    }
    if !prompter.check()? {
        eprintln!(
            "error: Uncaught {}, run again with the {allow_flag} flag",
            prompter.markers.denied
        );
        return Ok(ExitCode::from(1));
    }
    println!("{permission} granted");
    Ok(ExitCode::SUCCESS)
}
