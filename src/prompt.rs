//! Interactive prompting
//!
//! The vault engine consumes user input through the [`Prompter`] trait so
//! tests can script whole operations. [`TerminalPrompter`] talks to the
//! real terminal, suppressing echo for secrets.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};

use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, PwmError, Result};
use crate::pwgen;

/// Checks that a string contains only printable characters.
pub fn is_printable(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7e).contains(&b))
}

/// Source of interactive answers.
///
/// `read_line` and `read_secret` supply raw answers; the provided methods
/// layer the validation-and-retry loops on top so every implementation
/// gets identical semantics.
pub trait Prompter {
    /// Reads one line of input, without the trailing newline.
    fn read_line(&mut self, prompt: &str) -> Result<String>;

    /// Reads one line of input with terminal echo suppressed.
    fn read_secret(&mut self, prompt: &str) -> Result<Zeroizing<String>>;

    /// Shows a line of output to the user.
    fn show(&mut self, text: &str);

    /// Shows output without a trailing newline, flushed immediately.
    /// Used for the authentication backoff dots.
    fn show_progress(&mut self, text: &str);

    /// Asks a yes/no question; an empty answer selects the default.
    fn read_yes_no(&mut self, prompt: &str, default_yes: bool) -> Result<bool> {
        loop {
            let answer = self.read_line(prompt)?.to_ascii_lowercase();
            match answer.as_str() {
                "" => return Ok(default_yes),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.show("I don't understand.  Please answer yes or no."),
            }
        }
    }

    /// Asks for an unsigned integer within `min..=max`.
    fn read_uint(&mut self, prompt: &str, min: usize, max: usize) -> Result<usize> {
        loop {
            let answer = self.read_line(prompt)?;
            match answer.parse::<usize>() {
                Ok(value) if (min..=max).contains(&value) => return Ok(value),
                Ok(_) => self.show(&format!("Value must be between {min} and {max}.")),
                Err(_) => self.show("Please enter a number."),
            }
        }
    }

    /// Asks for a printable field of at most `max_len` characters.
    /// The field may be empty.
    fn read_field(&mut self, prompt: &str, max_len: usize) -> Result<String> {
        loop {
            let answer = self.read_line(prompt)?;
            if !is_printable(&answer) {
                self.show("Only printable characters can be used.");
                continue;
            }
            if answer.len() > max_len {
                self.show("Entry is too long.  Try again:");
                continue;
            }
            return Ok(answer);
        }
    }

    /// Asks for a password (or the master passphrase), echo suppressed,
    /// enforcing the printable/length rules.
    fn read_password(&mut self, prompt: &str) -> Result<Zeroizing<String>> {
        loop {
            let secret = self.read_secret(prompt)?;
            if pwgen::is_valid_password(&secret) {
                return Ok(secret);
            }
            self.show(&format!(
                "Passwords must be {} to {} printable characters.  Try again:",
                pwgen::MIN_PASSWORD_LEN,
                pwgen::MAX_PASSWORD_LEN
            ));
        }
    }
}

/// Prompter backed by the controlling terminal.
///
/// Prompts go to stderr so vault output on stdout stays clean. Secrets are
/// read without echo when stdin is a terminal; otherwise they are read as
/// plain lines so the binary can be driven from a pipe.
#[derive(Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }

    fn read_raw_line(&self) -> Result<String> {
        let mut line = String::new();
        let bytes = io::stdin().lock().read_line(&mut line).map_err(|e| {
            PwmError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "could not read standard in",
                e,
            )
        })?;
        if bytes == 0 {
            return Err(PwmError::with_kind(
                ErrorCategory::User,
                ErrorKind::PromptUnavailable,
                "standard in closed while waiting for an answer",
            ));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}

impl Prompter for TerminalPrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        eprint!("{prompt} ");
        let _ = io::stderr().flush();
        self.read_raw_line()
    }

    fn read_secret(&mut self, prompt: &str) -> Result<Zeroizing<String>> {
        if io::stdin().is_terminal() {
            let secret = rpassword::prompt_password(format!("{prompt} ")).map_err(|e| {
                PwmError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::PromptUnavailable,
                    "failure reading passphrase",
                    e,
                )
            })?;
            Ok(Zeroizing::new(secret))
        } else {
            eprint!("{prompt} ");
            let _ = io::stderr().flush();
            Ok(Zeroizing::new(self.read_raw_line()?))
        }
    }

    fn show(&mut self, text: &str) {
        println!("{text}");
    }

    fn show_progress(&mut self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
    }
}

/// Prompter that replays a fixed script of answers (for testing).
///
/// An exhausted script is an error rather than a hang, so a test with a
/// wrong or missing answer fails fast. Output is collected into
/// `transcript` for assertions.
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    pub transcript: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, _prompt: &str) -> Result<String> {
        self.answers.pop_front().ok_or_else(|| {
            PwmError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::PromptUnavailable,
                "scripted answers exhausted",
            )
        })
    }

    fn read_secret(&mut self, prompt: &str) -> Result<Zeroizing<String>> {
        Ok(Zeroizing::new(self.read_line(prompt)?))
    }

    fn show(&mut self, text: &str) {
        self.transcript.push(text.to_string());
    }

    fn show_progress(&mut self, text: &str) {
        self.transcript.push(text.to_string());
    }
}
