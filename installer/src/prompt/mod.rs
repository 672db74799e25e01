// Terminal prompts: yes/no confirmation and the OS menu.
//
// Reads block without a timeout. End of input is an error, never an implicit answer.

use anyhow::{Context, Result};
use log::info;
use std::io::{BufRead, Write};

use crate::error::InstallerError;
use crate::platform::PlatformFamily;

pub const ACCEPTED_ANSWERS: [&str; 4] = ["y", "n", "yes", "no"];

/// Yes/no gate before destructive actions.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// `Some(true)` for yes (including empty input), `Some(false)` for no, `None` otherwise.
pub fn normalize_answer(raw: &str) -> Option<bool> {
    let answer = raw.strip_suffix('\n').unwrap_or(raw);
    let answer = answer.strip_suffix('\r').unwrap_or(answer);
    match answer.to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

pub struct InteractiveConfirmer<R, W> {
    input: R,
    output: W,
}

impl InteractiveConfirmer<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> InteractiveConfirmer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .context("Failed to read from standard input")?;
        if n == 0 {
            return Err(InstallerError::InputClosed.into());
        }
        Ok(line)
    }

    /// Numbered OS menu. `Ok(None)` when the operator picks `0`.
    pub fn choose_platform(
        &mut self,
        detected: Option<PlatformFamily>,
    ) -> Result<Option<PlatformFamily>> {
        writeln!(self.output, "Choose your operating system:")?;
        loop {
            for (i, family) in PlatformFamily::ALL.iter().enumerate() {
                let marker = if Some(*family) == detected {
                    " (detected)"
                } else {
                    ""
                };
                writeln!(
                    self.output,
                    "  {} : {}{}",
                    i + 1,
                    family.display_name(),
                    marker
                )?;
            }
            writeln!(self.output, "  0 : exit this installer")?;
            write!(self.output, "Your choice: ")?;
            self.output.flush()?;

            let answer = self.read_line()?;
            let answer = answer.trim();
            if answer == "0" {
                info!("[PHASE: preflight] [STEP: os_menu] Operator exited from the OS menu");
                return Ok(None);
            }
            let picked = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| PlatformFamily::ALL.get(i).copied());
            if let Some(family) = picked {
                info!(
                    "[PHASE: preflight] [STEP: os_menu] Operator chose {}",
                    family
                );
                return Ok(Some(family));
            }
            writeln!(
                self.output,
                "\nIncorrect choice! Please choose from the following list:"
            )?;
        }
    }
}

impl<R: BufRead, W: Write> Confirm for InteractiveConfirmer<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        loop {
            write!(self.output, "\n{}(Y/n) ", question)?;
            self.output.flush()?;
            let line = self.read_line()?;
            match normalize_answer(&line) {
                Some(answer) => return Ok(answer),
                None => writeln!(
                    self.output,
                    "Valid answers are: {}",
                    ACCEPTED_ANSWERS.join(", ")
                )?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn confirmer(input: &str) -> InteractiveConfirmer<Cursor<Vec<u8>>, Vec<u8>> {
        InteractiveConfirmer::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn normalize_accepts_documented_answers() {
        for yes in ["", "\n", "y", "Y\r\n", "yes", "YES\n"] {
            assert_eq!(normalize_answer(yes), Some(true), "{:?}", yes);
        }
        for no in ["n", "N", "no", "NO", "nO"] {
            assert_eq!(normalize_answer(no), Some(false), "{:?}", no);
        }
        for other in ["maybe", "yep", "0", "ja", " y", "yes ", "\tn\n"] {
            assert_eq!(normalize_answer(other), None, "{:?}", other);
        }
    }

    #[test]
    fn empty_line_means_yes() {
        let mut c = confirmer("\n");
        assert!(c.confirm("Drop it? ").expect("answer"));
    }

    #[test]
    fn invalid_answer_reprompts() {
        let mut c = confirmer("maybe\nNO\n");
        assert!(!c.confirm("Drop it? ").expect("answer"));
        let out = String::from_utf8(c.output.clone()).expect("utf8");
        assert_eq!(out.matches("Drop it? (Y/n) ").count(), 2);
        assert!(out.contains("Valid answers are: y, n, yes, no"));
    }

    #[test]
    fn padded_answer_reprompts() {
        let mut c = confirmer(" y\nn\n");
        assert!(!c.confirm("Drop it? ").expect("answer"));
        let out = String::from_utf8(c.output.clone()).expect("utf8");
        assert_eq!(out.matches("Valid answers are").count(), 1);
    }

    #[test]
    fn closed_input_is_an_error() {
        let mut c = confirmer("maybe\n");
        let err = c.confirm("Drop it? ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallerError>(),
            Some(InstallerError::InputClosed)
        ));
    }

    #[test]
    fn menu_loops_until_valid_choice() {
        let mut c = confirmer("7\nabc\n2\n");
        let picked = c
            .choose_platform(Some(PlatformFamily::Fedora))
            .expect("menu");
        assert_eq!(picked, Some(PlatformFamily::Fedora));
        let out = String::from_utf8(c.output.clone()).expect("utf8");
        assert_eq!(out.matches("Incorrect choice!").count(), 2);
        assert!(out.contains("  2 : Fedora / RHEL (detected)"));
        assert!(out.contains("  3 : openSUSE / SLES\n"));
    }

    #[test]
    fn menu_zero_exits() {
        let mut c = confirmer("0\n");
        assert_eq!(c.choose_platform(None).expect("menu"), None);
    }
}
