// Fatal installer errors
//
// Everything in here aborts the run before (or instead of) the next mutating step.
// Best-effort command failures are NOT errors; see `installation::CommandOutcome`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("Please execute this installer as root! Exiting...")]
    NotRoot,

    #[error("Directory {} already exists. Delete this directory or choose another one.", .0.display())]
    InstallDirExists(PathBuf),

    #[error("Configuration file {} could not be found! Exiting...", .0.display())]
    StateMissing(PathBuf),

    #[error("Configuration file {} is malformed: {reason}", .path.display())]
    StateMalformed { path: PathBuf, reason: String },

    #[error("User '{0}' does not exist on this system")]
    UnknownUser(String),

    #[error("Unable to read host resources: {0}")]
    HostFacts(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Command '{program}' failed (operation={operation}, exit_code={exit_code:?})")]
    CommandFailed {
        program: String,
        operation: String,
        exit_code: Option<i32>,
    },

    #[error("Input closed while waiting for an answer")]
    InputClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_single_line() {
        let errors = vec![
            InstallerError::NotRoot,
            InstallerError::InstallDirExists(PathBuf::from("/opt/koozic-v2")),
            InstallerError::StateMissing(PathBuf::from("/etc/koozic-install.conf")),
            InstallerError::StateMalformed {
                path: PathBuf::from("/etc/koozic-install.conf"),
                reason: "missing USER".to_string(),
            },
            InstallerError::UnknownUser("nobody-here".to_string()),
        ];
        for e in errors {
            assert!(!e.to_string().contains('\n'), "multi-line message: {}", e);
        }
    }

    #[test]
    fn install_dir_exists_names_the_directory() {
        let e = InstallerError::InstallDirExists(PathBuf::from("/opt/koozic-v2"));
        assert!(e.to_string().contains("/opt/koozic-v2"));
    }
}
