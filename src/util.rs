//! Small shared helpers: the `cmd!`/`re!` macros and `Command` extensions.

use std::ffi::OsStr;
use std::process::{Command, ExitStatus, Output};

/// Builds a [`Command`], splitting string-literal pieces on whitespace and
/// passing expressions through as single arguments. Used for the handful of
/// git plumbing operations (`push`, `fetch`) that need a real subprocess
/// rather than `gix`'s in-process object/ref access.
#[macro_export]
macro_rules! cmd {
    ($bin:literal $(, $($rest:tt)*)?) => {{
        let bin_str = format!($bin);
        let parts: Vec<&str> = bin_str.split_whitespace().collect();
        let (bin, pre_args) = match parts.as_slice() {
            [bin, args @ ..] => (bin, args),
            [] => panic!("Command cannot be empty"),
        };

        #[allow(unused_mut)]
        let mut args: Vec<String> = pre_args.iter().map(|s| s.to_string()).collect();
        $crate::cmd!(@inner args $(, $($rest)*)?);

        log::debug!("exec: {} {}", bin, args.iter().map(|s| if s.contains(' ') {
            format!("'{}'", s)
        } else {
            s.clone()
        }).collect::<Vec<_>>().join(" "));
        $crate::util::cmd(bin, &args)
    }};

    // Parenthesized group: ($(...))
    (@inner $vec:ident, ($($fmt:tt)+) $(, $($rest:tt)*)?) => {
        $vec.push(format!($($fmt)+));
        $crate::cmd!(@inner $vec $(, $($rest)*)?);
    };

    // String literal (treated as a format string)
    (@inner $vec:ident, $l:literal $(, $($rest:tt)*)?) => {
        let formatted = format!($l);
        for s in formatted.split_whitespace() {
            $vec.push(s.to_string());
        }
        $crate::cmd!(@inner $vec $(, $($rest)*)?);
    };

    // Spread: extend with all elements of a `Vec<String>`/slice expression
    (@inner $vec:ident, ...$e:expr $(, $($rest:tt)*)?) => {
        $vec.extend($e.into_iter().map(|s| s.to_string()));
        $crate::cmd!(@inner $vec $(, $($rest)*)?);
    };

    // Expression
    (@inner $vec:ident, $e:expr $(, $($rest:tt)*)?) => {
        $vec.push($e.to_string());
        $crate::cmd!(@inner $vec $(, $($rest)*)?);
    };

    // Base cases
    (@inner $vec:ident $(,)?) => {};
}

/// Defines (or inline-evaluates) a lazily compiled, process-wide regex.
#[macro_export]
macro_rules! re {
    ($name:ident, $re:literal) => {
        fn $name() -> &'static regex::Regex {
            re!(@inner $re)
        }
    };
    ($re:literal) => {
        (|| -> &'static regex::Regex { re!(@inner $re) })()
    };
    (@inner $re:literal) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

pub fn cmd<I: AsRef<OsStr>>(name: &str, args: impl IntoIterator<Item = I>) -> Command {
    let mut c = Command::new(name);
    c.args(args);
    c
}

pub trait CommandExt {
    /// Runs the command, surfacing a [`crate::error::GhstackError::Git`]
    /// naming the offending command rather than panicking, per spec.md §7
    /// ("Git error — surfaced verbatim with the command that failed").
    fn run_checked(self, label: &str) -> crate::error::Result<Output>;
    fn run_status_checked(self, label: &str) -> crate::error::Result<ExitStatus>;
}

impl CommandExt for Command {
    fn run_checked(mut self, label: &str) -> crate::error::Result<Output> {
        let output = self.output().map_err(|e| crate::error::GhstackError::Git {
            command: label.to_string(),
            stderr: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(crate::error::GhstackError::Git {
                command: label.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run_status_checked(mut self, label: &str) -> crate::error::Result<ExitStatus> {
        let status = self.status().map_err(|e| crate::error::GhstackError::Git {
            command: label.to_string(),
            stderr: e.to_string(),
        })?;
        if !status.success() {
            return Err(crate::error::GhstackError::Git {
                command: label.to_string(),
                stderr: format!("exited with {status}"),
            });
        }
        Ok(status)
    }
}

pub fn to_trimmed_string_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_builds_program_and_args() {
        let c = cmd("git", ["status", "--short"]);
        assert_eq!(c.get_program(), "git");
        let args: Vec<_> = c.get_args().collect();
        assert_eq!(args, ["status", "--short"]);
    }

    #[test]
    fn cmd_macro_splits_literal_and_keeps_expr_whole() {
        let branch = "feature/with spaces";
        let c = cmd!("git push origin", branch);
        assert_eq!(c.get_program(), "git");
        let args: Vec<_> =
            c.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["push", "origin", branch]);
    }
}
