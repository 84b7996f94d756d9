//! The error taxonomy described in spec.md §7.
//!
//! Engine code returns [`GhstackError`] so callers can match on the variant
//! (needed for the exit-code contract: 0 success, 1 user error, 2 invariant
//! violation). The CLI boundary wraps these in a `color_eyre::Report` for
//! pretty-printing but internal code never deals in opaque `eyre::Report`.

use thiserror::Error;

/// Distinct, user-visible failure modes of the submission/land/unlink
/// engines.
#[derive(Debug, Error)]
pub enum GhstackError {
    #[error("Cowardly refusing to submit an empty stack.")]
    EmptyStack,

    #[error(
        "Stack of {len} commits exceeds the configured limit of {limit}. Use --force to override."
    )]
    StackTooLong { len: usize, limit: usize },

    #[error(
        "Commit {oid} is a merge of an already-submitted gh/ branch. \
         This usually means you tried to re-submit a synthetic commit ghstack created; \
         check out the original branch instead."
    )]
    PoisonedHead { oid: String },

    #[error(
        "Botched rebase detected: commits {first} and {second} both carry ghstack-num {ghnum}. \
         Run `ghstack unlink` on one of them and resubmit."
    )]
    BotchedRebase {
        first: String,
        second: String,
        ghnum: u64,
    },

    #[error(
        "Cannot ghstack a stack with closed PR #{pr_number} whose branch was deleted. \
         Rebase the commit past it, or run `ghstack unlink`."
    )]
    ClosedPrBranchDeleted { pr_number: u64 },

    #[error(
        "Cowardly refusing to push an update to GitHub, since it looks another source has \
         updated GitHub since you last pushed for PR #{pr_number}. \
         Expected source-id {expected}, found {actual}."
    )]
    ConcurrentRemoteUpdate {
        pr_number: u64,
        expected: String,
        actual: String,
    },

    #[error(
        "PR #{pr_number} is not the head of its own stack: PR #{blocking_pr_number} below it \
         is not yet landed. Land that one first, or pass the lower PR's URL."
    )]
    LandNotHeadOfStack {
        pr_number: u64,
        blocking_pr_number: u64,
    },

    #[error(
        "Local branch for PR #{pr_number} no longer matches the commit last pushed to GitHub. \
         Someone updated the stack after your last `ghstack submit`; re-submit before landing."
    )]
    LandStaleLocalState { pr_number: u64 },

    #[error(
        "Failed to fast-forward {branch} after {attempts} retries; someone else landed first."
    )]
    LandNonFastForward { branch: String, attempts: u32 },

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("{forge} request failed: {message}")]
    ForgeTransient { forge: String, message: String },

    #[error("{forge} request failed: {message}")]
    ForgePermanent { forge: String, message: String },

    #[error(
        "internal invariant violated: {what}. This is a ghstack bug; please file a report with \
         the following diagnostics:\n{diagnostics}"
    )]
    InvariantViolation { what: String, diagnostics: String },
}

impl GhstackError {
    /// The exit code this error should map to, per spec.md §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            GhstackError::InvariantViolation { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, GhstackError>;
