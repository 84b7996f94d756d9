//! Context threaded through every engine entry point.
//!
//! Grounded on spec.md §9 ("Global state... Pass as a context parameter
//! threaded through the engine"): nowhere below this layer do we re-read
//! environment variables or git config directly.

/// Stack-layout strategy. See spec.md §3 "Two operating modes".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `base` is a synthetic branch owned by ghstack.
    Stack,
    /// `base` is an existing upstream branch (or the previous diff's head).
    Direct,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// GitHub login used to namespace branches: `gh/<username>/<n>/...`.
    pub username: String,
    /// Remote to read from and push to (default `origin`).
    pub remote: String,
    /// Upstream default branch (e.g. `main`), the bottom of every stack.
    pub default_branch: String,
    /// Forge repository owner.
    pub owner: String,
    /// Forge repository name.
    pub repo: String,
    pub mode: Mode,
    /// Safety throttle on stack length (spec.md §3, §5).
    pub max_stack_len: usize,
    /// Force past the length throttle / config drift / etc.
    pub force: bool,
    /// Overwrite PR title/body with the local commit message unconditionally,
    /// rather than preserving forge-side edits (spec.md §4.2, §4.5).
    pub update_fields: bool,
    /// Print what would happen without writing to `Git` or `Forge`.
    pub dry_run: bool,
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        username: impl Into<String>,
        remote: impl Into<String>,
        default_branch: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Config {
            username: username.into(),
            remote: remote.into(),
            default_branch: default_branch.into(),
            owner: owner.into(),
            repo: repo.into(),
            mode: Mode::Stack,
            max_stack_len: 8,
            force: false,
            update_fields: false,
            dry_run: false,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_update_fields(mut self, update_fields: bool) -> Self {
        self.update_fields = update_fields;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_max_stack_len(mut self, max_stack_len: usize) -> Self {
        self.max_stack_len = max_stack_len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stack_mode_with_throttle_eight() {
        let cfg = Config::new("alice", "origin", "main", "acme", "widgets");
        assert_eq!(cfg.mode, Mode::Stack);
        assert_eq!(cfg.max_stack_len, 8);
        assert!(!cfg.force);
        assert!(!cfg.update_fields);
        assert!(!cfg.dry_run);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = Config::new("alice", "origin", "main", "acme", "widgets")
            .with_mode(Mode::Direct)
            .with_force(true)
            .with_max_stack_len(3);
        assert_eq!(cfg.mode, Mode::Direct);
        assert!(cfg.force);
        assert_eq!(cfg.max_stack_len, 3);
    }
}
