use std::{fs, path::PathBuf};

use tempfile::TempDir;

pub mod mock_server;

#[macro_export]
macro_rules! test_context {
    () => {
        $crate::TestContextBuilder::new().binary(assert_cmd::cargo::cargo_bin!("ghstack"))
    };
}

pub struct TestContextBuilder {
    owner: String,
    name: String,
    username: String,
    initial_commit: bool,
    ghstack_bin: Option<PathBuf>,
}

impl Default for TestContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContextBuilder {
    pub fn new() -> Self {
        Self {
            owner: "owner".to_string(),
            name: "repo".to_string(),
            username: "alice".to_string(),
            initial_commit: true,
            ghstack_bin: None,
        }
    }

    pub fn binary(&mut self, ghstack: impl Into<PathBuf>) -> &mut Self {
        self.ghstack_bin = Some(ghstack.into());
        self
    }

    pub fn owner(&mut self, owner: &str) -> &mut Self {
        self.owner = owner.to_string();
        self
    }

    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }

    pub fn username(&mut self, username: &str) -> &mut Self {
        self.username = username.to_string();
        self
    }

    pub fn initial_commit(&mut self, initial_commit: bool) -> &mut Self {
        self.initial_commit = initial_commit;
        self
    }

    pub fn build(&self) -> TestContext {
        let dir = TempDir::new().unwrap();
        let repo_path = dir.path().join("local");
        fs::create_dir(&repo_path).unwrap();

        let remote_path = dir.path().join("remote.git");
        init_git_bare_repo(&remote_path);
        init_git_repo(&repo_path, &remote_path);

        let ghstack_bin = self.ghstack_bin.clone().expect("ghstack binary path must be set");

        let state = mock_server::MockState {
            repo_owner: self.owner.clone(),
            repo_name: self.name.clone(),
            ..Default::default()
        };
        let state_path = repo_path.join("mock_state.json");
        mock_server::write_state(&state_path, &state);

        let (tx, rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let state_path_for_server = state_path.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build runtime");
            rt.block_on(async {
                let url = mock_server::start_mock_server(state_path_for_server).await;
                tx.send(url).expect("failed to send mock server url");
                let _ = shutdown_rx.await;
            });
        });
        let mock_server_url = rx.recv().unwrap();

        let ctx = TestContext {
            dir,
            repo_path,
            remote_path,
            username: self.username.clone(),
            ghstack_bin_path: ghstack_bin,
            mock_server_url,
            shutdown_tx: Some(shutdown_tx),
            state_path,
        };

        if self.initial_commit {
            ctx.commit("Initial commit");
        }

        ctx
    }
}

pub struct TestContext {
    pub dir: TempDir,
    pub repo_path: PathBuf,
    pub remote_path: PathBuf,
    pub username: String,
    pub ghstack_bin_path: PathBuf,
    pub mock_server_url: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    state_path: PathBuf,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl TestContext {
    pub fn ghstack(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new(&self.ghstack_bin_path);
        cmd.current_dir(&self.repo_path);
        cmd.env("GHSTACK_USERNAME", &self.username);
        cmd.env("GITHUB_TOKEN", "mock-token");
        cmd.env("GHSTACK_GITHUB_API_URL", &self.mock_server_url);
        cmd
    }

    pub fn run_git(&self, args: &[&str]) {
        self.git().args(args).assert().success();
    }

    pub fn git(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new("git");
        cmd.current_dir(&self.repo_path);
        cmd
    }

    pub fn remote_git(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::new("git");
        cmd.current_dir(&self.remote_path);
        cmd
    }

    pub fn read_mock_state(&self) -> mock_server::MockState {
        mock_server::read_state(&self.state_path)
    }

    pub fn commit(&self, msg: &str) {
        self.run_git(&["commit", "--allow-empty", "-m", msg]);
    }

    pub fn amend(&self, msg: &str) {
        self.run_git(&["commit", "--amend", "-m", msg]);
    }

    pub fn inject_failure(&self, request_type: &str, remaining: usize) {
        let mut state = self.read_mock_state();
        state.fail_next_request = Some(request_type.to_string());
        state.fail_remaining = remaining;
        mock_server::write_state(&self.state_path, &state);
    }
}

fn run_git_cmd(path: &std::path::Path, args: &[&str]) {
    assert_cmd::Command::new("git").current_dir(path).args(args).assert().success();
}

pub fn init_git_bare_repo(path: &std::path::Path) {
    fs::create_dir(path).unwrap();
    run_git_cmd(path, &["init", "--bare"]);
}

fn init_git_repo(path: &std::path::Path, remote_path: &std::path::Path) {
    run_git_cmd(path, &["init"]);
    run_git_cmd(path, &["config", "user.email", "test@example.com"]);
    run_git_cmd(path, &["config", "user.name", "Test User"]);
    run_git_cmd(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    run_git_cmd(path, &["remote", "add", "origin", remote_path.to_str().unwrap()]);
}

