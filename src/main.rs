use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use owo_colors::OwoColorize;

use ghstack::classifier::Classification;
use ghstack::config::{Config, Mode};
use ghstack::forge::OctocrabForge;
use ghstack::git::GixGit;
use ghstack::{land, status, submit, unlink};

/// Turns a linear stack of local commits into a fan of linked GitHub pull
/// requests, one per commit, kept in sync across amends and rebases.
#[derive(Parser)]
#[command(name = "ghstack", version)]
struct Cli {
    /// Repository root. Defaults to the current directory.
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Remote to read from and push to.
    #[arg(long, global = true, default_value = "origin")]
    remote: String,

    /// Upstream default branch, the bottom of every stack.
    #[arg(long, global = true, default_value = "main")]
    base: String,

    /// Operate in direct mode (no synthetic base branches).
    #[arg(long, global = true)]
    direct: bool,

    /// Push past the stack-length throttle and closed-PR checks.
    #[arg(long, global = true)]
    force: bool,

    /// Print what would happen without writing to git or the forge.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Overwrite PR title/body with the local commit message unconditionally.
    #[arg(long, global = true)]
    update_fields: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push the current stack (or the stack rooted at REV) to the forge.
    Submit {
        #[arg(default_value = "HEAD")]
        rev: String,
        /// Restrict to these commits only; the rest of the stack is still
        /// walked and validated but left untouched. May be repeated.
        #[arg(long = "only")]
        only: Vec<String>,
    },
    /// Land PR_NUMBER and every PR below it in its stack.
    Land { pr_number: u64 },
    /// Strip ghstack trailers from local commits, leaving the forge alone.
    Unlink {
        #[arg(default_value = "HEAD")]
        rev: String,
    },
    /// Show how the current stack would be classified, without writing anything.
    Status {
        #[arg(default_value = "HEAD")]
        rev: String,
        /// Restrict the report to these commits only.
        #[arg(long = "only")]
        only: Vec<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(gh_err) = err.downcast_ref::<ghstack::error::GhstackError>() {
                eprintln!("{}", format!("error: {gh_err}").red());
                std::process::exit(gh_err.exit_code());
            }
            Err(err)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let git = GixGit::open(&cli.repo).wrap_err("failed to open repository")?;

    let username = git_config(&cli.repo, "ghstack.github_username")
        .or_else(|| std::env::var("GHSTACK_USERNAME").ok())
        .ok_or_else(|| eyre!("no GitHub username configured (set ghstack.github_username or GHSTACK_USERNAME)"))?;
    let (owner, repo) = resolve_owner_repo(&cli.repo, &cli.remote)?;

    let mode = if cli.direct { Mode::Direct } else { Mode::Stack };
    let config = Config::new(username, cli.remote.clone(), cli.base.clone(), owner, repo)
        .with_mode(mode)
        .with_force(cli.force)
        .with_dry_run(cli.dry_run)
        .with_update_fields(cli.update_fields);

    let token = std::env::var("GITHUB_TOKEN")
        .or_else(|_| std::env::var("GH_TOKEN"))
        .map_err(|_| eyre!("set GITHUB_TOKEN (or GH_TOKEN) to a personal access token"))?;
    let forge = OctocrabForge::new(token)?;

    match &cli.command {
        Command::Submit { rev, only } => {
            if config.dry_run {
                let rows = status::status(&git, &forge, &config, rev, only)?;
                for row in rows {
                    let verdict = match row.classification {
                        Classification::New => "would create".to_string(),
                        Classification::Skip { pr_number, .. } => format!("unchanged (#{pr_number})"),
                        Classification::Update { pr_number, .. } => format!("would update (#{pr_number})"),
                    };
                    println!("{:<40} {verdict}", row.commit.oid);
                }
            } else {
                let rows = submit::submit(&git, &forge, &config, rev, only)?;
                for row in rows {
                    println!("{:>8}  {:?}  {}", row.pr_number, row.action, row.pr_url);
                }
            }
        }
        Command::Land { pr_number } => {
            let landed = land::land(&git, &forge, &config, *pr_number)?;
            for entry in landed {
                println!("landed gh/{}/{} (PR #{})", config.username, entry.ghnum, entry.pr_number);
            }
        }
        Command::Unlink { rev } => {
            let stack = ghstack::selector::select_stack(&git, &config, rev)?;
            let commits = stack
                .commits
                .iter()
                .map(|c| (c.oid.clone(), c.message.clone()))
                .collect::<Vec<_>>();
            unlink::unlink(&git, &commits)?;
        }
        Command::Status { rev, only } => {
            let rows = status::status(&git, &forge, &config, rev, only)?;
            for row in rows {
                let verdict = match row.classification {
                    Classification::New => "new".to_string(),
                    Classification::Skip { pr_number, .. } => format!("unchanged (#{pr_number})"),
                    Classification::Update { pr_number, .. } => format!("update (#{pr_number})"),
                };
                println!("{:<40} {verdict}", row.commit.oid);
            }
        }
    }

    Ok(())
}

fn git_config(repo: &std::path::Path, key: &str) -> Option<String> {
    let output = ghstack::cmd!("git config --get {key}")
        .current_dir(repo)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(ghstack::util::to_trimmed_string_lossy(&output.stdout))
}

/// Resolves `(owner, repo)` from the configured remote's URL, accepting
/// both `git@github.com:owner/repo.git` and `https://github.com/owner/repo`
/// forms.
fn resolve_owner_repo(repo: &std::path::Path, remote: &str) -> Result<(String, String)> {
    let output = ghstack::cmd!("git remote get-url {remote}")
        .current_dir(repo)
        .output()
        .wrap_err("failed to read remote url")?;
    if !output.status.success() {
        return Err(eyre!("remote {remote} is not configured"));
    }
    let url = ghstack::util::to_trimmed_string_lossy(&output.stdout);
    parse_owner_repo(&url).ok_or_else(|| eyre!("could not parse owner/repo from remote url: {url}"))
}

fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let stripped = url.strip_suffix(".git").unwrap_or(url);
    let tail = stripped
        .rsplit_once("github.com:")
        .or_else(|| stripped.rsplit_once("github.com/"))
        .map(|(_, tail)| tail)?;
    let (owner, repo) = tail.split_once('/')?;
    Some((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ssh_remote_url() {
        let (owner, repo) = parse_owner_repo("git@github.com:acme/widgets.git").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn parses_https_remote_url() {
        let (owner, repo) = parse_owner_repo("https://github.com/acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }
}
