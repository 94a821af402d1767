//! `git` subprocess backend

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::{Result, StashEntry, VcsBackend, VcsError};

/// A repository driven through the `git` binary
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the repository containing `dir`
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidate = Self::new(dir);
        let top = candidate.run(&["rev-parse", "--show-toplevel"])?;
        Ok(Self::new(top.trim()))
    }

    fn command_line(args: &[&str]) -> String {
        format!("git {}", args.join(" "))
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        tracing::debug!(dir = %self.root.display(), "{}", Self::command_line(args));
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|source| VcsError::Spawn {
                command: Self::command_line(args),
                dir: self.root.clone(),
                source,
            })
    }

    fn failed(args: &[&str], output: &Output) -> VcsError {
        VcsError::Failed {
            command: Self::command_line(args),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Run and return stdout; non-zero exit is an error
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(Self::failed(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a query where exit status 1 means "no answer"
    fn query(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.output(args)?;
        match output.status.code() {
            Some(0) => {
                let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok(if out.is_empty() { None } else { Some(out) })
            }
            Some(1) => Ok(None),
            _ => Err(Self::failed(args, &output)),
        }
    }

    fn status_lines(&self, pathspec: Option<&str>) -> Result<String> {
        let mut args = vec!["status", "--porcelain", "--untracked-files=all"];
        if let Some(spec) = pathspec {
            args.extend(["--", spec]);
        }
        self.run(&args)
    }
}

impl VcsBackend for Git {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_initialized(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|source| VcsError::Spawn {
            command: "mkdir".to_string(),
            dir: self.root.clone(),
            source,
        })?;
        self.run(&["init", "--quiet"])?;
        Ok(())
    }

    fn commit_all(&self, pathspec: &str, message: &str, allow_empty: bool) -> Result<bool> {
        let changed = !self.status_lines(Some(pathspec))?.trim().is_empty();
        if changed {
            self.run(&["add", "--all", "--", pathspec])?;
        } else if !allow_empty {
            return Ok(false);
        }

        let mut args = vec!["commit", "--quiet", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run(&args)?;
        Ok(true)
    }

    fn tag_head(&self, name: &str) -> Result<()> {
        self.run(&["tag", "--force", name])?;
        Ok(())
    }

    fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        let spec = format!("{}^{{commit}}", rev);
        self.query(&["rev-parse", "--verify", "--quiet", &spec])
    }

    fn is_merge_commit(&self, rev: &str) -> Result<bool> {
        Ok(self.rev_parse(&format!("{}^2", rev))?.is_some())
    }

    fn author(&self) -> Result<Option<String>> {
        self.query(&["config", "user.email"])
    }

    fn commit_time(&self, rev: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(sha) = self.rev_parse(rev)? else {
            return Ok(None);
        };
        let args = ["log", "-1", "--format=%ct", sha.as_str()];
        let out = self.run(&args)?;
        let secs: i64 = out.trim().parse().map_err(|_| VcsError::Parse {
            command: Self::command_line(&args),
            detail: format!("not a unix timestamp: {:?}", out.trim()),
        })?;
        Ok(DateTime::<Utc>::from_timestamp(secs, 0))
    }

    fn find_commit_by_subject(&self, subject: &str) -> Result<Option<String>> {
        // refs/stash is left out: stash commits embed the HEAD subject.
        let grep = format!("--grep=^{}$", escape_basic_regex(subject));
        let out = self.run(&[
            "log",
            "--branches",
            "--tags",
            &grep,
            "--format=%H",
            "-n",
            "1",
        ])?;
        Ok(out.lines().next().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()))
    }

    fn root_commit(&self) -> Result<Option<String>> {
        let out = self.run(&[
            "rev-list",
            "--max-parents=0",
            "--branches",
            "--tags",
            "--reverse",
        ])?;
        Ok(out.lines().next().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()))
    }

    fn checkout(&self, rev: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", rev])?;
        Ok(())
    }

    fn stash_list(&self) -> Result<Vec<StashEntry>> {
        let out = self.run(&["stash", "list", "--format=%gd%x09%gs"])?;
        Ok(parse_stash_list(&out))
    }

    fn stash_push(&self, message: &str) -> Result<bool> {
        if !self.has_uncommitted_changes()? {
            return Ok(false);
        }
        self.run(&["stash", "push", "--include-untracked", "--quiet", "-m", message])?;
        Ok(true)
    }

    fn stash_pop(&self, reference: &str) -> Result<()> {
        self.run(&["stash", "pop", "--quiet", reference])?;
        Ok(())
    }

    fn stash_drop(&self, reference: &str) -> Result<()> {
        self.run(&["stash", "drop", "--quiet", reference])?;
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(!self.status_lines(None)?.trim().is_empty())
    }

    fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.query(&["config", "--local", "--get", key])
    }

    fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.run(&["config", "--local", key, value])?;
        Ok(())
    }
}

/// Fresh repository with a local identity in a temp dir, `None` when no
/// `git` binary is installed
#[cfg(test)]
pub(crate) fn scratch_repo() -> Option<(tempfile::TempDir, Git)> {
    let available = Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("git not installed, skipping");
        return None;
    }
    let dir = tempfile::tempdir().unwrap();
    let git = Git::new(dir.path());
    git.init().unwrap();
    git.config_set("user.name", "test").unwrap();
    git.config_set("user.email", "test@example.com").unwrap();
    git.config_set("commit.gpgsign", "false").unwrap();
    Some((dir, git))
}

/// Escape the characters special to git's default (basic) regex dialect
fn escape_basic_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '.' | '[' | ']' | '*' | '^' | '$') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Parse `stash list --format=%gd%x09%gs` output
fn parse_stash_list(out: &str) -> Vec<StashEntry> {
    out.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match line.split_once('\t') {
            Some((reference, message)) => Some(StashEntry {
                reference: reference.trim().to_string(),
                message: message.trim().to_string(),
            }),
            None => {
                tracing::warn!("ignoring unrecognised stash line: {}", line);
                None
            }
        })
        .collect()
}
