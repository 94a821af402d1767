//! In-memory backend for tests
//!
//! Models just enough of a repository for the sync and capture state
//! machines: a linear list of commits holding file maps, a working tree, a
//! stash stack and local config. Any operation can be made to fail.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::{Result, StashEntry, VcsBackend, VcsError};

type Tree = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct FakeCommit {
    pub id: String,
    pub message: String,
    pub parents: Vec<String>,
    pub tree: Tree,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    commits: Vec<FakeCommit>,
    head: Option<String>,
    worktree: Tree,
    /// Newest first: (subject, saved tree)
    stashes: Vec<(String, Tree)>,
    config: HashMap<String, String>,
    tags: HashMap<String, String>,
    author: Option<String>,
    failing: HashSet<&'static str>,
    calls: Vec<String>,
}

pub struct FakeVcs {
    root: PathBuf,
    state: RefCell<State>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/fake/repo"),
            state: RefCell::new(State::default()),
        }
    }

    /// Initialized repo with a single empty root commit checked out
    pub fn with_root() -> Self {
        let fake = Self::new();
        fake.init().unwrap();
        fake.commit_all("*", "Initial Claude sessions", true).unwrap();
        fake
    }

    pub fn set_author(&self, author: &str) {
        self.state.borrow_mut().author = Some(author.to_string());
    }

    /// Add a commit directly (primary-repo style), with explicit parents
    pub fn add_commit(&self, id: &str, parents: &[&str], time: Option<DateTime<Utc>>) {
        let mut st = self.state.borrow_mut();
        st.initialized = true;
        let tree = st.worktree.clone();
        st.commits.push(FakeCommit {
            id: id.to_string(),
            message: format!("commit {}", id),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            tree,
            time,
        });
        st.head = Some(id.to_string());
    }

    pub fn write_file(&self, name: &str, content: &str) {
        self.state
            .borrow_mut()
            .worktree
            .insert(name.to_string(), content.to_string());
    }

    pub fn file(&self, name: &str) -> Option<String> {
        self.state.borrow().worktree.get(name).cloned()
    }

    pub fn head(&self) -> Option<String> {
        self.state.borrow().head.clone()
    }

    pub fn commits(&self) -> Vec<FakeCommit> {
        self.state.borrow().commits.clone()
    }

    pub fn stash_messages(&self) -> Vec<String> {
        self.state
            .borrow()
            .stashes
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn tag(&self, name: &str) -> Option<String> {
        self.state.borrow().tags.get(name).cloned()
    }

    pub fn fail(&self, op: &'static str) {
        self.state.borrow_mut().failing.insert(op);
    }

    pub fn heal(&self, op: &'static str) {
        self.state.borrow_mut().failing.remove(op);
    }

    /// Operations invoked so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    fn enter(&self, op: &'static str) -> Result<()> {
        let mut st = self.state.borrow_mut();
        st.calls.push(op.to_string());
        if st.failing.contains(op) {
            return Err(VcsError::Failed {
                command: format!("git {}", op),
                status: "exit status: 1".to_string(),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn head_tree(st: &State) -> Tree {
        st.head
            .as_ref()
            .and_then(|h| st.commits.iter().find(|c| &c.id == h))
            .map(|c| c.tree.clone())
            .unwrap_or_default()
    }

    fn resolve(st: &State, rev: &str) -> Option<String> {
        let (base, up) = match rev.strip_suffix("^2") {
            Some(b) => (b, Some(1)),
            None => match rev.strip_suffix('^') {
                Some(b) => (b, Some(0)),
                None => (rev, None),
            },
        };
        let base = if base == "HEAD" {
            st.head.clone()?
        } else if let Some(tagged) = st.tags.get(base) {
            tagged.clone()
        } else {
            st.commits
                .iter()
                .find(|c| c.id == base || c.id.starts_with(base))?
                .id
                .clone()
        };
        match up {
            None => Some(base),
            Some(n) => st
                .commits
                .iter()
                .find(|c| c.id == base)?
                .parents
                .get(n)
                .cloned(),
        }
    }

    fn stash_index(reference: &str) -> Option<usize> {
        reference
            .strip_prefix("stash@{")?
            .strip_suffix('}')?
            .parse()
            .ok()
    }
}

impl VcsBackend for FakeVcs {
    fn root(&self) -> &Path {
        &self.root
    }

    fn is_initialized(&self) -> bool {
        self.state.borrow().initialized
    }

    fn init(&self) -> Result<()> {
        self.enter("init")?;
        self.state.borrow_mut().initialized = true;
        Ok(())
    }

    fn commit_all(&self, _pathspec: &str, message: &str, allow_empty: bool) -> Result<bool> {
        self.enter("commit")?;
        let mut st = self.state.borrow_mut();
        let dirty = st.worktree != Self::head_tree(&st);
        if !dirty && !allow_empty {
            return Ok(false);
        }
        let id = format!("{:040x}", st.commits.len() + 1);
        let parents = st.head.iter().cloned().collect();
        let tree = st.worktree.clone();
        st.commits.push(FakeCommit {
            id: id.clone(),
            message: message.to_string(),
            parents,
            tree,
            time: None,
        });
        st.head = Some(id);
        Ok(true)
    }

    fn tag_head(&self, name: &str) -> Result<()> {
        self.enter("tag")?;
        let mut st = self.state.borrow_mut();
        if let Some(head) = st.head.clone() {
            st.tags.insert(name.to_string(), head);
        }
        Ok(())
    }

    fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        self.enter("rev-parse")?;
        Ok(Self::resolve(&self.state.borrow(), rev))
    }

    fn is_merge_commit(&self, rev: &str) -> Result<bool> {
        Ok(self.rev_parse(&format!("{}^2", rev))?.is_some())
    }

    fn author(&self) -> Result<Option<String>> {
        self.enter("author")?;
        Ok(self.state.borrow().author.clone())
    }

    fn commit_time(&self, rev: &str) -> Result<Option<DateTime<Utc>>> {
        self.enter("commit-time")?;
        let st = self.state.borrow();
        let Some(id) = Self::resolve(&st, rev) else {
            return Ok(None);
        };
        Ok(st.commits.iter().find(|c| c.id == id).and_then(|c| c.time))
    }

    fn find_commit_by_subject(&self, subject: &str) -> Result<Option<String>> {
        self.enter("log")?;
        Ok(self
            .state
            .borrow()
            .commits
            .iter()
            .rev()
            .find(|c| c.message.lines().any(|l| l == subject))
            .map(|c| c.id.clone()))
    }

    fn root_commit(&self) -> Result<Option<String>> {
        self.enter("rev-list")?;
        Ok(self.state.borrow().commits.first().map(|c| c.id.clone()))
    }

    fn checkout(&self, rev: &str) -> Result<()> {
        self.enter("checkout")?;
        let mut st = self.state.borrow_mut();
        let id = Self::resolve(&st, rev).ok_or_else(|| VcsError::Failed {
            command: format!("git checkout {}", rev),
            status: "exit status: 1".to_string(),
            stderr: "unknown revision".to_string(),
        })?;
        if st.worktree != Self::head_tree(&st) {
            return Err(VcsError::Failed {
                command: format!("git checkout {}", rev),
                status: "exit status: 1".to_string(),
                stderr: "local changes would be overwritten".to_string(),
            });
        }
        st.head = Some(id);
        st.worktree = Self::head_tree(&st);
        Ok(())
    }

    fn stash_list(&self) -> Result<Vec<StashEntry>> {
        self.enter("stash-list")?;
        Ok(self
            .state
            .borrow()
            .stashes
            .iter()
            .enumerate()
            .map(|(i, (message, _))| StashEntry {
                reference: format!("stash@{{{}}}", i),
                message: message.clone(),
            })
            .collect())
    }

    fn stash_push(&self, message: &str) -> Result<bool> {
        self.enter("stash-push")?;
        let mut st = self.state.borrow_mut();
        let clean = Self::head_tree(&st);
        if st.worktree == clean {
            return Ok(false);
        }
        let saved = std::mem::replace(&mut st.worktree, clean);
        st.stashes
            .insert(0, (format!("On (no branch): {}", message), saved));
        Ok(true)
    }

    fn stash_pop(&self, reference: &str) -> Result<()> {
        self.enter("stash-pop")?;
        let mut st = self.state.borrow_mut();
        let idx = Self::stash_index(reference)
            .filter(|i| *i < st.stashes.len())
            .ok_or_else(|| VcsError::Failed {
                command: format!("git stash pop {}", reference),
                status: "exit status: 1".to_string(),
                stderr: "no such stash".to_string(),
            })?;
        let (_, tree) = st.stashes.remove(idx);
        st.worktree = tree;
        Ok(())
    }

    fn stash_drop(&self, reference: &str) -> Result<()> {
        self.enter("stash-drop")?;
        let mut st = self.state.borrow_mut();
        if let Some(idx) = Self::stash_index(reference).filter(|i| *i < st.stashes.len()) {
            st.stashes.remove(idx);
        }
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        self.enter("status")?;
        let st = self.state.borrow();
        Ok(st.worktree != Self::head_tree(&st))
    }

    fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.enter("config-get")?;
        Ok(self.state.borrow().config.get(key).cloned())
    }

    fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.enter("config-set")?;
        self.state
            .borrow_mut()
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
