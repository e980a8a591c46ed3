//! Session state carried across a run: the open repository and whichever
//! transaction is currently in progress, if any.

use fsfs_core::Rev;
use fsfs_engine::{Repo, RepoConfig, Transaction};
use std::path::{Path, PathBuf};

pub struct SessionState {
    pub repo_path: PathBuf,
    pub repo: Option<Repo>,
    pub txn: Option<Transaction>,
}

impl SessionState {
    pub fn new(repo_path: PathBuf) -> Self {
        SessionState { repo_path, repo: None, txn: None }
    }

    pub fn open_existing(repo_path: &Path) -> Result<Self, String> {
        let repo = Repo::open(repo_path, RepoConfig::default()).map_err(|e| e.to_string())?;
        Ok(SessionState { repo_path: repo_path.to_path_buf(), repo: Some(repo), txn: None })
    }

    pub fn init(&mut self) -> Result<Rev, String> {
        if self.repo.is_some() {
            return Err("repository is already open".to_string());
        }
        let repo = Repo::create(&self.repo_path, RepoConfig::default()).map_err(|e| e.to_string())?;
        let youngest = repo.youngest();
        self.repo = Some(repo);
        Ok(youngest)
    }

    pub fn repo_mut(&mut self) -> Result<&mut Repo, String> {
        self.repo.as_mut().ok_or_else(|| "no repository open; run `init` first".to_string())
    }

    /// Returns the open repository and the in-progress transaction as a
    /// disjoint pair of borrows, beginning a transaction against the
    /// repository's current revision if none is active yet.
    pub fn repo_and_txn(&mut self) -> Result<(&mut Repo, &mut Transaction), String> {
        if self.txn.is_none() {
            let repo = self.repo.as_ref().ok_or_else(|| "no repository open; run `init` first".to_string())?;
            let txn = repo.begin().map_err(|e| e.to_string())?;
            self.txn = Some(txn);
        }
        let repo = self.repo.as_mut().ok_or_else(|| "no repository open; run `init` first".to_string())?;
        let txn = self.txn.as_mut().expect("just ensured Some");
        Ok((repo, txn))
    }

    pub fn commit(&mut self) -> Result<Rev, String> {
        let txn = self.txn.take().ok_or_else(|| "no transaction in progress".to_string())?;
        let repo = self.repo.as_mut().ok_or_else(|| "no repository open".to_string())?;
        repo.commit(txn).map_err(|e| e.to_string())
    }

    pub fn abort(&mut self) -> Result<(), String> {
        let txn = self.txn.take().ok_or_else(|| "no transaction in progress".to_string())?;
        let repo = self.repo.as_mut().ok_or_else(|| "no repository open".to_string())?;
        repo.abort(txn).map_err(|e| e.to_string())
    }
}
