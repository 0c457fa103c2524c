//! Handle to one repository folder

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::names::{decode_component, encode_component};
use crate::record::{RecordPatch, RepositoryRecord};
use crate::{BRANCHES_DIR, CONFIGURATION_FILE, LOGS_DIR, SCRIPTS_DIR, script_extension};

/// A repository folder on disk
///
/// The handle holds no record state: every accessor reads the `.conf` file
/// again, and [`Repository::update`] re-reads before it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    slug: String,
    dir: PathBuf,
}

impl Repository {
    /// Open an existing repository folder, creating its sub-folders if needed
    pub(crate) fn open(root: &Path, slug: &str) -> Result<Self, StoreError> {
        debug!(%slug, "Repository::open: called");
        let repo = Self {
            slug: slug.to_string(),
            dir: root.join(slug),
        };
        // Fails fast when the folder does not hold a valid record
        repo.record()?;
        repo.ensure_folders()?;
        Ok(repo)
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn conf_path(&self) -> PathBuf {
        self.dir.join(CONFIGURATION_FILE)
    }

    pub fn branches_dir(&self) -> PathBuf {
        self.dir.join(BRANCHES_DIR)
    }

    /// Working-tree directory for a branch (may not exist)
    pub fn branch_path(&self, branch_name: &str) -> PathBuf {
        self.branches_dir().join(encode_component(branch_name))
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.dir.join(SCRIPTS_DIR)
    }

    /// Script file for a script name (may not exist)
    pub fn script_path(&self, script_name: &str) -> PathBuf {
        self.scripts_dir()
            .join(format!("{}{}", encode_component(script_name), script_extension()))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join(LOGS_DIR)
    }

    /// Read and parse the record from disk
    pub fn record(&self) -> Result<RepositoryRecord, StoreError> {
        let path = self.conf_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(slug = %self.slug, "Repository::record: no record file");
                return Err(StoreError::NotFound(self.slug.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| StoreError::Invalid {
            slug: self.slug.clone(),
            reason: e.to_string(),
        })
    }

    /// Overwrite the record on disk
    pub fn save(&self, record: &RepositoryRecord) -> Result<(), StoreError> {
        debug!(slug = %self.slug, "Repository::save: called");
        let tmp = self.dir.join(format!("{}.tmp", CONFIGURATION_FILE));
        fs::write(&tmp, serde_json::to_string(record)?)?;
        fs::rename(&tmp, self.conf_path())?;
        Ok(())
    }

    /// Re-read the record, check its identity, merge the patch and write it back
    pub fn update(&self, expected_id: &str, patch: RecordPatch) -> Result<RepositoryRecord, StoreError> {
        debug!(slug = %self.slug, %expected_id, "Repository::update: called");
        let current = self.record()?;

        if current.repository_id != expected_id {
            debug!(found = %current.repository_id, "Repository::update: identity mismatch");
            return Err(StoreError::IdentityMismatch {
                slug: self.slug.clone(),
                expected: expected_id.to_string(),
                found: current.repository_id,
            });
        }

        if patch.is_empty() {
            debug!("Repository::update: empty patch, nothing to write");
            return Ok(current);
        }

        let merged = current.merge(patch);
        self.save(&merged)?;
        Ok(merged)
    }

    /// Remove the repository folder with its record, cache, scripts and logs
    pub fn detach(self) -> Result<(), StoreError> {
        debug!(slug = %self.slug, "Repository::detach: called");
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(slug = %self.slug, "Detached repository");
        Ok(())
    }

    /// Branch names that currently have a working-tree directory
    pub fn cached_branches(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.branches_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut branches = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if entry.file_type().is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                branches.push(decode_component(name));
            }
        }
        branches.sort();
        Ok(branches)
    }

    /// Names of the scripts stored for this repository
    pub fn script_names(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.scripts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let ext = script_extension();
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(file_name) = entry.file_name().to_str()
                && let Some(stem) = file_name.strip_suffix(ext)
            {
                names.push(decode_component(stem));
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn has_script(&self, script_name: &str) -> bool {
        self.script_path(script_name).is_file()
    }

    /// Script body, or `None` when no such script exists
    pub fn script_content(&self, script_name: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.script_path(script_name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create or replace a script
    pub fn write_script(&self, script_name: &str, content: &str) -> Result<PathBuf, StoreError> {
        debug!(slug = %self.slug, %script_name, "Repository::write_script: called");
        fs::create_dir_all(self.scripts_dir())?;
        let path = self.script_path(script_name);
        fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }

        info!(slug = %self.slug, %script_name, "Saved script");
        Ok(path)
    }

    /// Delete a script; a missing script is not an error
    pub fn delete_script(&self, script_name: &str) -> Result<bool, StoreError> {
        debug!(slug = %self.slug, %script_name, "Repository::delete_script: called");
        match fs::remove_file(self.script_path(script_name)) {
            Ok(()) => {
                info!(slug = %self.slug, %script_name, "Deleted script");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_folders(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.branches_dir())?;
        fs::create_dir_all(self.scripts_dir())?;
        fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
