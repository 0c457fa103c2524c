//! Root of the repository folders

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::record::NewRepository;
use crate::repository::Repository;

/// The directory holding one folder per repository
#[derive(Debug, Clone)]
pub struct RepoStore {
    root: PathBuf,
}

impl RepoStore {
    /// Open or create the store at the given path
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(?root, "Opened repository store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every sub-directory name under the root, sorted
    pub fn list_slugs(&self) -> Result<Vec<String>, StoreError> {
        let mut slugs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                slugs.push(name.to_string());
            }
        }
        slugs.sort();
        Ok(slugs)
    }

    /// Handles for every folder holding a valid record
    ///
    /// Folders whose record is missing or unparseable are skipped.
    pub fn repositories(&self) -> Result<Vec<Repository>, StoreError> {
        let mut repos = Vec::new();
        for slug in self.list_slugs()? {
            match Repository::open(&self.root, &slug) {
                Ok(repo) => repos.push(repo),
                Err(e) => warn!(%slug, error = %e, "Skipping repository folder"),
            }
        }
        debug!(count = repos.len(), "RepoStore::repositories: loaded");
        Ok(repos)
    }

    /// Open one repository by slug
    pub fn open_repository(&self, slug: &str) -> Result<Repository, StoreError> {
        validate_slug(slug)?;
        if !self.root.join(slug).is_dir() {
            return Err(StoreError::NotFound(slug.to_string()));
        }
        Repository::open(&self.root, slug)
    }

    /// Find a repository by its stable identifier
    pub fn find_by_id(&self, repository_id: &str) -> Result<Repository, StoreError> {
        for repo in self.repositories()? {
            if repo.record()?.repository_id == repository_id {
                return Ok(repo);
            }
        }
        Err(StoreError::NotFound(repository_id.to_string()))
    }

    /// Create a repository folder and its initial record, returning the new id
    pub fn attach(&self, slug: &str, new_repo: NewRepository) -> Result<String, StoreError> {
        debug!(%slug, "RepoStore::attach: called");
        validate_slug(slug)?;

        let dir = self.root.join(slug);
        if dir.exists() {
            return Err(StoreError::SlugTaken(slug.to_string()));
        }

        let id = Uuid::now_v7().to_string();
        fs::create_dir_all(&dir)?;
        let record = new_repo.into_record(id.clone());

        let repo_result = fs::write(dir.join(crate::CONFIGURATION_FILE), serde_json::to_string(&record)?)
            .map_err(StoreError::from)
            .and_then(|_| Repository::open(&self.root, slug));

        if let Err(e) = repo_result {
            let _ = fs::remove_dir_all(&dir);
            return Err(e);
        }

        info!(%slug, repository_id = %id, "Attached repository");
        Ok(id)
    }

    /// Rename a repository folder
    pub fn rename(&self, slug: &str, new_slug: &str) -> Result<Repository, StoreError> {
        debug!(%slug, %new_slug, "RepoStore::rename: called");
        validate_slug(new_slug)?;
        let repo = self.open_repository(slug)?;
        if slug == new_slug {
            return Ok(repo);
        }

        let target = self.root.join(new_slug);
        if target.exists() {
            return Err(StoreError::SlugTaken(new_slug.to_string()));
        }

        fs::rename(repo.dir(), &target)?;
        info!(%slug, %new_slug, "Renamed repository");
        Repository::open(&self.root, new_slug)
    }
}

/// A slug must be usable as exactly one directory name
fn validate_slug(slug: &str) -> Result<(), StoreError> {
    let bad = slug.trim().is_empty()
        || slug == "."
        || slug == ".."
        || slug.contains('/')
        || slug.contains('\\')
        || slug.contains('\0');
    if bad {
        return Err(StoreError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BranchRef, ConnectionStatus, RecordPatch};
    use tempfile::TempDir;

    fn store() -> (TempDir, RepoStore) {
        let temp = TempDir::new().unwrap();
        let store = RepoStore::open(temp.path().join("repositories")).unwrap();
        (temp, store)
    }

    fn acme() -> NewRepository {
        NewRepository::new("team", "acme", "secret")
    }

    #[test]
    fn test_attach_creates_layout() {
        let (_temp, store) = store();
        let id = store.attach("acme", acme()).unwrap();

        let repo = store.open_repository("acme").unwrap();
        assert!(repo.conf_path().is_file());
        assert!(repo.branches_dir().is_dir());
        assert!(repo.scripts_dir().is_dir());
        assert!(repo.logs_dir().is_dir());

        let record = repo.record().unwrap();
        assert_eq!(record.repository_id, id);
        assert_eq!(record.remote_connection_status, ConnectionStatus::Ok);
        assert!(record.branches.is_empty());
        assert!(record.observed_branches.is_empty());
    }

    #[test]
    fn test_attach_rejects_taken_and_invalid_slugs() {
        let (_temp, store) = store();
        store.attach("acme", acme()).unwrap();

        assert!(matches!(store.attach("acme", acme()), Err(StoreError::SlugTaken(_))));
        assert!(matches!(store.attach("", acme()), Err(StoreError::InvalidSlug(_))));
        assert!(matches!(store.attach("a/b", acme()), Err(StoreError::InvalidSlug(_))));
        assert!(matches!(store.attach("..", acme()), Err(StoreError::InvalidSlug(_))));
    }

    #[test]
    fn test_ids_are_unique() {
        let (_temp, store) = store();
        let a = store.attach("a", acme()).unwrap();
        let b = store.attach("b", acme()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_repositories_skips_invalid_folders() {
        let (_temp, store) = store();
        store.attach("good", acme()).unwrap();
        fs::create_dir_all(store.root().join("no-record")).unwrap();
        fs::create_dir_all(store.root().join("broken")).unwrap();
        fs::write(store.root().join("broken").join(".conf"), "{not json").unwrap();
        fs::write(store.root().join("stray-file"), "x").unwrap();

        assert_eq!(store.list_slugs().unwrap(), vec!["broken", "good", "no-record"]);

        let repos = store.repositories().unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].slug(), "good");
    }

    #[test]
    fn test_open_invalid_record() {
        let (_temp, store) = store();
        fs::create_dir_all(store.root().join("broken")).unwrap();
        fs::write(store.root().join("broken").join(".conf"), "{}").unwrap();

        assert!(matches!(store.open_repository("broken"), Err(StoreError::Invalid { .. })));
        assert!(matches!(store.open_repository("missing"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_rereads_disk() {
        let (_temp, store) = store();
        let id = store.attach("acme", acme()).unwrap();
        let repo = store.open_repository("acme").unwrap();

        // An external edit lands between our read and our write
        let mut external = repo.record().unwrap();
        external.branches = vec![BranchRef::at("main", "h1")];
        repo.save(&external).unwrap();

        let updated = repo
            .update(&id, RecordPatch::default().status(ConnectionStatus::Ko))
            .unwrap();
        assert_eq!(updated.branches, vec![BranchRef::at("main", "h1")]);
        assert_eq!(updated.remote_connection_status, ConnectionStatus::Ko);
        assert_eq!(repo.record().unwrap(), updated);
    }

    #[test]
    fn test_update_identity_mismatch() {
        let (_temp, store) = store();
        store.attach("acme", acme()).unwrap();
        let repo = store.open_repository("acme").unwrap();
        let before = repo.record().unwrap();

        let result = repo.update("someone-else", RecordPatch::default().status(ConnectionStatus::Ko));
        assert!(matches!(result, Err(StoreError::IdentityMismatch { .. })));
        assert_eq!(repo.record().unwrap(), before);
    }

    #[test]
    fn test_empty_update_does_not_rewrite() {
        let (_temp, store) = store();
        let id = store.attach("acme", acme()).unwrap();
        let repo = store.open_repository("acme").unwrap();
        let pretty = serde_json::to_string_pretty(&repo.record().unwrap()).unwrap();
        fs::write(repo.conf_path(), &pretty).unwrap();

        let record = repo.update(&id, RecordPatch::default()).unwrap();
        assert_eq!(record.repository_id, id);
        assert_eq!(fs::read_to_string(repo.conf_path()).unwrap(), pretty);

        let result = repo.update("someone-else", RecordPatch::default());
        assert!(matches!(result, Err(StoreError::IdentityMismatch { .. })));
    }

    #[test]
    fn test_update_missing_record() {
        let (_temp, store) = store();
        let id = store.attach("acme", acme()).unwrap();
        let repo = store.open_repository("acme").unwrap();
        fs::remove_file(repo.conf_path()).unwrap();

        let result = repo.update(&id, RecordPatch::default());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_detach_removes_everything() {
        let (_temp, store) = store();
        store.attach("acme", acme()).unwrap();
        store.attach("other", acme()).unwrap();
        let repo = store.open_repository("acme").unwrap();
        fs::create_dir_all(repo.branch_path("main")).unwrap();
        repo.write_script("main", "echo hi").unwrap();
        let dir = repo.dir().to_path_buf();

        repo.detach().unwrap();
        assert!(!dir.exists());
        assert_eq!(store.list_slugs().unwrap(), vec!["other"]);
    }

    #[test]
    fn test_rename() {
        let (_temp, store) = store();
        let id = store.attach("acme", acme()).unwrap();
        store.attach("taken", acme()).unwrap();

        assert!(matches!(store.rename("acme", "taken"), Err(StoreError::SlugTaken(_))));

        let renamed = store.rename("acme", "acme-2").unwrap();
        assert_eq!(renamed.slug(), "acme-2");
        assert_eq!(renamed.record().unwrap().repository_id, id);
        assert!(!store.root().join("acme").exists());
    }

    #[test]
    fn test_find_by_id() {
        let (_temp, store) = store();
        store.attach("a", acme()).unwrap();
        let id = store.attach("b", acme()).unwrap();

        assert_eq!(store.find_by_id(&id).unwrap().slug(), "b");
        assert!(matches!(store.find_by_id("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_scripts_crud() {
        let (_temp, store) = store();
        store.attach("acme", acme()).unwrap();
        let repo = store.open_repository("acme").unwrap();

        assert!(repo.script_names().unwrap().is_empty());
        assert_eq!(repo.script_content("main").unwrap(), None);

        repo.write_script("main", "echo one").unwrap();
        repo.write_script("feature/login", "echo two").unwrap();
        fs::write(repo.scripts_dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(repo.script_names().unwrap(), vec!["feature/login", "main"]);
        assert!(repo.has_script("feature/login"));
        assert_eq!(repo.script_content("main").unwrap().as_deref(), Some("echo one"));

        repo.write_script("main", "echo updated").unwrap();
        assert_eq!(repo.script_content("main").unwrap().as_deref(), Some("echo updated"));

        assert!(repo.delete_script("main").unwrap());
        assert!(!repo.delete_script("main").unwrap());
        assert_eq!(repo.script_names().unwrap(), vec!["feature/login"]);
    }

    #[test]
    fn test_cached_branches_decodes_names() {
        let (_temp, store) = store();
        store.attach("acme", acme()).unwrap();
        let repo = store.open_repository("acme").unwrap();

        fs::create_dir_all(repo.branch_path("main")).unwrap();
        fs::create_dir_all(repo.branch_path("feature/login")).unwrap();
        fs::write(repo.branches_dir().join("stray"), "x").unwrap();

        assert_eq!(repo.cached_branches().unwrap(), vec!["feature/login", "main"]);
        assert_eq!(repo.branch_path("feature/login").parent().unwrap(), repo.branches_dir());
    }
}
