//! RepoStore - per-repository records on disk
//!
//! Every watched repository owns one folder under the store root. The folder
//! is the only authoritative copy of the repository's state; anything held in
//! memory is a snapshot that gets re-read before each update.
//!
//! # Layout
//!
//! ```text
//! repositories/
//! └── {slug}/
//!     ├── .conf            # RepositoryRecord (JSON)
//!     ├── branches/        # one working tree per materialized branch
//!     │   └── {branch}/
//!     ├── scripts/         # {name}.sh (or .bat on Windows)
//!     └── logs/            # {name}-{epoch-ms}.txt per script run
//! ```
//!
//! # Example
//!
//! ```ignore
//! use repostore::{BranchRef, NewRepository, RecordPatch, RepoStore};
//!
//! let store = RepoStore::open("/home/me/.hallucigenia/repositories")?;
//! let id = store.attach("acme", NewRepository::new("team", "acme", "token"))?;
//! let repo = store.open_repository("acme")?;
//! repo.update(&id, RecordPatch::default().observed(vec![BranchRef::unhashed("main")]))?;
//! ```

mod error;
mod names;
mod record;
mod repository;
mod store;

pub use error::StoreError;
pub use names::{decode_component, encode_component};
pub use record::{BranchRef, ConnectionStatus, NewRepository, RecordPatch, RepositoryRecord};
pub use repository::Repository;
pub use store::RepoStore;

/// Name of the record file inside each repository folder
pub const CONFIGURATION_FILE: &str = ".conf";

/// Sub-folder holding materialized branch working trees
pub const BRANCHES_DIR: &str = "branches";

/// Sub-folder holding side-effect scripts
pub const SCRIPTS_DIR: &str = "scripts";

/// Sub-folder holding one log file per script invocation
pub const LOGS_DIR: &str = "logs";

/// Extension used for script files on the current platform
pub fn script_extension() -> &'static str {
    if cfg!(windows) { ".bat" } else { ".sh" }
}
