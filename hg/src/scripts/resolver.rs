//! Script resolution

/// Why a script was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Named exactly after the updated branch
    Branch,
    /// Named after the repository, used when no branch script exists
    Default,
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// The script chosen for an updated branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    pub name: String,
    pub kind: ScriptKind,
}

/// Pick the script for `branch_name`: branch script, else default, else none
pub fn resolve_script(branch_name: &str, repository_name: &str, available: &[String]) -> Option<ResolvedScript> {
    if available.iter().any(|s| s == branch_name) {
        return Some(ResolvedScript {
            name: branch_name.to_string(),
            kind: ScriptKind::Branch,
        });
    }

    if available.iter().any(|s| s == repository_name) {
        return Some(ResolvedScript {
            name: repository_name.to_string(),
            kind: ScriptKind::Default,
        });
    }

    None
}
