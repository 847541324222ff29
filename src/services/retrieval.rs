use crate::services::vcs::{RepoIdentity, VcsContentService};

pub(crate) struct RetrievedFile {
    pub(crate) path: String,
    pub(crate) content: String,
}

pub(crate) struct RetrievedFiles {
    pub(crate) found: Vec<RetrievedFile>,
    pub(crate) missing: Vec<String>,
}

impl RetrievedFiles {
    pub(crate) fn nothing_found(&self) -> bool {
        self.found.is_empty()
    }
}

/// Fetches each required path independently. Any failure (missing path,
/// access denied, transient error) classifies the path as missing and the
/// batch keeps going. `found` preserves the input ordering; analysis
/// context depends on it.
pub(crate) async fn fetch_required(
    vcs: &dyn VcsContentService,
    repo: &RepoIdentity,
    paths: &[String],
) -> RetrievedFiles {
    let mut found = Vec::new();
    let mut missing = Vec::new();

    for path in paths {
        match vcs.fetch_file(repo, path).await {
            Ok(Some(content)) => found.push(RetrievedFile { path: path.clone(), content }),
            Ok(None) => {
                tracing::warn!(repo = %repo.full_name(), path = %path, "Required file not found");
                missing.push(path.clone());
            }
            Err(err) => {
                tracing::warn!(
                    repo = %repo.full_name(),
                    path = %path,
                    error = %err,
                    "Failed to fetch required file; treating as missing"
                );
                missing.push(path.clone());
            }
        }
    }

    RetrievedFiles { found, missing }
}
