//! Layer 2: install directory containment and permissions.

use std::path::Path;

/// Most permissive mode allowed on a binary's containing directory.
pub const MAX_DIRECTORY_MODE: u32 = 0o750;

/// Problems with the binary's location, one message per finding.
///
/// An empty result means the binary exists, resolves strictly beneath
/// `allowed_base`, and its directory grants nothing beyond `rwxr-x---`.
pub async fn check_binary_directory(binary_path: &str, allowed_base: &Path) -> Vec<String> {
    if binary_path.is_empty() {
        return vec!["binary path is empty".to_string()];
    }

    let binary = Path::new(binary_path);
    let resolved = match tokio::fs::canonicalize(binary).await {
        Ok(path) => path,
        Err(e) => return vec![format!("binary path {binary_path} is not accessible: {e}")],
    };

    let mut problems = Vec::new();

    match tokio::fs::canonicalize(allowed_base).await {
        Ok(base) => {
            if resolved == base || !resolved.starts_with(&base) {
                problems.push(format!(
                    "binary {} resolves outside allowed directory {}",
                    resolved.display(),
                    base.display()
                ));
            }
        }
        Err(e) => problems.push(format!(
            "allowed directory {} is not accessible: {e}",
            allowed_base.display()
        )),
    }

    if let Some(dir) = resolved.parent() {
        match tokio::fs::metadata(dir).await {
            Ok(meta) => {
                if let Some(mode) = excess_mode(&meta) {
                    problems.push(format!(
                        "directory {} has insecure permissions {:04o} (maximum {:04o})",
                        dir.display(),
                        mode,
                        MAX_DIRECTORY_MODE
                    ));
                }
            }
            Err(e) => problems.push(format!("cannot stat {}: {e}", dir.display())),
        }
    }

    problems
}

/// The directory's permission bits, if any exceed [`MAX_DIRECTORY_MODE`].
#[cfg(unix)]
fn excess_mode(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;

    let mode = meta.permissions().mode() & 0o777;
    (mode & !MAX_DIRECTORY_MODE != 0).then_some(mode)
}

#[cfg(not(unix))]
fn excess_mode(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}
