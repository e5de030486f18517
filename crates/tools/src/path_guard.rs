//! Path guard — keeps the file tools inside their sandbox.
//!
//! A path is accepted when it contains no `..` component, does not fall
//! under a forbidden prefix, and (when roots are configured) lies under one
//! of the allowed roots.

use std::path::{Component, Path, PathBuf};

use agentscope_core::error::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum PathGuardError {
    #[error("path '{path}' is outside the allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("path '{path}' is under forbidden prefix '{prefix}'")]
    Forbidden { path: String, prefix: String },

    #[error("path traversal rejected in '{path}'")]
    Traversal { path: String },

    #[error("cannot resolve '{path}': {reason}")]
    Unresolvable { path: String, reason: String },
}

impl PathGuardError {
    pub fn into_tool_error(self, tool_name: &str) -> ToolError {
        ToolError::PermissionDenied {
            tool_name: tool_name.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Allowed roots plus forbidden prefixes. `~` expands to `$HOME`.
#[derive(Debug, Clone, Default)]
pub struct PathGuard {
    allowed_roots: Vec<String>,
    forbidden: Vec<String>,
}

impl PathGuard {
    /// A guard that only rejects traversal.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn new(allowed_roots: Vec<String>, forbidden: Vec<String>) -> Self {
        Self {
            allowed_roots,
            forbidden,
        }
    }

    /// Resolve `path` and check it. Returns the resolved path.
    ///
    /// Paths that do not exist yet are resolved through their nearest
    /// existing ancestor, so writes to new files are checked too.
    pub fn check(&self, path: &str) -> Result<PathBuf, PathGuardError> {
        let raw = Path::new(path);
        if raw.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(PathGuardError::Traversal { path: path.into() });
        }

        let resolved = resolve(raw).map_err(|e| PathGuardError::Unresolvable {
            path: path.into(),
            reason: e.to_string(),
        })?;
        let normalized = normalize(&resolved);

        for prefix in &self.forbidden {
            if is_under(&normalized, &normalize(&canonical_or_raw(prefix))) {
                return Err(PathGuardError::Forbidden {
                    path: path.into(),
                    prefix: prefix.clone(),
                });
            }
        }

        if !self.allowed_roots.is_empty() {
            let allowed = self
                .allowed_roots
                .iter()
                .any(|root| is_under(&normalized, &normalize(&canonical_or_raw(root))));
            if !allowed {
                return Err(PathGuardError::OutsideAllowedRoots { path: path.into() });
            }
        }

        Ok(resolved)
    }
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn canonical_or_raw(configured: &str) -> PathBuf {
    let path = PathBuf::from(expand_tilde(configured));
    path.canonicalize().unwrap_or(path)
}

fn normalize(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/").to_lowercase();
    let s = s.strip_prefix("//?/").unwrap_or(&s);
    s.trim_end_matches('/').to_string()
}

fn is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

pub(crate) fn expand_tilde(path: &str) -> String {
    if (path == "~" || path.starts_with("~/"))
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_accepts_plain_paths() {
        assert!(PathGuard::permissive().check("/any/where/file.txt").is_ok());
    }

    #[test]
    fn traversal_rejected() {
        let guard = PathGuard::permissive();
        assert!(matches!(
            guard.check("../../../etc/passwd"),
            Err(PathGuardError::Traversal { .. })
        ));
        assert!(matches!(
            guard.check("/home/user/../../etc/passwd"),
            Err(PathGuardError::Traversal { .. })
        ));
    }

    #[test]
    fn forbidden_prefix_rejected() {
        let guard = PathGuard::new(vec![], vec!["/etc".into()]);
        match guard.check("/etc/passwd") {
            Err(PathGuardError::Forbidden { prefix, .. }) => assert_eq!(prefix, "/etc"),
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn prefix_match_respects_component_boundary() {
        let guard = PathGuard::new(vec![], vec!["/nonexistent-etc".into()]);
        assert!(guard.check("/nonexistent-etcetera/file").is_ok());
        assert!(guard.check("/nonexistent-etc/file").is_err());
    }

    #[test]
    fn allowed_roots_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let guard = PathGuard::new(vec![root], vec![]);

        let inside = dir.path().join("sub/new.txt");
        assert!(guard.check(inside.to_str().unwrap()).is_ok());

        assert!(matches!(
            guard.check("/definitely/elsewhere.txt"),
            Err(PathGuardError::OutsideAllowedRoots { .. })
        ));
    }

    #[test]
    fn forbidden_wins_over_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("secret");
        std::fs::create_dir(&secret).unwrap();
        let guard = PathGuard::new(
            vec![dir.path().to_string_lossy().to_string()],
            vec![secret.to_string_lossy().to_string()],
        );
        assert!(guard.check(secret.join("key").to_str().unwrap()).is_err());
    }

    #[test]
    fn tilde_prefix_expands() {
        if let Some(home) = home_dir() {
            let guard = PathGuard::new(vec![], vec!["~/.ssh".into()]);
            assert!(guard.check(&format!("{home}/.ssh/id_rsa")).is_err());
        }
    }
}
