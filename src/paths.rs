//! Path containment for the knowledge root.
//!
//! Every path reference entering the engine passes through [`PathValidator`]
//! before any filesystem read or subprocess spawn. Validation is lexical
//! first (resolve `.`/`..` without touching the filesystem, reject anything
//! that leaves the root prefix) and only then consults the disk to walk
//! symlinks component by component.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::errors::PathError;

/// Maximum number of symlinked components resolved along one candidate path.
///
/// The bound is a fixed constant rather than a configuration knob: eight
/// levels is beyond any sane document layout, and a candidate that needs
/// more is treated as an escape attempt.
pub const MAX_SYMLINK_DEPTH: usize = 8;

/// A path that has passed containment validation.
///
/// Holds both the root-relative form (used in results and error messages)
/// and the absolute form (used for filesystem access and subprocess
/// arguments). Constructed only by [`PathValidator::validate`].
#[derive(Debug, Clone)]
pub struct RootedPath {
    relative: PathBuf,
    absolute: PathBuf,
}

impl RootedPath {
    /// Root-relative path. Empty for the root itself.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// Absolute path inside the root, for filesystem access.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Whether the validated target currently exists on disk.
    pub fn exists(&self) -> bool {
        std::fs::symlink_metadata(&self.absolute).is_ok()
    }

    /// Display label: `/` for the root itself, the relative path otherwise.
    pub fn label(&self) -> String {
        if self.relative.as_os_str().is_empty() {
            "/".to_string()
        } else {
            self.relative.display().to_string()
        }
    }
}

impl fmt::Display for RootedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative.display())
    }
}

/// Validates candidate paths against a canonical root directory.
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
    follow_symlinks: bool,
}

impl PathValidator {
    /// Creates a validator anchored at `root`, which must exist. The root
    /// is canonicalized once so later prefix checks compare real paths.
    pub fn new(root: &Path, follow_symlinks: bool) -> io::Result<Self> {
        let root = std::fs::canonicalize(root)?;
        Ok(Self {
            root,
            follow_symlinks,
        })
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// Validates a candidate path reference.
    ///
    /// The candidate is joined onto the root and normalized lexically; a
    /// result outside the root fails with [`PathError::Traversal`] before
    /// any filesystem access. Existing components are then walked and each
    /// symlink is resolved (up to [`MAX_SYMLINK_DEPTH`]) and re-checked
    /// against the root. A missing target is not an error here — callers
    /// that require existence use [`PathValidator::validate_existing`].
    pub fn validate(&self, candidate: &str) -> Result<RootedPath, PathError> {
        let joined = self.root.join(candidate);
        let normalized = normalize(&joined);

        if !normalized.starts_with(&self.root) {
            warn!(path = candidate, "rejected path outside the knowledge root");
            return Err(PathError::Traversal(candidate.to_string()));
        }

        let relative = normalized
            .strip_prefix(&self.root)
            .unwrap_or_else(|_| Path::new(""))
            .to_path_buf();

        self.walk_symlinks(&relative, candidate)?;

        Ok(RootedPath {
            relative,
            absolute: normalized,
        })
    }

    /// Like [`validate`](Self::validate), but the target must exist.
    pub fn validate_existing(&self, candidate: &str) -> Result<RootedPath, PathError> {
        let rooted = self.validate(candidate)?;
        if !rooted.exists() {
            return Err(PathError::NotFound(rooted.to_string()));
        }
        Ok(rooted)
    }

    /// Walks the existing prefix of `relative` component by component,
    /// resolving symlinks and rejecting any that leave the root. Stops at
    /// the first missing component; absence is the caller's concern.
    fn walk_symlinks(&self, relative: &Path, candidate: &str) -> Result<(), PathError> {
        let mut current = self.root.clone();
        let mut depth = 0usize;

        for component in relative.components() {
            current.push(component);

            let meta = match std::fs::symlink_metadata(&current) {
                Ok(meta) => meta,
                // Missing (or unreadable) tail: nothing left to resolve.
                Err(_) => break,
            };

            if meta.file_type().is_symlink() {
                let shown = current
                    .strip_prefix(&self.root)
                    .unwrap_or_else(|_| Path::new(""))
                    .display()
                    .to_string();

                if !self.follow_symlinks {
                    warn!(path = %shown, "rejected symlink (policy disallows following)");
                    return Err(PathError::SymlinkDenied(shown));
                }

                depth += 1;
                if depth > MAX_SYMLINK_DEPTH {
                    warn!(path = %shown, "rejected path: symlink depth bound exceeded");
                    return Err(PathError::Traversal(candidate.to_string()));
                }

                let resolved = match std::fs::canonicalize(&current) {
                    Ok(resolved) => resolved,
                    // Dangling symlink: treat like a missing tail.
                    Err(_) => break,
                };

                if !resolved.starts_with(&self.root) {
                    warn!(path = %shown, "rejected symlink pointing outside the root");
                    return Err(PathError::Traversal(candidate.to_string()));
                }

                current = resolved;
            }
        }

        Ok(())
    }
}

/// Lexical normalization: resolves `.` and `..` components without touching
/// the filesystem. `..` pops the previous component; popping past the top
/// clamps, which the subsequent prefix check turns into a rejection.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn validator(follow_symlinks: bool) -> (TempDir, PathValidator) {
        let tmp = TempDir::new().unwrap();
        let validator = PathValidator::new(tmp.path(), follow_symlinks).unwrap();
        (tmp, validator)
    }

    #[test]
    fn plain_relative_paths_pass() {
        let (_tmp, v) = validator(false);
        let rooted = v.validate("docs/manual.md").unwrap();
        assert_eq!(rooted.relative(), Path::new("docs/manual.md"));
        assert!(rooted.absolute().starts_with(v.root()));
    }

    #[test]
    fn empty_candidate_is_the_root() {
        let (_tmp, v) = validator(false);
        let rooted = v.validate("").unwrap();
        assert_eq!(rooted.relative(), Path::new(""));
        assert_eq!(rooted.absolute(), v.root());
    }

    #[test]
    fn dot_segments_are_resolved_lexically() {
        let (_tmp, v) = validator(false);
        let rooted = v.validate("a/./b/../c.txt").unwrap();
        assert_eq!(rooted.relative(), Path::new("a/c.txt"));
    }

    #[test]
    fn parent_escape_is_traversal() {
        let (_tmp, v) = validator(false);
        match v.validate("../etc/passwd") {
            Err(PathError::Traversal(p)) => assert_eq!(p, "../etc/passwd"),
            other => panic!("expected Traversal, got {:?}", other),
        }
    }

    #[test]
    fn deep_parent_escape_is_traversal() {
        let (_tmp, v) = validator(false);
        assert!(matches!(
            v.validate("docs/../../../../root"),
            Err(PathError::Traversal(_))
        ));
    }

    #[test]
    fn absolute_candidate_outside_root_is_traversal() {
        let (_tmp, v) = validator(false);
        assert!(matches!(
            v.validate("/etc/passwd"),
            Err(PathError::Traversal(_))
        ));
    }

    #[test]
    fn missing_target_validates_but_fails_existing() {
        let (_tmp, v) = validator(false);
        assert!(v.validate("no/such/file.txt").is_ok());
        assert!(matches!(
            v.validate_existing("no/such/file.txt"),
            Err(PathError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_denied_when_following_disabled() {
        let (tmp, v) = validator(false);
        fs::write(tmp.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real.txt"), tmp.path().join("link.txt"))
            .unwrap();

        assert!(matches!(
            v.validate("link.txt"),
            Err(PathError::SymlinkDenied(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn inside_symlink_is_allowed_when_following_enabled() {
        let (tmp, v) = validator(true);
        fs::create_dir(tmp.path().join("real")).unwrap();
        fs::write(tmp.path().join("real/doc.txt"), "x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("alias")).unwrap();

        let rooted = v.validate("alias/doc.txt").unwrap();
        assert!(rooted.exists());
    }

    #[cfg(unix)]
    #[test]
    fn escaping_symlink_is_traversal_even_when_following_enabled() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "x").unwrap();

        let (tmp, v) = validator(true);
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("leak")).unwrap();

        assert!(matches!(
            v.validate("leak/secret.txt"),
            Err(PathError::Traversal(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_depth_bound_is_enforced() {
        let (tmp, v) = validator(true);

        // d1..d10 are real sibling directories; each d_i holds a symlink
        // s -> ../d_{i+1}, and the root holds s -> d1. The candidate
        // s/s/s/... crosses one symlink per component.
        let hops = MAX_SYMLINK_DEPTH + 1;
        for i in 1..=hops {
            fs::create_dir(tmp.path().join(format!("d{}", i))).unwrap();
        }
        std::os::unix::fs::symlink("d1", tmp.path().join("s")).unwrap();
        for i in 1..hops {
            std::os::unix::fs::symlink(
                format!("../d{}", i + 1),
                tmp.path().join(format!("d{}/s", i)),
            )
            .unwrap();
        }
        fs::write(tmp.path().join(format!("d{}/leaf.txt", hops)), "x").unwrap();

        let mut candidate = String::new();
        for _ in 0..hops {
            candidate.push_str("s/");
        }
        candidate.push_str("leaf.txt");

        assert!(matches!(
            v.validate(&candidate),
            Err(PathError::Traversal(_))
        ));

        // One fewer hop stays within the bound.
        let mut shorter = String::new();
        for _ in 0..hops - 1 {
            shorter.push_str("s/");
        }
        shorter.push_str(&format!("leaf{}.txt", hops));
        assert!(v.validate(&shorter).is_ok());
    }
}
