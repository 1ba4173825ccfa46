use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Removes a failed operation's output on drop, unless marked as kept.
///
/// Only files the operation produced are removed: a file that did not exist when the
/// guard was created, or a pre-existing one the tool was allowed to overwrite and
/// actually rewrote. A pre-existing file left untouched is never deleted.
#[derive(Debug)]
pub struct OutputGuard {
    path: PathBuf,
    keep: bool,
    prior: Option<Fingerprint>,
    replaceable: bool,
}

impl OutputGuard {
    /// `replaceable` says whether the tool may overwrite an existing file at `path`.
    pub fn new(path: impl Into<PathBuf>, replaceable: bool) -> Self {
        let path = path.into();
        let prior = Fingerprint::of(&path);
        Self {
            path,
            keep: false,
            prior,
            replaceable,
        }
    }

    pub fn keep(&mut self) {
        self.keep = true;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn existed(&self) -> bool {
        self.prior.is_some()
    }

    fn produced_by_operation(&self) -> bool {
        let Some(current) = Fingerprint::of(&self.path) else {
            return false;
        };
        match self.prior {
            None => true,
            Some(prior) => self.replaceable && prior != current,
        }
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if !self.produced_by_operation() {
            if self.existed() {
                debug!(path = %self.path.display(), "left pre-existing output in place");
            }
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial output"),
            Err(err) => warn!(path = %self.path.display(), %err, "could not remove partial output"),
        }
    }
}

/// A concat demuxer list written to a temporary file, removed when dropped.
#[derive(Debug)]
pub struct ConcatList {
    file: NamedTempFile,
}

impl ConcatList {
    pub fn create(contents: &str) -> io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("ffcore-concat-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        debug!(path = %file.path().display(), entries = contents.lines().count(), "wrote concat list");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_new_output_unless_kept() {
        let dir = tempfile::tempdir().unwrap();
        let dropped = dir.path().join("dropped.mp4");
        let kept = dir.path().join("kept.mp4");

        let guard = OutputGuard::new(&dropped, true);
        fs::write(&dropped, b"partial").unwrap();
        drop(guard);

        let mut guard = OutputGuard::new(&kept, true);
        fs::write(&kept, b"complete").unwrap();
        guard.keep();
        drop(guard);

        assert!(!dropped.exists());
        assert!(kept.exists());
    }

    #[test]
    fn untouched_existing_file_survives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("precious.mp4");
        fs::write(&path, b"user data").unwrap();

        let guard = OutputGuard::new(&path, true);
        assert!(guard.existed());
        drop(guard);

        assert_eq!(fs::read(&path).unwrap(), b"user data");
    }

    #[test]
    fn rewritten_existing_file_is_removed_only_when_replaceable() {
        let dir = tempfile::tempdir().unwrap();
        let replaced = dir.path().join("replaced.mp4");
        let protected = dir.path().join("protected.mp4");
        fs::write(&replaced, b"old").unwrap();
        fs::write(&protected, b"old").unwrap();

        let guard = OutputGuard::new(&replaced, true);
        fs::write(&replaced, b"half-written output").unwrap();
        drop(guard);

        let guard = OutputGuard::new(&protected, false);
        fs::write(&protected, b"half-written output").unwrap();
        drop(guard);

        assert!(!replaced.exists());
        assert!(protected.exists());
    }

    #[test]
    fn tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        drop(OutputGuard::new(dir.path().join("never-written.mp4"), true));
    }

    #[test]
    fn concat_list_lives_for_its_scope() {
        let path = {
            let list = ConcatList::create("file '/tmp/a.mp4'\n").unwrap();
            assert_eq!(
                fs::read_to_string(list.path()).unwrap(),
                "file '/tmp/a.mp4'\n"
            );
            list.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
