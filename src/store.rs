use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::models::DocumentId;

/// Check-then-fetch cache of raw article markup, keyed by document ID.
pub trait DocumentCache: Send + Sync {
    fn load(&self, id: &DocumentId) -> io::Result<Option<String>>;
    fn store(&self, id: &DocumentId, html: &str) -> io::Result<()>;
}

/// Cache laid out as `<dir>/<ID>.html`.
pub struct FsDocumentStore {
    dir: PathBuf,
}

impl FsDocumentStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{}.html", id))
    }
}

impl DocumentCache for FsDocumentStore {
    fn load(&self, id: &DocumentId) -> io::Result<Option<String>> {
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn store(&self, id: &DocumentId, html: &str) -> io::Result<()> {
        write_atomic(&self.path_for(id), html.as_bytes())
    }
}

/// Write to a sibling temp file, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DocumentId {
        DocumentId::parse(s).unwrap()
    }

    #[test]
    fn miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path().join("raw")).unwrap();
        assert!(store.load(&id("PMC1")).unwrap().is_none());

        store.store(&id("PMC1"), "<html>one</html>").unwrap();
        assert_eq!(store.load(&id("PMC1")).unwrap().as_deref(), Some("<html>one</html>"));
        assert!(store.path_for(&id("PMC1")).ends_with("raw/PMC1.html"));
    }

    #[test]
    fn store_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path()).unwrap();
        store.store(&id("PMC2"), "first version, longer").unwrap();
        store.store(&id("PMC2"), "second").unwrap();
        assert_eq!(store.load(&id("PMC2")).unwrap().as_deref(), Some("second"));
        // no temp files left behind
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
