use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{DocumentId, ItemStatus, Record};
use crate::store::write_atomic;

/// Dossier directory: one pretty-printed JSON file per record.
pub struct RecordStore {
    dir: PathBuf,
}

/// Just enough of an existing dossier to decide whether to reuse it.
#[derive(Debug, Deserialize)]
pub struct RecordHeader {
    pub pmcid: DocumentId,
    pub status: ItemStatus,
    #[serde(default)]
    pub missing_sections: Vec<String>,
}

impl RecordStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, output_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", output_id))
    }

    pub fn write(&self, record: &Record) -> io::Result<PathBuf> {
        let path = self.path_for(&record.id);
        write_json(&path, record)?;
        Ok(path)
    }

    /// Header of the dossier at `output_id`, if one exists and parses.
    pub fn existing(&self, output_id: &str) -> Option<RecordHeader> {
        let bytes = fs::read(self.path_for(output_id)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let mut body = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    body.push(b'\n');
    write_atomic(path, &body)
}
