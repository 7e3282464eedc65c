//! JSON file persistence for memory snapshots.
//!
//! The agent core only exposes `snapshot`/`restore`; this module is the
//! filesystem collaborator that stores one snapshot per session id.

use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::memory::{Memory, MemorySnapshot};

/// Stores each session as `<dir>/<session_id>.json` containing the
/// serialized [`MemorySnapshot`].
pub struct JsonSession {
    dir: PathBuf,
}

impl JsonSession {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn save(&self, session_id: &str, memory: &Memory) -> Result<()> {
        let path = self.session_path(session_id)?;
        let file = fs::File::create(&path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &memory.snapshot())?;
        Ok(())
    }

    pub fn load(&self, session_id: &str, memory: &Memory) -> Result<()> {
        let path = self.session_path(session_id)?;
        if !path.exists() {
            return Err(anyhow!("Session not found: {}", session_id));
        }
        let file = fs::File::open(&path)?;
        let snapshot: MemorySnapshot = serde_json::from_reader(file)?;
        memory.restore(snapshot);
        Ok(())
    }

    /// Like [`load`](Self::load) but a missing session is not an error;
    /// returns whether anything was restored.
    pub fn load_if_exists(&self, session_id: &str, memory: &Memory) -> Result<bool> {
        if !self.exists(session_id) {
            return Ok(false);
        }
        self.load(session_id, memory)?;
        Ok(true)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.session_path(session_id)
            .map(|path| path.exists())
            .unwrap_or(false)
    }

    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let path = self.session_path(session_id)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf> {
        if session_id.trim().is_empty()
            || session_id.contains('/')
            || session_id.contains('\\')
        {
            return Err(anyhow!("Invalid session id: {:?}", session_id));
        }
        Ok(self.dir.join(format!("{}.json", session_id)))
    }
}
