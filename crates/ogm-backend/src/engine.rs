use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::graph::PropertyGraph;
use crate::snapshot::{read_snapshot, write_snapshot};

/// A graph database engine: owns a [`PropertyGraph`] and decides how it is
/// made durable.
pub trait GraphEngine: Send {
    /// Human-readable engine name, used in logs.
    fn name(&self) -> &'static str;

    fn graph(&self) -> &PropertyGraph;

    fn graph_mut(&mut self) -> &mut PropertyGraph;

    /// Whether changes become durable only at [`commit`](Self::commit).
    fn supports_transactions(&self) -> bool;

    /// Make all pending changes durable.
    fn commit(&mut self) -> BackendResult<()>;

    /// Discard changes made since the last commit.
    fn rollback(&mut self) -> BackendResult<()>;

    /// Persist without transactional semantics.
    fn flush(&mut self) -> BackendResult<()>;

    /// Release the engine. Pending changes are made durable first.
    fn shutdown(&mut self) -> BackendResult<()>;
}

// ---------------------------------------------------------------------------
// MemoryEngine
// ---------------------------------------------------------------------------

/// Volatile engine: nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    graph: PropertyGraph,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_graph(graph: PropertyGraph) -> Self {
        Self { graph }
    }
}

impl GraphEngine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn graph(&self) -> &PropertyGraph {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut PropertyGraph {
        &mut self.graph
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    fn commit(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn rollback(&mut self) -> BackendResult<()> {
        Err(BackendError::InvalidStore(
            "memory engine does not support transactions".into(),
        ))
    }

    fn flush(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileEngine
// ---------------------------------------------------------------------------

/// File-backed engine persisting the whole graph as one snapshot.
///
/// In transactional mode the snapshot is rewritten on `commit` and
/// `rollback` reloads it. Otherwise `flush` writes it.
pub struct FileEngine {
    path: PathBuf,
    graph: PropertyGraph,
    transactional: bool,
}

impl FileEngine {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    pub fn open(path: &Path, transactional: bool) -> BackendResult<Self> {
        let graph = read_snapshot(path)?.unwrap_or_default();
        debug!(path = %path.display(), transactional, "file engine opened");
        Ok(Self {
            path: path.to_path_buf(),
            graph,
            transactional,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl GraphEngine for FileEngine {
    fn name(&self) -> &'static str {
        "file"
    }

    fn graph(&self) -> &PropertyGraph {
        &self.graph
    }

    fn graph_mut(&mut self) -> &mut PropertyGraph {
        &mut self.graph
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    fn commit(&mut self) -> BackendResult<()> {
        write_snapshot(&self.path, &self.graph)
    }

    fn rollback(&mut self) -> BackendResult<()> {
        if !self.transactional {
            return Err(BackendError::InvalidStore(
                "rollback requires a transactional engine".into(),
            ));
        }
        self.graph = read_snapshot(&self.path)?.unwrap_or_default();
        Ok(())
    }

    fn flush(&mut self) -> BackendResult<()> {
        write_snapshot(&self.path, &self.graph)
    }

    fn shutdown(&mut self) -> BackendResult<()> {
        write_snapshot(&self.path, &self.graph)
    }
}

impl std::fmt::Debug for FileEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEngine")
            .field("path", &self.path)
            .field("transactional", &self.transactional)
            .field("nodes", &self.graph.node_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogm_types::Id;

    #[test]
    fn memory_engine_has_no_transactions() {
        let mut e = MemoryEngine::new();
        assert!(!e.supports_transactions());
        assert!(e.commit().is_ok());
        assert!(e.rollback().is_err());
    }

    #[test]
    fn file_engine_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.snap");

        let mut e = FileEngine::open(&path, true).unwrap();
        e.graph_mut().add_node(Id::from_raw("a"));
        e.commit().unwrap();

        let reopened = FileEngine::open(&path, true).unwrap();
        assert!(reopened.graph().contains_node(&Id::from_raw("a")));
    }

    #[test]
    fn rollback_discards_uncommitted_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.snap");

        let mut e = FileEngine::open(&path, true).unwrap();
        e.graph_mut().add_node(Id::from_raw("kept"));
        e.commit().unwrap();
        e.graph_mut().add_node(Id::from_raw("dropped"));
        e.rollback().unwrap();

        assert!(e.graph().contains_node(&Id::from_raw("kept")));
        assert!(!e.graph().contains_node(&Id::from_raw("dropped")));
    }
}
