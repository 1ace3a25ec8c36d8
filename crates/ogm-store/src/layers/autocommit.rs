use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::pipeline::{Request, Response, StoreLayer};
use crate::traits::PersistentStore;

/// Commits the wrapped store after every `chunk` successful mutations.
pub struct AutocommitLayer {
    chunk: usize,
    pending: usize,
}

impl AutocommitLayer {
    pub fn new(chunk: usize) -> StoreResult<Self> {
        if chunk == 0 {
            return Err(StoreError::InvalidOptions("autocommit chunk must be positive".into()));
        }
        Ok(Self { chunk, pending: 0 })
    }

    /// Mutations since the last commit.
    pub fn pending(&self) -> usize {
        self.pending
    }
}

impl StoreLayer for AutocommitLayer {
    fn name(&self) -> &'static str {
        "autocommit"
    }

    fn observe(
        &mut self,
        request: &Request<'_>,
        outcome: &StoreResult<Response>,
        inner: &mut dyn PersistentStore,
    ) -> StoreResult<()> {
        if outcome.is_err() {
            return Ok(());
        }
        match request {
            Request::Save | Request::Commit | Request::Close => self.pending = 0,
            _ if request.is_mutation() => {
                self.pending += 1;
                if self.pending >= self.chunk {
                    inner.commit()?;
                    debug!(chunk = self.chunk, "autocommit");
                    self.pending = 0;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectWriteStore;
    use crate::pipeline::StorePipeline;
    use crate::traits::StoreValue;
    use ogm_backend::{BackendConfig, GraphBackend, PersistentObject};
    use ogm_types::{ClassInfo, Feature, Id, Value};

    #[test]
    fn zero_chunk_is_rejected() {
        assert!(matches!(AutocommitLayer::new(0), Err(StoreError::InvalidOptions(_))));
    }

    #[test]
    fn commits_every_chunk_of_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig::at(dir.path()).transactional(true);
        let snapshot = dir.path().join("graph.snap");
        let mut p = StorePipeline::new(Box::new(DirectWriteStore::new(
            GraphBackend::open(&config).unwrap(),
        )));
        p.wrap(Box::new(AutocommitLayer::new(2).unwrap()));

        let o = PersistentObject::new(Id::from_raw("e"), ClassInfo::new("N", "urn:t"));
        let f = Feature::attributes("tags");
        let tag = |t: &str| StoreValue::Attribute(Value::from(t));

        p.add(&o, &f, None, &tag("a")).unwrap();
        assert!(!snapshot.exists());
        p.add(&o, &f, None, &tag("b")).unwrap();
        assert!(snapshot.exists());
        p.add(&o, &f, None, &tag("c")).unwrap();

        let mut committed = DirectWriteStore::new(GraphBackend::open(&config).unwrap());
        let e = committed.object(&Id::from_raw("e")).unwrap().unwrap();
        assert_eq!(committed.size(&e, &f).unwrap(), 2);
    }
}
