use tracing::{info, warn};

use crate::error::StoreResult;
use crate::pipeline::{Request, Response, StoreLayer};
use crate::traits::PersistentStore;

/// Emits one `tracing` event per store call.
pub struct LoggingLayer;

impl StoreLayer for LoggingLayer {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn observe(
        &mut self,
        request: &Request<'_>,
        outcome: &StoreResult<Response>,
        _inner: &mut dyn PersistentStore,
    ) -> StoreResult<()> {
        let operation = request.operation();
        let (element, feature) = match request.target() {
            Some((object, feature)) => (Some(object.id().to_string()), Some(feature.name())),
            None => (None, None),
        };
        match outcome {
            Ok(_) => info!(operation, element = element.as_deref(), feature, "store call"),
            Err(e) => warn!(
                operation,
                element = element.as_deref(),
                feature,
                error = %e,
                "store call failed"
            ),
        }
        Ok(())
    }
}
