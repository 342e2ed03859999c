use crate::pricing::{is_demo_model, DEMO_SUFFIX};
use crate::trace::call::CallRecord;

/// A transformation applied to a call record before it is finalized.
pub trait CallMiddleware: Send + Sync {
    fn apply(&self, record: CallRecord) -> CallRecord;
}

impl<F> CallMiddleware for F
where
    F: Fn(CallRecord) -> CallRecord + Send + Sync,
{
    fn apply(&self, record: CallRecord) -> CallRecord {
        self(record)
    }
}

/// Tags a record's model with the reserved demo suffix so it prices at the
/// demonstration multiplier. Already-tagged models are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoPricing;

impl CallMiddleware for DemoPricing {
    fn apply(&self, mut record: CallRecord) -> CallRecord {
        if !record.model.is_empty() && !is_demo_model(&record.model) {
            record.model.push_str(DEMO_SUFFIX);
        }
        record
    }
}

/// Ordered middleware applied first to last.
#[derive(Default)]
pub struct MiddlewareChain {
    layers: Vec<Box<dyn CallMiddleware>>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: impl CallMiddleware + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn apply(&self, record: CallRecord) -> CallRecord {
        self.layers.iter().fold(record, |record, layer| layer.apply(record))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
