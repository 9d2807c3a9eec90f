use std::collections::HashMap;
use std::sync::Arc;

use by_address::ByAddress;

use class_objects::{ClassObject, MethodShape};

use crate::ResolutionResult;

/// Memoizes resolution results per (receiver class identity, method shape).
/// Resolution is deterministic for a fixed hierarchy and classes are never
/// unloaded, so entries stay valid forever.
pub struct ResolutionLookupCache {
    inner: HashMap<(ByAddress<Arc<ClassObject>>, MethodShape), ResolutionResult>,
}

impl ResolutionLookupCache {
    pub fn new() -> Self {
        Self { inner: HashMap::new() }
    }

    pub fn add_entry(&mut self, class: Arc<ClassObject>, shape: MethodShape, result: ResolutionResult) {
        self.inner.insert((ByAddress(class), shape), result);
    }

    pub fn lookup(&self, class: Arc<ClassObject>, shape: MethodShape) -> Option<ResolutionResult> {
        self.inner.get(&(ByAddress(class), shape)).cloned()
    }
}

impl Default for ResolutionLookupCache {
    fn default() -> Self {
        Self::new()
    }
}
