use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use log::trace;
use ssa_ir::CodeAddress;

/// Symbol to pointer table for lazily materialized stubs. In the running
/// JIT every entry backs an indirection in executable memory; the
/// materializer patches entries from compile-callback addresses to real
/// code, and callers that went through the stub once keep working without
/// re-materialization.
pub struct StubsManager {
    stubs: RwLock<HashMap<String, CodeAddress>>,
}

impl StubsManager {
    pub fn new() -> Self {
        Self { stubs: RwLock::new(HashMap::new()) }
    }

    /// Registers `symbol` pointing at `initial_pointer`, usually a compile
    /// callback. Creating an existing stub keeps the current pointer.
    pub fn create_stub(&self, symbol: &str, initial_pointer: CodeAddress) {
        let mut stubs = self.stubs.write().unwrap();
        if !stubs.contains_key(symbol) {
            trace!("created stub {}", symbol);
            stubs.insert(symbol.to_string(), initial_pointer);
        }
    }

    pub fn update_pointer(&self, symbol: &str, real_pointer: CodeAddress) {
        self.stubs.write().unwrap().insert(symbol.to_string(), real_pointer);
    }

    pub fn lookup(&self, symbol: &str) -> Option<CodeAddress> {
        self.stubs.read().unwrap().get(symbol).copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.stubs.read().unwrap().contains_key(symbol)
    }
}

impl Default for StubsManager {
    fn default() -> Self {
        Self::new()
    }
}

pub type MaterializeFn = Box<dyn FnOnce() -> Option<CodeAddress> + Send>;

/// Hands out unique callback addresses bound to one-shot materialization
/// functions. Executing such an address for the first time runs the bound
/// function; the stubs manager is then patched so nothing executes it
/// twice.
pub struct CompileCallbackManager {
    next_address: AtomicUsize,
    callbacks: Mutex<HashMap<CodeAddress, MaterializeFn>>,
}

/// Callback addresses live in their own range so they can never collide
/// with code the IR layer hands back.
const CALLBACK_ADDRESS_BASE: usize = 0x7f00_0000;

impl CompileCallbackManager {
    pub fn new() -> Self {
        Self { next_address: AtomicUsize::new(CALLBACK_ADDRESS_BASE), callbacks: Mutex::new(HashMap::new()) }
    }

    pub fn get_compile_callback(&self, materialize: MaterializeFn) -> CodeAddress {
        let address = CodeAddress(self.next_address.fetch_add(16, Ordering::Relaxed));
        self.callbacks.lock().unwrap().insert(address, materialize);
        address
    }

    /// First execution of a callback address: runs and consumes the bound
    /// materialization function. Returns `None` for unknown (or already
    /// consumed) addresses.
    pub fn run_callback(&self, address: CodeAddress) -> Option<CodeAddress> {
        let materialize = self.callbacks.lock().unwrap().remove(&address)?;
        materialize()
    }
}

impl Default for CompileCallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_keeps_the_first_pointer_and_update_overwrites() {
        let stubs = StubsManager::new();
        stubs.create_stub("f", CodeAddress(1));
        stubs.create_stub("f", CodeAddress(2));
        assert_eq!(stubs.lookup("f"), Some(CodeAddress(1)));
        stubs.update_pointer("f", CodeAddress(3));
        assert_eq!(stubs.lookup("f"), Some(CodeAddress(3)));
        assert!(stubs.contains("f"));
        assert!(!stubs.contains("g"));
    }

    #[test]
    fn callbacks_run_once() {
        let callbacks = CompileCallbackManager::new();
        let address = callbacks.get_compile_callback(Box::new(|| Some(CodeAddress(42))));
        assert_eq!(callbacks.run_callback(address), Some(CodeAddress(42)));
        assert_eq!(callbacks.run_callback(address), None);
    }

    #[test]
    fn callback_addresses_are_distinct() {
        let callbacks = CompileCallbackManager::new();
        let first = callbacks.get_compile_callback(Box::new(|| None));
        let second = callbacks.get_compile_callback(Box::new(|| None));
        assert_ne!(first, second);
    }
}
