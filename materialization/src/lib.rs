//! The lazy half of the method compiler: the front-end API the bytecode
//! translator calls for every class-, field- or method-referring opcode
//! (`LazyClassHelper`), and the materializer the JIT link layer consults
//! when a mangled stub symbol is first needed (`StubMaterializer`).
//!
//! The shared pattern is fast path / slow path: if the target is already
//! loaded (and initialized where the JVM requires it), the helper emits
//! inline IR from known facts; otherwise it emits a call to a mangled
//! symbol and the materializer later demangles, resolves, compiles a
//! trampoline and patches the stub pointer.

pub mod dispatch;
pub mod lazy_helper;
pub mod materializer;
pub mod stubs;

pub use lazy_helper::{IndirectResolution, LazyClassHelper};
pub use materializer::StubMaterializer;
pub use stubs::{CompileCallbackManager, StubsManager};

/// Runtime entry points emitted IR may reference. Their definitions belong
/// to the VM runtime, not to this layer.
pub const ITABLE_LOOKUP_SYMBOL: &str = "jvm_itable_lookup";
pub const INITIALIZE_CLASS_SYMBOL: &str = "jvm_initialize_class";
pub const THROW_LINKAGE_ERROR_SYMBOL: &str = "jvm_throw_linkage_error";
