use std::sync::Arc;

use log::trace;

use class_objects::{class_object_address, ClassLoader, HasAccessFlags};
use descriptors::{FieldType, MethodType};
use method_resolution::{interface_method_resolution, virtual_method_resolution, ResolutionResult};
use ssa_ir::{method_signature, Callee, IRBuilder, IRSignature, IRType, IRValue};
use stub_mangling::{
    mangle_class_object_access, mangle_direct_method_call, mangle_field_access,
    mangle_method_resolution_call, mangle_static_call, MethodResolution,
};

use crate::dispatch::{emit_itable_dispatch, emit_vtable_dispatch};
use crate::materializer::{find_method_in_chain, StubMaterializer};
use crate::stubs::{CompileCallbackManager, StubsManager};

/// How `do_indirect_call` resolves its target.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IndirectResolution {
    /// 5.4.3.3. Method Resolution from the JVM Spec.
    Virtual,
    /// 5.4.3.4. Interface Method Resolution from the JVM Spec.
    Interface,
}

fn class_object_signature() -> IRSignature {
    IRSignature { parameters: vec![], return_type: Some(IRType::Pointer) }
}

/// Fetches properties of classes for the bytecode translator while keeping
/// class loading lazy: every query either produces inline IR from an
/// already loaded class object, or a call to a mangled stub symbol whose
/// definition the materializer supplies on first use.
///
/// One helper instance belongs to one translator task; nothing here is
/// shared mutable state except the loader and managers, which synchronize
/// internally.
pub struct LazyClassHelper {
    loader: Arc<ClassLoader>,
    stubs: Arc<StubsManager>,
    callbacks: Arc<CompileCallbackManager>,
    materializer: Arc<StubMaterializer>,
}

impl LazyClassHelper {
    pub fn new(
        loader: Arc<ClassLoader>,
        stubs: Arc<StubsManager>,
        callbacks: Arc<CompileCallbackManager>,
        materializer: Arc<StubMaterializer>,
    ) -> Self {
        Self { loader, stubs, callbacks, materializer }
    }

    fn ensure_stub(&self, symbol: &str) {
        if self.stubs.contains(symbol) {
            return;
        }
        let materializer = self.materializer.clone();
        let stub_symbol = symbol.to_string();
        let callback = self
            .callbacks
            .get_compile_callback(Box::new(move || materializer.materialize(&stub_symbol)));
        self.stubs.create_stub(symbol, callback);
    }

    fn stub_call(
        &self,
        builder: &mut IRBuilder,
        symbol: String,
        signature: IRSignature,
        args: Vec<IRValue>,
    ) -> Option<IRValue> {
        trace!("emitting call through stub {}", symbol);
        self.ensure_stub(&symbol);
        builder.create_call(Callee::Symbol(symbol), signature, args)
    }

    /// An IR pointer to the class object for `descriptor`. A compile-time
    /// constant when the class is already loaded (and initialized, when
    /// `must_initialize` asks for it); otherwise a `Load` stub call, whose
    /// initializing variant runs `<clinit>` before returning.
    pub fn get_class_object(
        &self,
        builder: &mut IRBuilder,
        descriptor: &FieldType<'_>,
        must_initialize: bool,
    ) -> IRValue {
        if let Some(class) = self.loader.for_field_descriptor_loaded(descriptor) {
            if !must_initialize || class.is_initialized() {
                return builder.const_ptr(class_object_address(&class));
            }
        }
        let symbol = mangle_class_object_access(descriptor, must_initialize);
        self.stub_call(builder, symbol, class_object_signature(), vec![]).unwrap()
    }

    /// The byte offset of instance field `field_name` within objects of
    /// `class_name`, as an i64 constant or a `() -> i64` stub call.
    pub fn get_instance_field_offset(
        &self,
        builder: &mut IRBuilder,
        class_name: &str,
        field_name: &str,
        field_type: &FieldType<'_>,
    ) -> IRValue {
        if let Some(offset) =
            self.loader.for_name_loaded(class_name).and_then(|class| class.field_offset(field_name))
        {
            return builder.const_int(IRType::I64, offset as i64);
        }
        let symbol = mangle_field_access(class_name, field_name, field_type);
        let signature = IRSignature { parameters: vec![], return_type: Some(IRType::I64) };
        self.stub_call(builder, symbol, signature, vec![]).unwrap()
    }

    /// A pointer to the static field's storage, as a constant once the
    /// class is loaded and initialized, else a `() -> ptr` stub call whose
    /// materialization runs `<clinit>` first.
    pub fn get_static_field_address(
        &self,
        builder: &mut IRBuilder,
        class_name: &str,
        field_name: &str,
        field_type: &FieldType<'_>,
    ) -> IRValue {
        if let Some(class) = self.loader.for_name_loaded(class_name) {
            if class.is_initialized() {
                if let Some(address) = class.static_field_address(field_name) {
                    return builder.const_ptr(address);
                }
            }
        }
        let symbol = mangle_field_access(class_name, field_name, field_type);
        self.stub_call(builder, symbol, class_object_signature(), vec![]).unwrap()
    }

    /// A non-virtual call to the possibly static `method_name` in
    /// `class_name`; implements `invokestatic` and `invokespecial`. `args`
    /// includes the receiver iff the call is not static.
    pub fn do_non_virtual_call(
        &self,
        builder: &mut IRBuilder,
        is_static: bool,
        class_name: &str,
        method_name: &str,
        descriptor: &MethodType<'_>,
        args: Vec<IRValue>,
    ) -> Option<IRValue> {
        let signature = method_signature(descriptor, !is_static);
        debug_assert_eq!(signature.parameters.len(), args.len());
        if let Some(class) = self.loader.for_name_loaded(class_name) {
            if let Some((declaring, method)) =
                find_method_in_chain(&class, method_name, &descriptor.to_string())
            {
                // invokestatic triggers initialization at execution time,
                // so the direct call shortcut requires it already happened
                if method.is_static() == is_static && (!is_static || declaring.is_initialized()) {
                    let target = mangle_direct_method_call(&declaring.name(), method_name, descriptor);
                    return builder.create_call(Callee::Symbol(target), signature, args);
                }
            }
        }
        let symbol = if is_static {
            mangle_static_call(class_name, method_name, descriptor)
        } else {
            mangle_method_resolution_call(MethodResolution::Special, class_name, method_name, descriptor)
        };
        self.stub_call(builder, symbol, signature, args)
    }

    /// A virtual or interface call to `method_name` in `class_name`;
    /// `args[0]` is the receiver. On the fast path the resolved dispatch
    /// sequence is inlined at the call site; otherwise the call goes
    /// through a method-resolution stub.
    pub fn do_indirect_call(
        &self,
        builder: &mut IRBuilder,
        class_name: &str,
        method_name: &str,
        descriptor: &MethodType<'_>,
        args: Vec<IRValue>,
        resolution: IndirectResolution,
    ) -> Option<IRValue> {
        let signature = method_signature(descriptor, true);
        debug_assert_eq!(signature.parameters.len(), args.len());
        debug_assert!(!args.is_empty());
        if let Some(class) = self.loader.for_name_loaded(class_name) {
            let descriptor_text = descriptor.to_string();
            let result = match resolution {
                IndirectResolution::Virtual => {
                    virtual_method_resolution(&class, method_name, &descriptor_text)
                }
                IndirectResolution::Interface => {
                    interface_method_resolution(&class, method_name, &descriptor_text, &self.loader)
                }
            };
            let receiver = args[0];
            match result {
                ResolutionResult::VTable(offset) => {
                    return emit_vtable_dispatch(builder, receiver, offset.slot, &signature, args, false);
                }
                ResolutionResult::ITable(offset) => {
                    return emit_itable_dispatch(builder, receiver, offset, &signature, args, false);
                }
                // the stub materializes into a throwing trampoline, raising
                // the linkage error at the call's dynamic moment
                ResolutionResult::Error(_) => {}
            }
        }
        let mangled_resolution = match resolution {
            IndirectResolution::Virtual => MethodResolution::Virtual,
            IndirectResolution::Interface => MethodResolution::Interface,
        };
        let symbol = mangle_method_resolution_call(mangled_resolution, class_name, method_name, descriptor);
        self.stub_call(builder, symbol, signature, args)
    }
}
