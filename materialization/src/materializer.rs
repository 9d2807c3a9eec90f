use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, trace};

use class_objects::layout::{class_status_value, CLASS_STATUS_OFFSET};
use class_objects::{
    class_object_address, ensure_initialized, resolve_field, ClassLoader, ClassObject, ClassStatus,
    HasAccessFlags, Method, MethodShape, StaticInitializerRunner,
};
use method_resolution::lookup_cache::ResolutionLookupCache;
use method_resolution::{interface_method_resolution, virtual_method_resolution, ResolutionResult};
use ssa_ir::{
    method_signature, Callee, CodeAddress, IRBuilder, IRFunction, IRLayer, IRModule, IRSignature, IRType,
};
use stub_mangling::{
    demangle_stub_symbol, mangle_direct_method_call, DemangledClassObjectAccess, DemangledFieldAccess,
    DemangledMethodResolutionCall, DemangledStaticCall, DemangledVariant, MethodResolution,
};

use crate::dispatch::{emit_itable_dispatch, emit_vtable_dispatch};
use crate::stubs::StubsManager;
use crate::{INITIALIZE_CLASS_SYMBOL, THROW_LINKAGE_ERROR_SYMBOL};

/// Resolution along the superclass chain only, as used by static and
/// special calls (no dispatch table involved).
pub(crate) fn find_method_in_chain(
    class: &Arc<ClassObject>,
    method_name: &str,
    descriptor: &str,
) -> Option<(Arc<ClassObject>, Method)> {
    let mut current = Some(class.clone());
    while let Some(searched) = current {
        let class_class = searched.try_unwrap_class_class()?;
        if let Some(method) = class_class.find_declared_method(method_name, descriptor) {
            return Some((searched.clone(), method.clone()));
        }
        current = class_class.super_class().cloned();
    }
    None
}

fn class_object_signature() -> IRSignature {
    IRSignature { parameters: vec![], return_type: Some(IRType::Pointer) }
}

fn direct_forwarder(symbol: &str, signature: IRSignature, target_symbol: String) -> IRFunction {
    let mut builder = IRBuilder::new(symbol, signature.clone());
    let args = builder.arguments().to_vec();
    let result = builder.create_tail_call(Callee::Symbol(target_symbol), signature, args);
    builder.create_return(result);
    builder.finish()
}

struct MaterializeState {
    finished: HashMap<String, CodeAddress>,
    in_flight: HashSet<String>,
}

/// Materializes mangled stub symbols on the link layer's unresolved-symbol
/// query: demangle, load and resolve against the (now possibly loaded)
/// hierarchy, build the trampoline as IR, hand it to the compile layer and
/// patch the stub pointer. Every symbol is materialized exactly once;
/// concurrent first calls block on the in-flight set.
pub struct StubMaterializer {
    loader: Arc<ClassLoader>,
    initializer: Arc<dyn StaticInitializerRunner>,
    base_layer: Arc<dyn IRLayer>,
    stubs: Arc<StubsManager>,
    virtual_cache: Mutex<ResolutionLookupCache>,
    interface_cache: Mutex<ResolutionLookupCache>,
    state: Mutex<MaterializeState>,
    state_changed: Condvar,
    /// Owns the message bytes referenced by throwing trampolines.
    error_messages: Mutex<Vec<Box<str>>>,
}

impl StubMaterializer {
    pub fn new(
        loader: Arc<ClassLoader>,
        initializer: Arc<dyn StaticInitializerRunner>,
        base_layer: Arc<dyn IRLayer>,
        stubs: Arc<StubsManager>,
    ) -> Self {
        Self {
            loader,
            initializer,
            base_layer,
            stubs,
            virtual_cache: Mutex::new(ResolutionLookupCache::new()),
            interface_cache: Mutex::new(ResolutionLookupCache::new()),
            state: Mutex::new(MaterializeState { finished: HashMap::new(), in_flight: HashSet::new() }),
            state_changed: Condvar::new(),
            error_messages: Mutex::new(Vec::new()),
        }
    }

    /// Entry point for the link layer. `None` declines symbols that are not
    /// ours. Every demangleable symbol yields an address; resolution and
    /// linkage failures compile into trampolines that raise the Java error
    /// at the call site's dynamic moment.
    pub fn materialize(&self, symbol: &str) -> Option<CodeAddress> {
        let demangled = demangle_stub_symbol(symbol);
        if matches!(demangled, DemangledVariant::NotOurs) {
            return None;
        }
        {
            let mut state = self.state.lock().unwrap();
            loop {
                if let Some(address) = state.finished.get(symbol) {
                    return Some(*address);
                }
                if state.in_flight.contains(symbol) {
                    state = self.state_changed.wait(state).unwrap();
                } else {
                    state.in_flight.insert(symbol.to_string());
                    break;
                }
            }
        }
        debug!("materializing {}", symbol);
        let address = match demangled {
            DemangledVariant::NotOurs => unreachable!(),
            DemangledVariant::FieldAccess(request) => self.materialize_field_access(symbol, request),
            DemangledVariant::MethodResolutionCall(request) => {
                self.materialize_method_resolution(symbol, request)
            }
            DemangledVariant::StaticCall(request) => self.materialize_static_call(symbol, request),
            DemangledVariant::ClassObjectAccess(request) => self.materialize_class_object(symbol, request),
        };
        self.stubs.update_pointer(symbol, address);
        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(symbol);
        state.finished.insert(symbol.to_string(), address);
        self.state_changed.notify_all();
        drop(state);
        Some(address)
    }

    /// Whether `symbol` has been materialized already; later calls bypass
    /// materialization entirely through the stubs manager's pointer table.
    pub fn is_materialized(&self, symbol: &str) -> bool {
        self.state.lock().unwrap().finished.contains_key(symbol)
    }

    fn compile(&self, function: IRFunction) -> CodeAddress {
        self.base_layer.add(IRModule { functions: vec![function] })
    }

    fn throwing_trampoline(&self, symbol: &str, signature: IRSignature, message: String) -> CodeAddress {
        trace!("linkage error for {}: {}", symbol, message);
        let message_address = {
            let mut messages = self.error_messages.lock().unwrap();
            messages.push(message.into_boxed_str());
            messages.last().unwrap().as_ptr() as usize
        };
        let mut builder = IRBuilder::new(symbol, signature);
        let message_pointer = builder.const_ptr(message_address);
        builder.create_call(
            Callee::Symbol(THROW_LINKAGE_ERROR_SYMBOL.to_string()),
            IRSignature { parameters: vec![IRType::Pointer], return_type: None },
            vec![message_pointer],
        );
        builder.create_unreachable();
        self.compile(builder.finish())
    }

    fn materialize_field_access(&self, symbol: &str, request: DemangledFieldAccess<'_>) -> CodeAddress {
        let descriptor = request.descriptor.to_string();
        let class = match self.loader.for_name(request.class_name) {
            Ok(class) => class,
            Err(err) => return self.throwing_trampoline(symbol, class_object_signature(), err.to_string()),
        };
        let (declaring, field) = match resolve_field(&class, request.field_name, &descriptor) {
            Some(found) => found,
            None => {
                let message =
                    format!("NoSuchFieldError: {}.{}:{}", request.class_name, request.field_name, descriptor);
                return self.throwing_trampoline(symbol, class_object_signature(), message);
            }
        };
        if field.is_static() {
            if let Err(err) = ensure_initialized(&declaring, &*self.initializer) {
                return self.throwing_trampoline(symbol, class_object_signature(), err.to_string());
            }
            let address = declaring.static_field_address(&field.name).unwrap();
            let mut builder = IRBuilder::new(symbol, class_object_signature());
            let pointer = builder.const_ptr(address);
            builder.create_return(Some(pointer));
            self.compile(builder.finish())
        } else {
            let offset = class.field_offset(&field.name).unwrap();
            let signature = IRSignature { parameters: vec![], return_type: Some(IRType::I64) };
            let mut builder = IRBuilder::new(symbol, signature);
            let offset_const = builder.const_int(IRType::I64, offset as i64);
            builder.create_return(Some(offset_const));
            self.compile(builder.finish())
        }
    }

    fn virtual_resolution_cached(
        &self,
        class: &Arc<ClassObject>,
        method_name: &str,
        descriptor: &str,
    ) -> ResolutionResult {
        let shape = MethodShape { name: method_name.to_string(), descriptor: descriptor.to_string() };
        if let Some(hit) = self.virtual_cache.lock().unwrap().lookup(class.clone(), shape.clone()) {
            return hit;
        }
        let result = virtual_method_resolution(class, method_name, descriptor);
        self.virtual_cache.lock().unwrap().add_entry(class.clone(), shape, result.clone());
        result
    }

    fn interface_resolution_cached(
        &self,
        class: &Arc<ClassObject>,
        method_name: &str,
        descriptor: &str,
    ) -> ResolutionResult {
        let shape = MethodShape { name: method_name.to_string(), descriptor: descriptor.to_string() };
        if let Some(hit) = self.interface_cache.lock().unwrap().lookup(class.clone(), shape.clone()) {
            return hit;
        }
        let result = interface_method_resolution(class, method_name, descriptor, &self.loader);
        self.interface_cache.lock().unwrap().add_entry(class.clone(), shape, result.clone());
        result
    }

    fn materialize_method_resolution(
        &self,
        symbol: &str,
        request: DemangledMethodResolutionCall<'_>,
    ) -> CodeAddress {
        let signature = method_signature(&request.descriptor, true);
        let descriptor = request.descriptor.to_string();
        let class = match self.loader.for_name(request.class_name) {
            Ok(class) => class,
            Err(err) => return self.throwing_trampoline(symbol, signature, err.to_string()),
        };
        match request.resolution {
            MethodResolution::Special => match find_method_in_chain(&class, request.method_name, &descriptor)
            {
                Some((declaring, method)) if !method.is_static() => {
                    let target = mangle_direct_method_call(&declaring.name(), &method.name, &request.descriptor);
                    self.compile(direct_forwarder(symbol, signature, target))
                }
                Some(_) => {
                    let message = format!(
                        "IncompatibleClassChangeError: {}.{}:{} is static",
                        request.class_name, request.method_name, descriptor
                    );
                    self.throwing_trampoline(symbol, signature, message)
                }
                None => {
                    let message = format!(
                        "NoSuchMethodError: {}.{}:{}",
                        request.class_name, request.method_name, descriptor
                    );
                    self.throwing_trampoline(symbol, signature, message)
                }
            },
            MethodResolution::Virtual => {
                match self.virtual_resolution_cached(&class, request.method_name, &descriptor) {
                    ResolutionResult::VTable(offset) => {
                        self.compile(vtable_trampoline(symbol, &signature, offset.slot))
                    }
                    ResolutionResult::ITable(offset) => {
                        self.compile(itable_trampoline(symbol, &signature, offset))
                    }
                    ResolutionResult::Error(message) => self.throwing_trampoline(symbol, signature, message),
                }
            }
            MethodResolution::Interface => {
                match self.interface_resolution_cached(&class, request.method_name, &descriptor) {
                    ResolutionResult::VTable(offset) => {
                        self.compile(vtable_trampoline(symbol, &signature, offset.slot))
                    }
                    ResolutionResult::ITable(offset) => {
                        self.compile(itable_trampoline(symbol, &signature, offset))
                    }
                    ResolutionResult::Error(message) => self.throwing_trampoline(symbol, signature, message),
                }
            }
        }
    }

    fn materialize_static_call(&self, symbol: &str, request: DemangledStaticCall<'_>) -> CodeAddress {
        let signature = method_signature(&request.descriptor, false);
        let descriptor = request.descriptor.to_string();
        let class = match self.loader.for_name(request.class_name) {
            Ok(class) => class,
            Err(err) => return self.throwing_trampoline(symbol, signature, err.to_string()),
        };
        match find_method_in_chain(&class, request.method_name, &descriptor) {
            Some((declaring, method)) if method.is_static() => {
                if let Err(err) = ensure_initialized(&declaring, &*self.initializer) {
                    return self.throwing_trampoline(symbol, signature, err.to_string());
                }
                let target = mangle_direct_method_call(&declaring.name(), &method.name, &request.descriptor);
                self.compile(direct_forwarder(symbol, signature, target))
            }
            Some(_) => {
                let message = format!(
                    "IncompatibleClassChangeError: {}.{}:{} is not static",
                    request.class_name, request.method_name, descriptor
                );
                self.throwing_trampoline(symbol, signature, message)
            }
            None => {
                let message = format!(
                    "NoSuchMethodError: {}.{}:{}",
                    request.class_name, request.method_name, descriptor
                );
                self.throwing_trampoline(symbol, signature, message)
            }
        }
    }

    fn materialize_class_object(&self, symbol: &str, request: DemangledClassObjectAccess<'_>) -> CodeAddress {
        let signature = class_object_signature();
        let class = match self.loader.for_field_descriptor(&request.descriptor) {
            Ok(class) => class,
            Err(err) => return self.throwing_trampoline(symbol, signature, err.to_string()),
        };
        if !request.must_initialize {
            let mut builder = IRBuilder::new(symbol, signature);
            let pointer = builder.const_ptr(class_object_address(&class));
            builder.create_return(Some(pointer));
            return self.compile(builder.finish());
        }
        if let Err(err) = ensure_initialized(&class, &*self.initializer) {
            return self.throwing_trampoline(symbol, signature, err.to_string());
        }
        // Guarded <clinit> sequence: re-checks the mirror's state word so a
        // caller racing initialization still enters the runtime's
        // initializer (which blocks on the class monitor) before using the
        // class object.
        let mut builder = IRBuilder::new(symbol, signature);
        let class_pointer = builder.const_ptr(class_object_address(&class));
        let status_address = builder.create_ptr_add(class_pointer, CLASS_STATUS_OFFSET);
        let status = builder.create_load(IRType::I32, status_address);
        let initialized = builder.const_int(IRType::I32, class_status_value(ClassStatus::Initialized));
        let is_initialized = builder.create_cmp_eq(status, initialized);
        let done_block = builder.create_block();
        let init_block = builder.create_block();
        builder.create_cond_branch(is_initialized, done_block, init_block);
        builder.set_insert_point(init_block);
        builder.create_call(
            Callee::Symbol(INITIALIZE_CLASS_SYMBOL.to_string()),
            IRSignature { parameters: vec![IRType::Pointer], return_type: None },
            vec![class_pointer],
        );
        builder.create_branch(done_block);
        builder.set_insert_point(done_block);
        builder.create_return(Some(class_pointer));
        self.compile(builder.finish())
    }
}

fn vtable_trampoline(symbol: &str, signature: &IRSignature, slot: class_objects::MethodNumber) -> IRFunction {
    let mut builder = IRBuilder::new(symbol, signature.clone());
    let args = builder.arguments().to_vec();
    let receiver = args[0];
    let result = emit_vtable_dispatch(&mut builder, receiver, slot, signature, args, true);
    builder.create_return(result);
    builder.finish()
}

fn itable_trampoline(symbol: &str, signature: &IRSignature, offset: method_resolution::ITableOffset) -> IRFunction {
    let mut builder = IRBuilder::new(symbol, signature.clone());
    let args = builder.arguments().to_vec();
    let receiver = args[0];
    let result = emit_itable_dispatch(&mut builder, receiver, offset, signature, args, true);
    builder.create_return(result);
    builder.finish()
}
