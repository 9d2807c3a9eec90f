#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use class_objects::{
    ClassDefinition, ClassDefinitionSource, ClassLoader, ClassLoadingError, ClassObject, Field, Method,
    StaticInitializerRunner, ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC,
};
use materialization::{CompileCallbackManager, LazyClassHelper, StubMaterializer, StubsManager};
use ssa_ir::{CodeAddress, IRFunction, IRLayer, IRModule};

pub struct SpySource {
    definitions: HashMap<String, ClassDefinition>,
    load_counts: Arc<Mutex<HashMap<String, usize>>>,
}

impl SpySource {
    pub fn new(definitions: Vec<ClassDefinition>) -> Self {
        Self {
            definitions: definitions.into_iter().map(|d| (d.name.clone(), d)).collect(),
            load_counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn load_counts(&self) -> Arc<Mutex<HashMap<String, usize>>> {
        self.load_counts.clone()
    }
}

impl ClassDefinitionSource for SpySource {
    fn find_class(&self, binary_name: &str) -> Result<ClassDefinition, ClassLoadingError> {
        *self.load_counts.lock().unwrap().entry(binary_name.to_string()).or_insert(0) += 1;
        self.definitions
            .get(binary_name)
            .cloned()
            .ok_or_else(|| ClassLoadingError::ClassNotFound(binary_name.to_string()))
    }
}

pub struct SpyInitializer {
    runs: Mutex<HashMap<String, usize>>,
}

impl SpyInitializer {
    pub fn new() -> Self {
        Self { runs: Mutex::new(HashMap::new()) }
    }

    pub fn runs_of(&self, class_name: &str) -> usize {
        self.runs.lock().unwrap().get(class_name).copied().unwrap_or(0)
    }
}

impl StaticInitializerRunner for SpyInitializer {
    fn run_static_initializer(&self, class: &Arc<ClassObject>) -> Result<(), String> {
        *self.runs.lock().unwrap().entry(class.name()).or_insert(0) += 1;
        Ok(())
    }
}

/// An `IRLayer` that records every module and hands back synthetic code
/// addresses.
pub struct RecordingIRLayer {
    modules: Mutex<Vec<IRModule>>,
    next_address: AtomicUsize,
}

impl RecordingIRLayer {
    pub fn new() -> Self {
        Self { modules: Mutex::new(Vec::new()), next_address: AtomicUsize::new(0x1000_0000) }
    }

    pub fn module_count(&self) -> usize {
        self.modules.lock().unwrap().len()
    }

    pub fn function_named(&self, name: &str) -> Option<IRFunction> {
        self.modules
            .lock()
            .unwrap()
            .iter()
            .flat_map(|module| module.functions.iter())
            .find(|function| function.name == name)
            .cloned()
    }
}

impl IRLayer for RecordingIRLayer {
    fn add(&self, module: IRModule) -> CodeAddress {
        let mut modules = self.modules.lock().unwrap();
        modules.push(module);
        CodeAddress(self.next_address.fetch_add(0x100, Ordering::Relaxed))
    }
}

pub struct JitFixture {
    pub loader: Arc<ClassLoader>,
    pub stubs: Arc<StubsManager>,
    pub callbacks: Arc<CompileCallbackManager>,
    pub materializer: Arc<StubMaterializer>,
    pub helper: LazyClassHelper,
    pub layer: Arc<RecordingIRLayer>,
    pub initializer: Arc<SpyInitializer>,
    pub load_counts: Arc<Mutex<HashMap<String, usize>>>,
}

pub fn fixture(definitions: Vec<ClassDefinition>) -> JitFixture {
    let source = SpySource::new(definitions);
    let load_counts = source.load_counts();
    let loader = Arc::new(ClassLoader::new(Box::new(source)));
    let stubs = Arc::new(StubsManager::new());
    let callbacks = Arc::new(CompileCallbackManager::new());
    let layer = Arc::new(RecordingIRLayer::new());
    let initializer = Arc::new(SpyInitializer::new());
    let materializer =
        Arc::new(StubMaterializer::new(loader.clone(), initializer.clone(), layer.clone(), stubs.clone()));
    let helper =
        LazyClassHelper::new(loader.clone(), stubs.clone(), callbacks.clone(), materializer.clone());
    JitFixture { loader, stubs, callbacks, materializer, helper, layer, initializer, load_counts }
}

pub fn class(
    name: &str,
    super_class: Option<&str>,
    interfaces: Vec<&str>,
    methods: Vec<Method>,
    fields: Vec<Field>,
) -> ClassDefinition {
    ClassDefinition {
        name: name.to_string(),
        access_flags: ACC_PUBLIC,
        super_class: super_class.map(str::to_string),
        interfaces: interfaces.into_iter().map(str::to_string).collect(),
        methods,
        fields,
    }
}

pub fn interface(name: &str, methods: Vec<Method>) -> ClassDefinition {
    ClassDefinition {
        name: name.to_string(),
        access_flags: ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT,
        super_class: None,
        interfaces: vec![],
        methods,
        fields: vec![],
    }
}

pub fn object_definition() -> ClassDefinition {
    class(
        "java/lang/Object",
        None,
        vec![],
        vec![
            Method::new("toString", "()Ljava/lang/String;", ACC_PUBLIC),
            Method::new("hashCode", "()I", ACC_PUBLIC),
        ],
        vec![],
    )
}

pub fn clinit() -> Method {
    Method::new("<clinit>", "()V", ACC_STATIC)
}
