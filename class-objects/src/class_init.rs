use std::sync::Arc;
use std::thread;

use log::trace;
use thiserror::Error;

use crate::{ClassClass, ClassObject, ClassStatus, HasAccessFlags};

/// Executes `<clinit>` bodies. The real implementation calls into compiled
/// code; tests install spies.
pub trait StaticInitializerRunner: Send + Sync {
    /// An `Err` carries the description of the Java throwable the
    /// initializer raised.
    fn run_static_initializer(&self, class: &Arc<ClassObject>) -> Result<(), String>;
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ClassInitError {
    #[error("ExceptionInInitializerError: {0}")]
    InitializerFailed(String),
    #[error("NoClassDefFoundError: initialization of {0} failed previously")]
    ErroredClass(String),
}

/// Runs class initialization per JVM §5.5: at most once per class, the
/// class monitor serializing initializers, reentrant for the initializing
/// thread, superclass first, failure latched.
pub fn ensure_initialized(
    class: &Arc<ClassObject>,
    runner: &dyn StaticInitializerRunner,
) -> Result<(), ClassInitError> {
    let class_class = match &**class {
        ClassObject::Primitive(_) => return Ok(()),
        ClassObject::Array(array) => return ensure_initialized(&array.component, runner),
        ClassObject::Object(class_class) => class_class,
    };
    {
        let mut state = class_class.init.state.lock().unwrap();
        loop {
            match state.status {
                ClassStatus::Initialized => return Ok(()),
                ClassStatus::Errored => {
                    return Err(ClassInitError::ErroredClass(class_class.name().to_string()));
                }
                ClassStatus::Initializing => {
                    if state.initializing_thread == Some(thread::current().id()) {
                        // recursive reference from this class's own initializer
                        return Ok(());
                    }
                    state = class_class.init.on_change.wait(state).unwrap();
                }
                ClassStatus::Loaded => {
                    state.status = ClassStatus::Initializing;
                    state.initializing_thread = Some(thread::current().id());
                    break;
                }
            }
        }
    }
    let result = run_initializers(class, class_class, runner);
    let mut state = class_class.init.state.lock().unwrap();
    state.status = if result.is_ok() { ClassStatus::Initialized } else { ClassStatus::Errored };
    state.initializing_thread = None;
    class_class.init.on_change.notify_all();
    drop(state);
    result
}

fn run_initializers(
    class: &Arc<ClassObject>,
    class_class: &ClassClass,
    runner: &dyn StaticInitializerRunner,
) -> Result<(), ClassInitError> {
    if let Some(super_class) = class_class.super_class() {
        ensure_initialized(super_class, runner)?;
    }
    if !class_class.is_interface() {
        // superinterfaces declaring default methods, JVM §5.5 step 7
        for interface in class_class.interfaces() {
            if declares_default_methods(interface) {
                ensure_initialized(interface, runner)?;
            }
        }
    }
    if class_class.has_static_initializer() {
        trace!("running static initializer of {}", class_class.name());
        runner.run_static_initializer(class).map_err(ClassInitError::InitializerFailed)?;
    }
    Ok(())
}

fn declares_default_methods(interface: &Arc<ClassObject>) -> bool {
    match interface.try_unwrap_class_class() {
        Some(class_class) => class_class
            .methods()
            .iter()
            .any(|method| !method.is_static() && !method.is_abstract()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::loader::tests::{class, interface, FixtureSource};
    use crate::{ClassLoader, Method, ACC_ABSTRACT, ACC_PUBLIC, ACC_STATIC};

    use super::*;

    struct SpyInitializer {
        runs: Mutex<HashMap<String, usize>>,
        failing: Option<String>,
    }

    impl SpyInitializer {
        fn new() -> Self {
            Self { runs: Mutex::new(HashMap::new()), failing: None }
        }

        fn failing(class_name: &str) -> Self {
            Self { runs: Mutex::new(HashMap::new()), failing: Some(class_name.to_string()) }
        }

        fn runs_of(&self, class_name: &str) -> usize {
            self.runs.lock().unwrap().get(class_name).copied().unwrap_or(0)
        }
    }

    impl StaticInitializerRunner for SpyInitializer {
        fn run_static_initializer(&self, class: &Arc<ClassObject>) -> Result<(), String> {
            let name = class.name();
            *self.runs.lock().unwrap().entry(name.clone()).or_insert(0) += 1;
            if self.failing.as_deref() == Some(name.as_str()) {
                return Err("boom".to_string());
            }
            Ok(())
        }
    }

    fn clinit() -> Method {
        Method::new("<clinit>", "()V", ACC_STATIC)
    }

    #[test]
    fn initializes_superclass_first_and_once() {
        let definitions = vec![
            class("A", None, vec![], vec![clinit()], vec![]),
            class("B", Some("A"), vec![], vec![clinit()], vec![]),
        ];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let b = loader.for_name("B").unwrap();
        let spy = SpyInitializer::new();
        ensure_initialized(&b, &spy).unwrap();
        ensure_initialized(&b, &spy).unwrap();
        assert_eq!(spy.runs_of("A"), 1);
        assert_eq!(spy.runs_of("B"), 1);
        assert!(b.is_initialized());
        assert!(loader.for_name("A").unwrap().is_initialized());
    }

    #[test]
    fn default_method_interfaces_are_initialized_with_the_class() {
        let definitions = vec![
            interface(
                "WithDefault",
                vec![
                    Method::new("m", "()V", ACC_PUBLIC),
                    Method::new("<clinit>", "()V", ACC_STATIC),
                ],
            ),
            interface(
                "AbstractOnly",
                vec![
                    Method::new("n", "()V", ACC_PUBLIC | ACC_ABSTRACT),
                    Method::new("<clinit>", "()V", ACC_STATIC),
                ],
            ),
            class("C", None, vec!["WithDefault", "AbstractOnly"], vec![clinit()], vec![]),
        ];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let c = loader.for_name("C").unwrap();
        let spy = SpyInitializer::new();
        ensure_initialized(&c, &spy).unwrap();
        assert_eq!(spy.runs_of("WithDefault"), 1);
        assert_eq!(spy.runs_of("AbstractOnly"), 0);
        assert_eq!(spy.runs_of("C"), 1);
    }

    #[test]
    fn failure_is_latched() {
        let definitions = vec![class("A", None, vec![], vec![clinit()], vec![])];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let a = loader.for_name("A").unwrap();
        let spy = SpyInitializer::failing("A");
        assert!(matches!(ensure_initialized(&a, &spy), Err(ClassInitError::InitializerFailed(_))));
        assert_eq!(a.status(), ClassStatus::Errored);
        assert!(matches!(ensure_initialized(&a, &spy), Err(ClassInitError::ErroredClass(_))));
        assert_eq!(spy.runs_of("A"), 1);
    }

    #[test]
    fn concurrent_initialization_runs_once() {
        let definitions = vec![class("A", None, vec![], vec![clinit()], vec![])];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let a = loader.for_name("A").unwrap();
        let spy = Arc::new(SpyInitializer::new());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let a = a.clone();
                let spy = spy.clone();
                scope.spawn(move || ensure_initialized(&a, &*spy).unwrap());
            }
        });
        assert_eq!(spy.runs_of("A"), 1);
        assert!(a.is_initialized());
    }

    #[test]
    fn classes_without_clinit_initialize_silently() {
        let definitions = vec![class("A", None, vec![], vec![], vec![])];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let a = loader.for_name("A").unwrap();
        let spy = SpyInitializer::new();
        ensure_initialized(&a, &spy).unwrap();
        assert_eq!(spy.runs_of("A"), 0);
        assert!(a.is_initialized());
    }
}
