use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::thread::ThreadId;

use descriptors::{BaseType, FieldType};
use log::trace;
use thiserror::Error;

use crate::interface_table::InterfaceTable;
use crate::{ArrayClass, ClassClass, ClassObject, Field, Method};

/// The shape of a class as delivered by the (external) class-file parser.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    pub name: String,
    pub access_flags: u16,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<Method>,
    pub fields: Vec<Field>,
}

/// Where class definitions come from. Class-file parsing and the classpath
/// live behind this seam.
pub trait ClassDefinitionSource: Send + Sync {
    fn find_class(&self, binary_name: &str) -> Result<ClassDefinition, ClassLoadingError>;
}

#[derive(Error, Debug)]
pub enum ClassLoadingError {
    #[error("NoClassDefFoundError: {0}")]
    ClassNotFound(String),
    #[error("ClassCircularityError: {0}")]
    ClassCircularity(String),
    #[error("IncompatibleClassChangeError: {0} is not an interface")]
    InterfaceExpected(String),
}

/// The bootstrap class loader: an idempotent registry of loaded classes
/// keyed by canonical field descriptor, with the builtin primitive class
/// objects pre-registered. Loading a class loads its superclass and
/// superinterfaces transitively.
pub struct ClassLoader {
    source: Box<dyn ClassDefinitionSource>,
    classes: RwLock<HashMap<String, Arc<ClassObject>>>,
    in_flight: Mutex<HashMap<String, ThreadId>>,
    in_flight_changed: Condvar,
    interface_table: InterfaceTable,
}

impl ClassLoader {
    pub fn new(source: Box<dyn ClassDefinitionSource>) -> Self {
        let mut classes = HashMap::new();
        for base in [
            BaseType::Byte,
            BaseType::Char,
            BaseType::Double,
            BaseType::Float,
            BaseType::Int,
            BaseType::Long,
            BaseType::Short,
            BaseType::Boolean,
            BaseType::Void,
        ] {
            classes.insert(base.to_string(), Arc::new(ClassObject::Primitive(base)));
        }
        Self {
            source,
            classes: RwLock::new(classes),
            in_flight: Mutex::new(HashMap::new()),
            in_flight_changed: Condvar::new(),
            interface_table: InterfaceTable::new(),
        }
    }

    pub fn interface_table(&self) -> &InterfaceTable {
        &self.interface_table
    }

    /// Returns the class object for `binary_name`, loading it and its
    /// transitive dependencies if required. Loads are idempotent: a
    /// concurrent load of the same name blocks until the first one finishes,
    /// a recursive load from the same thread is a circularity error.
    pub fn for_name(&self, binary_name: &str) -> Result<Arc<ClassObject>, ClassLoadingError> {
        let key = format!("L{};", binary_name);
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            loop {
                if let Some(class) = self.classes.read().unwrap().get(&key) {
                    return Ok(class.clone());
                }
                match in_flight.get(binary_name) {
                    Some(loading_thread) if *loading_thread == thread::current().id() => {
                        return Err(ClassLoadingError::ClassCircularity(binary_name.to_string()));
                    }
                    Some(_) => in_flight = self.in_flight_changed.wait(in_flight).unwrap(),
                    None => {
                        in_flight.insert(binary_name.to_string(), thread::current().id());
                        break;
                    }
                }
            }
        }
        let result = self.define_class(binary_name, &key);
        let mut in_flight = self.in_flight.lock().unwrap();
        in_flight.remove(binary_name);
        self.in_flight_changed.notify_all();
        drop(in_flight);
        result
    }

    fn define_class(&self, binary_name: &str, key: &str) -> Result<Arc<ClassObject>, ClassLoadingError> {
        let definition = self.source.find_class(binary_name)?;
        let super_class = match &definition.super_class {
            Some(name) => Some(self.for_name(name)?),
            None => None,
        };
        let mut interfaces = Vec::with_capacity(definition.interfaces.len());
        for name in &definition.interfaces {
            let interface = self.for_name(name)?;
            if !interface.is_interface() {
                return Err(ClassLoadingError::InterfaceExpected(name.clone()));
            }
            interfaces.push(interface);
        }
        let class = Arc::new(ClassObject::Object(ClassClass::new(definition, super_class, interfaces)));
        self.classes.write().unwrap().insert(key.to_string(), class.clone());
        trace!("loaded class {}", binary_name);
        Ok(class)
    }

    /// The class object for `binary_name` if it has been loaded previously.
    pub fn for_name_loaded(&self, binary_name: &str) -> Option<Arc<ClassObject>> {
        self.classes.read().unwrap().get(&format!("L{};", binary_name)).cloned()
    }

    /// The class object for a field descriptor, loading if required. Array
    /// mirrors are created on first use from their loaded component.
    pub fn for_field_descriptor(&self, descriptor: &FieldType<'_>) -> Result<Arc<ClassObject>, ClassLoadingError> {
        match descriptor {
            FieldType::Base(_) => {
                Ok(self.classes.read().unwrap().get(&descriptor.to_string()).unwrap().clone())
            }
            FieldType::Object(object) => self.for_name(object.class_name),
            FieldType::Array(array) => {
                let key = descriptor.to_string();
                if let Some(class) = self.classes.read().unwrap().get(&key) {
                    return Ok(class.clone());
                }
                let component = self.for_field_descriptor(&array.component_type)?;
                let class = Arc::new(ClassObject::Array(ArrayClass { component }));
                // a racing load of the same array type keeps the first mirror
                let mut classes = self.classes.write().unwrap();
                Ok(classes.entry(key).or_insert(class).clone())
            }
        }
    }

    pub fn for_field_descriptor_loaded(&self, descriptor: &FieldType<'_>) -> Option<Arc<ClassObject>> {
        self.classes.read().unwrap().get(&descriptor.to_string()).cloned()
    }
}
