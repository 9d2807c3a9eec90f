use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

use descriptors::BaseType;

use crate::field_numbers::{get_field_numbers, get_field_numbers_static};
use crate::method_numbers::get_method_numbers;
use crate::static_fields::RawStaticFields;

pub mod class_init;
pub mod field_numbers;
pub mod interface_table;
pub mod layout;
pub mod loader;
pub mod method_numbers;
pub mod static_fields;

pub use class_init::{ensure_initialized, ClassInitError, StaticInitializerRunner};
pub use field_numbers::{FieldNumber, StaticFieldNumber};
pub use interface_table::{InterfaceID, InterfaceTable};
pub use loader::{ClassDefinition, ClassDefinitionSource, ClassLoader, ClassLoadingError};
pub use method_numbers::MethodNumber;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

pub trait HasAccessFlags {
    fn access_flags(&self) -> u16;
    fn is_public(&self) -> bool {
        self.access_flags() & ACC_PUBLIC != 0
    }
    fn is_private(&self) -> bool {
        self.access_flags() & ACC_PRIVATE != 0
    }
    fn is_static(&self) -> bool {
        self.access_flags() & ACC_STATIC != 0
    }
    fn is_final(&self) -> bool {
        self.access_flags() & ACC_FINAL != 0
    }
    fn is_abstract(&self) -> bool {
        self.access_flags() & ACC_ABSTRACT != 0
    }
    fn is_interface(&self) -> bool {
        self.access_flags() & ACC_INTERFACE != 0
    }
}

/// Name and descriptor, the identity under which a method occupies a
/// dispatch-table slot.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MethodShape {
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

impl Method {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, access_flags: u16) -> Self {
        Self { name: name.into(), descriptor: descriptor.into(), access_flags }
    }

    pub fn shape(&self) -> MethodShape {
        MethodShape { name: self.name.clone(), descriptor: self.descriptor.clone() }
    }
}

impl HasAccessFlags for Method {
    fn access_flags(&self) -> u16 {
        self.access_flags
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
}

impl Field {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, access_flags: u16) -> Self {
        Self { name: name.into(), descriptor: descriptor.into(), access_flags }
    }
}

impl HasAccessFlags for Field {
    fn access_flags(&self) -> u16 {
        self.access_flags
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClassStatus {
    Loaded,
    Initializing,
    Initialized,
    Errored,
}

#[derive(Debug)]
pub(crate) struct InitMonitor {
    pub(crate) state: Mutex<InitState>,
    pub(crate) on_change: Condvar,
}

#[derive(Debug)]
pub(crate) struct InitState {
    pub(crate) status: ClassStatus,
    pub(crate) initializing_thread: Option<ThreadId>,
}

impl InitMonitor {
    fn new() -> Self {
        Self {
            state: Mutex::new(InitState { status: ClassStatus::Loaded, initializing_thread: None }),
            on_change: Condvar::new(),
        }
    }
}

/// A loaded class, owned by the class loader for the lifetime of the
/// process. Everything downstream treats these as read-only views; the only
/// mutable state is the initialization monitor and the static storage, which
/// the runtime writes through raw addresses.
#[derive(Debug)]
pub enum ClassObject {
    Primitive(BaseType),
    Array(ArrayClass),
    Object(ClassClass),
}

#[derive(Debug)]
pub struct ArrayClass {
    pub component: Arc<ClassObject>,
}

#[derive(Debug)]
pub struct ClassClass {
    name: String,
    access_flags: u16,
    super_class: Option<Arc<ClassObject>>,
    interfaces: Vec<Arc<ClassObject>>,
    methods: Vec<Method>,
    fields: Vec<Field>,
    method_numbers: HashMap<MethodShape, MethodNumber>,
    recursive_method_count: u32,
    instance_field_numbers: HashMap<String, FieldNumber>,
    instance_field_count: u32,
    static_field_numbers: HashMap<String, StaticFieldNumber>,
    static_fields: RawStaticFields,
    init: InitMonitor,
}

impl ClassClass {
    pub(crate) fn new(
        definition: ClassDefinition,
        super_class: Option<Arc<ClassObject>>,
        interfaces: Vec<Arc<ClassObject>>,
    ) -> Self {
        let (recursive_method_count, method_numbers) =
            get_method_numbers(&definition.methods, super_class.as_ref(), &interfaces);
        let (instance_field_count, instance_field_numbers) =
            get_field_numbers(&definition.fields, super_class.as_ref());
        let static_field_numbers = get_field_numbers_static(&definition.fields);
        let static_fields = RawStaticFields::new(static_field_numbers.len());
        Self {
            name: definition.name,
            access_flags: definition.access_flags,
            super_class,
            interfaces,
            methods: definition.methods,
            fields: definition.fields,
            method_numbers,
            recursive_method_count,
            instance_field_numbers,
            instance_field_count,
            static_field_numbers,
            static_fields,
            init: InitMonitor::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_class(&self) -> Option<&Arc<ClassObject>> {
        self.super_class.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<ClassObject>] {
        &self.interfaces
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn find_declared_method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods.iter().find(|method| method.name == name && method.descriptor == descriptor)
    }

    pub fn find_declared_field(&self, name: &str, descriptor: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name && field.descriptor == descriptor)
    }

    pub fn method_number(&self, shape: &MethodShape) -> Option<MethodNumber> {
        self.method_numbers.get(shape).copied()
    }

    /// Slot count of this class's dispatch table, including everything
    /// inherited.
    pub fn recursive_method_count(&self) -> u32 {
        self.recursive_method_count
    }

    pub(crate) fn instance_field_count(&self) -> u32 {
        self.instance_field_count
    }

    pub(crate) fn instance_field_numbers(&self) -> &HashMap<String, FieldNumber> {
        &self.instance_field_numbers
    }

    /// Byte offset of an instance field (own or inherited) from the object
    /// base.
    pub fn field_offset(&self, field_name: &str) -> Option<usize> {
        self.instance_field_numbers.get(field_name).map(|number| layout::instance_field_offset(*number))
    }

    /// Stable address of a static field's storage slot.
    pub fn static_field_address(&self, field_name: &str) -> Option<usize> {
        self.static_field_numbers.get(field_name).map(|number| self.static_fields.address(*number))
    }

    pub fn has_static_initializer(&self) -> bool {
        self.find_declared_method("<clinit>", "()V").map_or(false, |method| method.is_static())
    }
}

impl HasAccessFlags for ClassClass {
    fn access_flags(&self) -> u16 {
        self.access_flags
    }
}

impl ClassObject {
    /// The canonical field descriptor of this class, also its key in the
    /// loader registry.
    pub fn descriptor(&self) -> String {
        match self {
            ClassObject::Primitive(base) => base.to_string(),
            ClassObject::Array(array) => format!("[{}", array.component.descriptor()),
            ClassObject::Object(class_class) => format!("L{};", class_class.name()),
        }
    }

    /// Binary name for classes, descriptor form for arrays and primitives.
    pub fn name(&self) -> String {
        match self {
            ClassObject::Object(class_class) => class_class.name().to_string(),
            other => other.descriptor(),
        }
    }

    pub fn status(&self) -> ClassStatus {
        match self {
            ClassObject::Primitive(_) => ClassStatus::Initialized,
            ClassObject::Array(array) => array.component.status(),
            ClassObject::Object(class_class) => class_class.init.state.lock().unwrap().status,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.status() == ClassStatus::Initialized
    }

    pub fn is_interface(&self) -> bool {
        match self {
            ClassObject::Object(class_class) => class_class.is_interface(),
            _ => false,
        }
    }

    pub fn try_unwrap_class_class(&self) -> Option<&ClassClass> {
        match self {
            ClassObject::Object(class_class) => Some(class_class),
            _ => None,
        }
    }

    pub fn unwrap_class_class(&self) -> &ClassClass {
        self.try_unwrap_class_class().unwrap()
    }

    pub fn vtable_slot(&self, method_name: &str, descriptor: &str) -> Option<MethodNumber> {
        let shape = MethodShape { name: method_name.to_string(), descriptor: descriptor.to_string() };
        self.try_unwrap_class_class()?.method_number(&shape)
    }

    pub fn itable_slot(&self, method_name: &str, descriptor: &str) -> Option<MethodNumber> {
        debug_assert!(self.is_interface());
        self.vtable_slot(method_name, descriptor)
    }

    pub fn field_offset(&self, field_name: &str) -> Option<usize> {
        self.try_unwrap_class_class()?.field_offset(field_name)
    }

    pub fn static_field_address(&self, field_name: &str) -> Option<usize> {
        self.try_unwrap_class_class()?.static_field_address(field_name)
    }
}

/// Address of the class object as seen by compiled code; stable because the
/// loader keeps every loaded class alive for the process lifetime.
pub fn class_object_address(class: &Arc<ClassObject>) -> usize {
    Arc::as_ptr(class) as usize
}

/// Field resolution per JVM §5.4.3.2: the class itself, then its
/// superinterfaces, then the superclass chain.
pub fn resolve_field(class: &Arc<ClassObject>, field_name: &str, descriptor: &str) -> Option<(Arc<ClassObject>, Field)> {
    let class_class = class.try_unwrap_class_class()?;
    if let Some(field) = class_class.find_declared_field(field_name, descriptor) {
        return Some((class.clone(), field.clone()));
    }
    for interface in class_class.interfaces() {
        if let Some(found) = resolve_field(interface, field_name, descriptor) {
            return Some(found);
        }
    }
    match class_class.super_class() {
        Some(super_class) => resolve_field(super_class, field_name, descriptor),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::loader::tests::{class, interface, FixtureSource};
    use crate::method_numbers::MethodNumber;

    use super::*;

    #[test]
    fn descriptor_forms() {
        let loader = ClassLoader::new(Box::new(FixtureSource::new(vec![class("a/B", None, vec![], vec![], vec![])])));
        let class = loader.for_name("a/B").unwrap();
        assert_eq!(class.descriptor(), "La/B;");
        let int_array = loader.for_field_descriptor(&descriptors::parse_field_type("[[I").unwrap()).unwrap();
        assert_eq!(int_array.descriptor(), "[[I");
        assert_eq!(int_array.name(), "[[I");
    }

    #[test]
    fn vtable_slots_are_inherited_and_stable() {
        let definitions = vec![
            class("A", None, vec![], vec![Method::new("m", "()V", ACC_PUBLIC)], vec![]),
            class("B", Some("A"), vec![], vec![Method::new("n", "()V", ACC_PUBLIC)], vec![]),
        ];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let a = loader.for_name("A").unwrap();
        let b = loader.for_name("B").unwrap();
        let slot_in_a = a.vtable_slot("m", "()V").unwrap();
        let slot_in_b = b.vtable_slot("m", "()V").unwrap();
        assert_eq!(slot_in_a, slot_in_b);
        assert!(b.vtable_slot("n", "()V").unwrap().0 > slot_in_b.0);
        assert_eq!(a.vtable_slot("n", "()V"), None);
    }

    #[test]
    fn interface_methods_take_slots_in_implementors() {
        let definitions = vec![
            interface("I", vec![Method::new("m", "()V", ACC_PUBLIC | ACC_ABSTRACT)]),
            class("C", None, vec!["I"], vec![Method::new("m", "()V", ACC_PUBLIC)], vec![]),
        ];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let i = loader.for_name("I").unwrap();
        let c = loader.for_name("C").unwrap();
        assert_eq!(i.itable_slot("m", "()V"), Some(MethodNumber(0)));
        assert!(c.vtable_slot("m", "()V").is_some());
    }

    #[test]
    fn recursive_method_count_spans_the_hierarchy() {
        let definitions = vec![
            class("A", None, vec![], vec![Method::new("m", "()V", ACC_PUBLIC)], vec![]),
            class(
                "B",
                Some("A"),
                vec![],
                vec![Method::new("m", "()V", ACC_PUBLIC), Method::new("n", "()V", ACC_PUBLIC)],
                vec![],
            ),
        ];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let b = loader.for_name("B").unwrap();
        // the override shares its slot with A's declaration
        assert_eq!(b.unwrap_class_class().recursive_method_count(), 2);
    }

    #[test]
    fn field_offsets_and_static_addresses() {
        let definitions = vec![
            class(
                "A",
                None,
                vec![],
                vec![],
                vec![Field::new("x", "I", ACC_PUBLIC), Field::new("COUNT", "I", ACC_PUBLIC | ACC_STATIC)],
            ),
            class("B", Some("A"), vec![], vec![], vec![Field::new("y", "J", ACC_PUBLIC)]),
        ];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let a = loader.for_name("A").unwrap();
        let b = loader.for_name("B").unwrap();
        assert_eq!(a.field_offset("x"), Some(layout::OBJECT_HEADER_SIZE));
        assert_eq!(b.field_offset("x"), Some(layout::OBJECT_HEADER_SIZE));
        assert_eq!(b.field_offset("y"), Some(layout::OBJECT_HEADER_SIZE + layout::FIELD_SLOT_SIZE));
        assert!(a.static_field_address("COUNT").is_some());
        assert_eq!(a.field_offset("COUNT"), None);
        assert_eq!(a.static_field_address("x"), None);
    }

    #[test]
    fn resolves_fields_through_supers_and_interfaces() {
        let definitions = vec![
            interface("I", vec![]),
            class("A", None, vec![], vec![], vec![Field::new("x", "I", ACC_PUBLIC)]),
            class("B", Some("A"), vec!["I"], vec![], vec![]),
        ];
        let loader = ClassLoader::new(Box::new(FixtureSource::new(definitions)));
        let b = loader.for_name("B").unwrap();
        let (declaring, field) = resolve_field(&b, "x", "I").unwrap();
        assert_eq!(declaring.name(), "A");
        assert_eq!(field.name, "x");
        assert!(resolve_field(&b, "x", "J").is_none());
        assert!(resolve_field(&b, "missing", "I").is_none());
    }
}
