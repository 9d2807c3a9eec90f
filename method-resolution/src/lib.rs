//! JVM §5.4.3.3 (virtual) and §5.4.3.4 (interface) method resolution,
//! producing dispatch-table coordinates for the stub materializer and the
//! lazy helper's fast path.

use std::collections::HashSet;
use std::sync::Arc;

use by_address::ByAddress;
use itertools::Itertools;

use class_objects::{ClassLoader, ClassObject, HasAccessFlags, InterfaceID, MethodNumber, MethodShape};

pub mod lookup_cache;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VTableOffset {
    pub slot: MethodNumber,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ITableOffset {
    pub interface_id: InterfaceID,
    pub slot: MethodNumber,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ResolutionResult {
    VTable(VTableOffset),
    ITable(ITableOffset),
    Error(String),
}

fn no_such_method(class: &Arc<ClassObject>, method_name: &str, method_type: &str) -> ResolutionResult {
    ResolutionResult::Error(format!("NoSuchMethodError: {}.{}:{}", class.name(), method_name, method_type))
}

/// All superinterfaces of `class` (transitively, through the superclass
/// chain as well), in binary-name order so that everything downstream is
/// independent of load order.
fn collect_superinterfaces(class: &Arc<ClassObject>) -> Vec<Arc<ClassObject>> {
    fn visit(class: &Arc<ClassObject>, seen: &mut HashSet<ByAddress<Arc<ClassObject>>>) {
        if let Some(class_class) = class.try_unwrap_class_class() {
            for interface in class_class.interfaces() {
                if seen.insert(ByAddress(interface.clone())) {
                    visit(interface, seen);
                }
            }
            if let Some(super_class) = class_class.super_class() {
                visit(super_class, seen);
            }
        }
    }
    let mut seen = HashSet::new();
    visit(class, &mut seen);
    seen.into_iter().map(|interface| interface.0).sorted_by_key(|interface| interface.name()).collect_vec()
}

fn declares_matching(
    interface: &Arc<ClassObject>,
    method_name: &str,
    method_type: &str,
    require_concrete: bool,
) -> bool {
    interface
        .unwrap_class_class()
        .find_declared_method(method_name, method_type)
        .map_or(false, |method| {
            !method.is_private() && !method.is_static() && (!require_concrete || !method.is_abstract())
        })
}

/// Candidates none of which is a superinterface of another candidate.
fn maximally_specific(candidates: &[Arc<ClassObject>]) -> Vec<Arc<ClassObject>> {
    candidates
        .iter()
        .filter(|interface| {
            !candidates.iter().any(|other| {
                !Arc::ptr_eq(interface, other)
                    && collect_superinterfaces(other).iter().any(|super_| Arc::ptr_eq(super_, interface))
            })
        })
        .cloned()
        .collect_vec()
}

/// Method resolution per JVM §5.4.3.3 against the class `class`: the class
/// itself, then the superclass chain, then the maximally specific
/// non-abstract superinterface default methods. The returned slot indexes
/// the vtable of `class`.
pub fn virtual_method_resolution(
    class: &Arc<ClassObject>,
    method_name: &str,
    method_type: &str,
) -> ResolutionResult {
    if method_name == "<init>" || method_name == "<clinit>" {
        return no_such_method(class, method_name, method_type);
    }
    let class_class = match class.try_unwrap_class_class() {
        Some(class_class) => class_class,
        None => return no_such_method(class, method_name, method_type),
    };
    let shape = MethodShape { name: method_name.to_string(), descriptor: method_type.to_string() };

    let mut found_abstract = false;
    let mut current = Some(class.clone());
    while let Some(searched) = current {
        let searched_class = searched.unwrap_class_class();
        if let Some(method) = searched_class.find_declared_method(method_name, method_type) {
            if method.is_static() {
                return ResolutionResult::Error(format!(
                    "IncompatibleClassChangeError: {}.{}:{} is static",
                    class.name(),
                    method_name,
                    method_type
                ));
            }
            if !method.is_abstract() {
                return match class_class.method_number(&shape) {
                    Some(slot) => ResolutionResult::VTable(VTableOffset { slot }),
                    None => no_such_method(class, method_name, method_type),
                };
            }
            found_abstract = true;
            break;
        }
        current = searched_class.super_class().cloned();
    }

    let superinterfaces = collect_superinterfaces(class);
    let defaults = superinterfaces
        .iter()
        .filter(|interface| declares_matching(interface, method_name, method_type, true))
        .cloned()
        .collect_vec();
    if !maximally_specific(&defaults).is_empty() {
        return match class_class.method_number(&shape) {
            Some(slot) => ResolutionResult::VTable(VTableOffset { slot }),
            None => no_such_method(class, method_name, method_type),
        };
    }
    let any_declared = found_abstract
        || superinterfaces
            .iter()
            .any(|interface| declares_matching(interface, method_name, method_type, false));
    if any_declared {
        return ResolutionResult::Error(format!(
            "AbstractMethodError: {}.{}:{}",
            class.name(),
            method_name,
            method_type
        ));
    }
    no_such_method(class, method_name, method_type)
}

/// Interface method resolution per JVM §5.4.3.4 against the interface
/// `interface`: the interface itself, then `java/lang/Object`'s public
/// instance methods (which dispatch through the vtable), then the maximally
/// specific superinterface scan. Ties among maximally specific non-abstract
/// candidates are broken by interface name so that resolution is
/// deterministic.
pub fn interface_method_resolution(
    interface: &Arc<ClassObject>,
    method_name: &str,
    method_type: &str,
    loader: &ClassLoader,
) -> ResolutionResult {
    let interface_class = match interface.try_unwrap_class_class() {
        Some(class_class) => class_class,
        None => return no_such_method(interface, method_name, method_type),
    };
    if !interface.is_interface() {
        return ResolutionResult::Error(format!(
            "IncompatibleClassChangeError: {} is not an interface",
            interface.name()
        ));
    }
    let shape = MethodShape { name: method_name.to_string(), descriptor: method_type.to_string() };

    if let Some(method) = interface_class.find_declared_method(method_name, method_type) {
        if method.is_static() {
            return ResolutionResult::Error(format!(
                "IncompatibleClassChangeError: {}.{}:{} is static",
                interface.name(),
                method_name,
                method_type
            ));
        }
        let interface_id = loader.interface_table().get_interface_id(interface.clone());
        return match interface_class.method_number(&shape) {
            Some(slot) => ResolutionResult::ITable(ITableOffset { interface_id, slot }),
            None => no_such_method(interface, method_name, method_type),
        };
    }

    match loader.for_name("java/lang/Object") {
        Ok(object) => {
            let object_class = object.unwrap_class_class();
            if let Some(method) = object_class.find_declared_method(method_name, method_type) {
                if method.is_public() && !method.is_static() {
                    if let Some(slot) = object_class.method_number(&shape) {
                        return ResolutionResult::VTable(VTableOffset { slot });
                    }
                }
            }
        }
        Err(err) => return ResolutionResult::Error(err.to_string()),
    }

    let superinterfaces = collect_superinterfaces(interface);
    let concrete = superinterfaces
        .iter()
        .filter(|candidate| declares_matching(candidate, method_name, method_type, true))
        .cloned()
        .collect_vec();
    let winner = maximally_specific(&concrete).into_iter().next().or_else(|| {
        superinterfaces
            .iter()
            .find(|candidate| declares_matching(candidate, method_name, method_type, false))
            .cloned()
    });
    match winner {
        Some(declaring) => {
            let slot = declaring.unwrap_class_class().method_number(&shape);
            let interface_id = loader.interface_table().get_interface_id(declaring.clone());
            match slot {
                Some(slot) => ResolutionResult::ITable(ITableOffset { interface_id, slot }),
                None => no_such_method(interface, method_name, method_type),
            }
        }
        None => no_such_method(interface, method_name, method_type),
    }
}
