use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::{ClassObject, Method, MethodShape};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MethodNumber(pub u32);

pub(crate) struct MethodNumberMappings {
    current_method_number: u32,
    mapping: HashMap<MethodShape, MethodNumber>,
}

impl MethodNumberMappings {
    fn new() -> Self {
        Self { current_method_number: 0, mapping: HashMap::new() }
    }

    fn sink_method(&mut self, shape: MethodShape) {
        if self.mapping.contains_key(&shape) {
            return;
        }
        let this_method_number = self.current_method_number;
        self.current_method_number += 1;
        self.mapping.insert(shape, MethodNumber(this_method_number));
    }
}

// Slot order: superclass slots first (root class leading), then
// superinterfaces in declaration order, then the class's own methods in
// shape order. An override keeps the slot its shape was first assigned.
fn get_method_numbers_recurse(
    methods: &[Method],
    parent: Option<&Arc<ClassObject>>,
    interfaces: &[Arc<ClassObject>],
    mappings: &mut MethodNumberMappings,
) {
    if let Some(parent) = parent {
        let class_class = parent.unwrap_class_class();
        get_method_numbers_recurse(
            class_class.methods(),
            class_class.super_class(),
            class_class.interfaces(),
            mappings,
        );
    }

    for interface in interfaces {
        let class_class = interface.unwrap_class_class();
        get_method_numbers_recurse(class_class.methods(), None, class_class.interfaces(), mappings);
    }

    for shape in methods
        .iter()
        .map(Method::shape)
        .sorted_by_key(|shape| (shape.name.clone(), shape.descriptor.clone()))
    {
        mappings.sink_method(shape);
    }
}

/// Slot numbers for every method shape reachable from this class, its
/// superclasses and its superinterfaces.
pub(crate) fn get_method_numbers(
    methods: &[Method],
    parent: Option<&Arc<ClassObject>>,
    interfaces: &[Arc<ClassObject>],
) -> (u32, HashMap<MethodShape, MethodNumber>) {
    let mut mappings = MethodNumberMappings::new();
    get_method_numbers_recurse(methods, parent, interfaces, &mut mappings);
    (mappings.current_method_number, mappings.mapping)
}
