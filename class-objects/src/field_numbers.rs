use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::{ClassObject, Field, HasAccessFlags};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FieldNumber(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StaticFieldNumber(pub u32);

/// Instance field slots: inherited slots first, then the class's own
/// instance fields in name order. A field hiding a superclass field of the
/// same name still gets a fresh slot; the subclass map points at the
/// hiding field.
pub(crate) fn get_field_numbers(
    fields: &[Field],
    parent: Option<&Arc<ClassObject>>,
) -> (u32, HashMap<String, FieldNumber>) {
    let (mut next, mut mapping) = match parent.and_then(|parent| parent.try_unwrap_class_class()) {
        Some(class_class) => (class_class.instance_field_count(), class_class.instance_field_numbers().clone()),
        None => (0, HashMap::new()),
    };
    for field in fields
        .iter()
        .filter(|field| !field.is_static())
        .sorted_by_key(|field| field.name.clone())
    {
        mapping.insert(field.name.clone(), FieldNumber(next));
        next += 1;
    }
    (next, mapping)
}

/// Static field slots are per-class; statics are not inherited storage.
pub(crate) fn get_field_numbers_static(fields: &[Field]) -> HashMap<String, StaticFieldNumber> {
    let mut mapping = HashMap::new();
    for (number, field) in fields
        .iter()
        .filter(|field| field.is_static())
        .sorted_by_key(|field| field.name.clone())
        .enumerate()
    {
        mapping.insert(field.name.clone(), StaticFieldNumber(number as u32));
    }
    mapping
}
