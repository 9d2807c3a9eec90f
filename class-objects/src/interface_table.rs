use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use by_address::ByAddress;

use crate::ClassObject;

/// Process-wide identity of an interface, used as the first coordinate of
/// itable dispatch.
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct InterfaceID(pub u32);

struct InterfaceTableInner {
    interfaces: Vec<Arc<ClassObject>>,
    id: HashMap<ByAddress<Arc<ClassObject>>, InterfaceID>,
}

impl InterfaceTableInner {
    fn get_interface_id(&mut self, interface: Arc<ClassObject>) -> InterfaceID {
        if let Some(res) = self.id.get(&ByAddress(interface.clone())) {
            return *res;
        }
        assert!(interface.is_interface());
        let new_id = InterfaceID(self.interfaces.len() as u32);
        self.id.insert(ByAddress(interface.clone()), new_id);
        self.interfaces.push(interface);
        new_id
    }

    fn try_lookup(&self, id: InterfaceID) -> Option<Arc<ClassObject>> {
        self.interfaces.get(id.0 as usize).cloned()
    }
}

pub struct InterfaceTable {
    inner: RwLock<InterfaceTableInner>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self { inner: RwLock::new(InterfaceTableInner { interfaces: vec![], id: HashMap::new() }) }
    }

    pub fn get_interface_id(&self, interface: Arc<ClassObject>) -> InterfaceID {
        self.inner.write().unwrap().get_interface_id(interface)
    }

    pub fn try_lookup(&self, id: InterfaceID) -> Option<Arc<ClassObject>> {
        self.inner.read().unwrap().try_lookup(id)
    }

    pub fn lookup(&self, id: InterfaceID) -> Arc<ClassObject> {
        self.try_lookup(id).unwrap()
    }
}

impl Default for InterfaceTable {
    fn default() -> Self {
        Self::new()
    }
}
