//! Offsets agreed between emitted IR and the runtime's native object and
//! class-mirror layout. The heap itself is owned by the runtime; dispatch
//! and initialization-guard code hard-codes these constants.

use crate::field_numbers::FieldNumber;
use crate::ClassStatus;

/// Object header word 0 holds the class mirror pointer.
pub const OBJECT_CLASS_OFFSET: i64 = 0;
/// Instance fields start after the two-word object header.
pub const OBJECT_HEADER_SIZE: usize = 16;
/// Every instance field occupies one pointer-sized slot.
pub const FIELD_SLOT_SIZE: usize = 8;
/// The class mirror's initialization state word, an i32.
pub const CLASS_STATUS_OFFSET: i64 = 8;
/// The class mirror's vtable block pointer.
pub const CLASS_VTABLE_OFFSET: i64 = 16;
/// A vtable entry is a single code pointer.
pub const VTABLE_ENTRY_SIZE: i64 = 8;

pub fn instance_field_offset(number: FieldNumber) -> usize {
    OBJECT_HEADER_SIZE + number.0 as usize * FIELD_SLOT_SIZE
}

/// Encoding of `ClassStatus` in the mirror's state word.
pub fn class_status_value(status: ClassStatus) -> i64 {
    match status {
        ClassStatus::Loaded => 0,
        ClassStatus::Initializing => 1,
        ClassStatus::Initialized => 2,
        ClassStatus::Errored => 3,
    }
}
