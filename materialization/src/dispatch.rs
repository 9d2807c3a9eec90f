//! Emission of the dispatch sequences shared by the helper's fast path
//! (inlined at the call site) and the materializer (trampoline bodies).

use class_objects::layout::{CLASS_VTABLE_OFFSET, OBJECT_CLASS_OFFSET, VTABLE_ENTRY_SIZE};
use class_objects::MethodNumber;
use method_resolution::ITableOffset;
use ssa_ir::{Callee, IRBuilder, IRSignature, IRType, IRValue};

use crate::ITABLE_LOOKUP_SYMBOL;

/// receiver -> class mirror -> vtable block -> slot entry -> indirect call.
pub(crate) fn emit_vtable_dispatch(
    builder: &mut IRBuilder,
    receiver: IRValue,
    slot: MethodNumber,
    signature: &IRSignature,
    args: Vec<IRValue>,
    tail: bool,
) -> Option<IRValue> {
    let class_address = builder.create_ptr_add(receiver, OBJECT_CLASS_OFFSET);
    let class_pointer = builder.create_load(IRType::Pointer, class_address);
    let vtable_address = builder.create_ptr_add(class_pointer, CLASS_VTABLE_OFFSET);
    let vtable_pointer = builder.create_load(IRType::Pointer, vtable_address);
    let entry_address = builder.create_ptr_add(vtable_pointer, slot.0 as i64 * VTABLE_ENTRY_SIZE);
    let target = builder.create_load(IRType::Pointer, entry_address);
    if tail {
        builder.create_tail_call(Callee::Value(target), signature.clone(), args)
    } else {
        builder.create_call(Callee::Value(target), signature.clone(), args)
    }
}

fn itable_lookup_signature() -> IRSignature {
    IRSignature {
        parameters: vec![IRType::Pointer, IRType::I32, IRType::I32],
        return_type: Some(IRType::Pointer),
    }
}

/// Itable rows are per-interface and found at runtime, so the entry lookup
/// goes through the runtime helper; only the indirect call is inlined.
pub(crate) fn emit_itable_dispatch(
    builder: &mut IRBuilder,
    receiver: IRValue,
    offset: ITableOffset,
    signature: &IRSignature,
    args: Vec<IRValue>,
    tail: bool,
) -> Option<IRValue> {
    let class_address = builder.create_ptr_add(receiver, OBJECT_CLASS_OFFSET);
    let class_pointer = builder.create_load(IRType::Pointer, class_address);
    let interface_id = builder.const_int(IRType::I32, offset.interface_id.0 as i64);
    let slot = builder.const_int(IRType::I32, offset.slot.0 as i64);
    let target = builder
        .create_call(
            Callee::Symbol(ITABLE_LOOKUP_SYMBOL.to_string()),
            itable_lookup_signature(),
            vec![class_pointer, interface_id, slot],
        )
        .unwrap();
    if tail {
        builder.create_tail_call(Callee::Value(target), signature.clone(), args)
    } else {
        builder.create_call(Callee::Value(target), signature.clone(), args)
    }
}
