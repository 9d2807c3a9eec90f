//! The JVM operand stack, reified as memory during translation to IR.
//!
//! Every slot is a pointer-sized stack cell allocated once at method entry;
//! pushes store through the cell and record the value's type in a shadow
//! vector, pops load back with the remembered type. The same cell may hold
//! differently typed values along different control-flow paths, which is
//! exactly what SSA construction cannot express directly; the optimizer
//! promotes the cells back into registers afterwards.

use ssa_ir::{reference_type, IRBuilder, IRType, IRValue};

pub struct OperandStack {
    cells: Vec<IRValue>,
    types: Vec<IRType>,
    top_of_stack: usize,
}

/// The stack's type vector and depth at one program point. Snapshots carry
/// no IR values; the cells backing the slots are stable for the whole
/// function, so types and depth suffice to re-enter a prior stack shape.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StackState {
    types: Vec<IRType>,
    top_of_stack: usize,
}

impl StackState {
    pub fn depth(&self) -> usize {
        self.top_of_stack
    }

    pub fn live_types(&self) -> &[IRType] {
        &self.types[..self.top_of_stack]
    }
}

impl OperandStack {
    /// Reserves `max_stack` cells at the builder's current insert point,
    /// which must be the function entry block.
    pub fn new(builder: &mut IRBuilder, max_stack: u16) -> Self {
        Self {
            cells: (0..max_stack).map(|_| builder.create_alloca()).collect(),
            types: vec![reference_type(); max_stack as usize],
            top_of_stack: 0,
        }
    }

    pub fn push(&mut self, builder: &mut IRBuilder, value: IRValue) {
        debug_assert!(self.top_of_stack < self.cells.len(), "operand stack overflow");
        self.types[self.top_of_stack] = builder.type_of(value);
        builder.create_store(value, self.cells[self.top_of_stack]);
        self.top_of_stack += 1;
    }

    pub fn pop(&mut self, builder: &mut IRBuilder) -> IRValue {
        self.pop_with_type(builder).0
    }

    pub fn pop_with_type(&mut self, builder: &mut IRBuilder) -> (IRValue, IRType) {
        debug_assert!(self.top_of_stack > 0, "operand stack underflow");
        self.top_of_stack -= 1;
        let ty = self.types[self.top_of_stack];
        (builder.create_load(ty, self.cells[self.top_of_stack]), ty)
    }

    pub fn save(&self) -> StackState {
        StackState { types: self.types.clone(), top_of_stack: self.top_of_stack }
    }

    pub fn restore(&mut self, state: StackState) {
        debug_assert_eq!(state.types.len(), self.types.len());
        self.types = state.types;
        self.top_of_stack = state.top_of_stack;
    }

    /// The stack shape on entry to an exception handler: the operand stack
    /// is cleared and the caught exception is the sole entry (JVM §6.5,
    /// athrow / handler dispatch).
    pub fn handler_entry_state(&self) -> StackState {
        StackState { types: vec![reference_type(); self.types.len()], top_of_stack: 1 }
    }

    /// Stores the caught exception into the bottom slot after
    /// `handler_entry_state` has been restored.
    pub fn set_handler_top(&mut self, builder: &mut IRBuilder, value: IRValue) {
        debug_assert!(!self.cells.is_empty());
        self.types[0] = builder.type_of(value);
        builder.create_store(value, self.cells[0]);
    }

    pub fn depth(&self) -> usize {
        self.top_of_stack
    }

    pub fn max_stack(&self) -> usize {
        self.cells.len()
    }
}
