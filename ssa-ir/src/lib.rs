use descriptors::{BaseType, FieldType, MethodType};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum IRType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Pointer,
}

/// The opaque pointer-sized type used for Java object references.
pub fn reference_type() -> IRType {
    IRType::Pointer
}

/// IR type for a Java value of the given descriptor type. Void has no value
/// type; it only occurs in return position, see `method_signature`.
pub fn java_value_type(field_type: &FieldType) -> IRType {
    match field_type {
        FieldType::Base(base) => match base {
            BaseType::Byte | BaseType::Boolean => IRType::I8,
            BaseType::Char | BaseType::Short => IRType::I16,
            BaseType::Int => IRType::I32,
            BaseType::Long => IRType::I64,
            BaseType::Float => IRType::F32,
            BaseType::Double => IRType::F64,
            BaseType::Void => panic!("void has no value type"),
        },
        FieldType::Object(_) | FieldType::Array(_) => IRType::Pointer,
    }
}

/// Signature for a call matching `descriptor`, with a leading receiver
/// pointer iff `implicit_this`.
pub fn method_signature(descriptor: &MethodType, implicit_this: bool) -> IRSignature {
    let mut parameters = Vec::with_capacity(descriptor.parameter_types.len() + implicit_this as usize);
    if implicit_this {
        parameters.push(reference_type());
    }
    for parameter in &descriptor.parameter_types {
        parameters.push(java_value_type(parameter));
    }
    let return_type = match &descriptor.return_type {
        FieldType::Base(BaseType::Void) => None,
        other => Some(java_value_type(other)),
    };
    IRSignature { parameters, return_type }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct IRValue(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockId(pub u32);

/// An executable address as seen by the stubs manager and the link layer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CodeAddress(pub usize);

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct IRSignature {
    pub parameters: Vec<IRType>,
    /// None for void.
    pub return_type: Option<IRType>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Callee {
    Symbol(String),
    Value(IRValue),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum IRInstr {
    Alloca { dst: IRValue },
    Load { dst: IRValue, ty: IRType, address: IRValue },
    Store { value: IRValue, address: IRValue },
    ConstInt { dst: IRValue, ty: IRType, value: i64 },
    ConstPtr { dst: IRValue, address: usize },
    PtrAdd { dst: IRValue, base: IRValue, offset_bytes: i64 },
    CmpEq { dst: IRValue, a: IRValue, b: IRValue },
    Branch { target: BlockId },
    CondBranch { condition: IRValue, if_true: BlockId, if_false: BlockId },
    Call { dst: Option<IRValue>, callee: Callee, signature: IRSignature, args: Vec<IRValue>, tail: bool },
    Return { value: Option<IRValue> },
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct IRFunction {
    pub name: String,
    pub signature: IRSignature,
    blocks: Vec<Vec<IRInstr>>,
    value_types: Vec<IRType>,
}

impl IRFunction {
    pub fn block(&self, block: BlockId) -> &[IRInstr] {
        &self.blocks[block.0 as usize]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn instructions(&self) -> impl Iterator<Item = &IRInstr> {
        self.blocks.iter().flatten()
    }

    pub fn type_of(&self, value: IRValue) -> IRType {
        self.value_types[value.0 as usize]
    }
}

#[derive(Debug, Clone)]
pub struct IRModule {
    pub functions: Vec<IRFunction>,
}

/// The compile layer finished trampolines are handed to. The real code
/// generator lives behind this seam; tests install a recording layer.
pub trait IRLayer: Send + Sync {
    fn add(&self, module: IRModule) -> CodeAddress;
}

pub struct IRBuilder {
    name: String,
    signature: IRSignature,
    blocks: Vec<Vec<IRInstr>>,
    current: BlockId,
    value_types: Vec<IRType>,
    arguments: Vec<IRValue>,
}

impl IRBuilder {
    pub fn new(name: impl Into<String>, signature: IRSignature) -> Self {
        let mut builder = Self {
            name: name.into(),
            value_types: Vec::new(),
            arguments: Vec::new(),
            blocks: vec![Vec::new()],
            current: BlockId(0),
            signature,
        };
        for i in 0..builder.signature.parameters.len() {
            let ty = builder.signature.parameters[i];
            let value = builder.new_value(ty);
            builder.arguments.push(value);
        }
        builder
    }

    fn new_value(&mut self, ty: IRType) -> IRValue {
        let value = IRValue(self.value_types.len() as u32);
        self.value_types.push(ty);
        value
    }

    fn emit(&mut self, instr: IRInstr) {
        self.blocks[self.current.0 as usize].push(instr);
    }

    pub fn argument(&self, index: usize) -> IRValue {
        self.arguments[index]
    }

    pub fn arguments(&self) -> &[IRValue] {
        &self.arguments
    }

    pub fn type_of(&self, value: IRValue) -> IRType {
        self.value_types[value.0 as usize]
    }

    pub fn create_block(&mut self) -> BlockId {
        let block = BlockId(self.blocks.len() as u32);
        self.blocks.push(Vec::new());
        block
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        debug_assert!((block.0 as usize) < self.blocks.len());
        self.current = block;
    }

    /// A pointer-sized stack cell, conventionally emitted at function entry.
    pub fn create_alloca(&mut self) -> IRValue {
        let dst = self.new_value(IRType::Pointer);
        self.emit(IRInstr::Alloca { dst });
        dst
    }

    pub fn create_load(&mut self, ty: IRType, address: IRValue) -> IRValue {
        let dst = self.new_value(ty);
        self.emit(IRInstr::Load { dst, ty, address });
        dst
    }

    pub fn create_store(&mut self, value: IRValue, address: IRValue) {
        self.emit(IRInstr::Store { value, address });
    }

    pub fn const_int(&mut self, ty: IRType, value: i64) -> IRValue {
        let dst = self.new_value(ty);
        self.emit(IRInstr::ConstInt { dst, ty, value });
        dst
    }

    pub fn const_ptr(&mut self, address: usize) -> IRValue {
        let dst = self.new_value(IRType::Pointer);
        self.emit(IRInstr::ConstPtr { dst, address });
        dst
    }

    pub fn create_ptr_add(&mut self, base: IRValue, offset_bytes: i64) -> IRValue {
        let dst = self.new_value(IRType::Pointer);
        self.emit(IRInstr::PtrAdd { dst, base, offset_bytes });
        dst
    }

    pub fn create_cmp_eq(&mut self, a: IRValue, b: IRValue) -> IRValue {
        let dst = self.new_value(IRType::I8);
        self.emit(IRInstr::CmpEq { dst, a, b });
        dst
    }

    pub fn create_branch(&mut self, target: BlockId) {
        self.emit(IRInstr::Branch { target });
    }

    pub fn create_cond_branch(&mut self, condition: IRValue, if_true: BlockId, if_false: BlockId) {
        self.emit(IRInstr::CondBranch { condition, if_true, if_false });
    }

    pub fn create_call(&mut self, callee: Callee, signature: IRSignature, args: Vec<IRValue>) -> Option<IRValue> {
        self.call_impl(callee, signature, args, false)
    }

    pub fn create_tail_call(&mut self, callee: Callee, signature: IRSignature, args: Vec<IRValue>) -> Option<IRValue> {
        self.call_impl(callee, signature, args, true)
    }

    fn call_impl(&mut self, callee: Callee, signature: IRSignature, args: Vec<IRValue>, tail: bool) -> Option<IRValue> {
        debug_assert_eq!(signature.parameters.len(), args.len());
        let dst = signature.return_type.map(|ty| self.new_value(ty));
        self.emit(IRInstr::Call { dst, callee, signature, args, tail });
        dst
    }

    pub fn create_return(&mut self, value: Option<IRValue>) {
        self.emit(IRInstr::Return { value });
    }

    pub fn create_unreachable(&mut self) {
        self.emit(IRInstr::Unreachable);
    }

    pub fn finish(self) -> IRFunction {
        IRFunction {
            name: self.name,
            signature: self.signature,
            blocks: self.blocks,
            value_types: self.value_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use descriptors::parse_method_type;

    use super::*;

    #[test]
    fn maps_java_types() {
        assert_eq!(java_value_type(&FieldType::Base(BaseType::Int)), IRType::I32);
        assert_eq!(java_value_type(&FieldType::Base(BaseType::Boolean)), IRType::I8);
        assert_eq!(java_value_type(&FieldType::Base(BaseType::Double)), IRType::F64);
        assert_eq!(java_value_type(&FieldType::object("java/lang/String")), IRType::Pointer);
        assert_eq!(java_value_type(&FieldType::array(FieldType::Base(BaseType::Long))), IRType::Pointer);
    }

    #[test]
    fn builds_signatures_with_receiver() {
        let descriptor = parse_method_type("(IJ)Ljava/lang/Object;").unwrap();
        let signature = method_signature(&descriptor, true);
        assert_eq!(signature.parameters, vec![IRType::Pointer, IRType::I32, IRType::I64]);
        assert_eq!(signature.return_type, Some(IRType::Pointer));

        let signature = method_signature(&descriptor, false);
        assert_eq!(signature.parameters, vec![IRType::I32, IRType::I64]);
    }

    #[test]
    fn void_return_has_no_result() {
        let descriptor = parse_method_type("()V").unwrap();
        let signature = method_signature(&descriptor, false);
        assert_eq!(signature.return_type, None);
        let mut builder = IRBuilder::new("f", signature.clone());
        assert_eq!(builder.create_call(Callee::Symbol("g".to_string()), signature, vec![]), None);
    }

    #[test]
    fn builder_tracks_value_types_and_blocks() {
        let signature = IRSignature { parameters: vec![IRType::Pointer], return_type: Some(IRType::I32) };
        let mut builder = IRBuilder::new("f", signature);
        let receiver = builder.argument(0);
        assert_eq!(builder.type_of(receiver), IRType::Pointer);

        let cell = builder.create_alloca();
        builder.create_store(receiver, cell);
        let loaded = builder.create_load(IRType::I32, cell);
        assert_eq!(builder.type_of(loaded), IRType::I32);

        let other = builder.create_block();
        assert_eq!(builder.current_block(), BlockId(0));
        builder.create_branch(other);
        builder.set_insert_point(other);
        assert_eq!(builder.current_block(), other);
        builder.create_return(Some(loaded));

        let function = builder.finish();
        assert_eq!(function.block_count(), 2);
        assert_eq!(function.block(other).last(), Some(&IRInstr::Return { value: Some(loaded) }));
        assert_eq!(function.type_of(loaded), IRType::I32);
    }
}
