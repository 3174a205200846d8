//! IR Builder
//!
//! A cursor over one position in one basic block. Every emission method
//! checks its operand types, inserts the new instruction at the cursor and
//! leaves the cursor right after it, so consecutive calls produce code in
//! program order.

use rcg_common::{CodegenError, Result};
use std::ops::{Deref, DerefMut};
use crate::types::TypeKind;
use crate::values::ValueKind;
use crate::{
    BinaryOp, Block, CastOp, FloatPredicate, Function, InstKind, IntPredicate, Module, Type,
    Value,
};

/// Where the next instruction goes: before `before`, or at the block's end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub block: Block,
    pub before: Option<Value>,
}

/// Builder for constructing IR
pub struct Builder<'m> {
    module: &'m mut Module,
    position: Option<Position>,
}

/// Cursor binding that puts the previous position back when dropped
struct ScopedCursor<'b, 'm> {
    builder: &'b mut Builder<'m>,
    saved: Option<Position>,
}

impl<'m> Deref for ScopedCursor<'_, 'm> {
    type Target = Builder<'m>;

    fn deref(&self) -> &Builder<'m> {
        self.builder
    }
}

impl<'m> DerefMut for ScopedCursor<'_, 'm> {
    fn deref_mut(&mut self) -> &mut Builder<'m> {
        self.builder
    }
}

impl Drop for ScopedCursor<'_, '_> {
    fn drop(&mut self) {
        self.builder.position = self.saved;
    }
}

impl<'m> Builder<'m> {
    /// Unpositioned builder; emitting before positioning is an error
    pub fn new(module: &'m mut Module) -> Self {
        Self { module, position: None }
    }

    /// Builder already positioned at the end of `block`
    pub fn at_end(module: &'m mut Module, block: Block) -> Self {
        Self {
            module,
            position: Some(Position { block, before: None }),
        }
    }

    pub fn module(&self) -> &Module {
        &*self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut *self.module
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Block the cursor currently points into
    pub fn insert_block(&self) -> Option<Block> {
        self.position.map(|position| position.block)
    }

    pub fn set_position(&mut self, position: Option<Position>) {
        self.position = position;
    }

    pub fn position_at_end(&mut self, block: Block) {
        self.position = Some(Position { block, before: None });
    }

    /// Point the cursor just before `inst`, which must be linked into a block
    pub fn position_before(&mut self, inst: Value) -> Result<()> {
        let block = self.module.instruction_parent(inst).ok_or_else(|| {
            CodegenError::invalid_state("cannot position before a detached instruction")
        })?;
        self.position = Some(Position { block, before: Some(inst) });
        Ok(())
    }

    pub fn clear_position(&mut self) {
        self.position = None;
    }

    /// Run `emit` with the cursor at the end of `block`
    ///
    /// The previous cursor is restored however `emit` exits, including an
    /// error return or a panic. The closure's result is handed back.
    pub fn build<T, F>(&mut self, block: Block, emit: F) -> T
    where
        F: FnOnce(&mut Builder<'m>) -> T,
    {
        let saved = self.position.replace(Position { block, before: None });
        let mut scope = ScopedCursor { builder: self, saved };
        emit(&mut *scope)
    }

    /// Attach a name to a value and hand it back
    pub fn named(&mut self, value: Value, name: &str) -> Result<Value> {
        self.module.set_name(value, name)?;
        Ok(value)
    }

    fn insert(&mut self, ty: Type, kind: InstKind) -> Result<Value> {
        let position = self.position.ok_or_else(|| {
            CodegenError::invalid_state(format!(
                "builder has no insertion point for '{}'",
                kind.opcode_name()
            ))
        })?;
        if let Some(anchor) = position.before {
            if self.module.instruction_parent(anchor) != Some(position.block) {
                return Err(CodegenError::invalid_state(format!(
                    "insertion point for '{}' was moved out of its block",
                    kind.opcode_name()
                )));
            }
        }
        Ok(self
            .module
            .insert_instruction(position.block, position.before, ty, kind))
    }

    fn describe(&self, ty: Type) -> String {
        self.module.types.display(ty).to_string()
    }

    fn mismatch(&self, expected: Type, found: Type) -> CodegenError {
        CodegenError::type_mismatch(self.describe(expected), self.describe(found))
    }

    /// Element type for vectors, the type itself otherwise
    fn scalar_of(&self, ty: Type) -> Type {
        match self.module.types.kind(ty) {
            TypeKind::Vector => self.module.types.element_type(ty).unwrap_or(ty),
            _ => ty,
        }
    }

    fn same_type(&self, opcode: &str, lhs: Value, rhs: Value) -> Result<Type> {
        let (lhs_ty, rhs_ty) = (self.module.type_of(lhs), self.module.type_of(rhs));
        if lhs_ty != rhs_ty {
            return Err(CodegenError::type_error(format!(
                "{opcode} operands must have the same type, found {} and {}",
                self.describe(lhs_ty),
                self.describe(rhs_ty)
            )));
        }
        Ok(lhs_ty)
    }

    fn expect_integer(&self, opcode: &str, value: Value) -> Result<Type> {
        let ty = self.module.type_of(value);
        if self.module.types.is_integer(ty) {
            Ok(ty)
        } else {
            Err(CodegenError::type_error(format!(
                "{opcode} requires an integer, found {}",
                self.describe(ty)
            )))
        }
    }

    fn expect_kind(&self, opcode: &str, value: Value, kind: TypeKind) -> Result<Type> {
        let ty = self.module.type_of(value);
        if self.module.types.kind(ty) == kind {
            Ok(ty)
        } else {
            Err(CodegenError::type_error(format!(
                "{opcode} requires a {kind} operand, found {}",
                self.describe(ty)
            )))
        }
    }

    /// i1, or a vector of i1 shaped like `ty`
    fn bool_like(&mut self, ty: Type) -> Result<Type> {
        let i1 = self.module.types.i1();
        match self.module.types.kind(ty) {
            TypeKind::Vector => {
                let length = self.module.types.length(ty).unwrap_or(1) as u32;
                self.module.types.vector(i1, length)
            }
            _ => Ok(i1),
        }
    }

    fn current_function(&self, opcode: &str) -> Result<Function> {
        self.insert_block()
            .and_then(|block| self.module.block_parent(block))
            .ok_or_else(|| {
                CodegenError::invalid_state(format!("'{opcode}' needs a block inside a function"))
            })
    }

    // Arithmetic

    /// Emit any binary operator after checking its operand kind
    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
        let ty = self.same_type(op.name(), lhs, rhs)?;
        let scalar = self.scalar_of(ty);
        let fits = if op.is_float() {
            self.module.types.is_float(scalar)
        } else {
            self.module.types.is_integer(scalar)
        };
        if !fits {
            return Err(CodegenError::type_error(format!(
                "{op} requires {} operands, found {}",
                if op.is_float() { "floating point" } else { "integer" },
                self.describe(ty)
            )));
        }
        self.insert(ty, InstKind::Binary { op, lhs, rhs })
    }

    pub fn add(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn udiv(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::UDiv, lhs, rhs)
    }

    pub fn sdiv(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::SDiv, lhs, rhs)
    }

    pub fn urem(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::URem, lhs, rhs)
    }

    pub fn srem(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::SRem, lhs, rhs)
    }

    pub fn shl(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Shl, lhs, rhs)
    }

    pub fn lshr(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::LShr, lhs, rhs)
    }

    pub fn ashr(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::AShr, lhs, rhs)
    }

    pub fn and(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::And, lhs, rhs)
    }

    pub fn or(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Or, lhs, rhs)
    }

    pub fn xor(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::Xor, lhs, rhs)
    }

    pub fn fadd(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::FAdd, lhs, rhs)
    }

    pub fn fsub(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::FSub, lhs, rhs)
    }

    pub fn fmul(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::FMul, lhs, rhs)
    }

    pub fn fdiv(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::FDiv, lhs, rhs)
    }

    pub fn frem(&mut self, lhs: Value, rhs: Value) -> Result<Value> {
        self.binary(BinaryOp::FRem, lhs, rhs)
    }

    /// `0 - value`
    pub fn neg(&mut self, value: Value) -> Result<Value> {
        let ty = self.expect_integer("neg", value)?;
        let zero = self.module.const_int(ty, 0)?;
        self.sub(zero, value)
    }

    /// Bitwise complement, `value ^ -1`
    pub fn not(&mut self, value: Value) -> Result<Value> {
        let ty = self.expect_integer("not", value)?;
        let ones = self.module.const_int(ty, -1)?;
        self.xor(value, ones)
    }

    /// `-0.0 - value`
    pub fn fneg(&mut self, value: Value) -> Result<Value> {
        let ty = self.expect_kind("fneg", value, TypeKind::Float)?;
        let zero = self.module.const_float(ty, -0.0)?;
        self.fsub(zero, value)
    }

    // Comparisons

    pub fn icmp(&mut self, pred: IntPredicate, lhs: Value, rhs: Value) -> Result<Value> {
        let ty = self.same_type("icmp", lhs, rhs)?;
        let scalar = self.scalar_of(ty);
        if !self.module.types.is_integer(scalar) && !self.module.types.is_pointer(scalar) {
            return Err(CodegenError::type_error(format!(
                "icmp requires integer or pointer operands, found {}",
                self.describe(ty)
            )));
        }
        let result = self.bool_like(ty)?;
        self.insert(result, InstKind::ICmp { pred, lhs, rhs })
    }

    pub fn fcmp(&mut self, pred: FloatPredicate, lhs: Value, rhs: Value) -> Result<Value> {
        let ty = self.same_type("fcmp", lhs, rhs)?;
        if !self.module.types.is_float(self.scalar_of(ty)) {
            return Err(CodegenError::type_error(format!(
                "fcmp requires floating point operands, found {}",
                self.describe(ty)
            )));
        }
        let result = self.bool_like(ty)?;
        self.insert(result, InstKind::FCmp { pred, lhs, rhs })
    }

    // Memory

    /// Stack slot for one `ty`
    pub fn alloca(&mut self, ty: Type) -> Result<Value> {
        self.allocate(ty, None)
    }

    /// Stack slot for `count` consecutive `ty` values
    pub fn array_alloca(&mut self, ty: Type, count: Value) -> Result<Value> {
        self.expect_integer("array alloca", count)?;
        self.allocate(ty, Some(count))
    }

    fn allocate(&mut self, allocated: Type, count: Option<Value>) -> Result<Value> {
        if !self.module.types.is_sized(allocated) {
            return Err(CodegenError::type_error(format!(
                "cannot allocate unsized type {}",
                self.describe(allocated)
            )));
        }
        let ty = self.module.types.pointer(allocated);
        self.insert(ty, InstKind::Alloca { allocated, count })
    }

    pub fn load(&mut self, ptr: Value) -> Result<Value> {
        let ptr_ty = self.expect_kind("load", ptr, TypeKind::Pointer)?;
        let pointee = self.module.types.element_type(ptr_ty).unwrap_or(ptr_ty);
        if !self.module.types.is_sized(pointee) {
            return Err(CodegenError::type_error(format!(
                "cannot load unsized type {}",
                self.describe(pointee)
            )));
        }
        self.insert(pointee, InstKind::Load { ptr })
    }

    pub fn store(&mut self, value: Value, ptr: Value) -> Result<Value> {
        let ptr_ty = self.expect_kind("store", ptr, TypeKind::Pointer)?;
        let pointee = self.module.types.element_type(ptr_ty).unwrap_or(ptr_ty);
        let value_ty = self.module.type_of(value);
        if pointee != value_ty {
            return Err(self.mismatch(pointee, value_ty));
        }
        let void = self.module.types.void();
        self.insert(void, InstKind::Store { value, ptr })
    }

    /// Derive a pointer by walking `indices` through the pointee type
    ///
    /// The first index steps over the pointer itself; later ones select a
    /// struct field (constant, range checked) or an array/vector element.
    pub fn gep(&mut self, base: Value, indices: &[Value]) -> Result<Value> {
        let base_ty = self.expect_kind("getelementptr", base, TypeKind::Pointer)?;
        if indices.is_empty() {
            return Err(CodegenError::argument("getelementptr needs at least one index"));
        }
        for &index in indices {
            self.expect_integer("getelementptr index", index)?;
        }

        let mut current = self.module.types.element_type(base_ty).unwrap_or(base_ty);
        for &index in &indices[1..] {
            current = match self.module.types.kind(current) {
                TypeKind::Struct => {
                    let field = self.module.const_int_value(index).ok_or_else(|| {
                        CodegenError::type_error("struct field index must be a constant")
                    })?;
                    let fields = self.module.types.element_types(current).unwrap_or(&[]);
                    match usize::try_from(field).ok().and_then(|i| fields.get(i)) {
                        Some(&field_ty) => field_ty,
                        None => {
                            return Err(CodegenError::index(
                                field as i64,
                                format!("{} has {} fields", self.describe(current), fields.len()),
                            ))
                        }
                    }
                }
                TypeKind::Array | TypeKind::Vector => {
                    self.module.types.element_type(current).unwrap_or(current)
                }
                _ => {
                    return Err(CodegenError::type_error(format!(
                        "cannot index into {}",
                        self.describe(current)
                    )))
                }
            };
        }

        let ty = self.module.types.pointer(current);
        self.insert(ty, InstKind::GetElementPtr { base, indices: indices.to_vec() })
    }

    /// Pointer to field `field` of the struct `base` points to
    pub fn struct_gep(&mut self, base: Value, field: u32) -> Result<Value> {
        let i32_ty = self.module.types.i32();
        let zero = self.module.const_int(i32_ty, 0)?;
        let index = self.module.const_uint(i32_ty, u64::from(field))?;
        self.gep(base, &[zero, index])
    }

    // Control flow

    pub fn br(&mut self, dest: Block) -> Result<Value> {
        let void = self.module.types.void();
        self.insert(void, InstKind::Branch { dest })
    }

    pub fn cond_br(&mut self, cond: Value, then_dest: Block, else_dest: Block) -> Result<Value> {
        let cond_ty = self.module.type_of(cond);
        if self.module.types.int_width(cond_ty) != Some(1) {
            let i1 = self.module.types.i1();
            return Err(self.mismatch(i1, cond_ty));
        }
        let void = self.module.types.void();
        self.insert(void, InstKind::CondBranch { cond, then_dest, else_dest })
    }

    /// Jump to the block paired with the matching constant, else to `default`
    pub fn switch(&mut self, value: Value, default: Block, cases: &[(Value, Block)]) -> Result<Value> {
        let ty = self.expect_integer("switch", value)?;
        let mut seen = Vec::with_capacity(cases.len());
        for &(key, _) in cases {
            let key_ty = self.module.type_of(key);
            if key_ty != ty {
                return Err(self.mismatch(ty, key_ty));
            }
            let bits = self
                .module
                .const_int_value(key)
                .ok_or_else(|| CodegenError::argument("switch case keys must be integer constants"))?;
            if seen.contains(&bits) {
                return Err(CodegenError::argument(format!("duplicate switch case {bits}")));
            }
            seen.push(bits);
        }
        let void = self.module.types.void();
        self.insert(void, InstKind::Switch { value, default, cases: cases.to_vec() })
    }

    /// Merge incoming values by predecessor block; every value must be `ty`
    pub fn phi(&mut self, ty: Type, incoming: &[(Block, Value)]) -> Result<Value> {
        for (i, &(block, value)) in incoming.iter().enumerate() {
            let value_ty = self.module.type_of(value);
            if value_ty != ty {
                return Err(self.mismatch(ty, value_ty));
            }
            if incoming[..i].iter().any(|&(earlier, _)| earlier == block) {
                return Err(duplicate_predecessor(self.module, block));
            }
        }
        self.insert(ty, InstKind::Phi { incoming: incoming.to_vec() })
    }

    /// Add a predecessor to an existing phi, for back edges built later
    pub fn add_incoming(&mut self, phi: Value, block: Block, value: Value) -> Result<()> {
        self.module.add_incoming(phi, block, value)
    }

    pub fn call(&mut self, callee: Function, args: &[Value]) -> Result<Value> {
        if self.module.is_removed(callee) {
            return Err(CodegenError::invalid_state("call to a removed function"));
        }
        let fn_ty = self.module.function_type(callee);
        let params = self.module.types.param_types(fn_ty).unwrap_or(&[]).to_vec();
        let var_arg = self.module.types.is_var_arg(fn_ty);
        if args.len() < params.len() || (!var_arg && args.len() != params.len()) {
            return Err(CodegenError::argument(format!(
                "'{}' expects {} arguments, got {}",
                self.module.function_name(callee),
                params.len(),
                args.len()
            )));
        }
        for (&param_ty, &arg) in params.iter().zip(args) {
            let arg_ty = self.module.type_of(arg);
            if arg_ty != param_ty {
                return Err(self.mismatch(param_ty, arg_ty));
            }
        }
        let ty = self.module.return_type(callee);
        self.insert(ty, InstKind::Call { callee, args: args.to_vec() })
    }

    pub fn ret(&mut self, value: Value) -> Result<Value> {
        let function = self.current_function("ret")?;
        let expected = self.module.return_type(function);
        let found = self.module.type_of(value);
        if expected != found {
            return Err(self.mismatch(expected, found));
        }
        let void = self.module.types.void();
        self.insert(void, InstKind::Return(Some(value)))
    }

    pub fn ret_void(&mut self) -> Result<Value> {
        let function = self.current_function("ret")?;
        let expected = self.module.return_type(function);
        let void = self.module.types.void();
        if expected != void {
            return Err(self.mismatch(expected, void));
        }
        self.insert(void, InstKind::Return(None))
    }

    pub fn unreachable(&mut self) -> Result<Value> {
        let void = self.module.types.void();
        self.insert(void, InstKind::Unreachable)
    }

    // Conversions

    /// Emit any conversion after checking it is legal between the two types
    pub fn cast(&mut self, op: CastOp, value: Value, ty: Type) -> Result<Value> {
        let from = self.module.type_of(value);
        let types = &self.module.types;
        let (from_kind, to_kind) = (types.kind(from), types.kind(ty));
        let (from_bits, to_bits) = (types.scalar_bits(from), types.scalar_bits(ty));
        let legal = match op {
            CastOp::Trunc => {
                from_kind == TypeKind::Integer && to_kind == TypeKind::Integer && to_bits < from_bits
            }
            CastOp::ZExt | CastOp::SExt => {
                from_kind == TypeKind::Integer && to_kind == TypeKind::Integer && to_bits > from_bits
            }
            CastOp::FpToUi | CastOp::FpToSi => {
                from_kind == TypeKind::Float && to_kind == TypeKind::Integer
            }
            CastOp::UiToFp | CastOp::SiToFp => {
                from_kind == TypeKind::Integer && to_kind == TypeKind::Float
            }
            CastOp::FpExt => {
                from_kind == TypeKind::Float && to_kind == TypeKind::Float && to_bits > from_bits
            }
            CastOp::FpTrunc => {
                from_kind == TypeKind::Float && to_kind == TypeKind::Float && to_bits < from_bits
            }
            CastOp::BitCast => {
                (from_kind == TypeKind::Pointer && to_kind == TypeKind::Pointer)
                    || (from_kind != TypeKind::Pointer
                        && to_kind != TypeKind::Pointer
                        && from_bits.is_some()
                        && from_bits == to_bits)
            }
        };
        if !legal {
            return Err(CodegenError::type_error(format!(
                "invalid {op} from {} to {}",
                self.describe(from),
                self.describe(ty)
            )));
        }
        self.insert(ty, InstKind::Cast { op, value })
    }

    pub fn bitcast(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::BitCast, value, ty)
    }

    pub fn trunc(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::Trunc, value, ty)
    }

    pub fn zext(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::ZExt, value, ty)
    }

    pub fn sext(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::SExt, value, ty)
    }

    pub fn fptoui(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::FpToUi, value, ty)
    }

    pub fn fptosi(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::FpToSi, value, ty)
    }

    pub fn uitofp(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::UiToFp, value, ty)
    }

    pub fn sitofp(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::SiToFp, value, ty)
    }

    pub fn fpext(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::FpExt, value, ty)
    }

    pub fn fptrunc(&mut self, value: Value, ty: Type) -> Result<Value> {
        self.cast(CastOp::FpTrunc, value, ty)
    }

    /// Resize an integer, choosing trunc, zext or sext; same width is a no-op
    pub fn int_cast(&mut self, value: Value, ty: Type, signed: bool) -> Result<Value> {
        let from = self.expect_integer("int cast", value)?;
        let (from_bits, to_bits) = (self.module.types.int_width(from), self.module.types.int_width(ty));
        match (from_bits, to_bits) {
            (Some(a), Some(b)) if a == b => Ok(value),
            (Some(a), Some(b)) if b < a => self.trunc(value, ty),
            (Some(_), Some(_)) if signed => self.sext(value, ty),
            (Some(_), Some(_)) => self.zext(value, ty),
            _ => Err(CodegenError::type_error(format!(
                "int cast target {} is not an integer",
                self.describe(ty)
            ))),
        }
    }

    /// Convert between float precisions; same precision is a no-op
    pub fn fp_cast(&mut self, value: Value, ty: Type) -> Result<Value> {
        let from = self.expect_kind("fp cast", value, TypeKind::Float)?;
        let (from_bits, to_bits) = (self.module.types.scalar_bits(from), self.module.types.scalar_bits(ty));
        if !self.module.types.is_float(ty) {
            return Err(CodegenError::type_error(format!(
                "fp cast target {} is not a float",
                self.describe(ty)
            )));
        }
        if from_bits == to_bits {
            Ok(value)
        } else if to_bits > from_bits {
            self.fpext(value, ty)
        } else {
            self.fptrunc(value, ty)
        }
    }

    // Aggregates

    fn member_type(&self, opcode: &str, aggregate_ty: Type, index: u32) -> Result<Type> {
        let types = &self.module.types;
        let (member, count) = match types.kind(aggregate_ty) {
            TypeKind::Struct => {
                let fields = types.element_types(aggregate_ty).unwrap_or(&[]);
                (fields.get(index as usize).copied(), fields.len() as u64)
            }
            TypeKind::Array => {
                let length = types.length(aggregate_ty).unwrap_or(0);
                let element = types.element_type(aggregate_ty);
                (element.filter(|_| u64::from(index) < length), length)
            }
            _ => {
                return Err(CodegenError::type_error(format!(
                    "{opcode} requires a struct or array, found {}",
                    self.describe(aggregate_ty)
                )))
            }
        };
        member.ok_or_else(|| {
            CodegenError::index(
                i64::from(index),
                format!("{} has {count} elements", self.describe(aggregate_ty)),
            )
        })
    }

    pub fn extract_value(&mut self, aggregate: Value, index: u32) -> Result<Value> {
        let aggregate_ty = self.module.type_of(aggregate);
        let ty = self.member_type("extractvalue", aggregate_ty, index)?;
        self.insert(ty, InstKind::ExtractValue { aggregate, index })
    }

    pub fn insert_value(&mut self, aggregate: Value, element: Value, index: u32) -> Result<Value> {
        let aggregate_ty = self.module.type_of(aggregate);
        let member = self.member_type("insertvalue", aggregate_ty, index)?;
        let element_ty = self.module.type_of(element);
        if member != element_ty {
            return Err(self.mismatch(member, element_ty));
        }
        self.insert(aggregate_ty, InstKind::InsertValue { aggregate, element, index })
    }

    pub fn extract_element(&mut self, vector: Value, index: Value) -> Result<Value> {
        let vector_ty = self.expect_kind("extractelement", vector, TypeKind::Vector)?;
        self.expect_integer("extractelement index", index)?;
        let ty = self.scalar_of(vector_ty);
        self.insert(ty, InstKind::ExtractElement { vector, index })
    }

    pub fn insert_element(&mut self, vector: Value, element: Value, index: Value) -> Result<Value> {
        let vector_ty = self.expect_kind("insertelement", vector, TypeKind::Vector)?;
        self.expect_integer("insertelement index", index)?;
        let (expected, found) = (self.scalar_of(vector_ty), self.module.type_of(element));
        if expected != found {
            return Err(self.mismatch(expected, found));
        }
        self.insert(vector_ty, InstKind::InsertElement { vector, element, index })
    }

    /// Pick lanes from the concatenation of `lhs` and `rhs` by a constant i32 mask
    pub fn shuffle_vector(&mut self, lhs: Value, rhs: Value, mask: Value) -> Result<Value> {
        let ty = self.same_type("shufflevector", lhs, rhs)?;
        self.expect_kind("shufflevector", lhs, TypeKind::Vector)?;
        let mask_ty = self.expect_kind("shufflevector mask", mask, TypeKind::Vector)?;
        if self.module.types.int_width(self.scalar_of(mask_ty)) != Some(32) {
            return Err(CodegenError::type_error(format!(
                "shufflevector mask must be a vector of i32, found {}",
                self.describe(mask_ty)
            )));
        }
        if !self.module.is_constant(mask) {
            return Err(CodegenError::argument("shufflevector mask must be a constant"));
        }
        let length = self.module.types.length(mask_ty).unwrap_or(1) as u32;
        let element = self.scalar_of(ty);
        let result = self.module.types.vector(element, length)?;
        self.insert(result, InstKind::ShuffleVector { lhs, rhs, mask })
    }

    pub fn select(&mut self, cond: Value, then_value: Value, else_value: Value) -> Result<Value> {
        let ty = self.same_type("select", then_value, else_value)?;
        let cond_ty = self.module.type_of(cond);
        if self.module.types.int_width(self.scalar_of(cond_ty)) != Some(1) {
            let i1 = self.module.types.i1();
            return Err(self.mismatch(i1, cond_ty));
        }
        // a vector condition picks lane by lane from vectors of the same length
        if self.module.types.kind(cond_ty) == TypeKind::Vector {
            let lanes = self.module.types.length(cond_ty);
            if self.module.types.kind(ty) != TypeKind::Vector || self.module.types.length(ty) != lanes {
                let expected = self.bool_like(ty)?;
                return Err(self.mismatch(expected, cond_ty));
            }
        }
        self.insert(ty, InstKind::Select { cond, then_value, else_value })
    }

    /// Internal constant global holding `text` with a trailing NUL
    pub fn global_string(&mut self, name: &str, text: &str) -> Result<Value> {
        self.module.global_string(name, text)
    }
}

impl Module {
    /// Add a `(block, value)` pair to a phi node
    pub fn add_incoming(&mut self, phi: Value, block: Block, value: Value) -> Result<()> {
        let (phi_ty, value_ty) = (self.type_of(phi), self.type_of(value));
        if phi_ty != value_ty {
            return Err(CodegenError::type_mismatch(
                self.types.display(phi_ty).to_string(),
                self.types.display(value_ty).to_string(),
            ));
        }
        let duplicate = match self.instruction(phi) {
            Some(InstKind::Phi { incoming }) => incoming.iter().any(|&(from, _)| from == block),
            _ => false,
        };
        if duplicate {
            return Err(duplicate_predecessor(self, block));
        }
        match &mut self.values[phi.index()].kind {
            ValueKind::Instruction(InstKind::Phi { incoming }) => {
                incoming.push((block, value));
                Ok(())
            }
            _ => Err(CodegenError::argument("value is not a phi node")),
        }
    }

    /// Drop every entry of a phi node that arrives from `block`
    pub fn remove_incoming(&mut self, phi: Value, block: Block) -> Result<usize> {
        match &mut self.values[phi.index()].kind {
            ValueKind::Instruction(InstKind::Phi { incoming }) => {
                let before = incoming.len();
                incoming.retain(|(from, _)| *from != block);
                Ok(before - incoming.len())
            }
            _ => Err(CodegenError::argument("value is not a phi node")),
        }
    }
}

fn duplicate_predecessor(module: &Module, block: Block) -> CodegenError {
    CodegenError::argument(format!(
        "phi already has an incoming value from '{}'",
        module.block_label(block)
    ))
}
