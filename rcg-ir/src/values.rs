//! IR Value Representations
//!
//! Every value (constants, arguments, globals and instructions) lives in the
//! module's value arena and is named by a [`Value`] handle. Equality is
//! handle identity: two `const_int` calls with the same payload produce two
//! distinct values.

use rcg_common::{CodegenError, Result};
use serde::{Deserialize, Serialize};
use crate::graph::{Links, NodeStore};
use crate::types::TypeKind;
use crate::{Block, Function, InstKind, Linkage, Module, Type};

/// Handle to a value owned by a [`Module`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Value(u32);

impl Value {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Module-level storage description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalData {
    pub(crate) value_type: Type,
    pub(crate) initializer: Option<Value>,
    pub(crate) linkage: Linkage,
    pub(crate) is_constant: bool,
}

impl GlobalData {
    pub fn value_type(&self) -> Type {
        self.value_type
    }

    pub fn initializer(&self) -> Option<Value> {
        self.initializer
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn is_constant(&self) -> bool {
        self.is_constant
    }
}

/// What a value is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Integer constant, stored zero-extended and masked to the type width
    ConstInt(u64),

    ConstFloat(f64),

    /// Null pointer
    ConstNull,

    Undef,

    /// Array, vector or struct constant; the shape comes from the type
    ConstAggregate(Vec<Value>),

    /// Byte array constant
    ConstString(Vec<u8>),

    /// Formal parameter of a function
    Argument { function: Function, index: usize },

    Global(GlobalData),

    Instruction(InstKind),
}

/// Arena entry for a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueData {
    pub(crate) ty: Type,
    pub(crate) name: Option<String>,
    pub(crate) kind: ValueKind,
    /// Position inside a basic block; only instructions are ever linked
    pub(crate) links: Links<Value, Block>,
}

impl ValueData {
    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::ConstInt(_)
                | ValueKind::ConstFloat(_)
                | ValueKind::ConstNull
                | ValueKind::Undef
                | ValueKind::ConstAggregate(_)
                | ValueKind::ConstString(_)
                | ValueKind::Global(_)
        )
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self.kind, ValueKind::Instruction(_))
    }

    pub fn as_instruction(&self) -> Option<&InstKind> {
        match &self.kind {
            ValueKind::Instruction(inst) => Some(inst),
            _ => None,
        }
    }
}

impl NodeStore<Value, Block> for Vec<ValueData> {
    fn links(&self, key: Value) -> &Links<Value, Block> {
        &self[key.index()].links
    }

    fn links_mut(&mut self, key: Value) -> &mut Links<Value, Block> {
        &mut self[key.index()].links
    }
}

/// Keep the low `bits` bits of `value`
pub fn mask(bits: u32, value: u64) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

/// Interpret the low `bits` bits of `value` as a two's complement number
pub fn sign_extend(bits: u32, value: u64) -> i64 {
    if bits == 0 || bits >= 64 {
        value as i64
    } else {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    }
}

impl Module {
    pub(crate) fn push_value(&mut self, ty: Type, kind: ValueKind) -> Value {
        let value = Value(self.values.len() as u32);
        self.values.push(ValueData {
            ty,
            name: None,
            kind,
            links: Links::default(),
        });
        value
    }

    pub fn value(&self, value: Value) -> &ValueData {
        &self.values[value.index()]
    }

    /// Type of any value
    pub fn type_of(&self, value: Value) -> Type {
        self.values[value.index()].ty
    }

    pub fn name_of(&self, value: Value) -> Option<&str> {
        self.values[value.index()].name.as_deref()
    }

    /// Rename a value; an empty name clears it
    ///
    /// Global names stay unique: taking a name held by another global fails.
    pub fn set_name(&mut self, value: Value, name: &str) -> Result<()> {
        let name = (!name.is_empty()).then(|| name.to_string());
        if matches!(self.values[value.index()].kind, ValueKind::Global(_)) {
            if let Some(new) = &name {
                if self.global_names.get(new).is_some_and(|&other| other != value) {
                    return Err(CodegenError::type_conflict(
                        new.as_str(),
                        "another global already has this name",
                    ));
                }
            }
            if let Some(old) = self.values[value.index()].name.take() {
                self.global_names.remove(&old);
            }
            if let Some(new) = &name {
                self.global_names.insert(new.clone(), value);
            }
        }
        self.values[value.index()].name = name;
        Ok(())
    }

    pub fn is_constant(&self, value: Value) -> bool {
        self.values[value.index()].is_constant()
    }

    /// Raw bits of an integer constant
    pub fn const_int_value(&self, value: Value) -> Option<u64> {
        match self.values[value.index()].kind {
            ValueKind::ConstInt(bits) => Some(bits),
            _ => None,
        }
    }

    /// Integer constant read as a signed number of its own width
    pub fn const_int_signed(&self, value: Value) -> Option<i64> {
        let raw = self.const_int_value(value)?;
        let width = self.types.int_width(self.type_of(value))?;
        Some(sign_extend(width, raw))
    }

    pub fn const_float_value(&self, value: Value) -> Option<f64> {
        match self.values[value.index()].kind {
            ValueKind::ConstFloat(v) => Some(v),
            _ => None,
        }
    }

    /// Operands of a value: aggregate elements, global initializer or instruction operands
    pub fn operands(&self, value: Value) -> Vec<Value> {
        match &self.values[value.index()].kind {
            ValueKind::ConstAggregate(elements) => elements.clone(),
            ValueKind::Global(global) => global.initializer.iter().copied().collect(),
            ValueKind::Instruction(inst) => inst.operands(),
            _ => Vec::new(),
        }
    }

    fn expect_kind(&self, ty: Type, kind: TypeKind, what: &str) -> Result<()> {
        if self.types.kind(ty) == kind {
            Ok(())
        } else {
            Err(CodegenError::type_error(format!(
                "{what} requires {kind} type, found {}",
                self.types.display(ty)
            )))
        }
    }

    /// Integer constant; the value is truncated to the width of `ty`
    pub fn const_int(&mut self, ty: Type, value: i64) -> Result<Value> {
        self.const_uint(ty, value as u64)
    }

    pub fn const_uint(&mut self, ty: Type, value: u64) -> Result<Value> {
        self.expect_kind(ty, TypeKind::Integer, "integer constant")?;
        let bits = self.types.int_width(ty).unwrap_or(64);
        if bits > 64 {
            return Err(CodegenError::argument(format!(
                "integer constants wider than 64 bits are not supported (i{bits})"
            )));
        }
        Ok(self.push_value(ty, ValueKind::ConstInt(mask(bits, value))))
    }

    pub fn const_bool(&mut self, value: bool) -> Value {
        let ty = self.types.i1();
        self.push_value(ty, ValueKind::ConstInt(u64::from(value)))
    }

    /// Floating point constant; rounded to single precision for `float`
    pub fn const_float(&mut self, ty: Type, value: f64) -> Result<Value> {
        self.expect_kind(ty, TypeKind::Float, "float constant")?;
        let stored = if self.types.scalar_bits(ty) == Some(32) {
            f64::from(value as f32)
        } else {
            value
        };
        Ok(self.push_value(ty, ValueKind::ConstFloat(stored)))
    }

    pub fn const_null(&mut self, ty: Type) -> Result<Value> {
        self.expect_kind(ty, TypeKind::Pointer, "null constant")?;
        Ok(self.push_value(ty, ValueKind::ConstNull))
    }

    pub fn undef(&mut self, ty: Type) -> Result<Value> {
        if !self.types.is_sized(ty) {
            return Err(CodegenError::argument(format!(
                "undef of unsized type {}",
                self.types.display(ty)
            )));
        }
        Ok(self.push_value(ty, ValueKind::Undef))
    }

    fn check_constant_elements(&self, expected: &[Type], elements: &[Value]) -> Result<()> {
        if expected.len() != elements.len() {
            return Err(CodegenError::argument(format!(
                "expected {} elements, got {}",
                expected.len(),
                elements.len()
            )));
        }
        for (&want, &element) in expected.iter().zip(elements) {
            let data = &self.values[element.index()];
            if !data.is_constant() {
                return Err(CodegenError::argument("aggregate elements must be constants"));
            }
            if data.ty != want {
                return Err(CodegenError::type_mismatch(
                    self.types.display(want).to_string(),
                    self.types.display(data.ty).to_string(),
                ));
            }
        }
        Ok(())
    }

    fn generate<F>(&mut self, count: usize, mut generator: F) -> Result<Vec<Value>>
    where
        F: FnMut(&mut Module, usize) -> Result<Value>,
    {
        (0..count).map(|index| generator(&mut *self, index)).collect()
    }

    /// Constant array of `element` values
    pub fn const_array(&mut self, element: Type, elements: &[Value]) -> Result<Value> {
        let ty = self.types.array(element, elements.len() as u64)?;
        self.check_constant_elements(&vec![element; elements.len()], elements)?;
        Ok(self.push_value(ty, ValueKind::ConstAggregate(elements.to_vec())))
    }

    /// Constant array whose `count` elements come from `generator(index)`
    pub fn const_array_with<F>(&mut self, element: Type, count: usize, generator: F) -> Result<Value>
    where
        F: FnMut(&mut Module, usize) -> Result<Value>,
    {
        let elements = self.generate(count, generator)?;
        self.const_array(element, &elements)
    }

    /// Constant of the vector type `ty`; the element count must match its length
    pub fn const_vector(&mut self, ty: Type, elements: &[Value]) -> Result<Value> {
        self.expect_kind(ty, TypeKind::Vector, "vector constant")?;
        let length = self.types.length(ty).unwrap_or(0) as usize;
        if elements.len() != length {
            return Err(CodegenError::argument(format!(
                "vector {} needs {length} elements, got {}",
                self.types.display(ty),
                elements.len()
            )));
        }
        let element = self.types.element_type(ty).ok_or_else(|| {
            CodegenError::invalid_state("vector type without element type")
        })?;
        self.check_constant_elements(&vec![element; length], elements)?;
        Ok(self.push_value(ty, ValueKind::ConstAggregate(elements.to_vec())))
    }

    /// Constant vector of `ty` whose elements come from `generator(index)`
    pub fn const_vector_with<F>(&mut self, ty: Type, generator: F) -> Result<Value>
    where
        F: FnMut(&mut Module, usize) -> Result<Value>,
    {
        self.expect_kind(ty, TypeKind::Vector, "vector constant")?;
        let length = self.types.length(ty).unwrap_or(0) as usize;
        let elements = self.generate(length, generator)?;
        self.const_vector(ty, &elements)
    }

    /// Constant of an anonymous struct type built from the element types
    pub fn const_struct(&mut self, elements: &[Value], packed: bool) -> Result<Value> {
        if let Some(&bad) = elements.iter().find(|&&e| !self.is_constant(e)) {
            return Err(CodegenError::argument(format!(
                "struct element {} is not a constant",
                bad.index()
            )));
        }
        let element_types: Vec<Type> = elements.iter().map(|&e| self.type_of(e)).collect();
        let ty = self.types.struct_type(&element_types, packed)?;
        Ok(self.push_value(ty, ValueKind::ConstAggregate(elements.to_vec())))
    }

    pub fn const_struct_with<F>(&mut self, count: usize, packed: bool, generator: F) -> Result<Value>
    where
        F: FnMut(&mut Module, usize) -> Result<Value>,
    {
        let elements = self.generate(count, generator)?;
        self.const_struct(&elements, packed)
    }

    /// Constant of a named (or any existing) struct type
    pub fn const_named_struct(&mut self, ty: Type, elements: &[Value]) -> Result<Value> {
        self.expect_kind(ty, TypeKind::Struct, "struct constant")?;
        if self.types.is_opaque(ty) {
            return Err(CodegenError::invalid_state(format!(
                "struct {} has no body",
                self.types.display(ty)
            )));
        }
        let expected = self.types.element_types(ty).unwrap_or(&[]).to_vec();
        self.check_constant_elements(&expected, elements)?;
        Ok(self.push_value(ty, ValueKind::ConstAggregate(elements.to_vec())))
    }

    /// `[n x i8]` constant holding the bytes of `text`
    pub fn const_string(&mut self, text: &str, null_terminate: bool) -> Result<Value> {
        let mut bytes = text.as_bytes().to_vec();
        if null_terminate {
            bytes.push(0);
        }
        let i8_type = self.types.i8();
        let ty = self.types.array(i8_type, bytes.len() as u64)?;
        Ok(self.push_value(ty, ValueKind::ConstString(bytes)))
    }

    /// Number of elements of an aggregate or string constant
    pub fn aggregate_len(&self, value: Value) -> Option<usize> {
        match &self.values[value.index()].kind {
            ValueKind::ConstAggregate(elements) => Some(elements.len()),
            ValueKind::ConstString(bytes) => Some(bytes.len()),
            _ => None,
        }
    }
}
