//! IR Type System
//!
//! Types live in a [`TypeRegistry`] and are referred to through copyable
//! [`Type`] handles. Structural types are interned, so two requests for
//! `[4 x i32]` hand back the same handle. Named structs are nominal: every
//! declaration produces a fresh handle whose body may be filled in once.

use rcg_common::{CodegenError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Largest integer width accepted by the registry
pub const MAX_INT_BITS: u32 = (1 << 23) - 1;

/// Handle to an interned type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Type(u32);

impl Type {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Coarse classification used to dispatch on a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Void,
    Integer,
    Float,
    Pointer,
    Array,
    Vector,
    Struct,
    Function,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Void => "void",
            TypeKind::Integer => "integer",
            TypeKind::Float => "float",
            TypeKind::Pointer => "pointer",
            TypeKind::Array => "array",
            TypeKind::Vector => "vector",
            TypeKind::Struct => "struct",
            TypeKind::Function => "function",
        };
        write!(f, "{name}")
    }
}

/// Structure of a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeData {
    Void,

    /// Integer with bit width
    Int(u32),

    /// IEEE single precision
    F32,

    /// IEEE double precision
    F64,

    Pointer(Type),

    /// Array type [length x element]
    Array { element: Type, length: u64 },

    /// Vector type <length x element>
    Vector { element: Type, length: u32 },

    /// Struct type; `elements` is `None` while a named struct is opaque
    Struct {
        name: Option<String>,
        elements: Option<Vec<Type>>,
        packed: bool,
    },

    Function {
        return_type: Type,
        params: Vec<Type>,
        var_arg: bool,
    },
}

impl TypeData {
    fn kind(&self) -> TypeKind {
        match self {
            TypeData::Void => TypeKind::Void,
            TypeData::Int(_) => TypeKind::Integer,
            TypeData::F32 | TypeData::F64 => TypeKind::Float,
            TypeData::Pointer(_) => TypeKind::Pointer,
            TypeData::Array { .. } => TypeKind::Array,
            TypeData::Vector { .. } => TypeKind::Vector,
            TypeData::Struct { .. } => TypeKind::Struct,
            TypeData::Function { .. } => TypeKind::Function,
        }
    }

    fn is_named_struct(&self) -> bool {
        matches!(self, TypeData::Struct { name: Some(_), .. })
    }
}

/// Owner of every type used by a module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<TypeData>", into = "Vec<TypeData>")]
pub struct TypeRegistry {
    types: Vec<TypeData>,
    interned: HashMap<TypeData, Type>,
    named: HashMap<String, Type>,
}

impl From<Vec<TypeData>> for TypeRegistry {
    fn from(types: Vec<TypeData>) -> Self {
        let mut interned = HashMap::new();
        let mut named = HashMap::new();
        for (index, data) in types.iter().enumerate() {
            let ty = Type(index as u32);
            match data {
                TypeData::Struct { name: Some(name), .. } => {
                    named.insert(name.clone(), ty);
                }
                _ => {
                    interned.entry(data.clone()).or_insert(ty);
                }
            }
        }
        Self { types, interned, named }
    }
}

impl From<TypeRegistry> for Vec<TypeData> {
    fn from(registry: TypeRegistry) -> Self {
        registry.types
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, data: TypeData) -> Type {
        if let Some(&ty) = self.interned.get(&data) {
            return ty;
        }
        let ty = Type(self.types.len() as u32);
        self.types.push(data.clone());
        self.interned.insert(data, ty);
        ty
    }

    /// Canonical handle for any structural type description
    ///
    /// Named structs cannot be interned; use [`TypeRegistry::declare_struct`].
    pub fn of(&mut self, data: TypeData) -> Result<Type> {
        match data {
            TypeData::Int(bits) => self.int(bits),
            TypeData::Array { element, length } => self.array(element, length),
            TypeData::Vector { element, length } => self.vector(element, length),
            TypeData::Struct { name: None, elements, packed } => {
                self.struct_type(&elements.unwrap_or_default(), packed)
            }
            TypeData::Struct { name: Some(name), .. } => Err(CodegenError::argument(format!(
                "named struct '{name}' must be declared, not interned"
            ))),
            TypeData::Function { return_type, params, var_arg } => {
                self.function(return_type, &params, var_arg)
            }
            other => Ok(self.intern(other)),
        }
    }

    pub fn void(&mut self) -> Type {
        self.intern(TypeData::Void)
    }

    /// Integer type of arbitrary width
    pub fn int(&mut self, bits: u32) -> Result<Type> {
        if bits == 0 || bits > MAX_INT_BITS {
            return Err(CodegenError::argument(format!("invalid integer width {bits}")));
        }
        Ok(self.intern(TypeData::Int(bits)))
    }

    pub fn i1(&mut self) -> Type {
        self.intern(TypeData::Int(1))
    }

    pub fn i8(&mut self) -> Type {
        self.intern(TypeData::Int(8))
    }

    pub fn i16(&mut self) -> Type {
        self.intern(TypeData::Int(16))
    }

    pub fn i32(&mut self) -> Type {
        self.intern(TypeData::Int(32))
    }

    pub fn i64(&mut self) -> Type {
        self.intern(TypeData::Int(64))
    }

    pub fn f32(&mut self) -> Type {
        self.intern(TypeData::F32)
    }

    pub fn f64(&mut self) -> Type {
        self.intern(TypeData::F64)
    }

    pub fn pointer(&mut self, pointee: Type) -> Type {
        self.intern(TypeData::Pointer(pointee))
    }

    pub fn array(&mut self, element: Type, length: u64) -> Result<Type> {
        if !self.is_sized(element) {
            return Err(CodegenError::argument(format!(
                "array element type {} is not sized",
                self.display(element)
            )));
        }
        Ok(self.intern(TypeData::Array { element, length }))
    }

    /// Vector of integers, floats or pointers
    pub fn vector(&mut self, element: Type, length: u32) -> Result<Type> {
        if length == 0 {
            return Err(CodegenError::argument("vector length must be non-zero"));
        }
        match self.kind(element) {
            TypeKind::Integer | TypeKind::Float | TypeKind::Pointer => {
                Ok(self.intern(TypeData::Vector { element, length }))
            }
            _ => Err(CodegenError::argument(format!(
                "invalid vector element type {}",
                self.display(element)
            ))),
        }
    }

    /// Anonymous (structurally interned) struct type
    pub fn struct_type(&mut self, elements: &[Type], packed: bool) -> Result<Type> {
        self.check_struct_elements(elements)?;
        Ok(self.intern(TypeData::Struct {
            name: None,
            elements: Some(elements.to_vec()),
            packed,
        }))
    }

    pub fn function(&mut self, return_type: Type, params: &[Type], var_arg: bool) -> Result<Type> {
        if matches!(self.kind(return_type), TypeKind::Function) {
            return Err(CodegenError::argument("functions cannot return function types"));
        }
        if let Some(&bad) = params.iter().find(|&&p| !self.is_sized(p)) {
            return Err(CodegenError::argument(format!(
                "invalid parameter type {}",
                self.display(bad)
            )));
        }
        Ok(self.intern(TypeData::Function {
            return_type,
            params: params.to_vec(),
            var_arg,
        }))
    }

    /// Create a fresh, opaque named struct
    pub fn declare_struct(&mut self, name: &str) -> Result<Type> {
        if self.named.contains_key(name) {
            return Err(CodegenError::type_conflict(name, "struct type already declared"));
        }
        let ty = Type(self.types.len() as u32);
        self.types.push(TypeData::Struct {
            name: Some(name.to_string()),
            elements: None,
            packed: false,
        });
        self.named.insert(name.to_string(), ty);
        Ok(ty)
    }

    /// Declare a named struct and set its body in one step
    pub fn named_struct(&mut self, name: &str, elements: &[Type], packed: bool) -> Result<Type> {
        let ty = self.declare_struct(name)?;
        self.set_struct_body(ty, elements, packed)?;
        Ok(ty)
    }

    /// Set the element list of a named struct; permitted exactly once
    pub fn set_struct_body(&mut self, ty: Type, elements: &[Type], packed: bool) -> Result<()> {
        if !self.types[ty.index()].is_named_struct() {
            return Err(CodegenError::type_error(format!(
                "{} is not a named struct type",
                self.display(ty)
            )));
        }
        // self reference through a pointer is allowed, by value it is not
        if elements.contains(&ty) {
            return Err(CodegenError::argument("struct cannot contain itself by value"));
        }
        self.check_struct_elements(elements)?;
        match &mut self.types[ty.index()] {
            TypeData::Struct { name, elements: slot, packed: p } => {
                if slot.is_some() {
                    return Err(CodegenError::invalid_state(format!(
                        "body of struct '{}' is already set",
                        name.as_deref().unwrap_or_default()
                    )));
                }
                *slot = Some(elements.to_vec());
                *p = packed;
                Ok(())
            }
            _ => Err(CodegenError::type_error("not a struct type")),
        }
    }

    fn check_struct_elements(&self, elements: &[Type]) -> Result<()> {
        match elements.iter().find(|&&e| !self.is_sized(e)) {
            Some(&bad) => Err(CodegenError::argument(format!(
                "invalid struct element type {}",
                self.display(bad)
            ))),
            None => Ok(()),
        }
    }

    /// Look up a named struct by name
    pub fn lookup_struct(&self, name: &str) -> Option<Type> {
        self.named.get(name).copied()
    }

    /// Named structs in declaration order
    pub fn named_structs(&self) -> impl Iterator<Item = Type> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, data)| data.is_named_struct())
            .map(|(index, _)| Type(index as u32))
    }

    pub fn data(&self, ty: Type) -> &TypeData {
        &self.types[ty.index()]
    }

    pub fn kind(&self, ty: Type) -> TypeKind {
        self.data(ty).kind()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn is_void(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::Void)
    }

    pub fn is_integer(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::Int(_))
    }

    pub fn is_float(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::F32 | TypeData::F64)
    }

    pub fn is_pointer(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::Pointer(_))
    }

    /// Struct or array
    pub fn is_aggregate(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::Struct { .. } | TypeData::Array { .. })
    }

    /// Types that can be stored in memory and passed by value
    pub fn is_sized(&self, ty: Type) -> bool {
        match self.data(ty) {
            TypeData::Void | TypeData::Function { .. } => false,
            TypeData::Struct { elements: None, .. } => false,
            _ => true,
        }
    }

    pub fn int_width(&self, ty: Type) -> Option<u32> {
        match self.data(ty) {
            TypeData::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    /// Width in bits of a scalar type, used to validate bit casts
    pub fn scalar_bits(&self, ty: Type) -> Option<u64> {
        match self.data(ty) {
            TypeData::Int(bits) => Some(u64::from(*bits)),
            TypeData::F32 => Some(32),
            TypeData::F64 => Some(64),
            TypeData::Pointer(_) => Some(64),
            TypeData::Vector { element, length } => {
                self.scalar_bits(*element).map(|bits| bits * u64::from(*length))
            }
            _ => None,
        }
    }

    /// Pointee of a pointer, element of an array or vector
    pub fn element_type(&self, ty: Type) -> Option<Type> {
        match self.data(ty) {
            TypeData::Pointer(pointee) => Some(*pointee),
            TypeData::Array { element, .. } | TypeData::Vector { element, .. } => Some(*element),
            _ => None,
        }
    }

    /// Element count of an array or vector
    pub fn length(&self, ty: Type) -> Option<u64> {
        match self.data(ty) {
            TypeData::Array { length, .. } => Some(*length),
            TypeData::Vector { length, .. } => Some(u64::from(*length)),
            _ => None,
        }
    }

    /// Ordered fields of a struct; empty for an opaque named struct
    pub fn element_types(&self, ty: Type) -> Option<&[Type]> {
        match self.data(ty) {
            TypeData::Struct { elements, .. } => Some(elements.as_deref().unwrap_or(&[])),
            _ => None,
        }
    }

    pub fn is_packed(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::Struct { packed: true, .. })
    }

    pub fn is_opaque(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::Struct { elements: None, .. })
    }

    pub fn struct_name(&self, ty: Type) -> Option<&str> {
        match self.data(ty) {
            TypeData::Struct { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    pub fn return_type(&self, ty: Type) -> Option<Type> {
        match self.data(ty) {
            TypeData::Function { return_type, .. } => Some(*return_type),
            _ => None,
        }
    }

    pub fn param_types(&self, ty: Type) -> Option<&[Type]> {
        match self.data(ty) {
            TypeData::Function { params, .. } => Some(params),
            _ => None,
        }
    }

    pub fn is_var_arg(&self, ty: Type) -> bool {
        matches!(self.data(ty), TypeData::Function { var_arg: true, .. })
    }

    /// Render a type in textual IR syntax
    pub fn display(&self, ty: Type) -> TypeDisplay<'_> {
        TypeDisplay { registry: self, ty }
    }
}

/// Display adapter returned by [`TypeRegistry::display`]
pub struct TypeDisplay<'a> {
    registry: &'a TypeRegistry,
    ty: Type,
}

impl TypeDisplay<'_> {
    fn nested(&self, ty: Type) -> Self {
        TypeDisplay { registry: self.registry, ty }
    }
}

impl TypeRegistry {
    /// Check that every type refers only to types in this registry
    ///
    /// Structural types may only refer to earlier entries, so the only
    /// cycles go through named structs.
    pub(crate) fn check_handles(&self) -> Result<()> {
        for (index, data) in self.types.iter().enumerate() {
            let limit = if data.is_named_struct() { self.types.len() } else { index };
            let children: Vec<Type> = match data {
                TypeData::Void | TypeData::F32 | TypeData::F64 => Vec::new(),
                TypeData::Int(bits) => {
                    if *bits == 0 || *bits > MAX_INT_BITS {
                        return Err(CodegenError::index(index as i64, format!("invalid integer width {bits}")));
                    }
                    Vec::new()
                }
                TypeData::Pointer(pointee) => vec![*pointee],
                TypeData::Array { element, .. } | TypeData::Vector { element, .. } => vec![*element],
                TypeData::Struct { elements, .. } => elements.clone().unwrap_or_default(),
                TypeData::Function { return_type, params, .. } => {
                    std::iter::once(*return_type).chain(params.iter().copied()).collect()
                }
            };
            if let Some(bad) = children.iter().find(|child| child.index() >= limit) {
                return Err(CodegenError::index(
                    bad.index() as i64,
                    format!("type {index} refers to a type outside the registry"),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn contains(&self, ty: Type) -> bool {
        ty.index() < self.types.len()
    }
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.registry.data(self.ty) {
            TypeData::Void => write!(f, "void"),
            TypeData::Int(bits) => write!(f, "i{bits}"),
            TypeData::F32 => write!(f, "float"),
            TypeData::F64 => write!(f, "double"),
            TypeData::Pointer(pointee) => write!(f, "{}*", self.nested(*pointee)),
            TypeData::Array { element, length } => {
                write!(f, "[{length} x {}]", self.nested(*element))
            }
            TypeData::Vector { element, length } => {
                write!(f, "<{length} x {}>", self.nested(*element))
            }
            TypeData::Struct { name: Some(name), .. } => write!(f, "%{name}"),
            TypeData::Struct { name: None, elements, packed } => {
                write_struct_body(f, self, elements.as_deref().unwrap_or(&[]), *packed)
            }
            TypeData::Function { return_type, params, var_arg } => {
                write!(f, "{} (", self.nested(*return_type))?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", self.nested(*param))?;
                }
                if *var_arg {
                    if !params.is_empty() { write!(f, ", ")?; }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Writes `{ a, b }` or `<{ a, b }>`; shared with named struct definitions
pub(crate) fn write_struct_body(
    f: &mut fmt::Formatter<'_>,
    display: &TypeDisplay<'_>,
    elements: &[Type],
    packed: bool,
) -> fmt::Result {
    if packed { write!(f, "<")?; }
    write!(f, "{{")?;
    for (i, element) in elements.iter().enumerate() {
        if i > 0 { write!(f, ",")?; }
        write!(f, " {}", display.nested(*element))?;
    }
    if !elements.is_empty() { write!(f, " ")?; }
    write!(f, "}}")?;
    if packed { write!(f, ">")?; }
    Ok(())
}

/// Body of a named struct as written in a type definition
pub struct StructBodyDisplay<'a> {
    display: TypeDisplay<'a>,
}

impl TypeRegistry {
    /// Render the body of a named struct (`opaque` when unset)
    pub fn display_struct_body(&self, ty: Type) -> StructBodyDisplay<'_> {
        StructBodyDisplay { display: self.display(ty) }
    }
}

impl fmt::Display for StructBodyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display.registry.data(self.display.ty) {
            TypeData::Struct { elements: None, .. } => write!(f, "opaque"),
            TypeData::Struct { elements: Some(elements), packed, .. } => {
                write_struct_body(f, &self.display, elements, *packed)
            }
            _ => write!(f, "{}", self.display),
        }
    }
}
