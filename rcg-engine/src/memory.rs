//! Interpreter values and typed memory
//!
//! Memory is a list of allocations. Each allocation holds `count` cells of
//! one IR type, and a cell keeps its structure, so a struct is stored as an
//! aggregate rather than as bytes. A pointer names an allocation, a cell
//! offset and a path of element indices into that cell.

use log::trace;
use rcg_common::{CodegenError, Result};
use rcg_ir::{Type, TypeData, TypeRegistry};

/// Address of a (possibly nested) memory location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub alloc: usize,
    pub index: i64,
    pub path: Vec<usize>,
}

impl Pointer {
    fn new(alloc: usize) -> Self {
        Self { alloc, index: 0, path: Vec::new() }
    }

    /// Opaque integer form handed across the engine boundary
    pub fn address(&self) -> u64 {
        ((self.alloc as u64 + 1) << 32) | (self.index as u64 & 0xffff_ffff)
    }

    pub fn from_address(address: u64) -> Option<Self> {
        let alloc = (address >> 32).checked_sub(1)?;
        Some(Self {
            alloc: alloc as usize,
            index: i64::from(address as u32 as i32),
            path: Vec::new(),
        })
    }
}

/// Runtime value of an IR value
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Int { bits: u32, value: u64 },
    F32(f32),
    F64(f64),
    /// `None` is null
    Ptr(Option<Pointer>),
    /// Struct fields, array elements or vector lanes
    Agg(Vec<Val>),
    Void,
}

impl Val {
    pub fn bool(value: bool) -> Self {
        Val::Int { bits: 1, value: u64::from(value) }
    }

    /// Zero value of `ty`; opaque and unsized types read as `Void`
    pub fn zero(types: &TypeRegistry, ty: Type) -> Self {
        match types.data(ty) {
            TypeData::Int(bits) => Val::Int { bits: *bits, value: 0 },
            TypeData::F32 => Val::F32(0.0),
            TypeData::F64 => Val::F64(0.0),
            TypeData::Pointer(_) => Val::Ptr(None),
            TypeData::Array { element, length } => {
                Val::Agg(vec![Val::zero(types, *element); *length as usize])
            }
            TypeData::Vector { element, length } => {
                Val::Agg(vec![Val::zero(types, *element); *length as usize])
            }
            TypeData::Struct { elements: Some(fields), .. } => {
                Val::Agg(fields.iter().map(|&field| Val::zero(types, field)).collect())
            }
            TypeData::Struct { elements: None, .. } | TypeData::Void | TypeData::Function { .. } => {
                Val::Void
            }
        }
    }

    /// Number of `Val` nodes a zero value of `ty` takes, `None` on overflow
    pub fn footprint(types: &TypeRegistry, ty: Type) -> Option<u64> {
        match types.data(ty) {
            TypeData::Array { element, length } => {
                Val::footprint(types, *element)?.checked_mul(*length)?.checked_add(1)
            }
            TypeData::Vector { element, length } => {
                Val::footprint(types, *element)?.checked_mul(u64::from(*length))?.checked_add(1)
            }
            TypeData::Struct { elements: Some(fields), .. } => fields
                .iter()
                .try_fold(1u64, |total, &field| total.checked_add(Val::footprint(types, field)?)),
            _ => Some(1),
        }
    }

    pub fn as_int(&self) -> Result<(u32, u64)> {
        match *self {
            Val::Int { bits, value } => Ok((bits, value)),
            ref other => Err(CodegenError::execution(format!("expected an integer, found {other:?}"))),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        Ok(self.as_int()?.1 != 0)
    }

    pub fn as_pointer(&self) -> Result<Option<&Pointer>> {
        match self {
            Val::Ptr(pointer) => Ok(pointer.as_ref()),
            other => Err(CodegenError::execution(format!("expected a pointer, found {other:?}"))),
        }
    }

    pub fn into_lanes(self) -> Result<Vec<Val>> {
        match self {
            Val::Agg(lanes) => Ok(lanes),
            other => Err(CodegenError::execution(format!("expected an aggregate, found {other:?}"))),
        }
    }
}

struct Allocation {
    cells: Vec<Val>,
    footprint: u64,
    stack: bool,
    live: bool,
}

/// All allocations made during one execution
pub struct Memory {
    allocations: Vec<Allocation>,
    /// `Val` nodes held by live allocations
    used: u64,
    max_cells: u64,
}

impl Memory {
    /// Empty memory holding at most `max_cells` value nodes at once
    pub fn new(max_cells: u64) -> Self {
        Self { allocations: Vec::new(), used: 0, max_cells }
    }

    /// Fails unless `ty` fits in what is left of the budget
    pub fn check_zero(&self, types: &TypeRegistry, ty: Type) -> Result<()> {
        self.reserve(types, ty, 1).map(|_| ())
    }

    /// Reserve `count` zeroed cells of `ty`
    pub fn allocate(&mut self, types: &TypeRegistry, ty: Type, count: usize, stack: bool) -> Result<Pointer> {
        let footprint = self.reserve(types, ty, count)?;
        let mut cells = Vec::new();
        cells.try_reserve_exact(count).map_err(|err| {
            CodegenError::execution(format!("cannot allocate {count} x {}: {err}", types.display(ty)))
        })?;
        cells.resize(count, Val::zero(types, ty));

        let alloc = self.allocations.len();
        trace!("alloc #{alloc}: {count} cells{}", if stack { " (stack)" } else { "" });
        self.used += footprint;
        self.allocations.push(Allocation { cells, footprint, stack, live: true });
        Ok(Pointer::new(alloc))
    }

    fn reserve(&self, types: &TypeRegistry, ty: Type, count: usize) -> Result<u64> {
        Val::footprint(types, ty)
            .and_then(|cell| cell.checked_mul(count as u64))
            .filter(|&total| total <= self.max_cells.saturating_sub(self.used))
            .ok_or_else(|| {
                CodegenError::execution(format!(
                    "allocation of {count} x {} exceeds the memory limit of {} cells",
                    types.display(ty),
                    self.max_cells
                ))
            })
    }

    /// Marker for the allocations made from now on
    pub fn mark(&self) -> usize {
        self.allocations.len()
    }

    /// Free the stack allocations made since `mark`
    pub fn release_frame(&mut self, mark: usize) {
        for allocation in self.allocations.iter_mut().skip(mark).filter(|a| a.stack && a.live) {
            allocation.live = false;
            allocation.cells = Vec::new();
            self.used -= allocation.footprint;
        }
    }

    pub fn load(&self, pointer: Option<&Pointer>) -> Result<Val> {
        let pointer = pointer.ok_or_else(|| CodegenError::execution("load from null pointer"))?;
        let mut slot = self.cell(pointer)?;
        for &step in &pointer.path {
            slot = match slot {
                Val::Agg(elements) => elements.get(step).ok_or_else(|| out_of_bounds(pointer))?,
                _ => return Err(out_of_bounds(pointer)),
            };
        }
        Ok(slot.clone())
    }

    pub fn store(&mut self, pointer: Option<&Pointer>, value: Val) -> Result<()> {
        let pointer = pointer.ok_or_else(|| CodegenError::execution("store to null pointer"))?;
        let mut slot = self.cell_mut(pointer)?;
        for &step in &pointer.path {
            slot = match slot {
                Val::Agg(elements) => elements.get_mut(step).ok_or_else(|| out_of_bounds(pointer))?,
                _ => return Err(out_of_bounds(pointer)),
            };
        }
        *slot = value;
        Ok(())
    }

    fn cell(&self, pointer: &Pointer) -> Result<&Val> {
        let allocation = self.live(pointer)?;
        usize::try_from(pointer.index)
            .ok()
            .and_then(|index| allocation.cells.get(index))
            .ok_or_else(|| out_of_bounds(pointer))
    }

    fn cell_mut(&mut self, pointer: &Pointer) -> Result<&mut Val> {
        self.live(pointer)?;
        let allocation = &mut self.allocations[pointer.alloc];
        usize::try_from(pointer.index)
            .ok()
            .and_then(|index| allocation.cells.get_mut(index))
            .ok_or_else(|| out_of_bounds(pointer))
    }

    fn live(&self, pointer: &Pointer) -> Result<&Allocation> {
        match self.allocations.get(pointer.alloc) {
            Some(allocation) if allocation.live => Ok(allocation),
            Some(_) => Err(CodegenError::execution(format!(
                "access to released stack slot #{}",
                pointer.alloc
            ))),
            None => Err(CodegenError::execution(format!("dangling pointer to #{}", pointer.alloc))),
        }
    }
}

fn out_of_bounds(pointer: &Pointer) -> CodegenError {
    CodegenError::execution(format!(
        "out-of-bounds access at #{}[{}]{:?}",
        pointer.alloc, pointer.index, pointer.path
    ))
}
