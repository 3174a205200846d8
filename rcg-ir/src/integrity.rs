//! Handle integrity
//!
//! Modules built through the API only ever hold handles into their own
//! arenas. A module deserialized from outside can hold anything, so it is
//! checked here before any other query indexes into it.

use rcg_common::{CodegenError, Result};
use crate::graph::{Chain, Links};
use crate::values::ValueKind;
use crate::{Block, Function, InstKind, Module, Type, TypeKind, Value};

fn broken(index: usize, message: impl Into<String>) -> CodegenError {
    CodegenError::index(index as i64, message)
}

/// Handles held by one value
#[derive(Default)]
struct Refs {
    values: Vec<Value>,
    blocks: Vec<Block>,
    functions: Vec<Function>,
    types: Vec<Type>,
}

impl Refs {
    fn of(kind: &ValueKind) -> Self {
        let mut refs = Refs::default();
        match kind {
            ValueKind::ConstAggregate(elements) => refs.values.extend(elements),
            ValueKind::Argument { function, .. } => refs.functions.push(*function),
            ValueKind::Global(global) => {
                refs.types.push(global.value_type);
                refs.values.extend(global.initializer);
            }
            ValueKind::Instruction(inst) => {
                refs.values = inst.operands();
                refs.blocks = inst.successors();
                match inst {
                    InstKind::Phi { incoming } => refs.blocks.extend(incoming.iter().map(|(from, _)| *from)),
                    InstKind::Call { callee, .. } => refs.functions.push(*callee),
                    InstKind::Alloca { allocated, .. } => refs.types.push(*allocated),
                    _ => {}
                }
            }
            _ => {}
        }
        refs
    }
}

impl Module {
    /// Check that every stored handle points into this module's arenas and
    /// that every block and instruction list is a well-formed chain
    pub fn check_integrity(&self) -> Result<()> {
        self.types.check_handles()?;
        let value_ok = |v: &Value| v.index() < self.values.len();
        let block_ok = |b: &Block| b.index() < self.blocks.len();
        let function_ok = |f: &Function| f.index() < self.functions.len();

        for (index, data) in self.values.iter().enumerate() {
            let refs = Refs::of(&data.kind);
            if !self.types.contains(data.ty) || !refs.types.iter().all(|&ty| self.types.contains(ty)) {
                return Err(broken(index, "value refers to an unknown type"));
            }
            if !refs.values.iter().all(value_ok)
                || !refs.blocks.iter().all(block_ok)
                || !refs.functions.iter().all(function_ok)
            {
                return Err(broken(index, "value refers to a missing value, block or function"));
            }
            if let ValueKind::Argument { function, index: position } = data.kind {
                if self.functions[function.index()].params.get(position).map(|p| p.index()) != Some(index) {
                    return Err(broken(index, "argument does not match its function's parameters"));
                }
            }
            let links = &data.links;
            if !links.parent.iter().all(block_ok) || !links.prev.iter().chain(&links.next).all(value_ok) {
                return Err(broken(index, "instruction links leave the value arena"));
            }
        }

        for (index, data) in self.blocks.iter().enumerate() {
            let links = &data.links;
            if !links.parent.iter().all(function_ok)
                || !links.prev.iter().chain(&links.next).all(block_ok)
                || !data.insts.first().iter().chain(&data.insts.last()).all(value_ok)
            {
                return Err(broken(index, "block links leave the module"));
            }
        }

        for (index, data) in self.functions.iter().enumerate() {
            if !self.types.contains(data.ty) || self.types.kind(data.ty) != TypeKind::Function {
                return Err(broken(index, "function does not have a function type"));
            }
            let param_count = self.types.param_types(data.ty).map_or(0, <[Type]>::len);
            if data.params.len() != param_count || !data.params.iter().all(value_ok) {
                return Err(broken(index, "function parameters do not match its type"));
            }
            if !data.blocks.first().iter().chain(&data.blocks.last()).all(block_ok) {
                return Err(broken(index, "function block list leaves the module"));
            }
        }

        if !self.globals.iter().chain(self.global_names.values()).all(value_ok)
            || !self.function_names.values().all(function_ok)
        {
            return Err(broken(0, "symbol table refers to a missing entry"));
        }

        for (index, data) in self.functions.iter().enumerate() {
            let function = Function::from_index(index);
            let blocks = walk(&data.blocks, self.blocks.len(), |b: Block| &self.blocks[b.index()].links)
                .ok_or_else(|| broken(index, "malformed block list"))?;
            for block in blocks {
                if self.blocks[block.index()].links.parent != Some(function) {
                    return Err(broken(block.index(), "block is listed under the wrong function"));
                }
                let insts = &self.blocks[block.index()].insts;
                let listed = walk(insts, self.values.len(), |v: Value| &self.values[v.index()].links)
                    .ok_or_else(|| broken(block.index(), "malformed instruction list"))?;
                for inst in listed {
                    let data = &self.values[inst.index()];
                    if data.links.parent != Some(block) || !data.is_instruction() {
                        return Err(broken(inst.index(), "value is listed under the wrong block"));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Follow a chain from its head; `None` unless it ends at its recorded tail
/// after exactly its recorded length
fn walk<'a, K, P: 'a, F>(chain: &Chain<K>, bound: usize, links: F) -> Option<Vec<K>>
where
    K: Copy + PartialEq + 'a,
    F: Fn(K) -> &'a Links<K, P>,
{
    let mut seen = Vec::new();
    let mut cursor = chain.first();
    while let Some(key) = cursor {
        if seen.len() >= bound.min(chain.len()) {
            return None;
        }
        seen.push(key);
        cursor = links(key).next;
    }
    (seen.len() == chain.len() && seen.last().copied() == chain.last()).then_some(seen)
}
