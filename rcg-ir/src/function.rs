//! Function Definitions
//!
//! Functions are declared on a [`Module`] by name and type. A function
//! without blocks is a declaration; appending the first block turns it
//! into a definition.

use log::debug;
use rcg_common::{CodegenError, Result};
use serde::{Deserialize, Serialize};
use crate::graph::Chain;
use crate::values::ValueKind;
use crate::{Block, InstKind, Linkage, Module, Type, Value};

/// Handle to a function owned by a [`Module`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Function(u32);

impl Function {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Function(index as u32)
    }
}

/// Function in IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionData {
    pub(crate) name: String,
    /// Function type: return type, parameter types and the var-arg flag
    pub(crate) ty: Type,
    pub(crate) params: Vec<Value>,
    pub(crate) linkage: Linkage,
    pub(crate) blocks: Chain<Block>,
    pub(crate) removed: bool,
}

/// Lazy walk over the blocks of a function, in layout order
pub struct Blocks<'m> {
    module: &'m Module,
    next: Option<Block>,
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let current = self.next?;
        self.next = self.module.next_block(current);
        Some(current)
    }
}

impl Module {
    /// Declare `name` with the given signature, or return the existing
    /// function of that name when its type is identical
    pub fn declare_function(
        &mut self,
        name: &str,
        return_type: Type,
        params: &[Type],
        var_arg: bool,
    ) -> Result<Function> {
        let ty = self.types.function(return_type, params, var_arg)?;
        self.add_function(name, ty)
    }

    /// Same as [`Module::declare_function`] for an already built function type
    pub fn add_function(&mut self, name: &str, ty: Type) -> Result<Function> {
        let param_types = self
            .types
            .param_types(ty)
            .ok_or_else(|| {
                CodegenError::type_error(format!(
                    "'{name}' needs a function type, found {}",
                    self.types.display(ty)
                ))
            })?
            .to_vec();

        if let Some(&existing) = self.function_names.get(name) {
            let existing_type = self.functions[existing.index()].ty;
            if existing_type == ty {
                return Ok(existing);
            }
            return Err(CodegenError::type_conflict(
                name,
                format!(
                    "function already declared as {}, requested {}",
                    self.types.display(existing_type),
                    self.types.display(ty)
                ),
            ));
        }
        if name.is_empty() {
            return Err(CodegenError::argument("function name must not be empty"));
        }

        let function = Function(self.functions.len() as u32);
        let params = param_types
            .iter()
            .enumerate()
            .map(|(index, &param_ty)| {
                self.push_value(param_ty, ValueKind::Argument { function, index })
            })
            .collect();
        self.functions.push(FunctionData {
            name: name.to_string(),
            ty,
            params,
            linkage: Linkage::External,
            blocks: Chain::default(),
            removed: false,
        });
        self.function_names.insert(name.to_string(), function);
        debug!("Declared function '{name}' of type {}", self.types.display(ty));
        Ok(function)
    }

    pub fn function(&self, name: &str) -> Option<Function> {
        self.function_names.get(name).copied()
    }

    /// Live functions in declaration order
    pub fn functions(&self) -> impl Iterator<Item = Function> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, data)| !data.removed)
            .map(|(index, _)| Function(index as u32))
    }

    pub fn function_count(&self) -> usize {
        self.function_names.len()
    }

    pub(crate) fn function_data(&self, function: Function) -> &FunctionData {
        &self.functions[function.index()]
    }

    pub fn function_name(&self, function: Function) -> &str {
        &self.function_data(function).name
    }

    pub fn function_type(&self, function: Function) -> Type {
        self.function_data(function).ty
    }

    pub fn return_type(&self, function: Function) -> Type {
        let ty = self.function_type(function);
        self.types.return_type(ty).unwrap_or(ty)
    }

    pub fn is_var_arg(&self, function: Function) -> bool {
        self.types.is_var_arg(self.function_type(function))
    }

    pub fn params(&self, function: Function) -> &[Value] {
        &self.function_data(function).params
    }

    pub fn param_count(&self, function: Function) -> usize {
        self.params(function).len()
    }

    /// Parameter by position; negative indices count from the end and
    /// anything out of range is `None`
    pub fn param(&self, function: Function, index: isize) -> Option<Value> {
        let params = self.params(function);
        let position = if index < 0 {
            params.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        params.get(position).copied()
    }

    /// Name the leading parameters in order; extra names are ignored
    pub fn set_param_names(&mut self, function: Function, names: &[&str]) {
        let params = self.functions[function.index()].params.clone();
        for (param, name) in params.into_iter().zip(names) {
            self.values[param.index()].name = (!name.is_empty()).then(|| name.to_string());
        }
    }

    pub fn linkage(&self, function: Function) -> Linkage {
        self.function_data(function).linkage
    }

    pub fn set_linkage(&mut self, function: Function, linkage: Linkage) {
        self.functions[function.index()].linkage = linkage;
    }

    /// No body: the symbol is resolved outside the module
    pub fn is_declaration(&self, function: Function) -> bool {
        self.function_data(function).blocks.len() == 0
    }

    pub fn is_removed(&self, function: Function) -> bool {
        self.function_data(function).removed
    }

    pub fn first_block(&self, function: Function) -> Option<Block> {
        self.function_data(function).blocks.first()
    }

    pub fn last_block(&self, function: Function) -> Option<Block> {
        self.function_data(function).blocks.last()
    }

    /// The block control enters on a call
    pub fn entry_block(&self, function: Function) -> Option<Block> {
        self.first_block(function)
    }

    pub fn block_count(&self, function: Function) -> usize {
        self.function_data(function).blocks.len()
    }

    /// Restartable, lazy enumeration of the function's blocks
    pub fn blocks(&self, function: Function) -> Blocks<'_> {
        Blocks {
            module: self,
            next: self.first_block(function),
        }
    }

    /// Functions whose bodies contain a call to `callee`
    pub fn callers(&self, callee: Function) -> Vec<Function> {
        self.functions()
            .filter(|&caller| {
                self.blocks(caller).any(|block| {
                    self.instructions(block).any(|inst| {
                        matches!(self.instruction(inst), Some(InstKind::Call { callee: c, .. }) if *c == callee)
                    })
                })
            })
            .collect()
    }

    /// Delete a function; fails while another live function still calls it
    pub fn remove_function(&mut self, function: Function) -> Result<()> {
        if self.is_removed(function) {
            return Ok(());
        }
        let callers: Vec<Function> = self
            .callers(function)
            .into_iter()
            .filter(|&caller| caller != function)
            .collect();
        if let Some(&caller) = callers.first() {
            return Err(CodegenError::invalid_state(format!(
                "'{}' is still called from '{}'",
                self.function_name(function),
                self.function_name(caller)
            )));
        }

        let blocks: Vec<Block> = self.blocks(function).collect();
        for block in blocks {
            self.remove_block(block);
        }
        let data = &mut self.functions[function.index()];
        data.removed = true;
        let name = data.name.clone();
        self.function_names.remove(&name);
        debug!("Removed function '{name}'");
        Ok(())
    }
}
