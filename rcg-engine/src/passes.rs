//! Module-level transformations
//!
//! A [`PassManager`] holds passes in the order they were added and runs
//! them over a verified module, reporting whether anything changed.

use log::{debug, info};
use rcg_common::{CodegenError, Result};
use rcg_ir::{Block, Function, InstKind, Module, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::eval::{int_binary, int_compare};

/// Available transformations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pass {
    /// Remove functions and globals unreachable from externally visible definitions
    GlobalDce,
    /// Remove unused side-effect-free instructions
    Dce,
    /// Remove blocks unreachable from the entry block
    UnreachableBlockElim,
    /// Fold integer arithmetic and comparisons over constants
    ConstProp,
}

impl Pass {
    pub const ALL: [Pass; 4] = [Pass::GlobalDce, Pass::Dce, Pass::UnreachableBlockElim, Pass::ConstProp];

    pub fn name(self) -> &'static str {
        match self {
            Pass::GlobalDce => "gdce",
            Pass::Dce => "dce",
            Pass::UnreachableBlockElim => "unreachable-block-elim",
            Pass::ConstProp => "constprop",
        }
    }

    /// Apply this pass once; returns whether the module changed
    pub fn run(self, module: &mut Module) -> Result<bool> {
        match self {
            Pass::GlobalDce => global_dce(module),
            Pass::Dce => dce(module),
            Pass::UnreachableBlockElim => unreachable_block_elim(module),
            Pass::ConstProp => const_prop(module),
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Pass {
    type Err = CodegenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Pass::ALL
            .into_iter()
            .find(|pass| pass.name() == s)
            .ok_or_else(|| CodegenError::argument(format!("unknown pass '{s}'")))
    }
}

/// Ordered list of passes to run over a module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassManager {
    passes: Vec<Pass>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pass: Pass) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Add a pass by its command-line name
    pub fn add_named(&mut self, name: &str) -> Result<&mut Self> {
        let pass = name.parse()?;
        Ok(self.add(pass))
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Verify `module`, then run every pass in order
    pub fn run(&self, module: &mut Module) -> Result<bool> {
        module.verify()?;
        let mut changed = false;
        for &pass in &self.passes {
            info!("Running pass {pass} on '{}'", module.name());
            let pass_changed = pass
                .run(module)
                .map_err(|err| CodegenError::pass(pass.name(), err.to_string()))?;
            debug!("Pass {pass} {}", if pass_changed { "changed the module" } else { "made no changes" });
            changed |= pass_changed;
        }
        Ok(changed)
    }
}

fn defined_functions(module: &Module) -> Vec<Function> {
    module.functions().filter(|&f| !module.is_declaration(f)).collect()
}

fn all_instructions(module: &Module, function: Function) -> Vec<Value> {
    module
        .blocks(function)
        .flat_map(|block| module.instructions(block))
        .collect()
}

#[derive(Default)]
struct Liveness {
    functions: HashSet<Function>,
    globals: HashSet<Value>,
    pending: Vec<Function>,
}

impl Liveness {
    fn function(&mut self, function: Function) {
        if self.functions.insert(function) {
            self.pending.push(function);
        }
    }

    /// Mark the globals reachable through a constant operand
    fn value(&mut self, module: &Module, value: Value) {
        match module.value(value).kind() {
            ValueKind::Global(_) => {
                if self.globals.insert(value) {
                    for operand in module.operands(value) {
                        self.value(module, operand);
                    }
                }
            }
            ValueKind::ConstAggregate(elements) => {
                for &element in elements {
                    self.value(module, element);
                }
            }
            _ => {}
        }
    }
}

fn global_dce(module: &mut Module) -> Result<bool> {
    let mut live = Liveness::default();
    for function in module.functions() {
        if !module.is_declaration(function) && module.linkage(function).is_externally_visible() {
            live.function(function);
        }
    }
    for global in module.globals() {
        let visible = module.global_linkage(global)?.is_externally_visible();
        if visible && module.initializer(global)?.is_some() {
            live.value(module, global);
        }
    }

    while let Some(function) = live.pending.pop() {
        for inst in all_instructions(module, function) {
            let Some(kind) = module.instruction(inst) else { continue };
            if let InstKind::Call { callee, .. } = kind {
                live.function(*callee);
            }
            for operand in kind.operands() {
                live.value(module, operand);
            }
        }
    }

    let dead_functions: Vec<Function> =
        module.functions().filter(|f| !live.functions.contains(f)).collect();
    let dead_globals: Vec<Value> = module.globals().filter(|g| !live.globals.contains(g)).collect();

    // dead functions may call each other, so empty every body before removal
    for &function in &dead_functions {
        let blocks: Vec<Block> = module.blocks(function).collect();
        for block in blocks {
            module.remove_block(block);
        }
    }
    for &function in &dead_functions {
        debug!("gdce: removing function '{}'", module.function_name(function));
        module.remove_function(function)?;
    }
    for &global in &dead_globals {
        module.remove_global(global)?;
    }
    Ok(!dead_functions.is_empty() || !dead_globals.is_empty())
}

fn dce(module: &mut Module) -> Result<bool> {
    let mut changed = false;
    loop {
        let functions = defined_functions(module);
        let instructions: Vec<Value> = functions
            .iter()
            .flat_map(|&function| all_instructions(module, function))
            .collect();
        let used: HashSet<Value> = instructions
            .iter()
            .filter_map(|&inst| module.instruction(inst))
            .flat_map(InstKind::operands)
            .collect();
        let dead: Vec<Value> = instructions
            .into_iter()
            .filter(|inst| !used.contains(inst))
            .filter(|&inst| module.instruction(inst).is_some_and(|kind| !kind.has_side_effects()))
            .collect();
        if dead.is_empty() {
            return Ok(changed);
        }
        for inst in dead {
            module.erase_instruction(inst)?;
        }
        changed = true;
    }
}

fn unreachable_block_elim(module: &mut Module) -> Result<bool> {
    let mut changed = false;
    for function in defined_functions(module) {
        let Some(entry) = module.entry_block(function) else { continue };
        let mut reachable = HashSet::from([entry]);
        let mut stack = vec![entry];
        while let Some(block) = stack.pop() {
            for next in module.successors(block) {
                if reachable.insert(next) {
                    stack.push(next);
                }
            }
        }

        let dead: Vec<Block> = module.blocks(function).filter(|b| !reachable.contains(b)).collect();
        if dead.is_empty() {
            continue;
        }
        let phis: Vec<Value> = module
            .blocks(function)
            .filter(|b| reachable.contains(b))
            .flat_map(|block| module.instructions(block))
            .filter(|&inst| matches!(module.instruction(inst), Some(InstKind::Phi { .. })))
            .collect();
        for &block in &dead {
            for &phi in &phis {
                module.remove_incoming(phi, block)?;
            }
            debug!(
                "unreachable-block-elim: removing '{}' from '{}'",
                module.block_label(block),
                module.function_name(function)
            );
            module.remove_block(block);
        }
        changed = true;
    }
    Ok(changed)
}

/// Constant result of an instruction whose operands are integer constants
fn fold(module: &Module, inst: Value) -> Option<u64> {
    match module.instruction(inst)? {
        InstKind::Binary { op, lhs, rhs } if !op.is_float() => {
            let bits = module.types.int_width(module.type_of(inst))?;
            let (a, b) = (module.const_int_value(*lhs)?, module.const_int_value(*rhs)?);
            // a trapping division is left for run time
            int_binary(*op, bits, a, b).ok()
        }
        InstKind::ICmp { pred, lhs, rhs } => {
            let bits = module.types.int_width(module.type_of(*lhs))?;
            let (a, b) = (module.const_int_value(*lhs)?, module.const_int_value(*rhs)?);
            Some(u64::from(int_compare(*pred, bits, a, b)))
        }
        _ => None,
    }
}

fn const_prop(module: &mut Module) -> Result<bool> {
    let mut changed = false;
    loop {
        let folded: Vec<(Value, u64)> = defined_functions(module)
            .into_iter()
            .flat_map(|function| all_instructions(module, function))
            .filter_map(|inst| fold(module, inst).map(|value| (inst, value)))
            .collect();
        if folded.is_empty() {
            return Ok(changed);
        }
        for (inst, value) in folded {
            let ty = module.type_of(inst);
            let constant = module.const_uint(ty, value)?;
            module.replace_all_uses(inst, constant)?;
            module.erase_instruction(inst)?;
        }
        changed = true;
    }
}
