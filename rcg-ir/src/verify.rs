//! Structural verification
//!
//! The builder only checks operand types. Whole-function rules (every block
//! terminated, phis first, references staying inside one function) are
//! checked here before a module is optimized or executed.

use log::debug;
use rcg_common::{CodegenError, Result};
use std::collections::{BTreeSet, HashMap};
use crate::values::ValueKind;
use crate::{Block, Function, InstKind, Module, Value};

impl Module {
    /// Label used for a block in diagnostics and printed IR
    pub fn block_label(&self, block: Block) -> String {
        match self.block_name(block) {
            Some(name) => name.to_string(),
            None => format!("bb{}", block.index()),
        }
    }

    /// Check every defined function
    pub fn verify(&self) -> Result<()> {
        for function in self.functions() {
            self.verify_function(function)?;
        }
        debug!("Module '{}' verified", self.name);
        Ok(())
    }

    pub fn verify_function(&self, function: Function) -> Result<()> {
        let fail = |message: String| CodegenError::verification(self.function_name(function), message);

        let mut predecessors: HashMap<Block, BTreeSet<Block>> = HashMap::new();
        for block in self.blocks(function) {
            for successor in self.successors(block) {
                if self.block_parent(successor) != Some(function) {
                    return Err(fail(format!(
                        "block {} branches to {} outside the function",
                        self.block_label(block),
                        self.block_label(successor)
                    )));
                }
                predecessors.entry(successor).or_default().insert(block);
            }
        }

        for block in self.blocks(function) {
            let label = self.block_label(block);
            let last = self
                .last_instruction(block)
                .ok_or_else(|| fail(format!("block {label} is empty")))?;

            let mut phis_allowed = true;
            for inst in self.instructions(block) {
                let Some(kind) = self.instruction(inst) else {
                    return Err(fail(format!("block {label} holds a non-instruction")));
                };
                if kind.is_terminator() != (inst == last) {
                    return Err(fail(if inst == last {
                        format!("block {label} does not end with a terminator")
                    } else {
                        format!("block {label} has a terminator before its end")
                    }));
                }
                match kind {
                    InstKind::Phi { incoming } => {
                        if !phis_allowed {
                            return Err(fail(format!("phi after a non-phi in block {label}")));
                        }
                        let sources: BTreeSet<Block> = incoming.iter().map(|(from, _)| *from).collect();
                        let expected = predecessors.get(&block).cloned().unwrap_or_default();
                        if sources != expected || sources.len() != incoming.len() {
                            return Err(fail(format!(
                                "phi in block {label} does not list each predecessor exactly once"
                            )));
                        }
                    }
                    _ => phis_allowed = false,
                }
                if let InstKind::Call { callee, .. } = kind {
                    if self.is_removed(*callee) {
                        return Err(fail(format!("block {label} calls a removed function")));
                    }
                }
                for operand in kind.operands() {
                    self.verify_operand(function, operand)
                        .map_err(|message| fail(format!("in block {label}: {message}")))?;
                }
            }
        }
        Ok(())
    }

    fn verify_operand(&self, function: Function, operand: Value) -> std::result::Result<(), String> {
        match self.value(operand).kind() {
            ValueKind::Argument { function: owner, .. } if *owner != function => {
                Err(format!("argument of '{}' used here", self.function_name(*owner)))
            }
            ValueKind::Instruction(_) => {
                let owner = self
                    .instruction_parent(operand)
                    .and_then(|block| self.block_parent(block));
                if owner == Some(function) {
                    Ok(())
                } else {
                    Err(format!("operand {} is not an instruction of this function", operand.index()))
                }
            }
            ValueKind::Global(_) if self.global_names.values().all(|&g| g != operand) => {
                Err(format!("operand {} refers to a removed global", operand.index()))
            }
            _ => Ok(()),
        }
    }
}
