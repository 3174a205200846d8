//! IR Instructions
//!
//! Defines all instruction types available in the IR. Operands are
//! non-owning [`Value`] handles; destinations are [`Block`] handles.

use log::{debug, trace};
use rcg_common::{CodegenError, Result};
use serde::{Deserialize, Serialize};
use crate::values::ValueKind;
use crate::{BinaryOp, Block, CastOp, FloatPredicate, Function, IntPredicate, Module, Type, Value};

/// IR Instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstKind {
    /// Binary operation: result = op lhs, rhs
    Binary {
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    },

    /// Integer comparison producing i1
    ICmp {
        pred: IntPredicate,
        lhs: Value,
        rhs: Value,
    },

    /// Float comparison producing i1
    FCmp {
        pred: FloatPredicate,
        lhs: Value,
        rhs: Value,
    },

    /// Allocate stack memory: result = alloca type, count
    Alloca {
        allocated: Type,
        count: Option<Value>,
    },

    /// Load from memory: result = load ptr
    Load {
        ptr: Value,
    },

    /// Store to memory: store value, ptr
    Store {
        value: Value,
        ptr: Value,
    },

    /// Get element pointer: result = getelementptr base, indices...
    GetElementPtr {
        base: Value,
        indices: Vec<Value>,
    },

    /// Unconditional branch: br label
    Branch {
        dest: Block,
    },

    /// Conditional branch: br cond, then, else
    CondBranch {
        cond: Value,
        then_dest: Block,
        else_dest: Block,
    },

    /// Multi-way branch on an integer
    Switch {
        value: Value,
        default: Block,
        cases: Vec<(Value, Block)>,
    },

    /// Phi node: result = phi [value, block], ...
    Phi {
        incoming: Vec<(Block, Value)>,
    },

    /// Function call: result = call func(args...)
    Call {
        callee: Function,
        args: Vec<Value>,
    },

    /// Return: ret value or ret void
    Return(Option<Value>),

    Unreachable,

    /// Conversion: result = op value to result type
    Cast {
        op: CastOp,
        value: Value,
    },

    ExtractValue {
        aggregate: Value,
        index: u32,
    },

    InsertValue {
        aggregate: Value,
        element: Value,
        index: u32,
    },

    ExtractElement {
        vector: Value,
        index: Value,
    },

    InsertElement {
        vector: Value,
        element: Value,
        index: Value,
    },

    ShuffleVector {
        lhs: Value,
        rhs: Value,
        mask: Value,
    },

    /// Select (ternary): result = select cond, then_value, else_value
    Select {
        cond: Value,
        then_value: Value,
        else_value: Value,
    },
}

impl InstKind {
    /// Mnemonic used by the printer
    pub fn opcode_name(&self) -> &'static str {
        match self {
            InstKind::Binary { op, .. } => op.name(),
            InstKind::ICmp { .. } => "icmp",
            InstKind::FCmp { .. } => "fcmp",
            InstKind::Alloca { .. } => "alloca",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::GetElementPtr { .. } => "getelementptr",
            InstKind::Branch { .. } | InstKind::CondBranch { .. } => "br",
            InstKind::Switch { .. } => "switch",
            InstKind::Phi { .. } => "phi",
            InstKind::Call { .. } => "call",
            InstKind::Return(_) => "ret",
            InstKind::Unreachable => "unreachable",
            InstKind::Cast { op, .. } => op.name(),
            InstKind::ExtractValue { .. } => "extractvalue",
            InstKind::InsertValue { .. } => "insertvalue",
            InstKind::ExtractElement { .. } => "extractelement",
            InstKind::InsertElement { .. } => "insertelement",
            InstKind::ShuffleVector { .. } => "shufflevector",
            InstKind::Select { .. } => "select",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Branch { .. }
                | InstKind::CondBranch { .. }
                | InstKind::Switch { .. }
                | InstKind::Return(_)
                | InstKind::Unreachable
        )
    }

    /// Instructions that must be kept even when their result is unused
    pub fn has_side_effects(&self) -> bool {
        match self {
            InstKind::Store { .. } | InstKind::Call { .. } => true,
            // division by zero traps
            InstKind::Binary { op, .. } => op.is_division(),
            other => other.is_terminator(),
        }
    }

    /// Value operands in textual order
    pub fn operands(&self) -> Vec<Value> {
        match self {
            InstKind::Binary { lhs, rhs, .. }
            | InstKind::ICmp { lhs, rhs, .. }
            | InstKind::FCmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Alloca { count, .. } => count.iter().copied().collect(),
            InstKind::Load { ptr } => vec![*ptr],
            InstKind::Store { value, ptr } => vec![*value, *ptr],
            InstKind::GetElementPtr { base, indices } => {
                std::iter::once(*base).chain(indices.iter().copied()).collect()
            }
            InstKind::Branch { .. } | InstKind::Unreachable => Vec::new(),
            InstKind::CondBranch { cond, .. } => vec![*cond],
            InstKind::Switch { value, cases, .. } => {
                std::iter::once(*value).chain(cases.iter().map(|(key, _)| *key)).collect()
            }
            InstKind::Phi { incoming } => incoming.iter().map(|(_, value)| *value).collect(),
            InstKind::Call { args, .. } => args.clone(),
            InstKind::Return(value) => value.iter().copied().collect(),
            InstKind::Cast { value, .. } => vec![*value],
            InstKind::ExtractValue { aggregate, .. } => vec![*aggregate],
            InstKind::InsertValue { aggregate, element, .. } => vec![*aggregate, *element],
            InstKind::ExtractElement { vector, index } => vec![*vector, *index],
            InstKind::InsertElement { vector, element, index } => vec![*vector, *element, *index],
            InstKind::ShuffleVector { lhs, rhs, mask } => vec![*lhs, *rhs, *mask],
            InstKind::Select { cond, then_value, else_value } => {
                vec![*cond, *then_value, *else_value]
            }
        }
    }

    /// Blocks control may transfer to
    pub fn successors(&self) -> Vec<Block> {
        match self {
            InstKind::Branch { dest } => vec![*dest],
            InstKind::CondBranch { then_dest, else_dest, .. } => vec![*then_dest, *else_dest],
            InstKind::Switch { default, cases, .. } => {
                std::iter::once(*default).chain(cases.iter().map(|(_, dest)| *dest)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Rewrite every use of `old` as `new`; returns the number of rewritten slots
    pub(crate) fn replace_operand(&mut self, old: Value, new: Value) -> usize {
        let mut count = 0;
        let mut swap = |slot: &mut Value| {
            if *slot == old {
                *slot = new;
                count += 1;
            }
        };
        match self {
            InstKind::Binary { lhs, rhs, .. }
            | InstKind::ICmp { lhs, rhs, .. }
            | InstKind::FCmp { lhs, rhs, .. } => {
                swap(lhs);
                swap(rhs);
            }
            InstKind::Alloca { count: Some(n), .. } => swap(n),
            InstKind::Alloca { count: None, .. } => {}
            InstKind::Load { ptr } => swap(ptr),
            InstKind::Store { value, ptr } => {
                swap(value);
                swap(ptr);
            }
            InstKind::GetElementPtr { base, indices } => {
                swap(base);
                indices.iter_mut().for_each(&mut swap);
            }
            InstKind::Branch { .. } | InstKind::Unreachable => {}
            InstKind::CondBranch { cond, .. } => swap(cond),
            InstKind::Switch { value, cases, .. } => {
                swap(value);
                cases.iter_mut().for_each(|(key, _)| swap(key));
            }
            InstKind::Phi { incoming } => incoming.iter_mut().for_each(|(_, value)| swap(value)),
            InstKind::Call { args, .. } => args.iter_mut().for_each(&mut swap),
            InstKind::Return(Some(value)) => swap(value),
            InstKind::Return(None) => {}
            InstKind::Cast { value, .. } => swap(value),
            InstKind::ExtractValue { aggregate, .. } => swap(aggregate),
            InstKind::InsertValue { aggregate, element, .. } => {
                swap(aggregate);
                swap(element);
            }
            InstKind::ExtractElement { vector, index } => {
                swap(vector);
                swap(index);
            }
            InstKind::InsertElement { vector, element, index } => {
                swap(vector);
                swap(element);
                swap(index);
            }
            InstKind::ShuffleVector { lhs, rhs, mask } => {
                swap(lhs);
                swap(rhs);
                swap(mask);
            }
            InstKind::Select { cond, then_value, else_value } => {
                swap(cond);
                swap(then_value);
                swap(else_value);
            }
        }
        count
    }
}

impl Module {
    /// The instruction behind a value, if it is one
    pub fn instruction(&self, value: Value) -> Option<&InstKind> {
        self.values[value.index()].as_instruction()
    }

    pub fn is_instruction(&self, value: Value) -> bool {
        self.values[value.index()].is_instruction()
    }

    /// Block holding the instruction; `None` when detached
    pub fn instruction_parent(&self, inst: Value) -> Option<Block> {
        self.values[inst.index()].links.parent
    }

    pub fn next_instruction(&self, inst: Value) -> Option<Value> {
        self.values[inst.index()].links.next
    }

    pub fn previous_instruction(&self, inst: Value) -> Option<Value> {
        self.values[inst.index()].links.prev
    }

    /// Create an instruction and link it into `block`, before `before` or at the tail
    pub(crate) fn insert_instruction(
        &mut self,
        block: Block,
        before: Option<Value>,
        ty: Type,
        kind: InstKind,
    ) -> Value {
        trace!("Emitting {} into block {}", kind.opcode_name(), block.index());
        let inst = self.push_value(ty, ValueKind::Instruction(kind));
        self.link_instruction(block, before, inst);
        inst
    }

    fn link_instruction(&mut self, block: Block, before: Option<Value>, inst: Value) {
        let chain = &mut self.blocks[block.index()].insts;
        match before {
            Some(anchor) => chain.insert_before(&mut self.values, block, anchor, inst),
            None => chain.push_back(&mut self.values, block, inst),
        }
    }

    fn detached_instruction(&self, inst: Value) -> Result<()> {
        if !self.is_instruction(inst) {
            return Err(CodegenError::argument(format!("value {} is not an instruction", inst.index())));
        }
        if self.instruction_parent(inst).is_some() {
            return Err(CodegenError::invalid_state(format!(
                "instruction {} already belongs to a block",
                inst.index()
            )));
        }
        Ok(())
    }

    /// Link a detached instruction at the end of `block`
    pub fn append_instruction(&mut self, block: Block, inst: Value) -> Result<()> {
        self.detached_instruction(inst)?;
        self.link_instruction(block, None, inst);
        Ok(())
    }

    /// Link a detached instruction right before `anchor`
    pub fn insert_instruction_before(&mut self, anchor: Value, inst: Value) -> Result<()> {
        self.detached_instruction(inst)?;
        let block = self.instruction_parent(anchor).ok_or_else(|| {
            CodegenError::invalid_state("anchor instruction is not in a block")
        })?;
        self.link_instruction(block, Some(anchor), inst);
        Ok(())
    }

    /// Unlink an instruction from its block, keeping it alive for re-insertion
    pub fn detach_instruction(&mut self, inst: Value) {
        if let Some(block) = self.instruction_parent(inst) {
            self.blocks[block.index()].insts.unlink(&mut self.values, inst);
        }
    }

    /// Remove an instruction whose result is no longer used
    pub fn erase_instruction(&mut self, inst: Value) -> Result<()> {
        if let Some(&user) = self.users(inst).first() {
            return Err(CodegenError::invalid_state(format!(
                "cannot erase instruction {}: still used by {}",
                inst.index(),
                user.index()
            )));
        }
        self.detach_instruction(inst);
        Ok(())
    }

    /// Linked instructions of live functions that take `value` as an operand
    pub fn users(&self, value: Value) -> Vec<Value> {
        self.functions()
            .flat_map(|function| self.blocks(function))
            .flat_map(|block| self.instructions(block))
            .filter(|&inst| {
                self.instruction(inst)
                    .is_some_and(|kind| kind.operands().contains(&value))
            })
            .collect()
    }

    /// Rewrite every operand slot holding `old` to hold `new`; returns the slot count
    pub fn replace_all_uses(&mut self, old: Value, new: Value) -> Result<usize> {
        let (old_ty, new_ty) = (self.type_of(old), self.type_of(new));
        if old_ty != new_ty {
            return Err(CodegenError::type_mismatch(
                self.types.display(old_ty).to_string(),
                self.types.display(new_ty).to_string(),
            ));
        }
        let mut replaced = 0;
        for data in &mut self.values {
            if let ValueKind::Instruction(kind) = &mut data.kind {
                replaced += kind.replace_operand(old, new);
            }
        }
        debug!("Replaced {replaced} uses of value {} with {}", old.index(), new.index());
        Ok(replaced)
    }
}
