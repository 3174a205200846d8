//! Basic Block Management
//!
//! Blocks are linked in program order inside their function and own an
//! ordered chain of instructions.

use log::debug;
use serde::{Deserialize, Serialize};
use crate::graph::{Chain, Links, NodeStore};
use crate::{Function, InstKind, Module, Value};

/// Handle to a basic block owned by a [`Module`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Block(u32);

impl Block {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic Block - a sequence of instructions with a single entry and exit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub(crate) name: Option<String>,
    pub(crate) links: Links<Block, Function>,
    pub(crate) insts: Chain<Value>,
}

impl NodeStore<Block, Function> for Vec<BlockData> {
    fn links(&self, key: Block) -> &Links<Block, Function> {
        &self[key.index()].links
    }

    fn links_mut(&mut self, key: Block) -> &mut Links<Block, Function> {
        &mut self[key.index()].links
    }
}

/// Lazy walk over the instructions of a block, in program order
pub struct Instructions<'m> {
    module: &'m Module,
    next: Option<Value>,
}

impl Iterator for Instructions<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let current = self.next?;
        self.next = self.module.values[current.index()].links.next;
        Some(current)
    }
}

impl Module {
    fn new_block(&mut self, name: &str) -> Block {
        let block = Block(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            name: (!name.is_empty()).then(|| name.to_string()),
            links: Links::default(),
            insts: Chain::default(),
        });
        block
    }

    /// Append a new, empty block at the end of `function`
    pub fn append_block(&mut self, function: Function, name: &str) -> Block {
        let block = self.new_block(name);
        self.functions[function.index()]
            .blocks
            .push_back(&mut self.blocks, function, block);
        debug!("Appended block {} to '{}'", block.index(), self.function_name(function));
        block
    }

    /// Insert a new, empty block right before `anchor` in its function
    pub fn insert_block_before(&mut self, anchor: Block, name: &str) -> Option<Block> {
        let function = self.block_parent(anchor)?;
        let block = self.new_block(name);
        self.functions[function.index()]
            .blocks
            .insert_before(&mut self.blocks, function, anchor, block);
        Some(block)
    }

    /// Unlink a block from its function and detach all of its instructions
    ///
    /// Branches and phi nodes elsewhere that mention the block must be
    /// rewritten or removed by the caller.
    pub fn remove_block(&mut self, block: Block) {
        let instructions: Vec<Value> = self.instructions(block).collect();
        let chain = &mut self.blocks[block.index()].insts;
        for inst in instructions {
            chain.unlink(&mut self.values, inst);
        }
        if let Some(function) = self.block_parent(block) {
            self.functions[function.index()].blocks.unlink(&mut self.blocks, block);
            debug!("Removed block {} from '{}'", block.index(), self.function_name(function));
        }
    }

    pub fn block_name(&self, block: Block) -> Option<&str> {
        self.blocks[block.index()].name.as_deref()
    }

    pub fn set_block_name(&mut self, block: Block, name: &str) {
        self.blocks[block.index()].name = (!name.is_empty()).then(|| name.to_string());
    }

    /// Function the block belongs to; absent once removed
    pub fn block_parent(&self, block: Block) -> Option<Function> {
        self.blocks[block.index()].links.parent
    }

    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block.index()].links.next
    }

    pub fn previous_block(&self, block: Block) -> Option<Block> {
        self.blocks[block.index()].links.prev
    }

    pub fn first_instruction(&self, block: Block) -> Option<Value> {
        self.blocks[block.index()].insts.first()
    }

    pub fn last_instruction(&self, block: Block) -> Option<Value> {
        self.blocks[block.index()].insts.last()
    }

    pub fn instruction_count(&self, block: Block) -> usize {
        self.blocks[block.index()].insts.len()
    }

    /// Restartable, lazy enumeration of the block's instructions
    pub fn instructions(&self, block: Block) -> Instructions<'_> {
        Instructions {
            module: self,
            next: self.first_instruction(block),
        }
    }

    /// The last instruction if it ends control flow
    pub fn terminator(&self, block: Block) -> Option<Value> {
        self.last_instruction(block)
            .filter(|&inst| self.instruction(inst).is_some_and(InstKind::is_terminator))
    }

    pub fn has_terminator(&self, block: Block) -> bool {
        self.terminator(block).is_some()
    }

    /// Blocks the terminator may branch to
    pub fn successors(&self, block: Block) -> Vec<Block> {
        self.terminator(block)
            .and_then(|term| self.instruction(term))
            .map(InstKind::successors)
            .unwrap_or_default()
    }
}
