//! Lexical blocks and scoped symbol lookup.
//!
//! A block is one lexical scope: an address range, its symbols in
//! declaration order, and a link to the enclosing block. Blocks form
//! a tree rooted at the global block; lookup walks inward by pc and
//! outward by enclosing-scope link.

use crate::symbol::{Namespace, Symbol, SymbolId};

/// Stable handle into a [`BlockTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// One lexical scope.
#[derive(Debug, Clone)]
pub struct Block {
    /// First address of the scope
    pub start: u64,
    /// First address past the scope
    pub end: u64,
    /// The function symbol owning this block, for function bodies
    pub function: Option<SymbolId>,
    /// Symbols declared directly in this scope, in order
    pub symbols: Vec<SymbolId>,
    /// Enclosing scope; `None` only for the global block
    pub superblock: Option<BlockId>,
}

/// Arena of blocks plus the symbol arena they index into.
pub struct BlockTable {
    blocks: Vec<Block>,
    symbols: Vec<Symbol>,
    global: BlockId,
}

impl BlockTable {
    /// Create a table whose global block spans the whole address space.
    pub fn new() -> Self {
        let global = Block {
            start: 0,
            end: u64::MAX,
            function: None,
            symbols: Vec::new(),
            superblock: None,
        };
        Self { blocks: vec![global], symbols: Vec::new(), global: BlockId(0) }
    }

    pub fn global_block(&self) -> BlockId {
        self.global
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// Add a symbol to the arena and to `block`'s list.
    pub fn add_symbol(&mut self, block: BlockId, sym: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(sym);
        self.blocks[block.0 as usize].symbols.push(id);
        id
    }

    /// Add a nested block under `superblock`.
    pub fn add_block(
        &mut self,
        start: u64,
        end: u64,
        function: Option<SymbolId>,
        superblock: BlockId,
    ) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            start,
            end,
            function,
            symbols: Vec::new(),
            superblock: Some(superblock),
        });
        id
    }

    /// The innermost block whose range contains `pc`.
    ///
    /// The global block always matches, so this never fails; callers
    /// that care can compare against [`Self::global_block`].
    pub fn lookup_block(&self, pc: u64) -> BlockId {
        let mut best = self.global;
        let mut best_span = u64::MAX;
        for (i, b) in self.blocks.iter().enumerate() {
            if pc >= b.start && pc < b.end {
                let span = b.end - b.start;
                if span <= best_span {
                    best = BlockId(i as u32);
                    best_span = span;
                }
            }
        }
        best
    }

    /// Look up `name` starting at `block` and walking enclosing scopes
    /// outward, global block last.
    pub fn lookup_symbol(
        &self,
        name: &str,
        block: BlockId,
        namespace: Namespace,
    ) -> Option<SymbolId> {
        let mut current = Some(block);
        while let Some(id) = current {
            let b = self.block(id);
            for &sid in &b.symbols {
                let s = self.symbol(sid);
                if s.namespace == namespace && s.name == name {
                    return Some(sid);
                }
            }
            current = b.superblock;
        }
        None
    }

    /// The function symbol owning the innermost function block around `pc`.
    pub fn function_for_pc(&self, pc: u64) -> Option<SymbolId> {
        self.function_block_for_pc(pc)
            .and_then(|id| self.block(id).function)
    }

    /// The entry address of the function containing `pc`.
    pub fn function_start(&self, pc: u64) -> Option<u64> {
        self.function_block_for_pc(pc).map(|id| self.block(id).start)
    }

    /// The innermost block around `pc` that is a function body.
    fn function_block_for_pc(&self, pc: u64) -> Option<BlockId> {
        let mut current = Some(self.lookup_block(pc));
        while let Some(id) = current {
            let b = self.block(id);
            if b.function.is_some() {
                return Some(id);
            }
            current = b.superblock;
        }
        None
    }
}

impl Default for BlockTable {
    fn default() -> Self {
        Self::new()
    }
}
