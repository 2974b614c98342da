use crate::analysis::Error;
use crate::cil::{InsnId, MethodBody};
use std::collections::HashSet;

/// Identifier of a basic block, numbered in program order from 0
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct BlockId(pub usize);

/// Assignment of every instruction of a body to a basic block
///
/// A block ends after any instruction that can transfer control somewhere other than the next
/// instruction (branches, returns, throws), and a new block starts at every branch target and
/// exception region boundary.
#[derive(Clone, Debug)]
pub struct BlockPartition {
    /// Block of each instruction, indexed by instruction
    blocks: Vec<BlockId>,

    /// First instruction of each block, indexed by block
    block_starts: Vec<InsnId>,
}

/// Partition a body into basic blocks in a single linear pass
pub fn partition_blocks(body: &MethodBody<'_>) -> BlockPartition {
    let mut targets: HashSet<InsnId> = HashSet::new();
    for (_, instruction) in body.iter() {
        targets.extend(instruction.targets().iter().copied());
    }
    for region in body.exception_regions() {
        targets.extend(region.boundaries());
    }

    let mut blocks = Vec::with_capacity(body.len());
    let mut block_starts = vec![];
    let mut previous_ends_block = false;

    for (id, instruction) in body.iter() {
        if block_starts.is_empty() || previous_ends_block || targets.contains(&id) {
            block_starts.push(id);
        }
        blocks.push(BlockId(block_starts.len() - 1));
        previous_ends_block = instruction.flow_control().ends_block();
    }

    BlockPartition {
        blocks,
        block_starts,
    }
}

impl BlockPartition {
    pub fn block_of(&self, id: InsnId) -> BlockId {
        self.blocks[id.index()]
    }

    pub fn same_block(&self, first: InsnId, second: InsnId) -> bool {
        self.block_of(first) == self.block_of(second)
    }

    /// Check that splicing between two instructions doesn't cross a block boundary
    pub fn ensure_same_block(&self, first: InsnId, second: InsnId) -> Result<(), Error> {
        if self.same_block(first, second) {
            Ok(())
        } else {
            Err(Error::CrossesBlockBoundary { first, second })
        }
    }

    pub fn block_count(&self) -> usize {
        self.block_starts.len()
    }

    /// First instruction of each block, in program order
    pub fn block_starts(&self) -> &[InsnId] {
        &self.block_starts
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cil::{parse_listing, Metadata, MetadataArenas};

    fn blocks_of(source: &str) -> Vec<usize> {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);
        let listing = parse_listing(&metadata, source).unwrap();
        let body = &listing.methods[0];
        let partition = partition_blocks(body);
        body.ids().map(|id| partition.block_of(id).0).collect()
    }

    #[test]
    fn control_transfers_split_blocks() {
        let blocks = blocks_of(
            r#"
            .method Test::Blocks
                ldarg 0
                brtrue target
                ldc.i4 1
                throw
            target:
                ldc.i4 2
                pop
                ret
                nop
            .end
            "#,
        );
        assert_eq!(blocks, vec![0, 0, 1, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn region_boundaries_split_blocks() {
        let blocks = blocks_of(
            r#"
            .method Test::Regions
                ldc.i4 1
            t:  stloc 0
                leave out
            h:  endfinally
            out:
                ret
            .try t h finally h out
            .end
            "#,
        );
        assert_eq!(blocks, vec![0, 1, 1, 2, 3]);
    }

    #[test]
    fn backward_target_starts_a_block() {
        let arenas = MetadataArenas::new();
        let metadata = Metadata::new(&arenas);
        let listing = parse_listing(
            &metadata,
            r#"
            .method Test::Loop
                ldc.i4 10
                stloc 0
            head:
                ldloc 0
                ldc.i4 1
                sub
                dup
                stloc 0
                brtrue head
                ret
            .end
            "#,
        )
        .unwrap();
        let body = &listing.methods[0];
        let partition = partition_blocks(body);

        assert_eq!(partition.block_count(), 3);
        assert_eq!(partition.block_starts(), &[InsnId(0), InsnId(2), InsnId(8)]);
        assert!(partition.same_block(InsnId(2), InsnId(7)));
        assert_eq!(partition.ensure_same_block(InsnId(3), InsnId(6)), Ok(()));
        assert_eq!(
            partition.ensure_same_block(InsnId(1), InsnId(2)),
            Err(Error::CrossesBlockBoundary {
                first: InsnId(1),
                second: InsnId(2),
            })
        );
    }
}
