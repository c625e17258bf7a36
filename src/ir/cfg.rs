//! CFG traversal order for the fixed-point driver.

use crate::ir::ir::{BlockId, Function};

/// Postorder over the blocks reachable from the entry.
pub fn postorder(f: &Function) -> Vec<BlockId> {
    let n = f.blocks.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);

    fn dfs(f: &Function, bb: BlockId, visited: &mut [bool], order: &mut Vec<BlockId>) {
        visited[bb.0 as usize] = true;
        for &child in &f.block(bb).children {
            if !visited[child.0 as usize] {
                dfs(f, child, visited, order);
            }
        }
        order.push(bb);
    }

    if n > 0 {
        dfs(f, f.entry, &mut visited, &mut order);
    }
    order
}

/// Reverse postorder: every block before its (non-back-edge) successors.
pub fn reverse_postorder(f: &Function) -> Vec<BlockId> {
    let mut order = postorder(f);
    order.reverse();
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpo_diamond() {
        let mut f = Function::new("t");
        let (b1, b2, b3) = (f.add_block(), f.add_block(), f.add_block());
        let x = f.arg_pseudo(0);
        f.insn_cbr(f.entry, x, b1, b2);
        f.insn_br(b1, b3);
        f.insn_br(b2, b3);

        let rpo = reverse_postorder(&f);
        assert_eq!(rpo.len(), 4);
        assert_eq!(rpo[0], f.entry);
        assert_eq!(rpo[3], b3, "join block comes after both arms");
    }

    #[test]
    fn test_unreachable_blocks_skipped() {
        let mut f = Function::new("t");
        let b1 = f.add_block();
        let _orphan = f.add_block();
        f.insn_br(f.entry, b1);
        let rpo = reverse_postorder(&f);
        assert_eq!(rpo, vec![f.entry, b1]);
    }
}
