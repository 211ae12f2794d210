//! Dominator tree over a [`Cfg`](super::Cfg).
//!
//! Iterative immediate-dominator computation in the Cooper–Harvey–Kennedy
//! style. Blocks are processed in index order, which the CFG builder emits
//! as a reverse postorder for reducible control flow, so the fixed point is
//! reached in very few sweeps.

use super::Cfg;

pub struct DomTree {
    idoms: Vec<usize>,
}

impl DomTree {
    /// Sentinel for "no immediate dominator": the entry block and blocks
    /// unreachable from it.
    const NONE: usize = usize::MAX;

    pub fn new(cfg: &Cfg) -> Self {
        let n = cfg.blocks.len();
        let mut idoms = vec![Self::NONE; n];
        if n == 0 {
            return Self { idoms };
        }

        // The entry is its own dominator while iterating; reported as None
        // from the accessor.
        idoms[Cfg::ENTRY] = Cfg::ENTRY;

        let mut changed = true;
        while changed {
            changed = false;
            for block in 1..n {
                let mut new_idom = Self::NONE;
                for &pred in &cfg.blocks[block].preds {
                    if idoms[pred] == Self::NONE {
                        // Not yet processed, or unreachable.
                        continue;
                    }
                    new_idom = if new_idom == Self::NONE {
                        pred
                    } else {
                        Self::intersect(&idoms, pred, new_idom)
                    };
                }
                if new_idom != Self::NONE && idoms[block] != new_idom {
                    idoms[block] = new_idom;
                    changed = true;
                }
            }
        }

        Self { idoms }
    }

    /// Walk both candidates up the (partial) dominator tree until they meet.
    /// Relies on every immediate dominator having a lower index than the
    /// blocks it dominates, which the builder's block order guarantees.
    fn intersect(idoms: &[usize], mut a: usize, mut b: usize) -> usize {
        while a != b {
            while a > b {
                a = idoms[a];
            }
            while b > a {
                b = idoms[b];
            }
        }
        a
    }

    /// The immediate dominator of `block`, or `None` for the entry block and
    /// for blocks unreachable from the entry.
    pub fn idom(&self, block: usize) -> Option<usize> {
        if block == Cfg::ENTRY || self.idoms[block] == Self::NONE {
            None
        } else {
            Some(self.idoms[block])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::literal::Literal;
    use crate::ir::types::{Type, TypeStore};

    #[test]
    fn diamond_merge_is_dominated_by_the_fork() {
        let store = TypeStore::default();
        let builder = Builder::new(&store);
        let body = builder.block(vec![builder.if_else(
            builder.const_(Literal::I32(1)),
            builder.call("a", Vec::new(), Type::None),
            builder.call("b", Vec::new(), Type::None),
        )]);

        let cfg = Cfg::build(&body);
        let domtree = DomTree::new(&cfg);

        // entry=0, then=1, else=2, merge=3
        assert_eq!(domtree.idom(0), None);
        assert_eq!(domtree.idom(1), Some(0));
        assert_eq!(domtree.idom(2), Some(0));
        assert_eq!(domtree.idom(3), Some(0));
    }

    #[test]
    fn loop_body_is_dominated_by_the_header() {
        let store = TypeStore::default();
        let builder = Builder::new(&store);
        let body = builder.block(vec![builder.loop_(
            "l",
            builder.block(vec![
                builder.if_(
                    builder.const_(Literal::I32(1)),
                    builder.call("a", Vec::new(), Type::None),
                ),
                builder.br_if("l", builder.const_(Literal::I32(1))),
            ]),
        )]);

        let cfg = Cfg::build(&body);
        let domtree = DomTree::new(&cfg);

        let header = 1;
        for block in header + 1..cfg.blocks.len() {
            if cfg.blocks[block].preds.is_empty() {
                continue;
            }
            // Everything reachable inside the loop traces back to the header.
            let mut curr = block;
            while let Some(idom) = domtree.idom(curr) {
                curr = idom;
                if curr == header {
                    break;
                }
            }
            assert!(curr == header || curr == Cfg::ENTRY);
        }
    }

    #[test]
    fn unreachable_blocks_have_no_idom() {
        let store = TypeStore::default();
        let builder = Builder::new(&store);
        let body = builder.block(vec![
            builder.return_(None),
            builder.call("a", Vec::new(), Type::None),
        ]);

        let cfg = Cfg::build(&body);
        let domtree = DomTree::new(&cfg);
        for block in 1..cfg.blocks.len() {
            if cfg.blocks[block].preds.is_empty() {
                assert_eq!(domtree.idom(block), None);
            }
        }
    }
}
