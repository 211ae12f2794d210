//! Control-flow graph construction from structured control flow.
//!
//! The builder linearizes a function body into basic blocks, recording in
//! each block's contents slot the "interesting" expressions a dataflow pass
//! cares about: every `global.set` and every `call`, in evaluation order.
//! Each such expression gets a sequence number; [`for_each_action`] repeats
//! the same traversal over the body so a pass can map decisions made on the
//! CFG back onto the expressions themselves. Both traversals recurse through
//! children in the same order, which is what keeps the numbering aligned.

pub mod domtree;

pub use domtree::DomTree;

use crate::ir::expr::{walk, Expr, ExprKind, Visitor};

/// One interesting expression inside a basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    GlobalSet { seq: usize, name: String },
    Call { seq: usize, target: String },
}

#[derive(Debug, Default)]
pub struct BasicBlock {
    pub preds: Vec<usize>,
    pub succs: Vec<usize>,
    pub actions: Vec<Action>,
}

/// A function body's CFG. Block 0 is the entry; blocks are created in
/// program order, so every forward edge goes from a lower index to a higher
/// one and only loop back edges point backwards.
#[derive(Debug)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    /// Total number of interesting expressions seen.
    pub num_actions: usize,
}

impl Cfg {
    pub const ENTRY: usize = 0;

    pub fn build(body: &Expr) -> Cfg {
        let mut builder = CfgBuilder::new();
        builder.visit(body);
        Cfg {
            blocks: builder.blocks,
            num_actions: builder.next_seq,
        }
    }
}

enum FrameKind {
    /// Branches to the label restart the loop at this header block.
    Loop { header: usize },
    /// Branches to the label exit the block; sources collect until the end.
    Block { branch_sources: Vec<usize> },
}

struct Frame {
    name: String,
    kind: FrameKind,
}

struct CfgBuilder {
    blocks: Vec<BasicBlock>,
    current: usize,
    frames: Vec<Frame>,
    next_seq: usize,
}

impl CfgBuilder {
    fn new() -> Self {
        Self {
            blocks: vec![BasicBlock::default()],
            current: Cfg::ENTRY,
            frames: Vec::new(),
            next_seq: 0,
        }
    }

    fn new_block(&mut self) -> usize {
        self.blocks.push(BasicBlock::default());
        self.blocks.len() - 1
    }

    fn edge(&mut self, from: usize, to: usize) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    /// Start a block with no incoming edges, for code after a terminator.
    /// Such blocks have no dominator and analyses skip them.
    fn start_dead_block(&mut self) {
        self.current = self.new_block();
    }

    fn record(&mut self, action: impl FnOnce(usize) -> Action) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let action = action(seq);
        self.blocks[self.current].actions.push(action);
    }

    fn visit(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Nop
            | ExprKind::Const(_)
            | ExprKind::LocalGet { .. }
            | ExprKind::GlobalGet { .. }
            | ExprKind::RefNull(_)
            | ExprKind::RefFunc(_) => {}
            ExprKind::Unreachable => self.start_dead_block(),
            ExprKind::Block { name, list } => {
                if let Some(name) = name {
                    self.frames.push(Frame {
                        name: name.clone(),
                        kind: FrameKind::Block {
                            branch_sources: Vec::new(),
                        },
                    });
                }
                for child in list {
                    self.visit(child);
                }
                if name.is_some() {
                    let frame = self.frames.pop().unwrap();
                    let FrameKind::Block { branch_sources } = frame.kind else {
                        unreachable!()
                    };
                    if !branch_sources.is_empty() {
                        let fallthrough = self.current;
                        let merge = self.new_block();
                        self.edge(fallthrough, merge);
                        for source in branch_sources {
                            self.edge(source, merge);
                        }
                        self.current = merge;
                    }
                }
            }
            ExprKind::If {
                condition,
                if_true,
                if_false,
            } => {
                self.visit(condition);
                let cond_block = self.current;

                let then_start = self.new_block();
                self.edge(cond_block, then_start);
                self.current = then_start;
                self.visit(if_true);
                let then_end = self.current;

                let else_end = if_false.as_ref().map(|if_false| {
                    let else_start = self.new_block();
                    self.edge(cond_block, else_start);
                    self.current = else_start;
                    self.visit(if_false);
                    self.current
                });

                let merge = self.new_block();
                self.edge(then_end, merge);
                match else_end {
                    Some(else_end) => self.edge(else_end, merge),
                    None => self.edge(cond_block, merge),
                }
                self.current = merge;
            }
            ExprKind::Loop { name, body } => {
                let header = self.new_block();
                self.edge(self.current, header);
                self.current = header;
                self.frames.push(Frame {
                    name: name.clone(),
                    kind: FrameKind::Loop { header },
                });
                self.visit(body);
                self.frames.pop();
            }
            ExprKind::Br { target, condition } => {
                if let Some(condition) = condition {
                    self.visit(condition);
                }
                let from = self.current;
                let frame = self
                    .frames
                    .iter_mut()
                    .rev()
                    .find(|frame| frame.name == *target)
                    .unwrap_or_else(|| panic!("branch to unknown label {target}"));
                match &mut frame.kind {
                    FrameKind::Loop { header } => {
                        let header = *header;
                        self.edge(from, header);
                    }
                    FrameKind::Block { branch_sources } => branch_sources.push(from),
                }
                if condition.is_some() {
                    let next = self.new_block();
                    self.edge(from, next);
                    self.current = next;
                } else {
                    self.start_dead_block();
                }
            }
            ExprKind::Return { value } => {
                if let Some(value) = value {
                    self.visit(value);
                }
                self.start_dead_block();
            }
            ExprKind::Drop(value)
            | ExprKind::LocalSet { value, .. }
            | ExprKind::RefAsNonNull(value) => self.visit(value),
            ExprKind::GlobalSet { name, value } => {
                self.visit(value);
                let name = name.clone();
                self.record(|seq| Action::GlobalSet { seq, name });
            }
            ExprKind::Call { target, operands } => {
                for operand in operands {
                    self.visit(operand);
                }
                let target = target.clone();
                self.record(|seq| Action::Call { seq, target });
            }
            ExprKind::StructNew { operands, .. } => {
                for operand in operands {
                    self.visit(operand);
                }
            }
            ExprKind::StructGet { object, .. } => self.visit(object),
            ExprKind::StructSet { object, value, .. } => {
                self.visit(object);
                self.visit(value);
            }
            ExprKind::Select {
                condition,
                if_true,
                if_false,
            } => {
                self.visit(if_true);
                self.visit(if_false);
                self.visit(condition);
            }
            ExprKind::Binary { left, right, .. } => {
                self.visit(left);
                self.visit(right);
            }
        }
    }
}

/// Visit every `global.set` and `call` in `body` in evaluation order,
/// passing the same sequence numbers [`Cfg::build`] assigned.
pub fn for_each_action(body: &mut Expr, f: impl FnMut(usize, &mut Expr)) {
    struct ActionVisitor<F> {
        seq: usize,
        f: F,
    }

    impl<F: FnMut(usize, &mut Expr)> Visitor for ActionVisitor<F> {
        fn visit_global_set(&mut self, expr: &mut Expr) {
            let seq = self.seq;
            self.seq += 1;
            (self.f)(seq, expr);
        }

        fn visit_call(&mut self, expr: &mut Expr) {
            let seq = self.seq;
            self.seq += 1;
            (self.f)(seq, expr);
        }
    }

    walk(body, &mut ActionVisitor { seq: 0, f });
}
