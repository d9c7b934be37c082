//! Expression trees for function bodies and constant initializers.
//!
//! A body is an [`ExprList`]: an owned, ordered sequence of [`Expr`] nodes.
//! Structured control (`block`, `loop`, `if`, `try`) owns nested lists, so
//! every node has exactly one owner. Dropping a node tears its subtree down
//! with an explicit work list, so neither long sequences nor deep nesting
//! recurse on the native stack.

use super::opcode::Opcode;
use super::types::{Const, Location, Type, Var, VarKind, INVALID_INDEX};
use std::mem;

/// An owned sequence of expressions, in execution order.
pub type ExprList = Vec<Expr>;

/// Result types of a structured block.
pub type BlockSignature = Vec<Type>;

/// A structured block body with an optional label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub label: Option<String>,
    pub sig: BlockSignature,
    pub exprs: ExprList,
}

impl Block {
    pub fn new(exprs: ExprList) -> Self {
        Self {
            label: None,
            sig: Vec::new(),
            exprs,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_sig(mut self, sig: BlockSignature) -> Self {
        self.sig = sig;
        self
    }
}

/// One handler arm of a `try` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub loc: Location,
    /// The exception caught, or `INVALID_INDEX` for a catch-all.
    pub var: Var,
    pub exprs: ExprList,
}

impl Catch {
    /// A handler for one specific exception.
    pub fn new(var: Var, exprs: ExprList) -> Self {
        Self {
            loc: var.loc.clone(),
            var,
            exprs,
        }
    }

    /// A handler for every exception.
    pub fn catch_all(exprs: ExprList) -> Self {
        Self {
            loc: Location::default(),
            var: Var::index(INVALID_INDEX),
            exprs,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self.var.kind, VarKind::Index(INVALID_INDEX))
    }
}

/// Fieldless discriminant of [`ExprKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprType {
    Binary,
    Block,
    Br,
    BrIf,
    BrTable,
    Call,
    CallIndirect,
    Compare,
    Const,
    Convert,
    CurrentMemory,
    Drop,
    GetGlobal,
    GetLocal,
    GrowMemory,
    If,
    Load,
    Loop,
    Nop,
    Rethrow,
    Return,
    Select,
    SetGlobal,
    SetLocal,
    Store,
    TeeLocal,
    Throw,
    TryBlock,
    Unary,
    Unreachable,
}

/// The operation an expression node performs, with its immediates.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Binary(Opcode),
    Block(Box<Block>),
    /// Branch to the label `Var` (an index is a relative depth).
    Br(Var),
    BrIf(Var),
    BrTable {
        targets: Vec<Var>,
        default_target: Var,
    },
    Call(Var),
    /// The var names the expected function type.
    CallIndirect(Var),
    Compare(Opcode),
    Const(Const),
    Convert(Opcode),
    CurrentMemory,
    Drop,
    GetGlobal(Var),
    GetLocal(Var),
    GrowMemory,
    If {
        true_: Box<Block>,
        /// Empty when the `if` has no `else` arm.
        false_: ExprList,
    },
    Load {
        opcode: Opcode,
        /// Alignment in bytes.
        align: u64,
        offset: u64,
    },
    Loop(Box<Block>),
    Nop,
    Rethrow(Var),
    Return,
    Select,
    SetGlobal(Var),
    SetLocal(Var),
    Store {
        opcode: Opcode,
        align: u64,
        offset: u64,
    },
    TeeLocal(Var),
    Throw(Var),
    TryBlock {
        block: Box<Block>,
        catches: Vec<Catch>,
    },
    Unary(Opcode),
    Unreachable,
}

impl ExprKind {
    pub fn ty(&self) -> ExprType {
        match self {
            ExprKind::Binary(_) => ExprType::Binary,
            ExprKind::Block(_) => ExprType::Block,
            ExprKind::Br(_) => ExprType::Br,
            ExprKind::BrIf(_) => ExprType::BrIf,
            ExprKind::BrTable { .. } => ExprType::BrTable,
            ExprKind::Call(_) => ExprType::Call,
            ExprKind::CallIndirect(_) => ExprType::CallIndirect,
            ExprKind::Compare(_) => ExprType::Compare,
            ExprKind::Const(_) => ExprType::Const,
            ExprKind::Convert(_) => ExprType::Convert,
            ExprKind::CurrentMemory => ExprType::CurrentMemory,
            ExprKind::Drop => ExprType::Drop,
            ExprKind::GetGlobal(_) => ExprType::GetGlobal,
            ExprKind::GetLocal(_) => ExprType::GetLocal,
            ExprKind::GrowMemory => ExprType::GrowMemory,
            ExprKind::If { .. } => ExprType::If,
            ExprKind::Load { .. } => ExprType::Load,
            ExprKind::Loop(_) => ExprType::Loop,
            ExprKind::Nop => ExprType::Nop,
            ExprKind::Rethrow(_) => ExprType::Rethrow,
            ExprKind::Return => ExprType::Return,
            ExprKind::Select => ExprType::Select,
            ExprKind::SetGlobal(_) => ExprType::SetGlobal,
            ExprKind::SetLocal(_) => ExprType::SetLocal,
            ExprKind::Store { .. } => ExprType::Store,
            ExprKind::TeeLocal(_) => ExprType::TeeLocal,
            ExprKind::Throw(_) => ExprType::Throw,
            ExprKind::TryBlock { .. } => ExprType::TryBlock,
            ExprKind::Unary(_) => ExprType::Unary,
            ExprKind::Unreachable => ExprType::Unreachable,
        }
    }

    /// Nested expression lists owned by this node, in source order.
    pub fn children(&self) -> Vec<&ExprList> {
        match self {
            ExprKind::Block(block) | ExprKind::Loop(block) => vec![&block.exprs],
            ExprKind::If { true_, false_ } => vec![&true_.exprs, false_],
            ExprKind::TryBlock { block, catches } => {
                let mut lists = vec![&block.exprs];
                lists.extend(catches.iter().map(|c| &c.exprs));
                lists
            }
            _ => Vec::new(),
        }
    }

    /// Nested expression lists owned by this node, mutably, in source order.
    fn children_mut(&mut self) -> Vec<&mut ExprList> {
        match self {
            ExprKind::Block(block) | ExprKind::Loop(block) => vec![&mut block.exprs],
            ExprKind::If { true_, false_ } => vec![&mut true_.exprs, false_],
            ExprKind::TryBlock { block, catches } => {
                let mut lists = vec![&mut block.exprs];
                lists.extend(catches.iter_mut().map(|c| &mut c.exprs));
                lists
            }
            _ => Vec::new(),
        }
    }

    /// A copy of this node with every nested list left empty.
    fn clone_shallow(&self) -> ExprKind {
        let shell = |block: &Block| {
            Box::new(Block {
                label: block.label.clone(),
                sig: block.sig.clone(),
                exprs: Vec::new(),
            })
        };
        match self {
            ExprKind::Block(block) => ExprKind::Block(shell(block)),
            ExprKind::Loop(block) => ExprKind::Loop(shell(block)),
            ExprKind::If { true_, .. } => ExprKind::If {
                true_: shell(true_),
                false_: Vec::new(),
            },
            ExprKind::TryBlock { block, catches } => ExprKind::TryBlock {
                block: shell(block),
                catches: catches
                    .iter()
                    .map(|c| Catch {
                        loc: c.loc.clone(),
                        var: c.var.clone(),
                        exprs: Vec::new(),
                    })
                    .collect(),
            },
            leaf => leaf.clone(),
        }
    }

    /// Compare this node with `other`, ignoring the contents of nested lists
    /// but not their lengths.
    fn eq_shallow(&self, other: &ExprKind) -> bool {
        let same_block = |a: &Block, b: &Block| {
            a.label == b.label && a.sig == b.sig && a.exprs.len() == b.exprs.len()
        };
        match (self, other) {
            (ExprKind::Block(a), ExprKind::Block(b)) | (ExprKind::Loop(a), ExprKind::Loop(b)) => {
                same_block(a, b)
            }
            (
                ExprKind::If { true_, false_ },
                ExprKind::If {
                    true_: other_true,
                    false_: other_false,
                },
            ) => same_block(true_, other_true) && false_.len() == other_false.len(),
            (
                ExprKind::TryBlock { block, catches },
                ExprKind::TryBlock {
                    block: other_block,
                    catches: other_catches,
                },
            ) => {
                same_block(block, other_block)
                    && catches.len() == other_catches.len()
                    && catches.iter().zip(other_catches).all(|(a, b)| {
                        a.loc == b.loc && a.var == b.var && a.exprs.len() == b.exprs.len()
                    })
            }
            (a, b) if a.children().is_empty() && b.children().is_empty() => a == b,
            _ => false,
        }
    }

    /// Move every nested list out of this node onto `out`.
    fn take_children(&mut self, out: &mut Vec<ExprList>) {
        match self {
            ExprKind::Block(block) | ExprKind::Loop(block) => {
                out.push(mem::take(&mut block.exprs));
            }
            ExprKind::If { true_, false_ } => {
                out.push(mem::take(&mut true_.exprs));
                out.push(mem::take(false_));
            }
            ExprKind::TryBlock { block, catches } => {
                out.push(mem::take(&mut block.exprs));
                out.extend(catches.iter_mut().map(|c| mem::take(&mut c.exprs)));
            }
            _ => {}
        }
    }
}

/// A single expression node.
#[derive(Debug)]
pub struct Expr {
    pub loc: Location,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            loc: Location::default(),
            kind,
        }
    }

    pub fn with_loc(loc: Location, kind: ExprKind) -> Self {
        Self { loc, kind }
    }

    pub fn ty(&self) -> ExprType {
        self.kind.ty()
    }

    pub fn block(block: Block) -> Self {
        Self::new(ExprKind::Block(Box::new(block)))
    }

    pub fn loop_(block: Block) -> Self {
        Self::new(ExprKind::Loop(Box::new(block)))
    }

    pub fn if_(true_: Block, false_: ExprList) -> Self {
        Self::new(ExprKind::If {
            true_: Box::new(true_),
            false_,
        })
    }

    pub fn try_(block: Block, catches: Vec<Catch>) -> Self {
        Self::new(ExprKind::TryBlock {
            block: Box::new(block),
            catches,
        })
    }

    pub fn br_table(targets: Vec<Var>, default_target: Var) -> Self {
        Self::new(ExprKind::BrTable {
            targets,
            default_target,
        })
    }

    pub fn const_(c: Const) -> Self {
        Self::new(ExprKind::Const(c))
    }

    /// Pre-order visit of this node and everything nested under it.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        walk_list(std::slice::from_ref(self), f);
    }
}

impl Clone for Expr {
    /// Copies the subtree bottom-up from a pre-order listing, so nesting
    /// depth never reaches the native stack.
    fn clone(&self) -> Self {
        // Rebuild `expr` from its already-copied children on top of `built`.
        // The first child of the first list sits on top.
        fn assemble(expr: &Expr, built: &mut Vec<Expr>) -> Expr {
            let mut kind = expr.kind.clone_shallow();
            let lens: Vec<usize> = expr.kind.children().iter().map(|list| list.len()).collect();
            for (list, len) in kind.children_mut().into_iter().zip(lens) {
                let at = built.len() - len;
                list.extend(built.drain(at..).rev());
            }
            Expr::with_loc(expr.loc.clone(), kind)
        }

        let mut nodes = Vec::new();
        self.walk(&mut |expr| nodes.push(expr));
        let mut built = Vec::new();
        for expr in nodes.iter().skip(1).rev() {
            let copy = assemble(expr, &mut built);
            built.push(copy);
        }
        assemble(self, &mut built)
    }
}

impl PartialEq for Expr {
    /// Pre-order comparison; equal shapes and equal nodes in order mean
    /// equal trees.
    fn eq(&self, other: &Self) -> bool {
        let mut left = Vec::new();
        self.walk(&mut |expr| left.push(expr));
        let mut right = Vec::new();
        other.walk(&mut |expr| right.push(expr));
        left.len() == right.len()
            && left
                .iter()
                .zip(&right)
                .all(|(a, b)| a.loc == b.loc && a.kind.eq_shallow(&b.kind))
    }
}

impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.kind.take_children(&mut pending);
        while let Some(mut list) = pending.pop() {
            for mut expr in list.drain(..) {
                expr.kind.take_children(&mut pending);
                // `expr` is now a leaf; dropping it cannot recurse.
            }
        }
    }
}

/// Pre-order visit of every expression in `exprs`, including nested lists.
///
/// Iterative, so arbitrarily deep trees are safe to walk.
pub fn walk_list<'a>(exprs: &'a [Expr], f: &mut dyn FnMut(&'a Expr)) {
    let mut stack: Vec<std::slice::Iter<'a, Expr>> = vec![exprs.iter()];
    while let Some(iter) = stack.last_mut() {
        let Some(expr) = iter.next() else {
            stack.pop();
            continue;
        };
        f(expr);
        // Push in reverse so the first child list is visited first.
        for child in expr.kind.children().into_iter().rev() {
            stack.push(child.iter());
        }
    }
}

/// Count every node in `exprs`, nested ones included.
pub fn count_exprs(exprs: &[Expr]) -> usize {
    let mut count = 0;
    walk_list(exprs, &mut |_| count += 1);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::Const;

    fn nop() -> Expr {
        Expr::new(ExprKind::Nop)
    }

    #[test]
    fn test_catch_all_detection() {
        assert!(Catch::catch_all(vec![]).is_catch_all());
        assert!(Catch::new(Var::index(INVALID_INDEX), vec![]).is_catch_all());
        assert!(!Catch::new(Var::index(0), vec![]).is_catch_all());
        assert!(!Catch::new(Var::name("$e"), vec![]).is_catch_all());
    }

    #[test]
    fn test_expr_type_matches_kind() {
        assert_eq!(nop().ty(), ExprType::Nop);
        assert_eq!(Expr::block(Block::default()).ty(), ExprType::Block);
        assert_eq!(Expr::loop_(Block::default()).ty(), ExprType::Loop);
        assert_eq!(Expr::if_(Block::default(), vec![]).ty(), ExprType::If);
        assert_eq!(Expr::try_(Block::default(), vec![]).ty(), ExprType::TryBlock);
        assert_eq!(
            Expr::br_table(vec![], Var::index(0)).ty(),
            ExprType::BrTable
        );
        assert_eq!(Expr::const_(Const::i32(1)).ty(), ExprType::Const);
        assert_eq!(
            Expr::new(ExprKind::Binary(Opcode::I32Add)).ty(),
            ExprType::Binary
        );
    }

    #[test]
    fn test_empty_bodies_are_valid() {
        let block = Block::new(vec![]).with_label("$exit");
        assert_eq!(block.label.as_deref(), Some("$exit"));
        let expr = Expr::block(block);
        assert_eq!(count_exprs(std::slice::from_ref(&expr)), 1);
    }

    #[test]
    fn test_walk_is_preorder() {
        let body = vec![
            Expr::block(Block::new(vec![
                Expr::const_(Const::i32(1)),
                Expr::new(ExprKind::Drop),
            ])),
            Expr::if_(
                Block::new(vec![Expr::new(ExprKind::Br(Var::index(0)))]),
                vec![Expr::new(ExprKind::Unreachable)],
            ),
            Expr::new(ExprKind::Return),
        ];

        let mut seen = Vec::new();
        walk_list(&body, &mut |e| seen.push(e.ty()));
        assert_eq!(
            seen,
            vec![
                ExprType::Block,
                ExprType::Const,
                ExprType::Drop,
                ExprType::If,
                ExprType::Br,
                ExprType::Unreachable,
                ExprType::Return,
            ]
        );
    }

    #[test]
    fn test_try_children_include_catches() {
        let expr = Expr::try_(
            Block::new(vec![nop()]),
            vec![
                Catch::new(Var::index(0), vec![nop(), nop()]),
                Catch::catch_all(vec![nop()]),
            ],
        );
        let children = expr.kind.children();
        assert_eq!(children.len(), 3);
        assert_eq!(children[1].len(), 2);
        assert_eq!(count_exprs(std::slice::from_ref(&expr)), 5);
    }

    #[test]
    fn test_deep_nesting_drops_without_overflow() {
        let mut expr = nop();
        for _ in 0..200_000 {
            expr = Expr::block(Block::new(vec![expr]));
        }
        drop(expr);
    }

    #[test]
    fn test_deep_else_chain_drops_without_overflow() {
        let mut expr = nop();
        for _ in 0..200_000 {
            expr = Expr::if_(Block::default(), vec![expr]);
        }
        drop(expr);
    }

    #[test]
    fn test_clone_keeps_shape_and_order() {
        let expr = Expr::try_(
            Block::new(vec![
                Expr::block(Block::new(vec![nop(), Expr::const_(Const::i32(7))]).with_label("$b")),
                Expr::new(ExprKind::Throw(Var::index(0))),
            ])
            .with_sig(vec![Type::I32]),
            vec![
                Catch::new(Var::name("$e"), vec![Expr::new(ExprKind::Drop)]),
                Catch::catch_all(vec![Expr::if_(
                    Block::new(vec![nop()]),
                    vec![Expr::new(ExprKind::Unreachable)],
                )]),
            ],
        );

        let copy = expr.clone();
        assert_eq!(copy, expr);

        let mut seen = Vec::new();
        copy.walk(&mut |e| seen.push(e.ty()));
        assert_eq!(
            seen,
            vec![
                ExprType::TryBlock,
                ExprType::Block,
                ExprType::Nop,
                ExprType::Const,
                ExprType::Throw,
                ExprType::Drop,
                ExprType::If,
                ExprType::Nop,
                ExprType::Unreachable,
            ]
        );
        let ExprKind::TryBlock { block, catches } = &copy.kind else {
            panic!("expected try");
        };
        assert_eq!(block.sig, vec![Type::I32]);
        assert_eq!(catches[0].var, Var::name("$e"));
        assert!(catches[1].is_catch_all());
    }

    #[test]
    fn test_equality_sees_nested_differences() {
        let make = |value: u32, label: &str| {
            Expr::block(Block::new(vec![Expr::if_(
                Block::new(vec![Expr::const_(Const::i32(value))]),
                vec![],
            )]).with_label(label))
        };
        assert_eq!(make(1, "$a"), make(1, "$a"));
        assert_ne!(make(1, "$a"), make(2, "$a"));
        assert_ne!(make(1, "$a"), make(1, "$b"));

        // Same pre-order sequence, different nesting.
        let flat = Expr::block(Block::new(vec![Expr::block(Block::default()), nop()]));
        let nested = Expr::block(Block::new(vec![Expr::block(Block::new(vec![nop()]))]));
        assert_ne!(flat, nested);
    }

    #[test]
    fn test_deep_nesting_clones_without_overflow() {
        let mut expr = nop();
        for _ in 0..200_000 {
            expr = Expr::block(Block::new(vec![expr]));
        }
        let copy = expr.clone();
        assert_eq!(count_exprs(std::slice::from_ref(&copy)), 200_001);
        assert!(copy == expr);
    }
}
