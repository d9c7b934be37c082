//! Lowering of function bodies and constant expressions into expression trees.
//!
//! The flat operator stream is folded back into structured `Expr` nodes with a
//! control stack: `block`, `loop`, `if` and `try` push a frame, `else`,
//! `catch` and `catch_all` switch the arm being filled, and `end` pops the
//! frame and appends the finished node to its parent.

use crate::ir::{
    Block, BlockSignature, Catch, Const, Expr, ExprKind, ExprList, FuncSignature, Location,
    Opcode, OpcodeKind, Type, Var,
};
use anyhow::{bail, Context, Result};
use std::mem;
use wasmparser::{BlockType, ConstExpr, FunctionBody, MemArg, Operator, OperatorsReader};

/// Params plus locals allowed in one function, matching wasmparser's limit.
pub(super) const MAX_FUNCTION_LOCALS: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Func,
    Block,
    Loop,
    If,
    Try,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    loc: Location,
    sig: BlockSignature,
    /// The arm currently being filled.
    exprs: ExprList,
    /// `if`: the finished then-arm once `else` is seen.
    /// `try`: the finished protected body once the first handler starts.
    first: Option<ExprList>,
    catches: Vec<Catch>,
    /// Handler whose body is currently in `exprs`.
    handler: Option<Catch>,
}

impl Frame {
    fn new(kind: FrameKind, loc: Location, sig: BlockSignature) -> Self {
        Self {
            kind,
            loc,
            sig,
            exprs: Vec::new(),
            first: None,
            catches: Vec::new(),
            handler: None,
        }
    }

    /// Close the arm in `exprs` and open a new handler.
    fn start_handler(&mut self, next: Catch) {
        let exprs = mem::take(&mut self.exprs);
        match self.handler.take() {
            Some(mut handler) => {
                handler.exprs = exprs;
                self.catches.push(handler);
            }
            None => self.first = Some(exprs),
        }
        self.handler = Some(next);
    }

    /// Turn a closed frame into the node it denotes.
    fn into_expr(mut self) -> Expr {
        let body = |exprs: ExprList, sig: BlockSignature| Block::new(exprs).with_sig(sig);
        let kind = match self.kind {
            FrameKind::Block => ExprKind::Block(Box::new(body(self.exprs, self.sig))),
            FrameKind::Loop => ExprKind::Loop(Box::new(body(self.exprs, self.sig))),
            FrameKind::If => match self.first {
                Some(then) => ExprKind::If {
                    true_: Box::new(body(then, self.sig)),
                    false_: self.exprs,
                },
                None => ExprKind::If {
                    true_: Box::new(body(self.exprs, self.sig)),
                    false_: Vec::new(),
                },
            },
            FrameKind::Try => {
                let protected = match self.handler.take() {
                    Some(mut handler) => {
                        handler.exprs = mem::take(&mut self.exprs);
                        self.catches.push(handler);
                        self.first.take().unwrap_or_default()
                    }
                    None => self.exprs,
                };
                ExprKind::TryBlock {
                    block: Box::new(body(protected, self.sig)),
                    catches: self.catches,
                }
            }
            // The function frame is never turned into a node.
            FrameKind::Func => ExprKind::Block(Box::new(body(self.exprs, self.sig))),
        };
        Expr::with_loc(self.loc, kind)
    }
}

/// Lowers the operators of one function body.
pub(super) struct BodyLowering<'a> {
    /// Type section, for multi-value block types.
    sigs: &'a [FuncSignature],
    file: &'a Location,
    frames: Vec<Frame>,
}

impl<'a> BodyLowering<'a> {
    pub(super) fn new(sigs: &'a [FuncSignature], file: &'a Location) -> Self {
        Self {
            sigs,
            file,
            frames: Vec::new(),
        }
    }

    /// Declared local types, one entry per local.
    ///
    /// Counts are summed with the parameters and checked against
    /// [`MAX_FUNCTION_LOCALS`] before anything is allocated for them.
    pub(super) fn locals(body: &FunctionBody<'_>, num_params: u32) -> Result<Vec<Type>> {
        let mut locals = Vec::new();
        let mut total = u64::from(num_params);
        let locals_reader = body.get_locals_reader().context("getting locals reader")?;
        for local in locals_reader {
            let (count, val_type) = local.context("reading local")?;
            total += u64::from(count);
            if total > MAX_FUNCTION_LOCALS {
                bail!(
                    "too many locals: {} exceeds the limit of {}",
                    total,
                    MAX_FUNCTION_LOCALS
                );
            }
            let ty = Type::from_wasmparser(val_type)?;
            locals.extend(std::iter::repeat(ty).take(count as usize));
        }
        Ok(locals)
    }

    /// Fold the body's operator stream into an expression list.
    pub(super) fn lower(mut self, body: &FunctionBody<'_>) -> Result<ExprList> {
        let mut reader = body
            .get_operators_reader()
            .context("getting operators reader")?;
        self.frames.push(Frame::new(
            FrameKind::Func,
            self.file.at_offset(body.range().start),
            Vec::new(),
        ));

        while !reader.eof() {
            let offset = reader.original_position();
            let op = reader.read().context("reading operator")?;
            let loc = self.file.at_offset(offset);
            if let Some(exprs) = self
                .operator(op, loc)
                .with_context(|| format!("at offset {:#x}", offset))?
            {
                if !reader.eof() {
                    bail!("operators after the end of the function at {:#x}", offset);
                }
                return Ok(exprs);
            }
        }
        bail!("function body is missing its final `end`")
    }

    fn block_sig(&self, blockty: BlockType) -> Result<BlockSignature> {
        match blockty {
            BlockType::Empty => Ok(Vec::new()),
            BlockType::Type(vt) => Ok(vec![Type::from_wasmparser(vt)?]),
            BlockType::FuncType(index) => self
                .sigs
                .get(index as usize)
                .map(|sig| sig.result_types.clone())
                .with_context(|| format!("block type refers to unknown type {}", index)),
        }
    }

    fn top(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .context("operator outside of any control frame")
    }

    fn push(&mut self, loc: Location, kind: ExprKind) -> Result<()> {
        self.top()?.exprs.push(Expr::with_loc(loc, kind));
        Ok(())
    }

    /// Handle one operator. Returns the finished body when the function's own
    /// `end` is reached.
    fn operator(&mut self, op: Operator<'_>, loc: Location) -> Result<Option<ExprList>> {
        let var = |index: u32| Var::index(index).with_loc(loc.clone());

        let kind = match op {
            Operator::Block { blockty } => {
                let sig = self.block_sig(blockty)?;
                self.frames.push(Frame::new(FrameKind::Block, loc, sig));
                return Ok(None);
            }
            Operator::Loop { blockty } => {
                let sig = self.block_sig(blockty)?;
                self.frames.push(Frame::new(FrameKind::Loop, loc, sig));
                return Ok(None);
            }
            Operator::If { blockty } => {
                let sig = self.block_sig(blockty)?;
                self.frames.push(Frame::new(FrameKind::If, loc, sig));
                return Ok(None);
            }
            Operator::Try { blockty } => {
                let sig = self.block_sig(blockty)?;
                self.frames.push(Frame::new(FrameKind::Try, loc, sig));
                return Ok(None);
            }
            Operator::Else => {
                let frame = self.top()?;
                if frame.kind != FrameKind::If || frame.first.is_some() {
                    bail!("else without matching if");
                }
                frame.first = Some(mem::take(&mut frame.exprs));
                return Ok(None);
            }
            Operator::Catch { tag_index } => {
                let handler = Catch::new(var(tag_index), Vec::new());
                self.start_handler(handler)?;
                return Ok(None);
            }
            Operator::CatchAll => {
                let mut handler = Catch::catch_all(Vec::new());
                handler.loc = loc;
                self.start_handler(handler)?;
                return Ok(None);
            }
            Operator::Delegate { .. } => bail!("`delegate` is not supported"),
            Operator::End => {
                let frame = self.frames.pop().context("unbalanced `end`")?;
                if frame.kind == FrameKind::Func {
                    return Ok(Some(frame.exprs));
                }
                let expr = frame.into_expr();
                self.top()?.exprs.push(expr);
                return Ok(None);
            }

            Operator::Unreachable => ExprKind::Unreachable,
            Operator::Nop => ExprKind::Nop,
            Operator::Return => ExprKind::Return,
            Operator::Drop => ExprKind::Drop,
            Operator::Select | Operator::TypedSelect { .. } => ExprKind::Select,

            Operator::Br { relative_depth } => ExprKind::Br(var(relative_depth)),
            Operator::BrIf { relative_depth } => ExprKind::BrIf(var(relative_depth)),
            Operator::BrTable { targets } => {
                let depths = targets
                    .targets()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .context("reading br_table targets")?;
                ExprKind::BrTable {
                    targets: depths.into_iter().map(&var).collect(),
                    default_target: var(targets.default()),
                }
            }

            Operator::Call { function_index } => ExprKind::Call(var(function_index)),
            Operator::CallIndirect {
                type_index,
                table_index,
            } => {
                if table_index != 0 {
                    bail!("call_indirect through table {} is not supported", table_index);
                }
                ExprKind::CallIndirect(var(type_index))
            }

            Operator::LocalGet { local_index } => ExprKind::GetLocal(var(local_index)),
            Operator::LocalSet { local_index } => ExprKind::SetLocal(var(local_index)),
            Operator::LocalTee { local_index } => ExprKind::TeeLocal(var(local_index)),
            Operator::GlobalGet { global_index } => ExprKind::GetGlobal(var(global_index)),
            Operator::GlobalSet { global_index } => ExprKind::SetGlobal(var(global_index)),

            Operator::MemorySize { mem: 0, .. } => ExprKind::CurrentMemory,
            Operator::MemoryGrow { mem: 0, .. } => ExprKind::GrowMemory,

            Operator::Throw { tag_index } => ExprKind::Throw(var(tag_index)),
            Operator::Rethrow { relative_depth } => ExprKind::Rethrow(var(relative_depth)),

            ref other => match constant(other) {
                Some(c) => ExprKind::Const(c.with_loc(loc.clone())),
                None => numeric_or_memory(other)?,
            },
        };

        self.push(loc, kind)?;
        Ok(None)
    }

    fn start_handler(&mut self, handler: Catch) -> Result<()> {
        let frame = self.top()?;
        if frame.kind != FrameKind::Try {
            bail!("catch without matching try");
        }
        if frame.handler.as_ref().is_some_and(Catch::is_catch_all) {
            bail!("handler after catch_all");
        }
        frame.start_handler(handler);
        Ok(())
    }
}

fn constant(op: &Operator<'_>) -> Option<Const> {
    match *op {
        Operator::I32Const { value } => Some(Const::i32(value as u32)),
        Operator::I64Const { value } => Some(Const::i64(value as u64)),
        Operator::F32Const { value } => Some(Const::f32_bits(value.bits())),
        Operator::F64Const { value } => Some(Const::f64_bits(value.bits())),
        _ => None,
    }
}

fn memarg(op: &Operator<'_>) -> Option<MemArg> {
    match *op {
        Operator::I32Load { memarg }
        | Operator::I64Load { memarg }
        | Operator::F32Load { memarg }
        | Operator::F64Load { memarg }
        | Operator::I32Load8S { memarg }
        | Operator::I32Load8U { memarg }
        | Operator::I32Load16S { memarg }
        | Operator::I32Load16U { memarg }
        | Operator::I64Load8S { memarg }
        | Operator::I64Load8U { memarg }
        | Operator::I64Load16S { memarg }
        | Operator::I64Load16U { memarg }
        | Operator::I64Load32S { memarg }
        | Operator::I64Load32U { memarg }
        | Operator::I32Store { memarg }
        | Operator::I64Store { memarg }
        | Operator::F32Store { memarg }
        | Operator::F64Store { memarg }
        | Operator::I32Store8 { memarg }
        | Operator::I32Store16 { memarg }
        | Operator::I64Store8 { memarg }
        | Operator::I64Store16 { memarg }
        | Operator::I64Store32 { memarg } => Some(memarg),
        _ => None,
    }
}

fn numeric_or_memory(op: &Operator<'_>) -> Result<ExprKind> {
    let Some(opcode) = Opcode::from_operator(op) else {
        bail!("unsupported operator {:?}", op);
    };
    let kind = match opcode.kind() {
        OpcodeKind::Unary => ExprKind::Unary(opcode),
        OpcodeKind::Binary => ExprKind::Binary(opcode),
        OpcodeKind::Compare => ExprKind::Compare(opcode),
        OpcodeKind::Convert => ExprKind::Convert(opcode),
        OpcodeKind::Load | OpcodeKind::Store => {
            let memarg = memarg(op).with_context(|| format!("{} without memarg", opcode))?;
            if memarg.memory != 0 {
                bail!("{} on memory {} is not supported", opcode, memarg.memory);
            }
            // The binary stores log2 of the alignment.
            let align = 1u64
                .checked_shl(u32::from(memarg.align))
                .with_context(|| format!("{} alignment out of range", opcode))?;
            let offset = memarg.offset;
            if opcode.kind() == OpcodeKind::Load {
                ExprKind::Load {
                    opcode,
                    align,
                    offset,
                }
            } else {
                ExprKind::Store {
                    opcode,
                    align,
                    offset,
                }
            }
        }
    };
    Ok(kind)
}

/// Lower a constant initializer (global init, segment offset).
pub(super) fn lower_const_expr(expr: &ConstExpr<'_>, file: &Location) -> Result<ExprList> {
    let mut reader: OperatorsReader<'_> = expr.get_operators_reader();
    let mut exprs = Vec::new();
    while !reader.eof() {
        let offset = reader.original_position();
        let op = reader.read().context("reading const expr operator")?;
        let loc = file.at_offset(offset);
        let kind = match op {
            Operator::End => break,
            Operator::GlobalGet { global_index } => {
                ExprKind::GetGlobal(Var::index(global_index).with_loc(loc.clone()))
            }
            ref other => match constant(other) {
                Some(c) => ExprKind::Const(c.with_loc(loc.clone())),
                None => bail!("unsupported const expression operator: {:?}", other),
            },
        };
        exprs.push(Expr::with_loc(loc, kind));
    }
    Ok(exprs)
}
