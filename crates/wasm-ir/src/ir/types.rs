//! Leaf types shared by every IR node: source locations, value types,
//! symbolic references (`Var`) and typed immediates (`Const`).

use std::fmt;
use std::sync::Arc;

/// Position of an entity within one of the module's index spaces.
pub type Index = u32;

/// Sentinel meaning "no index". Never a valid position in any index space.
pub const INVALID_INDEX: Index = u32::MAX;

/// Where a construct came from, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    /// Source file (or script) name, if known.
    pub filename: Option<Arc<str>>,
    pub position: Position,
}

/// Text sources are addressed by line/column, binary sources by byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Text {
        line: u32,
        first_column: u32,
        last_column: u32,
    },
    Binary {
        offset: usize,
    },
}

impl Default for Position {
    fn default() -> Self {
        Position::Text {
            line: 0,
            first_column: 0,
            last_column: 0,
        }
    }
}

impl Location {
    /// A location in a text source.
    pub fn text(filename: Option<Arc<str>>, line: u32, first_column: u32, last_column: u32) -> Self {
        Self {
            filename,
            position: Position::Text {
                line,
                first_column,
                last_column,
            },
        }
    }

    /// A location in a binary source.
    pub fn binary(filename: Option<Arc<str>>, offset: usize) -> Self {
        Self {
            filename,
            position: Position::Binary { offset },
        }
    }

    /// Same file, different byte offset. Used when lowering a binary module.
    pub fn at_offset(&self, offset: usize) -> Self {
        Self::binary(self.filename.clone(), offset)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filename = self.filename.as_deref().unwrap_or("<unknown>");
        match self.position {
            Position::Text {
                line, first_column, ..
            } => write!(f, "{}:{}:{}", filename, line, first_column),
            Position::Binary { offset } => write!(f, "{}:{:#010x}", filename, offset),
        }
    }
}

/// WebAssembly value and element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    I32,
    I64,
    F32,
    F64,
    /// Element type of MVP tables.
    Funcref,
}

// Text-format spelling, shared by diagnostics and the opcode mnemonics.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Funcref => write!(f, "funcref"),
        }
    }
}

impl Type {
    /// Convert a `wasmparser::ValType`, rejecting types outside the MVP.
    pub fn from_wasmparser(vt: wasmparser::ValType) -> anyhow::Result<Self> {
        use wasmparser::ValType;
        match vt {
            ValType::I32 => Ok(Type::I32),
            ValType::I64 => Ok(Type::I64),
            ValType::F32 => Ok(Type::F32),
            ValType::F64 => Ok(Type::F64),
            ValType::Ref(r) if r.is_func_ref() => Ok(Type::Funcref),
            _ => anyhow::bail!("unsupported value type: {:?}", vt),
        }
    }

    /// Whether this is one of the four numeric types.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Type::Funcref)
    }
}

/// Size limits of a table (in elements) or memory (in pages).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub initial: u64,
    pub max: Option<u64>,
    pub is_shared: bool,
}

impl Limits {
    pub fn new(initial: u64, max: Option<u64>) -> Self {
        Self {
            initial,
            max,
            is_shared: false,
        }
    }
}

/// Kind of entity an import or export refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalKind {
    Func,
    Table,
    Memory,
    Global,
    Except,
}

impl fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExternalKind::Func => "func",
            ExternalKind::Table => "table",
            ExternalKind::Memory => "memory",
            ExternalKind::Global => "global",
            ExternalKind::Except => "except",
        };
        f.write_str(s)
    }
}

/// A reference to an entity, either already positional or still symbolic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VarKind {
    Index(Index),
    Name(String),
}

/// A resolved-or-unresolved reference carrying its source location.
///
/// Text producers build `Name` vars; binary producers build `Index` vars.
/// A resolver replaces names with indices via [`Var::resolve`]; a var that
/// already holds an index is never re-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    pub loc: Location,
    pub kind: VarKind,
}

impl Default for Var {
    fn default() -> Self {
        Var::index(INVALID_INDEX)
    }
}

impl Var {
    pub fn index(index: Index) -> Self {
        Self {
            loc: Location::default(),
            kind: VarKind::Index(index),
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            loc: Location::default(),
            kind: VarKind::Name(name.into()),
        }
    }

    pub fn with_loc(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }

    pub fn is_index(&self) -> bool {
        matches!(self.kind, VarKind::Index(_))
    }

    pub fn is_name(&self) -> bool {
        matches!(self.kind, VarKind::Name(_))
    }

    /// The positional index, if this var holds one (which may be `INVALID_INDEX`).
    pub fn as_index(&self) -> Option<Index> {
        match self.kind {
            VarKind::Index(index) => Some(index),
            VarKind::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            VarKind::Name(name) => Some(name),
            VarKind::Index(_) => None,
        }
    }

    /// True for an index var holding something other than the sentinel.
    pub fn is_valid_index(&self) -> bool {
        matches!(self.kind, VarKind::Index(index) if index != INVALID_INDEX)
    }

    /// Replace a symbolic name with its resolved index.
    ///
    /// Returns `false` and leaves the var untouched if it already holds an index.
    pub fn resolve(&mut self, index: Index) -> bool {
        match self.kind {
            VarKind::Name(_) => {
                self.kind = VarKind::Index(index);
                true
            }
            VarKind::Index(_) => false,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            VarKind::Index(index) if *index == INVALID_INDEX => write!(f, "<invalid>"),
            VarKind::Index(index) => write!(f, "{}", index),
            VarKind::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<Index> for Var {
    fn from(index: Index) -> Self {
        Var::index(index)
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Var::name(name)
    }
}

/// Payload of a typed immediate. Floats are kept as raw bits so NaN payloads
/// and signaling bits survive unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstValue {
    I32(u32),
    I64(u64),
    F32(u32),
    F64(u64),
}

/// A typed immediate value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Const {
    pub loc: Location,
    pub value: ConstValue,
}

impl Const {
    pub fn new(value: ConstValue) -> Self {
        Self {
            loc: Location::default(),
            value,
        }
    }

    pub fn i32(value: u32) -> Self {
        Self::new(ConstValue::I32(value))
    }

    pub fn i64(value: u64) -> Self {
        Self::new(ConstValue::I64(value))
    }

    /// An f32 constant given as its IEEE-754 bit pattern.
    pub fn f32_bits(bits: u32) -> Self {
        Self::new(ConstValue::F32(bits))
    }

    /// An f64 constant given as its IEEE-754 bit pattern.
    pub fn f64_bits(bits: u64) -> Self {
        Self::new(ConstValue::F64(bits))
    }

    pub fn f32(value: f32) -> Self {
        Self::f32_bits(value.to_bits())
    }

    pub fn f64(value: f64) -> Self {
        Self::f64_bits(value.to_bits())
    }

    pub fn with_loc(mut self, loc: Location) -> Self {
        self.loc = loc;
        self
    }

    /// Returns the value type of this constant.
    pub fn ty(&self) -> Type {
        match self.value {
            ConstValue::I32(_) => Type::I32,
            ConstValue::I64(_) => Type::I64,
            ConstValue::F32(_) => Type::F32,
            ConstValue::F64(_) => Type::F64,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            ConstValue::I32(v) => write!(f, "i32:{}", v),
            ConstValue::I64(v) => write!(f, "i64:{}", v),
            ConstValue::F32(bits) => write!(f, "f32:{:#010x}", bits),
            ConstValue::F64(bits) => write!(f, "f64:{:#018x}", bits),
        }
    }
}
