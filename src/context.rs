use std::collections::HashMap;
use std::rc::Rc;

use mplbin::{DataEntry, TypeTag, Value};

use crate::cell::{ProcEntry, VarCell};
use crate::expr::Expr;
use crate::{ContextId, InstrIndex, ProcId, VarId};

/// Runtime form of an instruction: operands decoded once at load time,
/// expression strings compiled to trees. Execution dispatches on the
/// variant, so stepping never re-parses anything.
#[derive(Clone, Debug)]
pub enum RtInstr {
    Nop,
    SetValue { var: VarId, value: Value },
    SetLinked { var: VarId, ty: TypeTag, linked: VarId },
    SetExpr { var: VarId, ty: TypeTag, expr: Rc<Expr> },
    Push { id: u32, procedure: bool },
    Jump { target: InstrIndex },
    If { target: InstrIndex, cond: Cond },
    Else,
    End,
    Define { id: ProcId, start: InstrIndex },
    Ret,
    Call { id: ProcId },
    WriteStr(Rc<str>),
    WriteVar(VarId),
    Input { var: VarId, ty: TypeTag },
    Eof,
}

/// IF condition: a variable read or a compiled expression. Expression
/// conditions are evaluated fresh on every visit, never memoized.
#[derive(Clone, Debug)]
pub enum Cond {
    Var(VarId),
    Expr(Rc<Expr>),
}

/// Symbol names of a loaded module's data segment. Modules that include
/// this one resolve their imports against these maps by name.
#[derive(Default, Debug)]
pub struct SegmentInfo {
    pub vars: HashMap<String, VarId>,
    pub procs: HashMap<String, ProcId>,
}

impl SegmentInfo {
    pub fn from_entries(entries: &[DataEntry]) -> SegmentInfo {
        let mut info = SegmentInfo::default();
        for entry in entries {
            if entry.procedure {
                info.procs.insert(entry.name.clone(), entry.id);
            } else {
                info.vars.insert(entry.name.clone(), entry.id);
            }
        }
        info
    }
}

/// Per-module runtime state.
pub struct Context {
    pub id: ContextId,
    pub code: Rc<Vec<RtInstr>>,
    pub vars: HashMap<VarId, VarCell>,
    pub procs: HashMap<ProcId, ProcEntry>,
    pub names: Rc<SegmentInfo>,
    pub ip: InstrIndex,
    pub eof: bool,
    /// Include index (as packed) to loaded context.
    pub includes: HashMap<u32, ContextId>,
    /// Writeback pairs per included context: (this context's id, remote id).
    pub intersections: HashMap<ContextId, Vec<(VarId, VarId)>>,
}

impl Context {
    pub fn new(id: ContextId) -> Context {
        Context {
            id,
            code: Rc::new(Vec::new()),
            vars: HashMap::new(),
            procs: HashMap::new(),
            names: Rc::new(SegmentInfo::default()),
            ip: 0,
            eof: false,
            includes: HashMap::new(),
            intersections: HashMap::new(),
        }
    }
}
