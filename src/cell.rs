use std::rc::Rc;

use mplbin::{TypeTag, Value};

use crate::expr::Expr;
use crate::{ContextId, InstrIndex, ProcId, VarId};

/// How a variable cell produces its value: an immediate, a lazy link to a
/// variable in some context, or a precompiled expression. An expression
/// cell evaluates when its SET executes, against the variable values
/// current at that moment, and keeps the tree (its evaluation kind) plus
/// the computed value; reads and intersection writeback return `last`
/// without re-evaluating.
#[derive(Clone, Debug)]
pub enum Storage {
    Immediate(Value),
    Linked { context: ContextId, var: VarId },
    Expr { tree: Rc<Expr>, last: Value },
}

/// A variable cell. Reads coerce the produced value into `ty`.
#[derive(Clone, Debug)]
pub struct VarCell {
    pub context: ContextId,
    pub ty: TypeTag,
    pub storage: Storage,
}

impl VarCell {
    pub fn immediate(context: ContextId, value: Value) -> VarCell {
        VarCell {
            context,
            ty: value.tag(),
            storage: Storage::Immediate(value),
        }
    }
}

/// Where a procedure's body starts. Procedures are parameterless; they
/// communicate through shared variables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcDescriptor {
    pub context: ContextId,
    pub id: ProcId,
    pub start: InstrIndex,
}

/// A procedure slot in a context: defined here, or re-resolved in the
/// include that owns it.
#[derive(Clone, Debug)]
pub enum ProcEntry {
    Local(ProcDescriptor),
    Imported { context: ContextId, remote: ProcId },
}
