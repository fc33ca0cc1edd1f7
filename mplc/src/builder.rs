use std::collections::HashMap;
use std::rc::Rc;

use matches::debug_assert_matches;
use mplbin::constants::{STRING_MAX, UNRESOLVED_TARGET};
use mplbin::{DataEntry, IfCond, Instr, TypeTag, Value};

use crate::error::Diagnostic;
use crate::line::{Command, CondSrc, LiteralKind, Rvalue, WriteArg};

/// Data-segment descriptor of an include, as seen by the packer.
#[derive(Debug, Default)]
pub struct IncludeInfo {
    pub vars: HashMap<String, u32>,
    pub procs: HashMap<String, u32>,
}

impl IncludeInfo {
    pub fn from_entries(entries: &[DataEntry]) -> IncludeInfo {
        let mut info = IncludeInfo::default();
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

/// Dense name→id map. Ids start at 1; 0 stays reserved for unresolved
/// references.
pub(crate) struct SymbolTable {
    next: u32,
    ids: HashMap<String, u32>,
    order: Vec<String>,
}

impl SymbolTable {
    fn new() -> SymbolTable {
        SymbolTable {
            next: 1,
            ids: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub(crate) fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(name.to_string(), id);
        self.order.push(name.to_string());
        id
    }

    pub(crate) fn get(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    /// Allocates an id without registering a name; used for imports.
    pub(crate) fn alloc(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Symbols in first-seen order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        let ids = &self.ids;
        self.order.iter().map(move |name| (&name[..], ids[name]))
    }
}

pub(crate) enum Bracket {
    If { instr: usize },
    Else { if_instr: usize, jump: usize, marker: usize },
    Define { jump: usize },
}

pub(crate) struct IncludeDecl {
    pub(crate) path: String,
    pub(crate) info: Rc<IncludeInfo>,
}

/// Walks the source line by line and emits one instruction blob per
/// command, deferring forward jumps, unresolved names and expression
/// payloads to the post-pass.
pub struct Builder {
    pub(crate) instr: Vec<Instr>,
    pub(crate) line_no: u32,
    pub(crate) line_index: HashMap<u32, i32>,
    pub(crate) forward: HashMap<u32, Vec<usize>>,
    pub(crate) brackets: Vec<Bracket>,
    pub(crate) exprs: Vec<(usize, String)>,
    pub(crate) unresolved: Vec<(String, usize)>,
    pub(crate) vars: SymbolTable,
    pub(crate) procs: SymbolTable,
    pub(crate) includes: Vec<IncludeDecl>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            instr: Vec::new(),
            line_no: 0,
            line_index: HashMap::new(),
            forward: HashMap::new(),
            brackets: Vec::new(),
            exprs: Vec::new(),
            unresolved: Vec::new(),
            vars: SymbolTable::new(),
            procs: SymbolTable::new(),
            includes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Starts the next source line: records its instruction index and
    /// patches any forward jump requests that were waiting for it.
    pub fn begin_line(&mut self) {
        self.line_no += 1;
        let index = self.next_index();
        self.line_index.insert(self.line_no, index);
        if let Some(waiting) = self.forward.remove(&self.line_no) {
            for idx in waiting {
                self.patch_jump(idx, index);
            }
        }
    }

    pub fn nop(&mut self) {
        self.emit(Instr::Nop);
    }

    pub fn invalid(&mut self, text: &str) {
        self.diagnostics.push(Diagnostic::Parse {
            line: self.line_no,
            text: text.trim().to_string(),
        });
        self.emit(Instr::Nop);
    }

    pub fn include(&mut self, path: String, info: Rc<IncludeInfo>) {
        self.includes.push(IncludeDecl { path, info });
    }

    pub fn command(&mut self, cmd: Command) {
        match cmd {
            Command::Set { name, rvalue, ty } => self.emit_set(name, rvalue, ty),
            Command::Push { name } => {
                let idx = self.emit(Instr::Push {
                    id: 0,
                    procedure: false,
                });
                self.unresolved.push((name.to_string(), idx));
            }
            Command::Write { arg } => match arg {
                WriteArg::Literal(text) => {
                    if text.len() > STRING_MAX {
                        self.invalid(text);
                    } else {
                        self.emit(Instr::WriteStr(text.to_string()));
                    }
                }
                WriteArg::Name(name) => {
                    let resolved = self.vars.get(name);
                    let idx = self.emit(Instr::WriteVar(resolved.unwrap_or(0)));
                    if resolved.is_none() {
                        self.unresolved.push((name.to_string(), idx));
                    }
                }
            },
            Command::Input { name, ty } => {
                if mpl::expr::is_reserved(name) {
                    self.invalid(name);
                    return;
                }
                let var = self.vars.intern(name);
                self.emit(Instr::Input { var, ty });
            }
            Command::Jump { line } => {
                if let Some(&target) = self.line_index.get(&line) {
                    self.emit(Instr::Jump { target });
                } else {
                    let idx = self.emit(Instr::Jump {
                        target: UNRESOLVED_TARGET,
                    });
                    self.forward.entry(line).or_insert_with(Vec::new).push(idx);
                }
            }
            Command::Define { name } => {
                let id = self.procs.intern(name);
                let start = self.next_index() + 2;
                self.emit(Instr::Define { id, start });
                let jump = self.emit(Instr::Jump {
                    target: UNRESOLVED_TARGET,
                });
                self.brackets.push(Bracket::Define { jump });
            }
            Command::Ret => {
                self.emit(Instr::Ret);
            }
            Command::Call { name } => {
                let resolved = self.procs.get(name);
                let idx = self.emit(Instr::Call {
                    id: resolved.unwrap_or(0),
                });
                if resolved.is_none() {
                    self.unresolved.push((name.to_string(), idx));
                }
            }
            Command::End => self.emit_end(),
            Command::EndElse => self.emit_else(),
            Command::IfBlock { cond } => {
                let instr = self.emit_if(cond, UNRESOLVED_TARGET);
                self.brackets.push(Bracket::If { instr });
            }
            Command::IfInline { cond, left, right } => {
                let base = self.next_index();
                self.emit_if(cond, base + 3);
                self.command(*left);
                self.emit(Instr::Jump { target: base + 4 });
                self.command(*right);
                self.emit(Instr::End);
            }
            Command::Include { .. } => unreachable!(),
        }
    }

    fn emit_set(&mut self, name: &str, rvalue: Rvalue, ty: TypeTag) {
        if mpl::expr::is_reserved(name) {
            self.invalid(name);
            return;
        }
        let var = self.vars.intern(name);
        match rvalue {
            Rvalue::Expr(src) => {
                let idx = self.emit(Instr::SetExpr {
                    var,
                    ty,
                    expr: String::new(),
                });
                self.exprs.push((idx, src.to_string()));
            }
            Rvalue::Name(linked) => {
                let resolved = self.vars.get(linked);
                let idx = self.emit(Instr::SetLinked {
                    var,
                    ty,
                    linked: resolved.unwrap_or(0),
                });
                if resolved.is_none() {
                    self.unresolved.push((linked.to_string(), idx));
                }
            }
            Rvalue::Literal(kind, text) => match literal_value(kind, text, ty) {
                Some(value) => {
                    self.emit(Instr::SetValue { var, value });
                }
                None => self.invalid(text),
            },
        }
    }

    fn emit_if(&mut self, cond: CondSrc, target: i32) -> usize {
        match cond {
            CondSrc::Expr(src) => {
                let idx = self.emit(Instr::If {
                    target,
                    cond: IfCond::Expr(String::new()),
                });
                self.exprs.push((idx, src.to_string()));
                idx
            }
            CondSrc::Name(name) => {
                let resolved = self.vars.get(name);
                let idx = self.emit(Instr::If {
                    target,
                    cond: IfCond::Var(resolved.unwrap_or(0)),
                });
                if resolved.is_none() {
                    self.unresolved.push((name.to_string(), idx));
                }
                idx
            }
        }
    }

    fn emit_else(&mut self) {
        match self.brackets.pop() {
            Some(Bracket::If { instr }) => {
                let jump = self.emit(Instr::Jump {
                    target: UNRESOLVED_TARGET,
                });
                let marker = self.emit(Instr::Else);
                self.brackets.push(Bracket::Else {
                    if_instr: instr,
                    jump,
                    marker,
                });
            }
            other => {
                if let Some(bracket) = other {
                    self.brackets.push(bracket);
                }
                self.invalid("END ?");
            }
        }
    }

    fn emit_end(&mut self) {
        match self.brackets.pop() {
            None => {
                self.emit(Instr::Eof);
            }
            Some(Bracket::If { instr }) => {
                let here = self.next_index();
                self.patch_if(instr, here);
                self.emit(Instr::End);
            }
            Some(Bracket::Else {
                if_instr,
                jump,
                marker,
            }) => {
                let here = self.next_index();
                self.patch_if(if_instr, marker as i32);
                self.patch_jump(jump, here);
                self.emit(Instr::End);
            }
            Some(Bracket::Define { jump }) => {
                let here = self.next_index();
                self.emit(Instr::Ret);
                self.patch_jump(jump, here + 1);
            }
        }
    }

    fn next_index(&self) -> i32 {
        self.instr.len() as i32
    }

    fn emit(&mut self, instr: Instr) -> usize {
        self.instr.push(instr);
        self.instr.len() - 1
    }

    fn patch_jump(&mut self, idx: usize, target: i32) {
        debug_assert_matches!(self.instr[idx], Instr::Jump { .. });
        if let Instr::Jump { target: slot } = &mut self.instr[idx] {
            *slot = target;
        }
    }

    fn patch_if(&mut self, idx: usize, target: i32) {
        debug_assert_matches!(self.instr[idx], Instr::If { .. });
        if let Instr::If { target: slot, .. } = &mut self.instr[idx] {
            *slot = target;
        }
    }
}

fn literal_value(kind: LiteralKind, text: &str, ty: TypeTag) -> Option<Value> {
    match ty {
        TypeTag::INT => match kind {
            LiteralKind::Int => text.parse().ok().map(Value::Int),
            _ => None,
        },
        TypeTag::FLOAT => match kind {
            LiteralKind::Int | LiteralKind::Float => text.parse().ok().map(Value::Float),
            _ => None,
        },
        TypeTag::BOOL => match kind {
            LiteralKind::Bool => Some(Value::Bool(text == "TRUE")),
            _ => None,
        },
        TypeTag::STRING => match kind {
            LiteralKind::Str if text.len() <= STRING_MAX => Some(Value::Str(text.to_string())),
            _ => None,
        },
    }
}
