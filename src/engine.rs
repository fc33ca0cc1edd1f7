use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mplbin::{IfCond, Instr, TypeTag};

use crate::cell::{ProcDescriptor, ProcEntry, Storage, VarCell};
use crate::console::Console;
use crate::context::{Cond, Context, RtInstr, SegmentInfo};
use crate::expr::{self, EvalError, ExprError, Scalar};
use crate::value;
use crate::{ContextId, InstrIndex, VarId, UNRESOLVED_ID};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ExitCode {
    Halted,           // Top-level EOF was reached (normal shutdown)
    DivisionByZero,   // Division or modulo by zero
    UndefinedObject,  // Referenced variable or procedure does not exist
    EmptyReturnStack, // RET with no pending call
    InvalidInput,     // INPUT line did not parse as the declared type
    BadJump,          // Instruction pointer left the code segment
    TypeError,        // Value could not be coerced to the declared type
    IoError,          // Console read or write failed
}

#[derive(Debug)]
pub enum Error {
    Module(PathBuf, mplbin::Error),
    Expr(String, ExprError),
    Include(String, ExitCode),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Module(path, err) => {
                write!(f, "Loading \"{}\" failed: {}", path.display(), err)
            }
            Error::Expr(src, err) => write!(f, "Compiling expression \"{}\" failed: {}", src, err),
            Error::Include(name, code) => {
                write!(f, "Include \"{}\" stopped with {:?}.", name, code)
            }
        }
    }
}

impl std::error::Error for Error {}

struct Frame {
    context: ContextId,
    ip: InstrIndex,
}

/// The virtual machine: every loaded context, the module cache, the return
/// stack and the console. One engine corresponds to one run of the
/// interpreter; dropping it releases every context and the cache.
pub struct Engine {
    contexts: HashMap<ContextId, Context>,
    cache: HashMap<String, ContextId>,
    return_stack: Vec<Frame>,
    current: ContextId,
    next_context: ContextId,
    root: PathBuf,
    console: Box<dyn Console>,
}

fn lower(instr: &Instr) -> Result<RtInstr, Error> {
    let compile = |src: &String| {
        expr::compile(src)
            .map(Rc::new)
            .map_err(|err| Error::Expr(src.clone(), err))
    };
    Ok(match instr {
        Instr::Nop | Instr::Include { .. } => RtInstr::Nop,
        Instr::SetValue { var, value } => RtInstr::SetValue {
            var: *var,
            value: value.clone(),
        },
        Instr::SetLinked { var, ty, linked } => RtInstr::SetLinked {
            var: *var,
            ty: *ty,
            linked: *linked,
        },
        Instr::SetExpr { var, ty, expr } => RtInstr::SetExpr {
            var: *var,
            ty: *ty,
            expr: compile(expr)?,
        },
        Instr::Push { id, procedure } => RtInstr::Push {
            id: *id,
            procedure: *procedure,
        },
        Instr::Jump { target } => RtInstr::Jump { target: *target },
        Instr::If { target, cond } => RtInstr::If {
            target: *target,
            cond: match cond {
                IfCond::Var(var) => Cond::Var(*var),
                IfCond::Expr(src) => Cond::Expr(compile(src)?),
            },
        },
        Instr::Else => RtInstr::Else,
        Instr::End => RtInstr::End,
        Instr::Define { id, start } => RtInstr::Define {
            id: *id,
            start: *start,
        },
        Instr::Ret => RtInstr::Ret,
        Instr::Call { id } => RtInstr::Call { id: *id },
        Instr::WriteStr(text) => RtInstr::WriteStr(Rc::from(text.as_str())),
        Instr::WriteVar(var) => RtInstr::WriteVar(*var),
        Instr::Input { var, ty } => RtInstr::Input {
            var: *var,
            ty: *ty,
        },
        Instr::Eof => RtInstr::Eof,
    })
}

fn exit_for(err: &EvalError) -> ExitCode {
    match err {
        EvalError::DivisionByZero => ExitCode::DivisionByZero,
        EvalError::Undefined(_) => ExitCode::UndefinedObject,
        EvalError::Type { .. } => ExitCode::TypeError,
    }
}

struct ContextFetch<'e> {
    engine: &'e mut Engine,
    context: ContextId,
}

impl<'e> expr::Fetch for ContextFetch<'e> {
    fn fetch(&mut self, id: u32) -> Result<Scalar, EvalError> {
        self.engine.read_var(self.context, id).map(Scalar::from)
    }
}

impl Engine {
    pub fn new(console: Box<dyn Console>) -> Engine {
        Engine::with_root(PathBuf::from("."), console)
    }

    /// Creates an engine whose include paths resolve against `root`.
    pub fn with_root(root: PathBuf, console: Box<dyn Console>) -> Engine {
        Engine {
            contexts: HashMap::new(),
            cache: HashMap::new(),
            return_stack: Vec::new(),
            current: 0,
            next_context: 1,
            root,
            console,
        }
    }

    /// Loads a module (reusing the cache), then runs it to its EOF.
    pub fn execute_file<P: AsRef<Path>>(&mut self, path: P) -> Result<ExitCode, Error> {
        let (id, _) = self.load_module(path.as_ref())?;
        Ok(self.run(id))
    }

    fn load_module(&mut self, path: &Path) -> Result<(ContextId, bool), Error> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if let Some(&id) = self.cache.get(&stem) {
            return Ok((id, false));
        }

        let module =
            mplbin::read_file(path).map_err(|err| Error::Module(path.to_owned(), err))?;

        let id = self.next_context;
        self.next_context += 1;
        self.cache.insert(stem, id);
        self.contexts.insert(id, Context::new(id));

        let previous = self.current;
        self.current = id;

        // Includes load recursively; a fresh include is executed to its EOF
        // right away, with a context switch there and back.
        let mut includes = HashMap::new();
        let mut executed = Vec::new();
        for instr in module.includes() {
            if let Instr::Include { index, path: name } = instr {
                let full = self.root.join(name);
                let (include_id, fresh) = self.load_module(&full)?;
                includes.insert(*index, include_id);
                if fresh {
                    self.switch_to(include_id);
                    let code = self.run(include_id);
                    self.switch_to(id);
                    if code != ExitCode::Halted {
                        return Err(Error::Include(name.clone(), code));
                    }
                    executed.push(include_id);
                }
            }
        }

        let info = Rc::new(SegmentInfo::from_entries(module.data()));
        let mut vars = HashMap::new();
        let mut procs = HashMap::new();
        let mut intersections: HashMap<ContextId, Vec<(VarId, VarId)>> = HashMap::new();

        for entry in module.data() {
            if entry.procedure {
                if let Some(include_index) = entry.import {
                    if let Some(&target) = includes.get(&include_index) {
                        if let Some(&remote) =
                            self.context_procs(target).and_then(|p| p.get(&entry.name))
                        {
                            procs.insert(
                                entry.id,
                                ProcEntry::Imported {
                                    context: target,
                                    remote,
                                },
                            );
                        }
                    }
                }
                continue;
            }

            if let Some(include_index) = entry.import {
                if let Some(&target) = includes.get(&include_index) {
                    if let Some(&remote) = self.context_vars(target).and_then(|v| v.get(&entry.name)) {
                        let ty = self
                            .contexts
                            .get(&target)
                            .and_then(|c| c.vars.get(&remote))
                            .map(|cell| cell.ty)
                            .unwrap_or(TypeTag::INT);
                        vars.insert(
                            entry.id,
                            VarCell {
                                context: id,
                                ty,
                                storage: Storage::Linked {
                                    context: target,
                                    var: remote,
                                },
                            },
                        );
                    }
                }
            }
            for (include_index, remote) in &entry.intersections {
                if let Some(&target) = includes.get(include_index) {
                    intersections
                        .entry(target)
                        .or_insert_with(Vec::new)
                        .push((entry.id, *remote));
                }
            }
        }

        let mut code = Vec::with_capacity(module.instructions().len());
        for instr in module.instructions() {
            code.push(lower(instr)?);
        }

        self.contexts.insert(
            id,
            Context {
                id,
                code: Rc::new(code),
                vars,
                procs,
                names: info,
                ip: 0,
                eof: false,
                includes,
                intersections,
            },
        );

        // The intersection tables above did not exist yet when these
        // includes ran, so the switch back copied nothing; propagate their
        // shared values now.
        for include_id in executed {
            self.writeback(include_id, id);
        }

        self.current = previous;
        Ok((id, true))
    }

    fn context_vars(&self, id: ContextId) -> Option<&HashMap<String, VarId>> {
        self.contexts.get(&id).map(|c| &c.names.vars)
    }

    fn context_procs(&self, id: ContextId) -> Option<&HashMap<String, u32>> {
        self.contexts.get(&id).map(|c| &c.names.procs)
    }

    /// Runs the given context until its EOF flag is set.
    fn run(&mut self, top: ContextId) -> ExitCode {
        if let Some(ctx) = self.contexts.get_mut(&top) {
            ctx.ip = 0;
            ctx.eof = false;
        }
        self.current = top;
        loop {
            let done = match self.contexts.get(&top) {
                Some(ctx) => ctx.eof,
                None => return ExitCode::BadJump,
            };
            if done {
                return ExitCode::Halted;
            }
            if let Some(code) = self.step() {
                return code;
            }
        }
    }

    fn step(&mut self) -> Option<ExitCode> {
        let cur = self.current;
        let (code, ip) = match self.contexts.get(&cur) {
            Some(ctx) => (Rc::clone(&ctx.code), ctx.ip),
            None => return Some(ExitCode::BadJump),
        };
        if ip < 0 || ip as usize >= code.len() {
            return Some(ExitCode::BadJump);
        }

        match &code[ip as usize] {
            RtInstr::Nop | RtInstr::Else | RtInstr::End => self.set_ip(ip + 1),
            RtInstr::SetValue { var, value } => {
                self.store(cur, *var, value.tag(), Storage::Immediate(value.clone()));
                self.set_ip(ip + 1);
            }
            RtInstr::SetLinked { var, ty, linked } => {
                self.store(
                    cur,
                    *var,
                    *ty,
                    Storage::Linked {
                        context: cur,
                        var: *linked,
                    },
                );
                self.set_ip(ip + 1);
            }
            RtInstr::SetExpr { var, ty, expr } => {
                // Evaluate before the cell is replaced, so an expression
                // naming its own target reads the previous value.
                let value = match self
                    .eval_in(cur, expr)
                    .and_then(|scalar| value::coerce(scalar, *ty))
                {
                    Ok(value) => value,
                    Err(err) => return Some(exit_for(&err)),
                };
                self.store(
                    cur,
                    *var,
                    *ty,
                    Storage::Expr {
                        tree: Rc::clone(expr),
                        last: value,
                    },
                );
                self.set_ip(ip + 1);
            }
            RtInstr::Push { id, procedure } => {
                if let Some(ctx) = self.contexts.get_mut(&cur) {
                    if *procedure {
                        ctx.procs.remove(id);
                    } else {
                        ctx.vars.remove(id);
                    }
                }
                self.set_ip(ip + 1);
            }
            RtInstr::Jump { target } => self.set_ip(*target),
            RtInstr::If { target, cond } => {
                let result = match cond {
                    Cond::Var(var) => self
                        .read_var(cur, *var)
                        .and_then(|v| Scalar::from(v).as_bool()),
                    Cond::Expr(tree) => {
                        let tree = Rc::clone(tree);
                        self.eval_in(cur, &tree).and_then(|s| s.as_bool())
                    }
                };
                match result {
                    Ok(true) => self.set_ip(ip + 1),
                    Ok(false) => self.set_ip(*target),
                    Err(err) => return Some(exit_for(&err)),
                }
            }
            RtInstr::Define { id, start } => {
                if let Some(ctx) = self.contexts.get_mut(&cur) {
                    ctx.procs.insert(
                        *id,
                        ProcEntry::Local(ProcDescriptor {
                            context: cur,
                            id: *id,
                            start: *start,
                        }),
                    );
                }
                self.set_ip(ip + 1);
            }
            RtInstr::Call { id } => {
                let descriptor = match self.resolve_proc(cur, *id) {
                    Some(d) => d,
                    None => return Some(ExitCode::UndefinedObject),
                };
                if descriptor.context != cur {
                    self.switch_to(descriptor.context);
                }
                self.return_stack.push(Frame {
                    context: cur,
                    ip: ip + 1,
                });
                self.set_ip(descriptor.start);
            }
            RtInstr::Ret => match self.return_stack.pop() {
                Some(frame) => {
                    if frame.context != self.current {
                        self.switch_to(frame.context);
                    }
                    self.set_ip(frame.ip);
                }
                None => return Some(ExitCode::EmptyReturnStack),
            },
            RtInstr::WriteStr(text) => {
                let text = Rc::clone(text);
                if self.console.write_line(&text).is_err() {
                    return Some(ExitCode::IoError);
                }
                self.set_ip(ip + 1);
            }
            RtInstr::WriteVar(var) => {
                let value = match self.read_var(cur, *var) {
                    Ok(value) => value,
                    Err(err) => return Some(exit_for(&err)),
                };
                if self.console.write_line(&value.to_string()).is_err() {
                    return Some(ExitCode::IoError);
                }
                self.set_ip(ip + 1);
            }
            RtInstr::Input { var, ty } => {
                let line = match self.console.read_line() {
                    Ok(line) => line,
                    Err(_) => return Some(ExitCode::IoError),
                };
                let value = match value::parse_input(&line, *ty) {
                    Some(value) => value,
                    None => return Some(ExitCode::InvalidInput),
                };
                self.store(cur, *var, *ty, Storage::Immediate(value));
                self.set_ip(ip + 1);
            }
            RtInstr::Eof => {
                if let Some(ctx) = self.contexts.get_mut(&cur) {
                    ctx.eof = true;
                }
                self.set_ip(ip + 1);
            }
        }
        None
    }

    fn set_ip(&mut self, ip: InstrIndex) {
        if let Some(ctx) = self.contexts.get_mut(&self.current) {
            ctx.ip = ip;
        }
    }

    fn store(&mut self, context: ContextId, var: VarId, ty: TypeTag, storage: Storage) {
        if let Some(ctx) = self.contexts.get_mut(&context) {
            ctx.vars.insert(
                var,
                VarCell {
                    context,
                    ty,
                    storage,
                },
            );
        }
    }

    /// Reads a variable, resolving links across contexts. Immediate and
    /// expression cells already hold a value of the declared type;
    /// expression cells hand back the value memoized when their SET ran.
    fn read_var(&mut self, context: ContextId, var: VarId) -> Result<mplbin::Value, EvalError> {
        if var == UNRESOLVED_ID {
            return Err(EvalError::Undefined(var));
        }
        let (ty, storage) = match self.contexts.get(&context).and_then(|c| c.vars.get(&var)) {
            Some(cell) => (cell.ty, cell.storage.clone()),
            None => return Err(EvalError::Undefined(var)),
        };
        match storage {
            Storage::Immediate(value) => Ok(value),
            Storage::Linked {
                context: target,
                var: remote,
            } => {
                let value = self.read_var(target, remote)?;
                value::coerce(Scalar::from(value), ty)
            }
            Storage::Expr { last, .. } => Ok(last),
        }
    }

    fn eval_in(&mut self, context: ContextId, tree: &Rc<expr::Expr>) -> Result<Scalar, EvalError> {
        let tree = Rc::clone(tree);
        let mut fetch = ContextFetch {
            engine: self,
            context,
        };
        tree.eval(&mut fetch)
    }

    fn resolve_proc(&self, context: ContextId, id: u32) -> Option<ProcDescriptor> {
        let mut context = context;
        let mut id = id;
        // Import chains are at most one hop per module; the bound guards
        // against a malformed binary.
        for _ in 0..=self.contexts.len() {
            match self.contexts.get(&context)?.procs.get(&id)? {
                ProcEntry::Local(descriptor) => return Some(*descriptor),
                ProcEntry::Imported {
                    context: target,
                    remote,
                } => {
                    context = *target;
                    id = *remote;
                }
            }
        }
        None
    }

    /// Switches the active context, copying shared variables from the
    /// context being left into the one being entered. The pairs come from
    /// whichever side owns the inclusion.
    fn switch_to(&mut self, to: ContextId) {
        if to == self.current {
            return;
        }
        let from = self.current;
        self.writeback(from, to);
        self.current = to;
    }

    fn writeback(&mut self, from: ContextId, to: ContextId) {
        let mut pairs: Vec<(VarId, VarId)> = Vec::new();
        if let Some(list) = self.contexts.get(&from).and_then(|c| c.intersections.get(&to)) {
            pairs.extend(list.iter().cloned());
        }
        if let Some(list) = self.contexts.get(&to).and_then(|c| c.intersections.get(&from)) {
            pairs.extend(list.iter().map(|&(local, remote)| (remote, local)));
        }
        for (src, dst) in pairs {
            if let Ok(value) = self.read_var(from, src) {
                self.store_shared(to, dst, value);
            }
        }
    }

    /// SET-style store used by writeback: an existing cell keeps its
    /// declared type, a missing one is created with the value's own type.
    fn store_shared(&mut self, context: ContextId, var: VarId, value: mplbin::Value) {
        let coerced = match self.contexts.get(&context).and_then(|c| c.vars.get(&var)) {
            Some(cell) => match value::coerce(Scalar::from(value), cell.ty) {
                Ok(v) => v,
                Err(_) => return,
            },
            None => value,
        };
        let cell = VarCell::immediate(context, coerced);
        if let Some(ctx) = self.contexts.get_mut(&context) {
            ctx.vars.insert(var, cell);
        }
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, stem: &str) -> Option<ContextId> {
        self.cache.get(stem).copied()
    }
}
