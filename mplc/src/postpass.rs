use std::collections::HashMap;

use mpl::expr::{self, ExprError};
use mplbin::{DataEntry, IfCond, Instr, Module};

use crate::builder::{Builder, IncludeDecl, SymbolTable};
use crate::error::{Diagnostic, Error};

/// Resolves names against the local symbol tables first, then against the
/// includes in declaration order. The first include hit synthesizes a local
/// id for the imported symbol so further references reuse it; names found
/// nowhere report a diagnostic and resolve to the id-0 sentinel.
struct Resolver<'a> {
    vars: &'a mut SymbolTable,
    procs: &'a mut SymbolTable,
    includes: &'a [IncludeDecl],
    imported_vars: HashMap<String, u32>,
    imported_procs: HashMap<String, u32>,
    entries: &'a mut Vec<DataEntry>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> Resolver<'a> {
    fn missing(&mut self, name: &str) -> u32 {
        self.diagnostics.push(Diagnostic::Unresolved {
            name: name.to_string(),
        });
        0
    }

    fn import_var(&mut self, name: &str) -> Option<u32> {
        if let Some(&id) = self.imported_vars.get(name) {
            return Some(id);
        }
        for (index, include) in self.includes.iter().enumerate() {
            if include.info.vars.contains_key(name) {
                let id = self.vars.alloc();
                self.imported_vars.insert(name.to_string(), id);
                self.entries.push(DataEntry {
                    import: Some(index as u32),
                    ..DataEntry::variable(id, name)
                });
                return Some(id);
            }
        }
        None
    }

    fn import_proc(&mut self, name: &str) -> Option<u32> {
        if let Some(&id) = self.imported_procs.get(name) {
            return Some(id);
        }
        for (index, include) in self.includes.iter().enumerate() {
            if include.info.procs.contains_key(name) {
                let id = self.procs.alloc();
                self.imported_procs.insert(name.to_string(), id);
                self.entries.push(DataEntry {
                    import: Some(index as u32),
                    ..DataEntry::procedure(id, name)
                });
                return Some(id);
            }
        }
        None
    }

    fn var(&mut self, name: &str) -> u32 {
        if let Some(id) = self.vars.get(name) {
            return id;
        }
        match self.import_var(name) {
            Some(id) => id,
            None => self.missing(name),
        }
    }

    fn procedure(&mut self, name: &str) -> u32 {
        if let Some(id) = self.procs.get(name) {
            return id;
        }
        match self.import_proc(name) {
            Some(id) => id,
            None => self.missing(name),
        }
    }

    /// PUSH targets may name either kind; variables win ties.
    fn any(&mut self, name: &str) -> (u32, bool) {
        if let Some(id) = self.vars.get(name) {
            return (id, false);
        }
        if let Some(id) = self.procs.get(name) {
            return (id, true);
        }
        if let Some(id) = self.import_var(name) {
            return (id, false);
        }
        if let Some(id) = self.import_proc(name) {
            return (id, true);
        }
        (self.missing(name), false)
    }
}

/// Rewrites bare variable names in an expression string to `@id` form.
/// Reserved names (literals, intrinsics, constants) pass through.
fn substitute(src: &str, resolver: &mut Resolver) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c.is_ascii_alphabetic() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(next, d)) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    chars.next();
                    end = next + d.len_utf8();
                } else {
                    break;
                }
            }
            let name = &src[start..end];
            if expr::is_reserved(name) {
                out.push_str(name);
            } else {
                out.push('@');
                out.push_str(&resolver.var(name).to_string());
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Runs the three post-pass stages and assembles the module: include
/// intersection marking, unresolved-name resolution, and expression
/// finalization with a validation compile.
pub(crate) fn finish(builder: Builder) -> Result<(Module, Vec<Diagnostic>), Error> {
    let Builder {
        mut instr,
        mut vars,
        mut procs,
        includes,
        exprs,
        unresolved,
        mut diagnostics,
        ..
    } = builder;

    // Stage 1: mark locally owned variables that also appear in includes.
    let mut entries = Vec::new();
    for (name, id) in vars.iter() {
        let mut entry = DataEntry::variable(id, name);
        for (index, include) in includes.iter().enumerate() {
            if let Some(&remote) = include.info.vars.get(name) {
                entry.intersections.push((index as u32, remote));
            }
        }
        entries.push(entry);
    }
    for (name, id) in procs.iter() {
        entries.push(DataEntry::procedure(id, name));
    }

    let mut resolver = Resolver {
        vars: &mut vars,
        procs: &mut procs,
        includes: &includes[..],
        imported_vars: HashMap::new(),
        imported_procs: HashMap::new(),
        entries: &mut entries,
        diagnostics: &mut diagnostics,
    };

    // Stage 2: fill the deferred name slots.
    for (name, idx) in unresolved {
        match &mut instr[idx] {
            Instr::SetLinked { linked, .. } => *linked = resolver.var(&name),
            Instr::WriteVar(var) => *var = resolver.var(&name),
            Instr::If {
                cond: IfCond::Var(var),
                ..
            } => *var = resolver.var(&name),
            Instr::Call { id } => *id = resolver.procedure(&name),
            Instr::Push { id, procedure } => {
                let (resolved, is_proc) = resolver.any(&name);
                *id = resolved;
                *procedure = is_proc;
            }
            _ => unreachable!(),
        }
    }

    // Stage 3: substitute names in expression strings and validate them.
    for (idx, raw) in exprs {
        let substituted = substitute(&raw, &mut resolver);
        match expr::compile(&substituted) {
            Ok(_) => {}
            Err(err @ ExprError::Type { .. }) | Err(err @ ExprError::BadArity { .. }) => {
                return Err(Error::Type(substituted, err));
            }
            Err(err) => resolver.diagnostics.push(Diagnostic::Expr {
                text: raw.clone(),
                message: err.to_string(),
            }),
        }
        match &mut instr[idx] {
            Instr::SetExpr { expr, .. } => *expr = substituted,
            Instr::If { cond, .. } => *cond = IfCond::Expr(substituted),
            _ => unreachable!(),
        }
    }

    drop(resolver);

    let include_instrs = includes
        .iter()
        .enumerate()
        .map(|(index, include)| Instr::Include {
            index: index as u32,
            path: include.path.clone(),
        })
        .collect();

    Ok((Module::from(include_instrs, instr, entries), diagnostics))
}
