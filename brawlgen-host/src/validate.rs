//! Static admission checks on a parsed agent
//!
//! Three passes, in order: denylisted names and dunder access, the import
//! allowlist, and the `act(state)` entrypoint.

use crate::error::AdmissionError;
use crate::script::ast::*;
use crate::script::ALLOWED_MODULES;

/// Name of the per-frame entrypoint
pub const ENTRYPOINT: &str = "act";

/// Names that reach outside the sandbox or inspect it
pub const DENIED_NAMES: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "open",
    "__import__",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "input",
    "breakpoint",
    "exit",
    "quit",
    "help",
    "dir",
    "type",
    "object",
    "super",
    "memoryview",
];

/// Run every static check
pub fn validate(module: &Module) -> Result<(), AdmissionError> {
    check_names(&module.body)?;
    check_imports(&module.body)?;
    check_entrypoint(module)
}

fn denied(name: &str) -> bool {
    if name == "__name__" {
        return false;
    }
    DENIED_NAMES.contains(&name) || name.starts_with("__")
}

fn forbid(name: &str, line: usize) -> Result<(), AdmissionError> {
    if denied(name) {
        return Err(AdmissionError::ForbiddenOp {
            line,
            what: name.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// DENYLIST
// ============================================================================

fn check_names(body: &[Stmt]) -> Result<(), AdmissionError> {
    for stmt in body {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Import(names) => {
                for (module, alias) in names {
                    forbid(module, line)?;
                    if let Some(a) = alias {
                        forbid(a, line)?;
                    }
                }
            }
            StmtKind::FromImport { module, names } => {
                forbid(module, line)?;
                for (name, alias) in names {
                    forbid(name, line)?;
                    if let Some(a) = alias {
                        forbid(a, line)?;
                    }
                }
            }
            StmtKind::Def(def) => {
                forbid(&def.name, line)?;
                for param in &def.params {
                    forbid(&param.name, line)?;
                    if let Some(d) = &param.default {
                        check_expr(d, line)?;
                    }
                }
                check_names(&def.body)?;
            }
            StmtKind::Return(value) => {
                if let Some(v) = value {
                    check_expr(v, line)?;
                }
            }
            StmtKind::If { branches, orelse } => {
                for (cond, block) in branches {
                    check_expr(cond, line)?;
                    check_names(block)?;
                }
                check_names(orelse)?;
            }
            StmtKind::While { cond, body } => {
                check_expr(cond, line)?;
                check_names(body)?;
            }
            StmtKind::For { target, iter, body } => {
                check_target(target, line)?;
                check_expr(iter, line)?;
                check_names(body)?;
            }
            StmtKind::Assign { targets, value } => {
                for t in targets {
                    check_target(t, line)?;
                }
                check_expr(value, line)?;
            }
            StmtKind::AugAssign { target, value, .. } => {
                check_target(target, line)?;
                check_expr(value, line)?;
            }
            StmtKind::Try {
                body,
                handler,
                orelse,
                finally,
            } => {
                check_names(body)?;
                if let Some(h) = handler {
                    if let Some(alias) = &h.alias {
                        forbid(alias, line)?;
                    }
                    check_names(&h.body)?;
                }
                check_names(orelse)?;
                check_names(finally)?;
            }
            StmtKind::Global(names) => {
                for n in names {
                    forbid(n, line)?;
                }
            }
            StmtKind::Expr(e) => check_expr(e, line)?,
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        }
    }
    Ok(())
}

fn check_target(target: &Target, line: usize) -> Result<(), AdmissionError> {
    match target {
        Target::Name(n) => forbid(n, line),
        Target::Subscript(obj, index) => {
            check_expr(obj, line)?;
            check_expr(index, line)
        }
        Target::Attribute(obj, attr) => {
            check_expr(obj, line)?;
            forbid(attr, line)
        }
        Target::Tuple(items) => items.iter().try_for_each(|t| check_target(t, line)),
    }
}

fn check_comprehensions(generators: &[Comprehension], line: usize) -> Result<(), AdmissionError> {
    for g in generators {
        check_target(&g.target, line)?;
        check_expr(&g.iter, line)?;
        for c in &g.conds {
            check_expr(c, line)?;
        }
    }
    Ok(())
}

fn check_expr(expr: &Expr, line: usize) -> Result<(), AdmissionError> {
    match expr {
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None => Ok(()),
        Expr::Name(n) => forbid(n, line),
        Expr::List(items) | Expr::Tuple(items) => {
            items.iter().try_for_each(|e| check_expr(e, line))
        }
        Expr::Dict(entries) => entries.iter().try_for_each(|(k, v)| {
            check_expr(k, line)?;
            check_expr(v, line)
        }),
        Expr::Attribute(obj, attr) => {
            check_expr(obj, line)?;
            forbid(attr, line)
        }
        Expr::Subscript(obj, index) => {
            check_expr(obj, line)?;
            check_expr(index, line)
        }
        Expr::Slice(a, b, c) => [a, b, c]
            .into_iter()
            .flatten()
            .try_for_each(|e| check_expr(e, line)),
        Expr::Call { func, args, kwargs } => {
            check_expr(func, line)?;
            args.iter().try_for_each(|e| check_expr(e, line))?;
            kwargs.iter().try_for_each(|(_, e)| check_expr(e, line))
        }
        Expr::Unary(_, e) => check_expr(e, line),
        Expr::Binary(_, a, b) | Expr::BoolOp(_, a, b) => {
            check_expr(a, line)?;
            check_expr(b, line)
        }
        Expr::Compare(first, rest) => {
            check_expr(first, line)?;
            rest.iter().try_for_each(|(_, e)| check_expr(e, line))
        }
        Expr::IfExp { cond, then, orelse } => {
            check_expr(cond, line)?;
            check_expr(then, line)?;
            check_expr(orelse, line)
        }
        Expr::ListComp { elt, generators } => {
            check_expr(elt, line)?;
            check_comprehensions(generators, line)
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            check_expr(key, line)?;
            check_expr(value, line)?;
            check_comprehensions(generators, line)
        }
    }
}

// ============================================================================
// IMPORT ALLOWLIST
// ============================================================================

fn allowed(module: &str) -> bool {
    let root = module.split('.').next().unwrap_or(module);
    ALLOWED_MODULES.contains(&root) && root == module
}

fn check_imports(body: &[Stmt]) -> Result<(), AdmissionError> {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import(names) => {
                for (module, _) in names {
                    if !allowed(module) {
                        return Err(AdmissionError::ForbiddenImport {
                            line: stmt.line,
                            module: module.clone(),
                        });
                    }
                }
            }
            StmtKind::FromImport { module, .. } => {
                if !allowed(module) {
                    return Err(AdmissionError::ForbiddenImport {
                        line: stmt.line,
                        module: module.clone(),
                    });
                }
            }
            StmtKind::Def(def) => check_imports(&def.body)?,
            StmtKind::If { branches, orelse } => {
                for (_, block) in branches {
                    check_imports(block)?;
                }
                check_imports(orelse)?;
            }
            StmtKind::While { body, .. } | StmtKind::For { body, .. } => check_imports(body)?,
            StmtKind::Try {
                body,
                handler,
                orelse,
                finally,
            } => {
                check_imports(body)?;
                if let Some(h) = handler {
                    check_imports(&h.body)?;
                }
                check_imports(orelse)?;
                check_imports(finally)?;
            }
            _ => {}
        }
    }
    Ok(())
}

// ============================================================================
// ENTRYPOINT
// ============================================================================

fn check_entrypoint(module: &Module) -> Result<(), AdmissionError> {
    let def = module
        .body
        .iter()
        .rev()
        .find_map(|stmt| match &stmt.kind {
            StmtKind::Def(def) if def.name == ENTRYPOINT => Some(def),
            _ => None,
        })
        .ok_or_else(|| {
            AdmissionError::MissingEntrypoint(format!(
                "no top-level function '{}' defined",
                ENTRYPOINT
            ))
        })?;

    if def.params.is_empty() || def.required_params() > 1 {
        return Err(AdmissionError::MissingEntrypoint(format!(
            "'{}' must take exactly one argument (line {})",
            ENTRYPOINT, def.line
        )));
    }
    Ok(())
}
