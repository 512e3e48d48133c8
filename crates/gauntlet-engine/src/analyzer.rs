//! Static security analysis of submitted source.
//!
//! The analyzer parses source host-side and walks the whole tree against a
//! [`DenyPolicy`](crate::policy::DenyPolicy) - no interpreter involved, so
//! the policy is unit-testable on its own. Two constructs are flagged:
//!
//! - `import X` / `from X import …` whose top-level module name is denied;
//! - direct calls whose callee is a bare denied name (`eval(…)`), wherever
//!   they appear in the tree. Attribute calls (`foo.eval(…)`) are not bare
//!   names and pass.
//!
//! Unparsable source fails closed with a syntax diagnostic. Verdicts are
//! produced fresh for every request and never cached.

use std::fmt;

use rustpython_parser::ast::{self, Expr, Stmt};
use rustpython_parser::Parse;

use crate::policy::DenyPolicy;

/// A single policy finding, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// An import statement named a denied module root.
    BannedModule(String),
    /// A direct call targeted a denied builtin.
    BannedCall(String),
    /// The source did not parse; nothing was analyzed.
    Unparsable(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::BannedModule(module) => {
                write!(f, "import of restricted module '{module}'")
            }
            Violation::BannedCall(name) => write!(f, "call to restricted builtin '{name}'"),
            Violation::Unparsable(message) => write!(f, "{message}"),
        }
    }
}

/// Outcome of one analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityVerdict {
    /// Findings in the order they were discovered.
    pub violations: Vec<Violation>,
}

impl SecurityVerdict {
    fn unparsable(message: String) -> Self {
        Self {
            violations: vec![Violation::Unparsable(message)],
        }
    }

    /// Safe means no violations and no parse failure.
    pub fn safe(&self) -> bool {
        self.violations.is_empty()
    }

    /// Whether the verdict is a parse failure rather than a policy finding.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self.violations.first(), Some(Violation::Unparsable(_)))
    }

    /// All diagnostics joined in discovery order.
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(Violation::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Walks an AST against a deny policy.
pub struct SecurityAnalyzer<'a> {
    policy: &'a DenyPolicy,
}

impl<'a> SecurityAnalyzer<'a> {
    pub fn new(policy: &'a DenyPolicy) -> Self {
        Self { policy }
    }

    /// Analyze one piece of source. User code and test code go through this
    /// identically.
    pub fn inspect(&self, source: &str) -> SecurityVerdict {
        let suite = match ast::Suite::parse(source, "<submission>") {
            Ok(suite) => suite,
            Err(err) => return SecurityVerdict::unparsable(err.to_string()),
        };

        let mut walk = Walk {
            policy: self.policy,
            violations: Vec::new(),
        };
        walk.body(&suite);

        SecurityVerdict {
            violations: walk.violations,
        }
    }
}

struct Walk<'a> {
    policy: &'a DenyPolicy,
    violations: Vec<Violation>,
}

impl Walk<'_> {
    fn check_import(&mut self, dotted: &str) {
        let root = dotted.split('.').next().unwrap_or(dotted);
        if self.policy.denies_module(root) {
            self.violations.push(Violation::BannedModule(root.to_string()));
        }
    }

    fn check_call_target(&mut self, name: &str) {
        if self.policy.denies_call(name) {
            self.violations.push(Violation::BannedCall(name.to_string()));
        }
    }

    fn body(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for expr in exprs {
            self.expr(expr);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Import(node) => {
                for alias in &node.names {
                    self.check_import(alias.name.as_str());
                }
            }
            Stmt::ImportFrom(node) => {
                // Relative imports (`from . import x`) carry no module name;
                // they are left to fail at runtime, nothing to match here.
                if let Some(module) = &node.module {
                    self.check_import(module.as_str());
                }
            }
            Stmt::FunctionDef(node) => {
                self.arguments(&node.args);
                self.exprs(&node.decorator_list);
                if let Some(returns) = &node.returns {
                    self.expr(returns);
                }
                self.body(&node.body);
            }
            Stmt::AsyncFunctionDef(node) => {
                self.arguments(&node.args);
                self.exprs(&node.decorator_list);
                if let Some(returns) = &node.returns {
                    self.expr(returns);
                }
                self.body(&node.body);
            }
            Stmt::ClassDef(node) => {
                self.exprs(&node.bases);
                for keyword in &node.keywords {
                    self.expr(&keyword.value);
                }
                self.exprs(&node.decorator_list);
                self.body(&node.body);
            }
            Stmt::Return(node) => {
                if let Some(value) = &node.value {
                    self.expr(value);
                }
            }
            Stmt::Delete(node) => self.exprs(&node.targets),
            Stmt::Assign(node) => {
                self.exprs(&node.targets);
                self.expr(&node.value);
            }
            Stmt::AugAssign(node) => {
                self.expr(&node.target);
                self.expr(&node.value);
            }
            Stmt::AnnAssign(node) => {
                self.expr(&node.target);
                self.expr(&node.annotation);
                if let Some(value) = &node.value {
                    self.expr(value);
                }
            }
            Stmt::For(node) => {
                self.expr(&node.target);
                self.expr(&node.iter);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            Stmt::AsyncFor(node) => {
                self.expr(&node.target);
                self.expr(&node.iter);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            Stmt::While(node) => {
                self.expr(&node.test);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            Stmt::If(node) => {
                self.expr(&node.test);
                self.body(&node.body);
                self.body(&node.orelse);
            }
            Stmt::With(node) => {
                for item in &node.items {
                    self.expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.expr(vars);
                    }
                }
                self.body(&node.body);
            }
            Stmt::AsyncWith(node) => {
                for item in &node.items {
                    self.expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.expr(vars);
                    }
                }
                self.body(&node.body);
            }
            Stmt::Match(node) => {
                self.expr(&node.subject);
                for case in &node.cases {
                    if let Some(guard) = &case.guard {
                        self.expr(guard);
                    }
                    self.body(&case.body);
                }
            }
            Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.expr(exc);
                }
                if let Some(cause) = &node.cause {
                    self.expr(cause);
                }
            }
            Stmt::Try(node) => {
                self.body(&node.body);
                self.handlers(&node.handlers);
                self.body(&node.orelse);
                self.body(&node.finalbody);
            }
            Stmt::TryStar(node) => {
                self.body(&node.body);
                self.handlers(&node.handlers);
                self.body(&node.orelse);
                self.body(&node.finalbody);
            }
            Stmt::Assert(node) => {
                self.expr(&node.test);
                if let Some(msg) = &node.msg {
                    self.expr(msg);
                }
            }
            Stmt::Expr(node) => self.expr(&node.value),
            // Pass, Break, Continue, Global, Nonlocal, type aliases: no
            // imports or calls can hide in these.
            _ => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Call(node) => {
                if let Expr::Name(name) = node.func.as_ref() {
                    self.check_call_target(name.id.as_str());
                }
                self.expr(&node.func);
                self.exprs(&node.args);
                for keyword in &node.keywords {
                    self.expr(&keyword.value);
                }
            }
            Expr::BoolOp(node) => self.exprs(&node.values),
            Expr::NamedExpr(node) => {
                self.expr(&node.target);
                self.expr(&node.value);
            }
            Expr::BinOp(node) => {
                self.expr(&node.left);
                self.expr(&node.right);
            }
            Expr::UnaryOp(node) => self.expr(&node.operand),
            Expr::Lambda(node) => {
                self.arguments(&node.args);
                self.expr(&node.body);
            }
            Expr::IfExp(node) => {
                self.expr(&node.test);
                self.expr(&node.body);
                self.expr(&node.orelse);
            }
            Expr::Dict(node) => {
                for key in node.keys.iter().flatten() {
                    self.expr(key);
                }
                self.exprs(&node.values);
            }
            Expr::Set(node) => self.exprs(&node.elts),
            Expr::ListComp(node) => {
                self.expr(&node.elt);
                self.comprehensions(&node.generators);
            }
            Expr::SetComp(node) => {
                self.expr(&node.elt);
                self.comprehensions(&node.generators);
            }
            Expr::DictComp(node) => {
                self.expr(&node.key);
                self.expr(&node.value);
                self.comprehensions(&node.generators);
            }
            Expr::GeneratorExp(node) => {
                self.expr(&node.elt);
                self.comprehensions(&node.generators);
            }
            Expr::Await(node) => self.expr(&node.value),
            Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.expr(value);
                }
            }
            Expr::YieldFrom(node) => self.expr(&node.value),
            Expr::Compare(node) => {
                self.expr(&node.left);
                self.exprs(&node.comparators);
            }
            Expr::FormattedValue(node) => {
                self.expr(&node.value);
                if let Some(spec) = &node.format_spec {
                    self.expr(spec);
                }
            }
            Expr::JoinedStr(node) => self.exprs(&node.values),
            Expr::Attribute(node) => self.expr(&node.value),
            Expr::Subscript(node) => {
                self.expr(&node.value);
                self.expr(&node.slice);
            }
            Expr::Starred(node) => self.expr(&node.value),
            Expr::List(node) => self.exprs(&node.elts),
            Expr::Tuple(node) => self.exprs(&node.elts),
            Expr::Slice(node) => {
                if let Some(lower) = &node.lower {
                    self.expr(lower);
                }
                if let Some(upper) = &node.upper {
                    self.expr(upper);
                }
                if let Some(step) = &node.step {
                    self.expr(step);
                }
            }
            // Name and Constant are leaves.
            _ => {}
        }
    }

    fn arguments(&mut self, args: &ast::Arguments) {
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            if let Some(annotation) = &arg.def.annotation {
                self.expr(annotation);
            }
            if let Some(default) = &arg.default {
                self.expr(default);
            }
        }
        if let Some(vararg) = &args.vararg {
            if let Some(annotation) = &vararg.annotation {
                self.expr(annotation);
            }
        }
        if let Some(kwarg) = &args.kwarg {
            if let Some(annotation) = &kwarg.annotation {
                self.expr(annotation);
            }
        }
    }

    fn handlers(&mut self, handlers: &[ast::ExceptHandler]) {
        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(node) = handler;
            if let Some(type_) = &node.type_ {
                self.expr(type_);
            }
            self.body(&node.body);
        }
    }

    fn comprehensions(&mut self, generators: &[ast::Comprehension]) {
        for generator in generators {
            self.expr(&generator.target);
            self.expr(&generator.iter);
            self.exprs(&generator.ifs);
        }
    }
}
