//! Structured representation of a generated Go source file.
//!
//! Strategies build a [`GoFile`] out of declarations; text is produced only by
//! [`GoFile::render`], which also derives the import block from the types the
//! declarations reference.

use std::{collections::BTreeMap, fmt::Write};

use crate::{
    model::{package_name_of, GoIdent},
    signature::{GoType, Signature, TypeKind, TypeRef},
};

pub(crate) const DEPRECATION_COMMENT: &str = "// Deprecated: Do not use.";

/// Typed accessors of a recorded call's return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    /// `Bool(i)`
    Bool,
    /// `Int(i)`
    Int,
    /// `String(i)`
    String,
    /// `Error(i)`
    Error,
}

impl Accessor {
    fn method(self) -> &'static str {
        match self {
            Accessor::Bool => "Bool",
            Accessor::Int => "Int",
            Accessor::String => "String",
            Accessor::Error => "Error",
        }
    }
}

/// Arguments of a call that takes a list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArgs {
    /// `f(a, b, c)`
    Positional(Vec<String>),

    /// `f(list...)`
    Spread(String),

    /// `f(append([]interface{}{a, b}, rest...)...)`
    Appended {
        /// Values before the variadic argument.
        fixed: Vec<String>,
        /// The variadic argument.
        rest: String,
    },
}

/// An expression in a returned position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `args.Error(1)`
    Accessor {
        /// Variable holding the recorded call.
        results: String,
        /// Typed accessor to call.
        accessor: Accessor,
        /// Position of the return value.
        index: usize,
    },

    /// `args.Get(0).(*Reply)`
    Cast {
        /// Variable holding the recorded call.
        results: String,
        /// Position of the return value.
        index: usize,
        /// Type asserted on the value.
        ty: TypeRef,
    },

    /// `c.On("Method", ...)`
    Expect {
        /// Name of the double's receiver.
        receiver: String,
        /// Method the expectation is set for.
        method: String,
        /// Argument matchers.
        args: CallArgs,
    },

    /// `pkg.Func("literal")`
    CallWithString {
        /// Function called.
        func: GoIdent,
        /// Its only argument.
        literal: String,
    },

    /// `&Type{}`
    NewZeroed(GoIdent),
}

/// A statement in a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Collects fixed values and every element of a variadic argument into a
    /// single `[]interface{}` named `list`.
    Flatten {
        /// Name of the declared slice.
        list: String,
        /// Values before the variadic argument.
        fixed: Vec<String>,
        /// The variadic argument.
        variadic: String,
    },

    /// `results := receiver.Called(args)`, or `_ = ...` without results.
    Record {
        /// Variable receiving the recorded call, if any.
        results: Option<String>,
        /// Name of the double's receiver.
        receiver: String,
        /// Arguments passed to `Called`.
        args: CallArgs,
    },

    /// `return a, b`
    Return(Vec<Expr>),
}

/// A struct type made only of embedded fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    /// Name of the type.
    pub name: GoIdent,
    /// Embedded types, in order.
    pub embedded: Vec<GoIdent>,
}

/// A function or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    /// Preceded by a deprecation comment.
    pub deprecated: bool,
    /// Name, receiver, arguments and results.
    pub signature: Signature,
    /// Statements of the body.
    pub body: Vec<Stmt>,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    /// `type X struct { ... }`
    Struct(StructDecl),
    /// `func ...`
    Func(FuncDecl),

    /// Source produced elsewhere, emitted unmodified.
    Verbatim(String),
}

impl Decl {
    /// The function, if this declares one.
    #[must_use]
    pub fn as_func(&self) -> Option<&FuncDecl> {
        match self {
            Decl::Func(func) => Some(func),
            _ => None,
        }
    }

    /// The struct, if this declares one.
    #[must_use]
    pub fn as_struct(&self) -> Option<&StructDecl> {
        match self {
            Decl::Struct(decl) => Some(decl),
            _ => None,
        }
    }
}

/// Header information of a generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Version of this plugin.
    pub plugin_version: String,
    /// Version of the protoc that invoked it.
    pub protoc_version: String,
    /// Path of the `.proto` file the output was generated from.
    pub source: String,
}

/// A Go source file under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoFile {
    /// Generated-code banner, omitted when `None`.
    pub header: Option<FileHeader>,
    /// Package clause.
    pub package: String,
    /// Identifiers declared under this import path are not qualified.
    pub import_path: String,
    /// Declarations, in output order.
    pub decls: Vec<Decl>,
}

impl GoFile {
    /// An empty file of `package`, declared under `import_path`.
    #[must_use]
    pub fn new(package: impl Into<String>, import_path: impl Into<String>) -> Self {
        Self {
            header: None,
            package: package.into(),
            import_path: import_path.into(),
            decls: Vec::new(),
        }
    }

    /// Appends a declaration.
    pub fn push(&mut self, decl: Decl) {
        self.decls.push(decl);
    }

    /// Functions declared in the file, in declaration order.
    #[must_use]
    pub fn funcs(&self) -> impl Iterator<Item = &FuncDecl> {
        self.decls.iter().filter_map(Decl::as_func)
    }

    /// Go source of the file, imports included.
    #[must_use]
    pub fn render(&self) -> String {
        let mut renderer = Renderer {
            self_import_path: &self.import_path,
            imports: BTreeMap::new(),
        };
        let body = self
            .decls
            .iter()
            .map(|decl| renderer.decl(decl))
            .collect::<Vec<_>>()
            .join("\n");

        let mut out = String::new();
        if let Some(header) = &self.header {
            out.push_str("// Code generated by protoc-gen-go-grpcmock. DO NOT EDIT.\n");
            out.push_str("// versions:\n");
            let _ = writeln!(out, "// - protoc-gen-go-grpcmock {}", header.plugin_version);
            let _ = writeln!(out, "// - protoc {}", header.protoc_version);
            let _ = writeln!(out, "// source: {}", header.source);
            out.push('\n');
        }
        let _ = writeln!(out, "package {}", self.package);
        out.push('\n');

        if !renderer.imports.is_empty() {
            out.push_str("import (\n");
            for (path, alias) in &renderer.imports {
                let _ = writeln!(out, "\t{alias} \"{path}\"");
            }
            out.push_str(")\n\n");
        }

        out.push_str(&body);
        out
    }
}

struct Renderer<'a> {
    self_import_path: &'a str,
    /// Import path to package alias.
    imports: BTreeMap<String, String>,
}

impl Renderer<'_> {
    fn qualify(&mut self, ident: &GoIdent) -> String {
        if ident.import_path.is_empty() || ident.import_path == self.self_import_path {
            return ident.name.clone();
        }
        let alias = match self.imports.get(&ident.import_path) {
            Some(alias) => alias.clone(),
            None => {
                let base = package_name_of(&ident.import_path);
                let mut alias = base.clone();
                let mut n = 1;
                while self.imports.values().any(|taken| *taken == alias) {
                    alias = format!("{base}{n}");
                    n += 1;
                }
                self.imports
                    .insert(ident.import_path.clone(), alias.clone());
                alias
            }
        };
        format!("{alias}.{}", ident.name)
    }

    fn ty(&mut self, ty: &TypeRef) -> String {
        let base = match &ty.ty {
            GoType::Named(ident) => self.qualify(ident),
            GoType::Builtin(builtin) => builtin.keyword().to_string(),
        };
        match ty.kind {
            TypeKind::Plain => base,
            TypeKind::Pointer => format!("*{base}"),
            TypeKind::Variadic => format!("...{base}"),
        }
    }

    fn decl(&mut self, decl: &Decl) -> String {
        match decl {
            Decl::Struct(decl) => {
                let mut out = format!("type {} struct {{\n", decl.name.name);
                for embedded in &decl.embedded {
                    let _ = writeln!(out, "\t{}", self.qualify(embedded));
                }
                out.push_str("}\n");
                out
            }
            Decl::Func(func) => self.func(func),
            Decl::Verbatim(source) => {
                let mut out = source.trim_matches('\n').to_string();
                out.push('\n');
                out
            }
        }
    }

    fn signature(&mut self, signature: &Signature) -> String {
        let mut out = String::from("func ");
        if let Some(receiver) = &signature.receiver {
            let ty = self.ty(&receiver.ty);
            let _ = write!(out, "({} {ty}) ", receiver.name);
        }
        let arguments = signature
            .arguments()
            .iter()
            .map(|arg| format!("{} {}", arg.name, self.ty(&arg.ty)))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(out, "{}({arguments})", signature.name);

        let returns = signature
            .returns()
            .iter()
            .map(|ty| self.ty(ty))
            .collect::<Vec<_>>();
        match returns.len() {
            0 => {}
            1 => {
                let _ = write!(out, " {}", returns[0]);
            }
            _ => {
                let _ = write!(out, " ({})", returns.join(", "));
            }
        }
        out
    }

    fn func(&mut self, func: &FuncDecl) -> String {
        let mut out = String::new();
        if func.deprecated {
            out.push_str(DEPRECATION_COMMENT);
            out.push('\n');
        }
        let signature = self.signature(&func.signature);
        let _ = writeln!(out, "{signature} {{");
        for stmt in &func.body {
            self.stmt(&mut out, stmt);
        }
        out.push_str("}\n");
        out
    }

    fn stmt(&mut self, out: &mut String, stmt: &Stmt) {
        match stmt {
            Stmt::Flatten {
                list,
                fixed,
                variadic,
            } => {
                let _ = writeln!(out, "\t{list} := []interface{{}}{{{}}}", fixed.join(", "));
                let _ = writeln!(out, "\tfor _, {variadic}1 := range {variadic} {{");
                let _ = writeln!(out, "\t\t{list} = append({list}, {variadic}1)");
                out.push_str("\t}\n");
            }
            Stmt::Record {
                results,
                receiver,
                args,
            } => {
                let call = format!("{receiver}.Called({})", call_args(args));
                match results {
                    Some(results) => {
                        let _ = writeln!(out, "\t{results} := {call}");
                    }
                    None => {
                        let _ = writeln!(out, "\t_ = {call}");
                    }
                }
            }
            Stmt::Return(exprs) => {
                let exprs = exprs
                    .iter()
                    .map(|expr| self.expr(expr))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(out, "\treturn {exprs}");
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Accessor {
                results,
                accessor,
                index,
            } => format!("{results}.{}({index})", accessor.method()),
            Expr::Cast { results, index, ty } => {
                format!("{results}.Get({index}).({})", self.ty(ty))
            }
            Expr::Expect {
                receiver,
                method,
                args,
            } => {
                let args = call_args(args);
                if args.is_empty() {
                    format!("{receiver}.On(\"{method}\")")
                } else {
                    format!("{receiver}.On(\"{method}\", {args})")
                }
            }
            Expr::CallWithString { func, literal } => {
                format!("{}(\"{literal}\")", self.qualify(func))
            }
            Expr::NewZeroed(ident) => format!("&{}{{}}", self.qualify(ident)),
        }
    }
}

fn call_args(args: &CallArgs) -> String {
    match args {
        CallArgs::Positional(values) => values.join(", "),
        CallArgs::Spread(list) => format!("{list}..."),
        CallArgs::Appended { fixed, rest } => {
            format!("append([]interface{{}}{{{}}}, {rest}...)...", fixed.join(", "))
        }
    }
}
