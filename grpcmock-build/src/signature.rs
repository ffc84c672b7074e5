//! Method signatures of generated doubles.
//!
//! A [`Signature`] is built once per method and role (client call site or
//! server handler) and is independent of the strategy that renders it.

use crate::model::{GoIdent, MethodDefinition};

/// Predeclared Go types the generators refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `bool`
    Bool,
    /// `int`
    Int,
    /// `string`
    String,
    /// `error`
    Error,
    /// The empty interface, `interface{}`.
    Interface,
}

impl Builtin {
    /// Spelling of the type in Go source.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Builtin::Bool => "bool",
            Builtin::Int => "int",
            Builtin::String => "string",
            Builtin::Error => "error",
            Builtin::Interface => "interface{}",
        }
    }
}

/// A Go type without pointer or variadic markers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GoType {
    /// A declared type, qualified by its import path.
    Named(GoIdent),
    /// A predeclared type.
    Builtin(Builtin),
}

/// How a [`GoType`] is used in a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// `T`
    Plain,
    /// `*T`
    Pointer,
    /// `...T`
    Variadic,
}

/// A type as it appears in an argument or return position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Plain, pointer or variadic.
    pub kind: TypeKind,
    /// The underlying type.
    pub ty: GoType,
}

impl TypeRef {
    /// `T` for a declared type.
    #[must_use]
    pub fn named(ident: GoIdent) -> Self {
        Self {
            kind: TypeKind::Plain,
            ty: GoType::Named(ident),
        }
    }

    /// `*T` for a declared type.
    #[must_use]
    pub fn pointer(ident: GoIdent) -> Self {
        Self {
            kind: TypeKind::Pointer,
            ty: GoType::Named(ident),
        }
    }

    /// A predeclared type.
    #[must_use]
    pub fn builtin(builtin: Builtin) -> Self {
        Self {
            kind: TypeKind::Plain,
            ty: GoType::Builtin(builtin),
        }
    }

    /// `error`
    #[must_use]
    pub fn error() -> Self {
        Self::builtin(Builtin::Error)
    }

    /// `...T`
    #[must_use]
    pub fn variadic(ty: GoType) -> Self {
        Self {
            kind: TypeKind::Variadic,
            ty,
        }
    }

    /// Whether this is `*T`.
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        self.kind == TypeKind::Pointer
    }

    /// Whether this is `...T`.
    #[must_use]
    pub fn is_variadic(&self) -> bool {
        self.kind == TypeKind::Variadic
    }

    /// The declared type referred to, if any.
    #[must_use]
    pub fn ident(&self) -> Option<&GoIdent> {
        match &self.ty {
            GoType::Named(ident) => Some(ident),
            GoType::Builtin(_) => None,
        }
    }

    /// The predeclared type, if used plainly.
    #[must_use]
    pub fn as_builtin(&self) -> Option<Builtin> {
        match (self.kind, &self.ty) {
            (TypeKind::Plain, GoType::Builtin(builtin)) => Some(*builtin),
            _ => None,
        }
    }
}

/// A named argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Name of the argument.
    pub name: String,
    /// Its type.
    pub ty: TypeRef,
}

/// The value a method is declared on, e.g. `c *MockGreeterClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    /// Name of the receiver.
    pub name: String,
    /// Its type.
    pub ty: TypeRef,
}

impl Receiver {
    /// `name *ident`
    #[must_use]
    pub fn pointer(name: &str, ident: GoIdent) -> Self {
        Self {
            name: name.to_string(),
            ty: TypeRef::pointer(ident),
        }
    }
}

/// Name, receiver, arguments and results of a Go function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Receiver of a method, `None` for a plain function.
    pub receiver: Option<Receiver>,
    /// Name of the function.
    pub name: String,
    arguments: Vec<Argument>,
    returns: Vec<TypeRef>,
}

impl Signature {
    /// A function named `name` without arguments or results.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            receiver: None,
            name: name.into(),
            arguments: Vec::new(),
            returns: Vec::new(),
        }
    }

    /// Turns the function into a method on `receiver`.
    #[must_use]
    pub fn with_receiver(self, receiver: Receiver) -> Self {
        Self {
            receiver: Some(receiver),
            ..self
        }
    }

    /// Appends an argument.
    ///
    /// # Panics
    ///
    /// Panics if the signature already ends with a variadic argument.
    #[must_use]
    pub fn argument(mut self, name: &str, ty: TypeRef) -> Self {
        assert!(
            self.variadic().is_none(),
            "`{}` cannot take `{name}` after its variadic argument",
            self.name
        );
        self.arguments.push(Argument {
            name: name.to_string(),
            ty,
        });
        self
    }

    /// Appends a result.
    #[must_use]
    pub fn returning(mut self, ty: TypeRef) -> Self {
        self.returns.push(ty);
        self
    }

    /// Arguments in declaration order.
    #[must_use]
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Results in declaration order.
    #[must_use]
    pub fn returns(&self) -> &[TypeRef] {
        &self.returns
    }

    /// The trailing variadic argument, if the signature has one.
    #[must_use]
    pub fn variadic(&self) -> Option<&Argument> {
        self.arguments.last().filter(|arg| arg.ty.is_variadic())
    }

    /// All arguments except the trailing variadic one.
    #[must_use]
    pub fn fixed_arguments(&self) -> &[Argument] {
        match self.variadic() {
            Some(_) => &self.arguments[..self.arguments.len() - 1],
            None => &self.arguments,
        }
    }

    /// Derives the expectation setter paired with this method: same receiver,
    /// name prefixed with `On`, every argument widened to `interface{}` (the
    /// variadic one stays variadic) and a single `*call` return.
    #[must_use]
    pub fn expectation_setter(&self, call: &GoIdent) -> Signature {
        let arguments = self
            .arguments
            .iter()
            .map(|arg| Argument {
                name: arg.name.clone(),
                ty: if arg.ty.is_variadic() {
                    TypeRef::variadic(GoType::Builtin(Builtin::Interface))
                } else {
                    TypeRef::builtin(Builtin::Interface)
                },
            })
            .collect();

        Signature {
            receiver: self.receiver.clone(),
            name: format!("On{}", self.name),
            arguments,
            returns: vec![TypeRef::pointer(call.clone())],
        }
    }
}

/// Signature of the method a client calls.
///
/// `ctx` always comes first and `opts ...grpc.CallOption` last; the request is
/// only passed directly when the client does not stream it. Unary methods
/// return the response, streaming ones the client stream handle.
#[must_use]
pub fn client_signature(method: &MethodDefinition) -> Signature {
    let shape = method.shape();

    let mut signature =
        Signature::new(&method.name).argument("ctx", TypeRef::named(GoIdent::context()));
    if !shape.is_client_streaming() {
        signature = signature.argument("in", TypeRef::pointer(method.input.clone()));
    }
    signature = signature.argument(
        "opts",
        TypeRef::variadic(GoType::Named(GoIdent::call_option())),
    );

    let response = if shape.is_streaming() {
        TypeRef::named(method.client_handle())
    } else {
        TypeRef::pointer(method.output.clone())
    };
    signature.returning(response).returning(TypeRef::error())
}

/// Signature of the method a server implements.
///
/// Only unary methods receive a context and return a response; streaming
/// methods get the server stream handle as their last argument instead.
#[must_use]
pub fn server_signature(method: &MethodDefinition) -> Signature {
    let shape = method.shape();

    let mut signature = Signature::new(&method.name);
    if !shape.is_streaming() {
        signature = signature
            .argument("ctx", TypeRef::named(GoIdent::context()))
            .returning(TypeRef::pointer(method.output.clone()));
    }
    if !shape.is_client_streaming() {
        signature = signature.argument("in", TypeRef::pointer(method.input.clone()));
    }
    if shape.is_streaming() {
        signature = signature.argument("out", TypeRef::named(method.server_handle()));
    }
    signature.returning(TypeRef::error())
}
