//! Methods of the stream handles passed to and returned from streaming RPCs.

use crate::{
    model::{GoIdent, MethodDefinition},
    signature::{Builtin, Signature, TypeRef},
};

/// Side of the RPC a stream handle is used on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRole {
    /// Returned to the caller of a streaming client method.
    Client,

    /// Passed into a streaming server method implementation.
    Server,
}

/// One method a stream handle has to provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleMethod {
    /// Signature, without receiver.
    pub signature: Signature,

    /// Whether the method sends or receives a protocol message. Only those get
    /// an expectation setter; the generic plumbing works on untyped payloads.
    pub typed: bool,
}

impl HandleMethod {
    fn plumbing(signature: Signature) -> Self {
        Self {
            signature,
            typed: false,
        }
    }

    fn typed(signature: Signature) -> Self {
        Self {
            signature,
            typed: true,
        }
    }
}

/// Method set of a stream handle type, fully determined by the method's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHandleContract {
    /// Side the handle is used on.
    pub role: HandleRole,
    /// The handle interface declared by protoc-gen-go-grpc.
    pub ident: GoIdent,
    /// Methods in output order.
    pub methods: Vec<HandleMethod>,
}

impl StreamHandleContract {
    /// Client side handle: `Header`, `Trailer`, `CloseSend`, `Context`,
    /// `SendMsg`, `RecvMsg`, a typed `Send` when the client streams and
    /// either `Recv` or `CloseAndRecv`.
    ///
    /// Unary methods have no handle.
    #[must_use]
    pub fn client(method: &MethodDefinition) -> Option<Self> {
        let shape = method.shape();
        if !shape.is_streaming() {
            return None;
        }

        let mut methods = vec![
            HandleMethod::plumbing(
                Signature::new("Header")
                    .returning(TypeRef::named(GoIdent::metadata()))
                    .returning(TypeRef::error()),
            ),
            HandleMethod::plumbing(
                Signature::new("Trailer").returning(TypeRef::named(GoIdent::metadata())),
            ),
            HandleMethod::plumbing(Signature::new("CloseSend").returning(TypeRef::error())),
            HandleMethod::plumbing(
                Signature::new("Context").returning(TypeRef::named(GoIdent::context())),
            ),
            HandleMethod::plumbing(
                Signature::new("SendMsg")
                    .argument("m", TypeRef::builtin(Builtin::Interface))
                    .returning(TypeRef::error()),
            ),
            HandleMethod::plumbing(
                Signature::new("RecvMsg")
                    .argument("m", TypeRef::builtin(Builtin::Interface))
                    .returning(TypeRef::error()),
            ),
        ];

        if shape.is_client_streaming() {
            methods.push(HandleMethod::typed(
                Signature::new("Send")
                    .argument("m", TypeRef::pointer(method.input.clone()))
                    .returning(TypeRef::error()),
            ));
        }

        let receive = if shape.is_server_streaming() {
            "Recv"
        } else {
            "CloseAndRecv"
        };
        methods.push(HandleMethod::typed(
            Signature::new(receive)
                .returning(TypeRef::pointer(method.output.clone()))
                .returning(TypeRef::error()),
        ));

        Some(Self {
            role: HandleRole::Client,
            ident: method.client_handle(),
            methods,
        })
    }

    /// Server side handle: `SetHeader`, `SendHeader`, `SetTrailer`, `Context`,
    /// `SendMsg`, `RecvMsg`, a typed `Recv` when the client streams and
    /// either `Send` or `SendAndClose`.
    ///
    /// Unary methods have no handle.
    #[must_use]
    pub fn server(method: &MethodDefinition) -> Option<Self> {
        let shape = method.shape();
        if !shape.is_streaming() {
            return None;
        }

        let mut methods = vec![
            HandleMethod::plumbing(
                Signature::new("SetHeader")
                    .argument("md", TypeRef::named(GoIdent::metadata()))
                    .returning(TypeRef::error()),
            ),
            HandleMethod::plumbing(
                Signature::new("SendHeader")
                    .argument("md", TypeRef::named(GoIdent::metadata()))
                    .returning(TypeRef::error()),
            ),
            HandleMethod::plumbing(
                Signature::new("SetTrailer").argument("md", TypeRef::named(GoIdent::metadata())),
            ),
            HandleMethod::plumbing(
                Signature::new("Context").returning(TypeRef::named(GoIdent::context())),
            ),
            HandleMethod::plumbing(
                Signature::new("SendMsg")
                    .argument("m", TypeRef::builtin(Builtin::Interface))
                    .returning(TypeRef::error()),
            ),
            HandleMethod::plumbing(
                Signature::new("RecvMsg")
                    .argument("m", TypeRef::builtin(Builtin::Interface))
                    .returning(TypeRef::error()),
            ),
        ];

        if shape.is_client_streaming() {
            methods.push(HandleMethod::typed(
                Signature::new("Recv")
                    .returning(TypeRef::pointer(method.input.clone()))
                    .returning(TypeRef::error()),
            ));
        }

        let send = if shape.is_server_streaming() {
            "Send"
        } else {
            "SendAndClose"
        };
        methods.push(HandleMethod::typed(
            Signature::new(send)
                .argument("m", TypeRef::pointer(method.output.clone()))
                .returning(TypeRef::error()),
        ));

        Some(Self {
            role: HandleRole::Server,
            ident: method.server_handle(),
            methods,
        })
    }

    /// The method called `name`.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&HandleMethod> {
        self.methods
            .iter()
            .find(|method| method.signature.name == name)
    }

    /// Names of all methods, in output order.
    #[must_use]
    pub fn method_names(&self) -> Vec<&str> {
        self.methods
            .iter()
            .map(|method| method.signature.name.as_str())
            .collect()
    }
}
