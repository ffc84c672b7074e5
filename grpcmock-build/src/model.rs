//! Description of the protobuf files, services and methods mocks are generated for.

use std::collections::BTreeMap;

use crate::shape::RpcShape;

/// Fully qualified Go identifier: the import path of the declaring package and
/// the identifier itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoIdent {
    /// Import path of the declaring package.
    pub import_path: String,
    /// The identifier.
    pub name: String,
}

impl GoIdent {
    /// `name` declared under `import_path`.
    #[must_use]
    pub fn new(import_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            import_path: import_path.into(),
            name: name.into(),
        }
    }

    pub(crate) fn context() -> Self {
        Self::new("context", "Context")
    }

    pub(crate) fn call_option() -> Self {
        Self::new("google.golang.org/grpc", "CallOption")
    }

    pub(crate) fn metadata() -> Self {
        Self::new("google.golang.org/grpc/metadata", "MD")
    }

    /// Identifiers that are shared by every generated file and therefore never
    /// get a file-local matcher helper.
    pub(crate) fn is_ambient(&self) -> bool {
        *self == Self::context() || *self == Self::call_option()
    }
}

/// Default Go package name for an import path: its last segment with every
/// character that is not valid in an identifier replaced by `_`.
pub(crate) fn package_name_of(import_path: &str) -> String {
    let base = import_path.rsplit('/').next().unwrap_or(import_path);
    let mut name: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// A protobuf file prepared for mock generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoFile {
    /// Path of the `.proto` file as passed to protoc.
    pub proto_path: String,
    /// Package clause of the generated file.
    pub go_package_name: String,
    /// Import path of the package the generated file belongs to. Empty when the
    /// mocks are generated into a separate package.
    pub go_import_path: String,
    /// Services in declaration order.
    pub services: Vec<ServiceDefinition>,
    /// Messages declared in the file, nested ones included.
    pub messages: Vec<GoIdent>,
    /// Go package names of the import paths known from the request.
    pub packages: BTreeMap<String, String>,
}

impl ProtoFile {
    /// Go package name declared under `import_path`.
    #[must_use]
    pub fn package_of(&self, import_path: &str) -> String {
        if import_path == self.go_import_path {
            return self.go_package_name.clone();
        }
        self.packages
            .get(import_path)
            .cloned()
            .unwrap_or_else(|| package_name_of(import_path))
    }

    /// Whether `ident` is a message or stream handle type declared alongside
    /// the services of this file.
    #[must_use]
    pub fn declares(&self, ident: &GoIdent) -> bool {
        self.messages.contains(ident)
            || self
                .services
                .iter()
                .flat_map(|service| &service.methods)
                .filter(|method| method.shape().is_streaming())
                .any(|method| method.client_handle() == *ident || method.server_handle() == *ident)
    }
}

/// A gRPC service to generate doubles for.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    /// Go name of the service.
    pub name: String,
    /// Carries `option deprecated = true`.
    pub deprecated: bool,
    /// Methods in declaration order.
    pub methods: Vec<MethodDefinition>,
}

/// A single RPC of a service.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    /// Go name of the method.
    pub name: String,
    /// Name of the owning service, used to qualify stream handle types.
    pub service: String,
    /// Import path of the Go package the service is generated into, which
    /// also declares its stream handle types.
    pub service_import_path: String,
    /// Request message.
    pub input: GoIdent,
    /// Response message.
    pub output: GoIdent,
    /// The client sends a stream of requests.
    pub client_streaming: bool,
    /// The server sends a stream of responses.
    pub server_streaming: bool,
    /// Carries `option deprecated = true`.
    pub deprecated: bool,
}

impl MethodDefinition {
    /// Which of the four RPC shapes the method has.
    #[must_use]
    pub fn shape(&self) -> RpcShape {
        RpcShape::classify(self.client_streaming, self.server_streaming)
    }

    /// Stream handle type handed to callers of the client method.
    #[must_use]
    pub fn client_handle(&self) -> GoIdent {
        self.handle(crate::CLIENT_SUFFIX)
    }

    /// Stream handle type passed into the server method implementation.
    #[must_use]
    pub fn server_handle(&self) -> GoIdent {
        self.handle(crate::SERVER_SUFFIX)
    }

    fn handle(&self, suffix: &str) -> GoIdent {
        GoIdent::new(
            self.service_import_path.clone(),
            format!("{}_{}{suffix}", self.service, self.name),
        )
    }
}
