//! Doubles generated by pegomock.
//!
//! This strategy does not write any mock bodies itself. It describes the
//! client, server and stream handle interfaces in pegomock's interface model,
//! hands that description to an external generator and passes the returned
//! source through.

use std::{
    collections::BTreeMap,
    io::{self, Write},
    process::{Command, Stdio},
    sync::Arc,
    thread,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{GeneratorError, GeneratorResult},
    golang::{Decl, GoFile},
    model::ProtoFile,
    registry::{MockStrategy, StrategyRegistry},
    signature::{client_signature, server_signature, GoType, Signature, TypeKind, TypeRef},
    stream::StreamHandleContract,
    CLIENT_SUFFIX, SERVER_SUFFIX,
};

/// Interfaces to mock, all declared in one Go package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfacePackage {
    /// Go package name of the mocks.
    pub name: String,
    /// Interfaces in output order.
    pub interfaces: Vec<Interface>,
}

/// An interface to mock. The generator adds the `Mock` prefix itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Name of the interface.
    pub name: String,
    /// Its method set.
    pub methods: Vec<InterfaceMethod>,
}

/// A method of an [`Interface`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceMethod {
    /// Name of the method.
    pub name: String,
    /// Arguments before the variadic one.
    #[serde(rename = "in")]
    pub inputs: Vec<Parameter>,
    /// Results.
    #[serde(rename = "out")]
    pub outputs: Vec<Parameter>,
    /// Trailing variadic argument, by element type.
    pub variadic: Option<Parameter>,
}

/// An argument or result, possibly unnamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name, empty for results.
    pub name: String,
    /// Its type.
    #[serde(rename = "type")]
    pub ty: InterfaceType,
}

/// A type in pegomock's interface model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterfaceType {
    /// A type declared in the package with the given import path.
    Named {
        /// Import path of the declaring package.
        package: String,
        /// Name of the type.
        #[serde(rename = "type")]
        ty: String,
    },
    /// `*T`
    Pointer {
        /// The pointed-to type.
        #[serde(rename = "type")]
        ty: Box<InterfaceType>,
    },
    /// A predeclared type such as `error`.
    Predeclared {
        /// Its keyword.
        name: String,
    },
}

/// Everything the external generator needs for one service.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    /// Interfaces to mock.
    pub package: &'a InterfacePackage,
    /// Path of the `.proto` file, used in the generated header.
    pub source: &'a str,
    /// Go package name of the mocks.
    pub package_name: &'a str,
    /// Import path the mocks are declared under.
    pub self_package: &'a str,
}

/// Output of the external generator: the mock source and its matcher helpers
/// keyed by matched type (e.g. `context_context`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GeneratedMocks {
    /// Go source of the mocks.
    pub source: String,
    /// Matcher helpers, each a complete Go declaration.
    #[serde(default)]
    pub matchers: BTreeMap<String, String>,
}

/// The library producing the mock source from an interface description.
pub trait InterfaceMockGenerator {
    /// Mocks of every interface in the request.
    ///
    /// # Errors
    ///
    /// Fails if the generator cannot produce mocks for the package.
    fn generate_output(&self, request: &GenerateRequest<'_>) -> GeneratorResult<GeneratedMocks>;
}

/// Runs an external program, sending the [`GenerateRequest`] as JSON on its
/// stdin and reading [`GeneratedMocks`] as JSON from its stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
}

impl CommandGenerator {
    /// Runs `program`, looked up in `PATH`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl InterfaceMockGenerator for CommandGenerator {
    fn generate_output(&self, request: &GenerateRequest<'_>) -> GeneratorResult<GeneratedMocks> {
        debug!(program = %self.program, package = %request.package_name, "running external mock generator");
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Written concurrently, the child may fill stdout before reading stdin.
        let input = serde_json::to_vec(request)?;
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || -> io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input)?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        let written = writer.join().map_err(|_| {
            GeneratorError::Delegate(format!("writing the request to {} panicked", self.program))
        })?;
        if !output.status.success() {
            return Err(GeneratorError::Delegate(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        written?;

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// The delegating strategy.
#[derive(Clone)]
pub struct PegomockStrategy {
    generator: Arc<dyn InterfaceMockGenerator + Send + Sync>,
}

impl PegomockStrategy {
    /// Name the strategy is registered under.
    pub const NAME: &'static str = "pegomock";

    /// Delegates to `generator`.
    #[must_use]
    pub fn new(generator: Arc<dyn InterfaceMockGenerator + Send + Sync>) -> Self {
        Self { generator }
    }
}

impl std::fmt::Debug for PegomockStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PegomockStrategy").finish_non_exhaustive()
    }
}

/// Registers the strategy, generating through `generator`.
pub fn register(
    registry: &mut StrategyRegistry,
    generator: Arc<dyn InterfaceMockGenerator + Send + Sync>,
) {
    registry.register(PegomockStrategy::NAME, move || {
        Box::new(PegomockStrategy::new(generator.clone()))
    });
}

impl MockStrategy for PegomockStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn mock(&self, file: &ProtoFile, out: &mut GoFile) -> GeneratorResult<()> {
        let package_name = file.go_package_name.as_str();
        let mut matchers = BTreeMap::new();

        for service in &file.services {
            let mut interfaces = vec![
                Interface {
                    name: format!("{}{CLIENT_SUFFIX}", service.name),
                    methods: service
                        .methods
                        .iter()
                        .map(|method| interface_method(&client_signature(method)))
                        .collect(),
                },
                Interface {
                    name: format!("{}{SERVER_SUFFIX}", service.name),
                    methods: service
                        .methods
                        .iter()
                        .map(|method| interface_method(&server_signature(method)))
                        .collect(),
                },
            ];
            for method in &service.methods {
                if let (Some(client), Some(server)) = (
                    StreamHandleContract::client(method),
                    StreamHandleContract::server(method),
                ) {
                    interfaces.push(handle_interface(&client));
                    interfaces.push(handle_interface(&server));
                }
            }

            let package = InterfacePackage {
                name: package_name.to_string(),
                interfaces,
            };
            debug!(service = %service.name, "delegating mock generation");
            let generated = self.generator.generate_output(&GenerateRequest {
                package: &package,
                source: &file.proto_path,
                package_name,
                self_package: &file.go_import_path,
            })?;

            let qualifier = format!("{package_name}.");
            for (ty, matcher) in generated.matchers {
                matchers.insert(ty, matcher.replace(&qualifier, ""));
            }

            let source = substring_after(&generated.source, &format!("package {package_name}"));
            if source.trim().is_empty() {
                warn!(service = %service.name, "external mock generator returned no declarations");
            } else {
                out.push(Decl::Verbatim(source.to_string()));
            }
        }

        for (ty, matcher) in matchers {
            // Shared by every proto file, so they would collide across files.
            if ty == "context_context" || ty.starts_with("grpc_") {
                continue;
            }
            let matcher = substring_after(&matcher, ")");
            if !matcher.trim().is_empty() {
                out.push(Decl::Verbatim(matcher.to_string()));
            }
        }

        Ok(())
    }
}

fn handle_interface(contract: &StreamHandleContract) -> Interface {
    Interface {
        name: contract.ident.name.clone(),
        methods: contract
            .methods
            .iter()
            .map(|method| interface_method(&method.signature))
            .collect(),
    }
}

fn interface_method(signature: &Signature) -> InterfaceMethod {
    let parameter = |name: &str, ty: &TypeRef| Parameter {
        name: name.to_string(),
        ty: interface_type(ty),
    };

    InterfaceMethod {
        name: signature.name.clone(),
        inputs: signature
            .fixed_arguments()
            .iter()
            .map(|arg| parameter(&arg.name, &arg.ty))
            .collect(),
        outputs: signature
            .returns()
            .iter()
            .map(|ty| parameter("", ty))
            .collect(),
        variadic: signature
            .variadic()
            .map(|arg| parameter(&arg.name, &arg.ty)),
    }
}

/// Variadic arguments are described by their element type.
fn interface_type(ty: &TypeRef) -> InterfaceType {
    let element = match &ty.ty {
        GoType::Named(ident) => InterfaceType::Named {
            package: ident.import_path.clone(),
            ty: ident.name.clone(),
        },
        GoType::Builtin(builtin) => InterfaceType::Predeclared {
            name: builtin.keyword().to_string(),
        },
    };
    match ty.kind {
        TypeKind::Pointer => InterfaceType::Pointer {
            ty: Box::new(element),
        },
        TypeKind::Plain | TypeKind::Variadic => element,
    }
}

/// Everything after the first occurrence of `separator`, or nothing if it does
/// not occur.
fn substring_after<'a>(value: &'a str, separator: &str) -> &'a str {
    value
        .find(separator)
        .map_or("", |position| &value[position + separator.len()..])
}
