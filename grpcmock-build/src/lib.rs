#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Generator of Go gRPC test doubles.
//!
//! Builds mock implementations of the client and server interfaces of every
//! service in a protoc request, in the idiom of a pluggable Go mocking library.
//!
//! ```no_run
//! # use std::io::{Read, Write};
//! let mut input = Vec::new();
//! std::io::stdin().read_to_end(&mut input)?;
//! let output = grpcmock_build::configure().framework("testify").process(&input)?;
//! std::io::stdout().write_all(&output)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;

use prost_types::compiler::CodeGeneratorRequest;
use tracing::debug;

use error::{GeneratorError, GeneratorResult};
use generator::{generate_file, output_file_name, protoc_version, GeneratedFile, PathsMode};
use golang::FileHeader;
use parser::{go_package, parse_proto_file, TypeIndex};
use pegomock::CommandGenerator;
use registry::{MockStrategy, StrategyRegistry};

pub mod error;
pub mod generator;
pub mod golang;
pub mod model;
pub mod pegomock;
mod parser;
mod plugin;
pub mod registry;
pub mod shape;
pub mod signature;
pub mod stream;
pub mod testify;

pub(crate) const MOCK_PREFIX: &str = "Mock";
pub(crate) const CLIENT_SUFFIX: &str = "Client";
pub(crate) const SERVER_SUFFIX: &str = "Server";

const DEFAULT_PEGOMOCK_COMMAND: &str = "pegomock-gen";

/// A builder with the built-in strategies registered and `testify` selected.
#[must_use]
pub fn configure() -> GrpcMockBuilder {
    let mut registry = StrategyRegistry::new();
    testify::register(&mut registry);
    pegomock::register(
        &mut registry,
        Arc::new(CommandGenerator::new(DEFAULT_PEGOMOCK_COMMAND)),
    );

    GrpcMockBuilder {
        framework: testify::TestifyStrategy::NAME.to_string(),
        import_package: false,
        paths: PathsMode::default(),
        plugin_version: concat!("v", env!("CARGO_PKG_VERSION")).to_string(),
        registry,
    }
}

/// Options of a generation run, created by [`configure`].
#[derive(Debug)]
pub struct GrpcMockBuilder {
    framework: String,
    import_package: bool,
    paths: PathsMode,
    plugin_version: String,
    registry: StrategyRegistry,
}

impl GrpcMockBuilder {
    /// Name of the mock strategy to generate with.
    #[must_use]
    pub fn framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = framework.into();
        self
    }

    /// Generate the mocks outside of the Go package of the `.proto` file.
    #[must_use]
    pub fn import_package(mut self, import_package: bool) -> Self {
        self.import_package = import_package;
        self
    }

    /// How output file names are derived.
    #[must_use]
    pub fn paths(mut self, paths: PathsMode) -> Self {
        self.paths = paths;
        self
    }

    /// Executable used by the `pegomock` strategy.
    #[must_use]
    pub fn pegomock_command(mut self, command: impl Into<String>) -> Self {
        pegomock::register(
            &mut self.registry,
            Arc::new(CommandGenerator::new(command)),
        );
        self
    }

    /// Version written into the header of generated files.
    #[must_use]
    pub fn plugin_version(mut self, version: impl Into<String>) -> Self {
        self.plugin_version = version.into();
        self
    }

    /// Makes an additional strategy available, replacing any strategy of the
    /// same name.
    #[must_use]
    pub fn strategy(
        mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> Box<dyn MockStrategy> + Send + Sync + 'static,
    ) -> Self {
        self.registry.register(name, constructor);
        self
    }

    /// Applies a protoc plugin parameter: comma separated `key=value` pairs.
    ///
    /// # Errors
    ///
    /// Will return [`GeneratorError::InvalidParameter`] on unknown keys or
    /// values that cannot be interpreted.
    pub fn parameter(mut self, parameter: &str) -> GeneratorResult<Self> {
        for pair in parameter.split(',').filter(|pair| !pair.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (pair, None),
            };
            let required = || {
                value.ok_or_else(|| {
                    GeneratorError::invalid_parameter(format!("`{key}` requires a value"))
                })
            };

            self = match key {
                "framework" => self.framework(required()?),
                "import_package" => {
                    let import_package = value.map_or(Ok(true), |value| parse_bool(key, value))?;
                    self.import_package(import_package)
                }
                "paths" => self.paths(required()?.parse()?),
                "pegomock_command" => self.pegomock_command(required()?),
                _ => {
                    return Err(GeneratorError::invalid_parameter(format!(
                        "unknown key `{key}`"
                    )))
                }
            };
        }
        Ok(self)
    }

    /// Generates the mock files for every requested file that has services.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole request.
    pub fn generate(&self, request: &CodeGeneratorRequest) -> GeneratorResult<Vec<GeneratedFile>> {
        let strategy = self.registry.resolve(&self.framework)?;
        debug!(strategy = strategy.name(), files = request.file_to_generate.len(), "generating");

        let index = TypeIndex::new(&request.proto_file);
        let protoc_version = protoc_version(request.compiler_version.as_ref());

        let mut generated = Vec::new();
        for name in &request.file_to_generate {
            let descriptor = request
                .proto_file
                .iter()
                .find(|file| file.name() == name)
                .ok_or_else(|| GeneratorError::MissingFile(name.clone()))?;
            let package = go_package(descriptor)
                .ok_or_else(|| GeneratorError::MissingGoPackage(name.clone()))?;

            let file = parse_proto_file(descriptor, &index, self.import_package)?;
            let header = FileHeader {
                plugin_version: self.plugin_version.clone(),
                protoc_version: protoc_version.clone(),
                source: name.clone(),
            };
            let output_name = output_file_name(name, &package.import_path, self.paths);
            if let Some(file) = generate_file(strategy.as_ref(), &file, header, output_name)? {
                generated.push(file);
            }
        }
        Ok(generated)
    }
}

/// Boolean flag values as accepted by Go's `strconv.ParseBool`.
fn parse_bool(key: &str, value: &str) -> GeneratorResult<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(GeneratorError::invalid_parameter(format!(
            "`{key}` must be a boolean, got `{value}`"
        ))),
    }
}
