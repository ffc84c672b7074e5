//! Rendering of a single `.proto` file into its mock file.

use std::str::FromStr;

use prost_types::compiler::Version;
use tracing::debug;

use crate::{
    error::{GeneratorError, GeneratorResult},
    golang::{FileHeader, GoFile},
    model::ProtoFile,
    registry::MockStrategy,
};

const OUTPUT_SUFFIX: &str = "_grpc_mock.pb.go";

/// A rendered output file, named relative to the protoc output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path of the file.
    pub name: String,
    /// Go source.
    pub content: String,
}

/// Where output files are placed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathsMode {
    /// In the directory of the Go import path.
    #[default]
    Import,
    /// Next to the `.proto` file.
    SourceRelative,
}

impl FromStr for PathsMode {
    type Err = GeneratorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "import" => Ok(PathsMode::Import),
            "source_relative" => Ok(PathsMode::SourceRelative),
            _ => Err(GeneratorError::invalid_parameter(format!(
                "paths must be `import` or `source_relative`, got `{value}`"
            ))),
        }
    }
}

/// Name of the mock file generated for `proto_path`.
pub(crate) fn output_file_name(proto_path: &str, go_import_path: &str, paths: PathsMode) -> String {
    let prefix = proto_path.strip_suffix(".proto").unwrap_or(proto_path);
    match paths {
        PathsMode::SourceRelative => format!("{prefix}{OUTPUT_SUFFIX}"),
        PathsMode::Import => {
            let base = prefix.rsplit('/').next().unwrap_or(prefix);
            if go_import_path.is_empty() {
                format!("{base}{OUTPUT_SUFFIX}")
            } else {
                format!("{go_import_path}/{base}{OUTPUT_SUFFIX}")
            }
        }
    }
}

/// Version of protoc as printed in the file header.
pub(crate) fn protoc_version(version: Option<&Version>) -> String {
    let Some(version) = version else {
        return "(unknown)".to_string();
    };
    let suffix = match version.suffix() {
        "" => String::new(),
        suffix => format!("-{suffix}"),
    };
    format!(
        "v{}.{}.{}{suffix}",
        version.major(),
        version.minor(),
        version.patch()
    )
}

/// Renders the doubles of every service in `file` with `strategy`.
///
/// Files without services produce no output.
pub(crate) fn generate_file(
    strategy: &dyn MockStrategy,
    file: &ProtoFile,
    header: FileHeader,
    name: String,
) -> GeneratorResult<Option<GeneratedFile>> {
    if file.services.is_empty() {
        debug!(file = %file.proto_path, "no services, skipping");
        return Ok(None);
    }

    debug!(file = %file.proto_path, strategy = strategy.name(), output = %name, "generating mocks");
    let mut out = GoFile::new(&file.go_package_name, &file.go_import_path);
    out.header = Some(header);
    strategy.mock(file, &mut out)?;

    Ok(Some(GeneratedFile {
        name,
        content: out.render(),
    }))
}
