use std::collections::{BTreeMap, HashMap};

use prost_types::{DescriptorProto, FileDescriptorProto, MethodDescriptorProto};
use tracing::{debug, warn};

use crate::{
    error::{GeneratorError, GeneratorResult},
    model::{package_name_of, GoIdent, MethodDefinition, ProtoFile, ServiceDefinition},
};

/// Go package a `.proto` file is compiled into, from its `go_package` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GoPackage {
    pub(crate) import_path: String,
    pub(crate) name: String,
}

/// Reads the `go_package` option of `file`: either `"path;name"` or `"path"`.
pub(crate) fn go_package(file: &FileDescriptorProto) -> Option<GoPackage> {
    let option = file
        .options
        .as_ref()
        .and_then(|options| options.go_package.as_deref())
        .filter(|option| !option.is_empty())?;

    Some(match option.split_once(';') {
        Some((import_path, name)) => GoPackage {
            import_path: import_path.to_string(),
            name: name.to_string(),
        },
        None => GoPackage {
            import_path: option.to_string(),
            name: package_name_of(option),
        },
    })
}

/// Go identifiers of every message in a request, keyed by fully qualified
/// protobuf name (`.pkg.Outer.Inner`).
#[derive(Debug, Default)]
pub(crate) struct TypeIndex {
    types: HashMap<String, GoIdent>,
    /// Messages declared by each file, keyed by file name.
    declared: HashMap<String, Vec<GoIdent>>,
    packages: BTreeMap<String, String>,
}

impl TypeIndex {
    pub(crate) fn new(files: &[FileDescriptorProto]) -> Self {
        let mut index = Self::default();
        for file in files {
            let Some(package) = go_package(file) else {
                debug!(file = file.name(), "no go_package option, messages not indexed");
                continue;
            };
            let prefix = match file.package() {
                "" => String::new(),
                proto_package => format!(".{proto_package}"),
            };
            let mut declared = Vec::new();
            for message in &file.message_type {
                index.add_message(&package.import_path, &prefix, None, message, &mut declared);
            }
            index.declared.insert(file.name().to_string(), declared);
            index.packages.insert(package.import_path, package.name);
        }
        index
    }

    fn add_message(
        &mut self,
        import_path: &str,
        proto_package: &str,
        parent: Option<&str>,
        message: &DescriptorProto,
        declared: &mut Vec<GoIdent>,
    ) {
        // Synthetic map entry messages have no Go type.
        if message
            .options
            .as_ref()
            .is_some_and(|options| options.map_entry())
        {
            return;
        }

        let name = match parent {
            Some(parent) => format!("{parent}.{}", message.name()),
            None => message.name().to_string(),
        };
        let ident = GoIdent::new(import_path, go_camel_case(&name));
        declared.push(ident.clone());
        self.types.insert(format!("{proto_package}.{name}"), ident);
        for nested in &message.nested_type {
            self.add_message(import_path, proto_package, Some(&name), nested, declared);
        }
    }

    fn resolve(&self, proto_name: &str) -> GeneratorResult<GoIdent> {
        self.types
            .get(proto_name)
            .cloned()
            .ok_or_else(|| GeneratorError::UnresolvedType(proto_name.to_string()))
    }
}

/// Converts `file` into the generation model.
///
/// With `import_package` the mocks are placed outside the file's Go package, so
/// the model gets no import path and every message type ends up qualified.
pub(crate) fn parse_proto_file(
    file: &FileDescriptorProto,
    index: &TypeIndex,
    import_package: bool,
) -> GeneratorResult<ProtoFile> {
    let package =
        go_package(file).ok_or_else(|| GeneratorError::MissingGoPackage(file.name().to_string()))?;

    let services = file
        .service
        .iter()
        .map(|service| {
            let name = go_camel_case(service.name());
            let methods = service
                .method
                .iter()
                .map(|method| parse_method(&name, &package.import_path, method, index))
                .collect::<GeneratorResult<Vec<_>>>()?;
            if methods.is_empty() {
                warn!(service = %name, "service declares no methods");
            }
            Ok(ServiceDefinition {
                deprecated: service
                    .options
                    .as_ref()
                    .is_some_and(|options| options.deprecated()),
                name,
                methods,
            })
        })
        .collect::<GeneratorResult<Vec<_>>>()?;

    Ok(ProtoFile {
        proto_path: file.name().to_string(),
        go_package_name: package.name,
        go_import_path: if import_package {
            String::new()
        } else {
            package.import_path
        },
        services,
        messages: index
            .declared
            .get(file.name())
            .cloned()
            .unwrap_or_default(),
        packages: index.packages.clone(),
    })
}

fn parse_method(
    service: &str,
    service_import_path: &str,
    method: &MethodDescriptorProto,
    index: &TypeIndex,
) -> GeneratorResult<MethodDefinition> {
    let (Some(name), Some(input), Some(output)) = (
        method.name.as_deref(),
        method.input_type.as_deref(),
        method.output_type.as_deref(),
    ) else {
        return Err(GeneratorError::MalformedMethod(format!(
            "{service}.{} must have a name, an input and an output type",
            method.name()
        )));
    };

    Ok(MethodDefinition {
        name: go_camel_case(name),
        service: service.to_string(),
        service_import_path: service_import_path.to_string(),
        input: index.resolve(input)?,
        output: index.resolve(output)?,
        client_streaming: method.client_streaming(),
        server_streaming: method.server_streaming(),
        deprecated: method
            .options
            .as_ref()
            .is_some_and(|options| options.deprecated()),
    })
}

/// Camel-cases a protobuf name the way protoc-gen-go names its Go identifiers.
///
/// A `.` followed by a lowercase letter is dropped, any other `.` becomes `_`.
/// A leading `_` becomes `X`. A `_` followed by a lowercase letter is dropped.
/// The first letter of every word is upper-cased.
pub(crate) fn go_camel_case(name: &str) -> String {
    let bytes = name.as_bytes();
    let lower_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_lowercase);

    let mut out = String::with_capacity(name.len());
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'.' if lower_at(i + 1) => {}
            b'.' => out.push('_'),
            b'_' if i == 0 || bytes[i - 1] == b'.' => out.push('X'),
            b'_' if lower_at(i + 1) => {}
            c if c.is_ascii_digit() => out.push(char::from(c)),
            c => {
                out.push(char::from(c.to_ascii_uppercase()));
                while lower_at(i + 1) {
                    i += 1;
                    out.push(char::from(bytes[i]));
                }
            }
        }
        i += 1;
    }
    out
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use prost_types::{
        FileOptions, MessageOptions, MethodOptions, ServiceDescriptorProto, ServiceOptions,
    };

    use super::*;

    fn message(name: &str, nested: Vec<DescriptorProto>) -> DescriptorProto {
        DescriptorProto {
            name: Some(name.to_string()),
            nested_type: nested,
            ..Default::default()
        }
    }

    fn file(name: &str, package: &str, go_package: Option<&str>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some(package.to_string()),
            options: go_package.map(|go_package| FileOptions {
                go_package: Some(go_package.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn rpc(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
        MethodDescriptorProto {
            name: Some(name.to_string()),
            input_type: Some(input.to_string()),
            output_type: Some(output.to_string()),
            ..Default::default()
        }
    }

    fn greeter() -> FileDescriptorProto {
        let mut greeter = file(
            "helloworld/helloworld.proto",
            "helloworld",
            Some("example.com/helloworld;helloworld"),
        );
        greeter.message_type = vec![
            message("HelloRequest", Vec::new()),
            message("HelloReply", Vec::new()),
        ];
        greeter.service = vec![ServiceDescriptorProto {
            name: Some("Greeter".to_string()),
            method: vec![
                rpc("SayHello", ".helloworld.HelloRequest", ".helloworld.HelloReply"),
                MethodDescriptorProto {
                    client_streaming: Some(true),
                    server_streaming: Some(true),
                    options: Some(MethodOptions {
                        deprecated: Some(true),
                        ..Default::default()
                    }),
                    ..rpc(
                        "say_hello_stream",
                        ".helloworld.HelloRequest",
                        ".google.protobuf.Empty",
                    )
                },
            ],
            options: Some(ServiceOptions {
                deprecated: Some(true),
                ..Default::default()
            }),
        }];
        greeter
    }

    fn empty() -> FileDescriptorProto {
        let mut empty = file(
            "google/protobuf/empty.proto",
            "google.protobuf",
            Some("google.golang.org/protobuf/types/known/emptypb"),
        );
        empty.message_type = vec![message("Empty", Vec::new())];
        empty
    }

    #[rstest::rstest]
    #[case("example.com/foo;bar", "example.com/foo", "bar")]
    #[case("example.com/foo", "example.com/foo", "foo")]
    #[case("example.com/route-guide", "example.com/route-guide", "route_guide")]
    fn go_packages(#[case] option: &str, #[case] import_path: &str, #[case] name: &str) {
        assert_eq!(
            go_package(&file("a.proto", "a", Some(option))),
            Some(GoPackage {
                import_path: import_path.to_string(),
                name: name.to_string(),
            })
        );
    }

    #[test]
    fn no_go_package() {
        assert_eq!(go_package(&file("a.proto", "a", None)), None);
        assert_eq!(go_package(&file("a.proto", "a", Some(""))), None);
    }

    #[rstest::rstest]
    #[case("Greeter", "Greeter")]
    #[case("route_guide", "RouteGuide")]
    #[case("say_hello_stream", "SayHelloStream")]
    #[case("_private", "XPrivate")]
    #[case("Outer.Inner", "Outer_Inner")]
    #[case("outer.inner", "OuterInner")]
    #[case("v2_api", "V2Api")]
    #[case("HTTPServer", "HTTPServer")]
    #[case("foo__bar", "Foo_Bar")]
    fn camel_case(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(go_camel_case(name), expected);
    }

    #[test]
    fn indexes_nested_messages() {
        let mut outer = file("outer.proto", "pkg", Some("example.com/pkg"));
        let map_entry = DescriptorProto {
            name: Some("LabelsEntry".to_string()),
            options: Some(MessageOptions {
                map_entry: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        outer.message_type = vec![message(
            "Outer",
            vec![
                message("Inner", Vec::new()),
                message("inner_message", Vec::new()),
                map_entry,
            ],
        )];

        let index = TypeIndex::new(&[outer]);
        assert_eq!(
            index.resolve(".pkg.Outer").unwrap(),
            GoIdent::new("example.com/pkg", "Outer")
        );
        assert_eq!(
            index.resolve(".pkg.Outer.Inner").unwrap(),
            GoIdent::new("example.com/pkg", "Outer_Inner")
        );
        assert_eq!(
            index.resolve(".pkg.Outer.inner_message").unwrap(),
            GoIdent::new("example.com/pkg", "OuterInnerMessage")
        );
        assert!(matches!(
            index.resolve(".pkg.Outer.LabelsEntry"),
            Err(GeneratorError::UnresolvedType(_))
        ));
    }

    #[test]
    fn parses_services() {
        let files = [empty(), greeter()];
        let index = TypeIndex::new(&files);
        let parsed = parse_proto_file(&files[1], &index, false).unwrap();

        assert_eq!(parsed.proto_path, "helloworld/helloworld.proto");
        assert_eq!(parsed.go_package_name, "helloworld");
        assert_eq!(parsed.go_import_path, "example.com/helloworld");
        assert_eq!(
            parsed.package_of("google.golang.org/protobuf/types/known/emptypb"),
            "emptypb"
        );

        let service = &parsed.services[0];
        assert_eq!(service.name, "Greeter");
        assert!(service.deprecated);

        let unary = &service.methods[0];
        assert_eq!(unary.name, "SayHello");
        assert_eq!(unary.service, "Greeter");
        assert_eq!(
            unary.input,
            GoIdent::new("example.com/helloworld", "HelloRequest")
        );
        assert!(!unary.deprecated);

        let stream = &service.methods[1];
        assert_eq!(stream.name, "SayHelloStream");
        assert!(stream.client_streaming && stream.server_streaming);
        assert!(stream.deprecated);
        assert_eq!(
            stream.output,
            GoIdent::new("google.golang.org/protobuf/types/known/emptypb", "Empty")
        );
        assert_eq!(
            stream.client_handle(),
            GoIdent::new("example.com/helloworld", "Greeter_SayHelloStreamClient")
        );

        assert_eq!(
            parsed.messages,
            [
                GoIdent::new("example.com/helloworld", "HelloRequest"),
                GoIdent::new("example.com/helloworld", "HelloReply"),
            ]
        );
    }

    #[test]
    fn import_package_clears_import_path() {
        let files = [empty(), greeter()];
        let index = TypeIndex::new(&files);
        let parsed = parse_proto_file(&files[1], &index, true).unwrap();
        assert_eq!(parsed.go_import_path, "");
        assert_eq!(parsed.go_package_name, "helloworld");
        assert_eq!(
            parsed.services[0].methods[0].input.import_path,
            "example.com/helloworld"
        );
        assert_eq!(
            parsed.services[0].methods[1].server_handle().import_path,
            "example.com/helloworld"
        );
        assert_eq!(parsed.messages.len(), 2);
    }

    #[test]
    fn missing_go_package() {
        let files = [file("a.proto", "a", None)];
        let index = TypeIndex::new(&files);
        let Err(GeneratorError::MissingGoPackage(name)) =
            parse_proto_file(&files[0], &index, false)
        else {
            panic!("Expected MissingGoPackage error");
        };
        assert_eq!(name, "a.proto");
    }

    #[test]
    fn unresolved_type() {
        let files = [greeter()];
        let index = TypeIndex::new(&files);
        let Err(GeneratorError::UnresolvedType(name)) = parse_proto_file(&files[0], &index, false)
        else {
            panic!("Expected UnresolvedType error");
        };
        assert_eq!(name, ".google.protobuf.Empty");
    }

    #[test]
    fn malformed_method() {
        let mut broken = greeter();
        broken.service[0].method[0].output_type = None;
        let files = [empty(), broken];
        let index = TypeIndex::new(&files);
        assert!(matches!(
            parse_proto_file(&files[1], &index, false),
            Err(GeneratorError::MalformedMethod(_))
        ));
    }
}
