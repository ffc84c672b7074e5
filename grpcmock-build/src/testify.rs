//! Call-recording doubles on top of `github.com/stretchr/testify/mock`.
//!
//! Every method records its invocation and answers with the canned values of
//! the matching expectation. Each method that deals in protocol messages gets a
//! paired `On<Method>` expectation setter, and every referenced message or
//! stream handle type gets an `Any<Type>()` matcher helper.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    error::{GeneratorError, GeneratorResult},
    golang::{Accessor, CallArgs, Decl, Expr, FuncDecl, GoFile, Stmt, StructDecl},
    model::{GoIdent, ProtoFile, ServiceDefinition},
    registry::{MockStrategy, StrategyRegistry},
    signature::{
        client_signature, server_signature, Argument, Builtin, Receiver, Signature, TypeRef,
    },
    stream::StreamHandleContract,
    CLIENT_SUFFIX, MOCK_PREFIX, SERVER_SUFFIX,
};

const TESTIFY_MOCK_PACKAGE: &str = "github.com/stretchr/testify/mock";

/// Name of the variable holding the recorded call's return values.
const RESULTS: &str = "args";

fn testify_ident(name: &str) -> GoIdent {
    GoIdent::new(TESTIFY_MOCK_PACKAGE, name)
}

/// The call-recording strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestifyStrategy;

impl TestifyStrategy {
    /// Name the strategy is registered under.
    pub const NAME: &'static str = "testify";
}

/// Registers the strategy.
pub fn register(registry: &mut StrategyRegistry) {
    registry.register(TestifyStrategy::NAME, || Box::new(TestifyStrategy));
}

impl MockStrategy for TestifyStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn mock(&self, file: &ProtoFile, out: &mut GoFile) -> GeneratorResult<()> {
        let mut matchers = MatcherRegistry::default();

        for service in &file.services {
            debug!(service = %service.name, "generating testify doubles");
            ServiceMocker {
                file,
                service,
                out: &mut *out,
                matchers: &mut matchers,
            }
            .generate()?;
        }

        for decl in matchers.helpers(file) {
            out.push(decl);
        }
        Ok(())
    }
}

struct ServiceMocker<'a> {
    file: &'a ProtoFile,
    service: &'a ServiceDefinition,
    out: &'a mut GoFile,
    matchers: &'a mut MatcherRegistry,
}

impl ServiceMocker<'_> {
    fn generate(&mut self) -> GeneratorResult<()> {
        let service = self.service;

        let client = self.double(&format!("{MOCK_PREFIX}{}{CLIENT_SUFFIX}", service.name));
        for method in &service.methods {
            let signature =
                client_signature(method).with_receiver(Receiver::pointer("c", client.clone()));
            self.method_definitions(&signature, method.deprecated)?;
            if let Some(contract) = StreamHandleContract::client(method) {
                self.stream_handle(&contract)?;
            }
        }

        let server = self.double(&format!("{MOCK_PREFIX}{}{SERVER_SUFFIX}", service.name));
        for method in &service.methods {
            let signature =
                server_signature(method).with_receiver(Receiver::pointer("s", server.clone()));
            self.method_definitions(&signature, method.deprecated)?;
            if let Some(contract) = StreamHandleContract::server(method) {
                self.stream_handle(&contract)?;
            }
        }

        Ok(())
    }

    /// Emits the double's type embedding `mock.Mock` and its constructor.
    fn double(&mut self, name: &str) -> GoIdent {
        let ident = GoIdent::new(self.file.go_import_path.clone(), name);
        self.out.push(Decl::Struct(StructDecl {
            name: ident.clone(),
            embedded: vec![testify_ident("Mock")],
        }));
        self.out.push(Decl::Func(FuncDecl {
            deprecated: self.service.deprecated,
            signature: Signature::new(format!("New{name}"))
                .returning(TypeRef::pointer(ident.clone())),
            body: vec![Stmt::Return(vec![Expr::NewZeroed(ident.clone())])],
        }));
        ident
    }

    fn stream_handle(&mut self, contract: &StreamHandleContract) -> GeneratorResult<()> {
        let double = self.double(&format!("{MOCK_PREFIX}{}", contract.ident.name));
        for handle_method in &contract.methods {
            let signature = handle_method
                .signature
                .clone()
                .with_receiver(Receiver::pointer("x", double.clone()));
            if handle_method.typed {
                self.method_definitions(&signature, false)?;
            } else {
                self.out.push(Decl::Func(FuncDecl {
                    deprecated: false,
                    body: recording_body(&signature),
                    signature,
                }));
            }
        }
        Ok(())
    }

    /// Emits the call-recording method followed by its expectation setter.
    fn method_definitions(&mut self, signature: &Signature, deprecated: bool) -> GeneratorResult<()> {
        self.matchers.collect(self.file, signature)?;
        self.out.push(Decl::Func(FuncDecl {
            deprecated,
            signature: signature.clone(),
            body: recording_body(signature),
        }));
        self.out.push(Decl::Func(expectation_setter(signature, deprecated)));
        Ok(())
    }
}

fn receiver_name(signature: &Signature) -> String {
    signature
        .receiver
        .as_ref()
        .map_or_else(String::new, |receiver| receiver.name.clone())
}

fn argument_names(arguments: &[Argument]) -> Vec<String> {
    arguments.iter().map(|arg| arg.name.clone()).collect()
}

/// Records the call, spreading a variadic argument into individual values, and
/// returns the canned values converted to the declared return types.
pub(crate) fn recording_body(signature: &Signature) -> Vec<Stmt> {
    let receiver = receiver_name(signature);
    let mut body = Vec::new();

    let args = match signature.variadic() {
        Some(variadic) => {
            let list = format!("{}0", variadic.name);
            body.push(Stmt::Flatten {
                list: list.clone(),
                fixed: argument_names(signature.fixed_arguments()),
                variadic: variadic.name.clone(),
            });
            CallArgs::Spread(list)
        }
        None => CallArgs::Positional(argument_names(signature.arguments())),
    };

    if signature.returns().is_empty() {
        body.push(Stmt::Record {
            results: None,
            receiver,
            args,
        });
        return body;
    }

    body.push(Stmt::Record {
        results: Some(RESULTS.to_string()),
        receiver,
        args,
    });
    body.push(Stmt::Return(
        signature
            .returns()
            .iter()
            .enumerate()
            .map(|(index, ty)| return_value(index, ty))
            .collect(),
    ));
    body
}

fn return_value(index: usize, ty: &TypeRef) -> Expr {
    let accessor = match ty.as_builtin() {
        Some(Builtin::Bool) => Some(Accessor::Bool),
        Some(Builtin::Int) => Some(Accessor::Int),
        Some(Builtin::String) => Some(Accessor::String),
        Some(Builtin::Error) => Some(Accessor::Error),
        Some(Builtin::Interface) | None => None,
    };
    match accessor {
        Some(accessor) => Expr::Accessor {
            results: RESULTS.to_string(),
            accessor,
            index,
        },
        None => Expr::Cast {
            results: RESULTS.to_string(),
            index,
            ty: ty.clone(),
        },
    }
}

/// `On<Method>` registering an expectation under the original method name with
/// the same flattened argument list the recording body passes to `Called`.
pub(crate) fn expectation_setter(signature: &Signature, deprecated: bool) -> FuncDecl {
    let args = match signature.variadic() {
        Some(variadic) => CallArgs::Appended {
            fixed: argument_names(signature.fixed_arguments()),
            rest: variadic.name.clone(),
        },
        None => CallArgs::Positional(argument_names(signature.arguments())),
    };

    FuncDecl {
        deprecated,
        signature: signature.expectation_setter(&testify_ident("Call")),
        body: vec![Stmt::Return(vec![Expr::Expect {
            receiver: receiver_name(signature),
            method: signature.name.clone(),
            args,
        }])],
    }
}

/// Distinct message and stream handle types referenced by generated methods,
/// keyed by the name of their `Any<Type>` helper.
///
/// Only types declared by the file being mocked get a helper. Mock files of
/// one Go package would otherwise redeclare helpers for shared types.
#[derive(Debug, Default)]
pub(crate) struct MatcherRegistry {
    types: BTreeMap<String, GoIdent>,
}

impl MatcherRegistry {
    fn collect(&mut self, file: &ProtoFile, signature: &Signature) -> GeneratorResult<()> {
        let types = signature
            .arguments()
            .iter()
            .map(|arg| &arg.ty)
            .chain(signature.returns());
        for ty in types {
            if let Some(ident) = ty.ident().filter(|ident| file.declares(ident)) {
                self.register(ident)?;
            }
        }
        Ok(())
    }

    pub(crate) fn register(&mut self, ident: &GoIdent) -> GeneratorResult<()> {
        if ident.is_ambient() {
            return Ok(());
        }

        let helper = format!("Any{}", ident.name);
        match self.types.get(&helper) {
            Some(existing) if existing == ident => Ok(()),
            Some(existing) => Err(GeneratorError::MatcherCollision {
                helper,
                first: format!("{}.{}", existing.import_path, existing.name),
                second: format!("{}.{}", ident.import_path, ident.name),
            }),
            None => {
                self.types.insert(helper, ident.clone());
                Ok(())
            }
        }
    }

    fn helpers(&self, file: &ProtoFile) -> Vec<Decl> {
        self.types
            .iter()
            .map(|(helper, ident)| {
                Decl::Func(FuncDecl {
                    deprecated: false,
                    signature: Signature::new(helper)
                        .returning(TypeRef::named(testify_ident("AnythingOfTypeArgument"))),
                    body: vec![Stmt::Return(vec![Expr::CallWithString {
                        func: testify_ident("AnythingOfType"),
                        literal: format!("*{}.{}", file.package_of(&ident.import_path), ident.name),
                    }])],
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::model::MethodDefinition;

    const PKG: &str = "example.com/greeter";

    fn method(name: &str, client_streaming: bool, server_streaming: bool) -> MethodDefinition {
        MethodDefinition {
            name: name.to_string(),
            service: "Greeter".to_string(),
            service_import_path: PKG.to_string(),
            input: GoIdent::new(PKG, "Req"),
            output: GoIdent::new(PKG, "Res"),
            client_streaming,
            server_streaming,
            deprecated: false,
        }
    }

    fn file(methods: Vec<MethodDefinition>) -> ProtoFile {
        ProtoFile {
            proto_path: "greeter.proto".to_string(),
            go_package_name: "greeter".to_string(),
            go_import_path: PKG.to_string(),
            services: vec![ServiceDefinition {
                name: "Greeter".to_string(),
                deprecated: false,
                methods,
            }],
            messages: vec![GoIdent::new(PKG, "Req"), GoIdent::new(PKG, "Res")],
            packages: BTreeMap::new(),
        }
    }

    fn mock(file: &ProtoFile) -> GoFile {
        let mut out = GoFile::new(&file.go_package_name, &file.go_import_path);
        TestifyStrategy.mock(file, &mut out).unwrap();
        out
    }

    fn struct_names(out: &GoFile) -> Vec<&str> {
        out.decls
            .iter()
            .filter_map(Decl::as_struct)
            .map(|decl| decl.name.name.as_str())
            .collect()
    }

    fn methods_of<'a>(out: &'a GoFile, double: &str) -> Vec<&'a str> {
        out.funcs()
            .filter(|func| {
                func.signature
                    .receiver
                    .as_ref()
                    .and_then(|receiver| receiver.ty.ident())
                    .is_some_and(|ident| ident.name == double)
            })
            .map(|func| func.signature.name.as_str())
            .collect()
    }

    fn free_functions(out: &GoFile) -> Vec<&str> {
        out.funcs()
            .filter(|func| func.signature.receiver.is_none())
            .map(|func| func.signature.name.as_str())
            .collect()
    }

    #[test]
    fn unary_greeter() {
        let out = mock(&file(vec![method("Get", false, false)]));

        assert_eq!(struct_names(&out), ["MockGreeterClient", "MockGreeterServer"]);
        assert_eq!(methods_of(&out, "MockGreeterClient"), ["Get", "OnGet"]);
        assert_eq!(methods_of(&out, "MockGreeterServer"), ["Get", "OnGet"]);
        assert_eq!(
            free_functions(&out),
            ["NewMockGreeterClient", "NewMockGreeterServer", "AnyReq", "AnyRes"]
        );
    }

    #[test]
    fn bidirectional_chat() {
        let out = mock(&file(vec![method("Chat", true, true)]));

        assert_eq!(
            struct_names(&out),
            [
                "MockGreeterClient",
                "MockGreeter_ChatClient",
                "MockGreeterServer",
                "MockGreeter_ChatServer"
            ]
        );
        assert_eq!(
            methods_of(&out, "MockGreeter_ChatClient"),
            [
                "Header",
                "Trailer",
                "CloseSend",
                "Context",
                "SendMsg",
                "RecvMsg",
                "Send",
                "OnSend",
                "Recv",
                "OnRecv"
            ]
        );
        assert_eq!(
            methods_of(&out, "MockGreeter_ChatServer"),
            [
                "SetHeader",
                "SendHeader",
                "SetTrailer",
                "Context",
                "SendMsg",
                "RecvMsg",
                "Recv",
                "OnRecv",
                "Send",
                "OnSend"
            ]
        );
        assert_eq!(
            free_functions(&out),
            [
                "NewMockGreeterClient",
                "NewMockGreeter_ChatClient",
                "NewMockGreeterServer",
                "NewMockGreeter_ChatServer",
                "AnyGreeter_ChatClient",
                "AnyGreeter_ChatServer",
                "AnyReq",
                "AnyRes"
            ]
        );
    }

    #[rstest::rstest]
    #[case(true, false, &["Send", "OnSend", "CloseAndRecv", "OnCloseAndRecv"], &["Recv", "OnRecv", "SendAndClose", "OnSendAndClose"])]
    #[case(false, true, &["Recv", "OnRecv"], &["Send", "OnSend"])]
    fn one_way_streams(
        #[case] client_streaming: bool,
        #[case] server_streaming: bool,
        #[case] client_typed: &[&str],
        #[case] server_typed: &[&str],
    ) {
        let out = mock(&file(vec![method("Flow", client_streaming, server_streaming)]));

        let client = methods_of(&out, "MockGreeter_FlowClient");
        assert_eq!(&client[6..], client_typed);
        let server = methods_of(&out, "MockGreeter_FlowServer");
        assert_eq!(&server[6..], server_typed);
    }

    #[test]
    fn matchers_are_deduplicated() {
        let out = mock(&file(vec![
            method("A", false, false),
            method("B", false, false),
            method("C", false, false),
        ]));

        let any_req = free_functions(&out)
            .into_iter()
            .filter(|name| *name == "AnyReq")
            .count();
        assert_eq!(any_req, 1);
    }

    #[test]
    fn matcher_targets_pointer_type() {
        let out = mock(&file(vec![method("Get", false, false)]));
        let helper = out
            .funcs()
            .find(|func| func.signature.name == "AnyReq")
            .unwrap();
        assert_eq!(
            helper.body,
            [Stmt::Return(vec![Expr::CallWithString {
                func: testify_ident("AnythingOfType"),
                literal: "*greeter.Req".to_string(),
            }])]
        );
    }

    #[test]
    fn ambient_types_get_no_matcher() {
        let out = mock(&file(vec![method("Get", false, false)]));
        let names = free_functions(&out);
        assert!(!names.contains(&"AnyContext"));
        assert!(!names.contains(&"AnyCallOption"));
    }

    #[test]
    fn foreign_types_get_no_matcher() {
        let mut get = method("Get", false, false);
        get.output = GoIdent::new("google.golang.org/protobuf/types/known/emptypb", "Empty");
        let mut chat = method("Chat", true, true);
        chat.output = get.output.clone();

        let out = mock(&file(vec![get, chat]));
        let matchers: Vec<&str> = free_functions(&out)
            .into_iter()
            .filter(|name| name.starts_with("Any"))
            .collect();
        assert_eq!(
            matchers,
            ["AnyGreeter_ChatClient", "AnyGreeter_ChatServer", "AnyReq"]
        );

        let handle = out
            .funcs()
            .find(|func| func.signature.name == "AnyGreeter_ChatClient")
            .unwrap();
        assert_eq!(
            handle.body,
            [Stmt::Return(vec![Expr::CallWithString {
                func: testify_ident("AnythingOfType"),
                literal: "*greeter.Greeter_ChatClient".to_string(),
            }])]
        );
    }

    #[test]
    fn colliding_matchers_fail() {
        let mut other = method("Other", false, false);
        other.input = GoIdent::new("example.com/other", "Req");

        let mut file = file(vec![method("Get", false, false), other]);
        file.messages.push(GoIdent::new("example.com/other", "Req"));
        let mut out = GoFile::new("greeter", PKG);
        let Err(error) = TestifyStrategy.mock(&file, &mut out) else {
            panic!("Expected MatcherCollision error");
        };
        assert!(matches!(
            error,
            GeneratorError::MatcherCollision { ref helper, .. } if helper == "AnyReq"
        ));
    }

    #[test]
    fn return_accessors() {
        let signature = Signature::new("Mixed")
            .with_receiver(Receiver::pointer("x", GoIdent::new(PKG, "MockMixed")))
            .returning(TypeRef::builtin(Builtin::Bool))
            .returning(TypeRef::builtin(Builtin::Int))
            .returning(TypeRef::builtin(Builtin::String))
            .returning(TypeRef::pointer(GoIdent::new(PKG, "Res")))
            .returning(TypeRef::named(GoIdent::new(PKG, "Greeter_ChatClient")))
            .returning(TypeRef::error());

        let body = recording_body(&signature);
        let Some(Stmt::Return(values)) = body.last() else {
            panic!("Expected a return statement");
        };
        let accessors: Vec<Option<Accessor>> = values
            .iter()
            .map(|value| match value {
                Expr::Accessor { accessor, .. } => Some(*accessor),
                _ => None,
            })
            .collect();
        assert_eq!(
            accessors,
            [
                Some(Accessor::Bool),
                Some(Accessor::Int),
                Some(Accessor::String),
                None,
                None,
                Some(Accessor::Error)
            ]
        );
        assert_eq!(
            values[3],
            Expr::Cast {
                results: RESULTS.to_string(),
                index: 3,
                ty: TypeRef::pointer(GoIdent::new(PKG, "Res")),
            }
        );
    }

    #[test]
    fn no_results_are_discarded() {
        let signature = Signature::new("SetTrailer")
            .with_receiver(Receiver::pointer("x", GoIdent::new(PKG, "MockHandle")))
            .argument("md", TypeRef::named(GoIdent::metadata()));
        assert_eq!(
            recording_body(&signature),
            [Stmt::Record {
                results: None,
                receiver: "x".to_string(),
                args: CallArgs::Positional(vec!["md".to_string()]),
            }]
        );
    }

    /// Method name and argument list a body passes to `Called`, or a setter
    /// passes to `On`, with a variadic argument marked as spread.
    fn recorded_key(func: &FuncDecl) -> (String, Vec<String>) {
        let mut flattened: Option<Vec<String>> = None;
        for stmt in &func.body {
            match stmt {
                Stmt::Flatten {
                    fixed, variadic, ..
                } => {
                    let mut values = fixed.clone();
                    values.push(format!("{variadic}..."));
                    flattened = Some(values);
                }
                Stmt::Record { args, .. } => {
                    let values = match args {
                        CallArgs::Positional(values) => values.clone(),
                        CallArgs::Spread(_) => flattened.clone().unwrap(),
                        CallArgs::Appended { .. } => unreachable!(),
                    };
                    return (func.signature.name.clone(), values);
                }
                Stmt::Return(exprs) => {
                    if let [Expr::Expect { method, args, .. }] = exprs.as_slice() {
                        let values = match args {
                            CallArgs::Positional(values) => values.clone(),
                            CallArgs::Appended { fixed, rest } => {
                                let mut values = fixed.clone();
                                values.push(format!("{rest}..."));
                                values
                            }
                            CallArgs::Spread(_) => unreachable!(),
                        };
                        return (method.clone(), values);
                    }
                }
            }
        }
        panic!("{} neither records nor expects a call", func.signature.name);
    }

    #[test]
    fn setters_key_on_the_recorded_call() {
        let out = mock(&file(vec![
            method("Get", false, false),
            method("Upload", true, false),
            method("List", false, true),
            method("Chat", true, true),
        ]));

        let funcs: Vec<&FuncDecl> = out.funcs().collect();
        let mut pairs = 0;
        for (index, func) in funcs.iter().enumerate() {
            let Some(setter_name) = func.signature.name.strip_prefix("On") else {
                continue;
            };
            let body = funcs[index - 1];
            assert_eq!(body.signature.name, setter_name);
            assert_eq!(body.signature.receiver, func.signature.receiver);
            assert_eq!(recorded_key(func), recorded_key(body));
            pairs += 1;
        }
        // 4 client + 4 server methods, 5 typed client handle and 5 typed server
        // handle methods.
        assert_eq!(pairs, 18);
    }

    #[test]
    fn deprecation_marks_method_pairs_and_constructors() {
        let mut deprecated = method("Old", false, false);
        deprecated.deprecated = true;
        let mut file = file(vec![deprecated, method("New", false, false)]);
        file.services[0].deprecated = true;

        let out = mock(&file);
        let flagged: Vec<&str> = out
            .funcs()
            .filter(|func| func.deprecated)
            .map(|func| func.signature.name.as_str())
            .collect();
        assert_eq!(
            flagged,
            [
                "NewMockGreeterClient",
                "Old",
                "OnOld",
                "NewMockGreeterServer",
                "Old",
                "OnOld"
            ]
        );
    }

    #[test]
    fn idempotent() {
        let file = file(vec![method("Get", false, false), method("Chat", true, true)]);
        assert_eq!(mock(&file).render(), mock(&file).render());
    }

    #[test]
    fn renders_unary_service() {
        let out = mock(&file(vec![method("Get", false, false)]));
        assert_eq!(out.render(), include_str!("test_cases/testify_unary.go"));
    }

    #[test]
    fn registers_under_testify() {
        let mut registry = StrategyRegistry::new();
        register(&mut registry);
        assert_eq!(registry.resolve("testify").unwrap().name(), "testify");
    }
}
