use dynrpc_core::method::StreamKind;
use dynrpc_core::reflection::client::{ReflectionClient, ReflectionResolveError};
use dynrpc_core::schema::{SchemaError, SchemaNode, SchemaSource, StaticSource};
use echo_service::{EchoServiceServer, FILE_DESCRIPTOR_SET, PROTO_DIR};
use echo_service_impl::EchoServiceImpl;
use prost_reflect::DescriptorPool;
use tonic::Code;
use tonic::service::Routes;


const ECHO_METHODS: [&str; 4] = [
    "echo.EchoService.UnaryEcho",
    "echo.EchoService.ServerStreamingEcho",
    "echo.EchoService.ClientStreamingEcho",
    "echo.EchoService.BidirectionalEcho",
];

fn reflective_source() -> SchemaSource<Routes> {
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .unwrap();

    let echo_service = EchoServiceServer::new(EchoServiceImpl);

    SchemaSource::reflective(Routes::new(reflection_service).add_service(echo_service))
}

fn static_source() -> SchemaSource<Routes> {
    SchemaSource::compile(&[PROTO_DIR], &["echo.proto"]).unwrap()
}

async fn assert_echo_schema(mut source: SchemaSource<Routes>) {
    let services = source.list_services().await.unwrap();
    assert!(services.contains(&"echo.EchoService".to_string()));

    let methods = source.list_methods().await.unwrap();
    let echo_methods: Vec<_> = methods
        .iter()
        .filter(|m| m.starts_with("echo."))
        .map(String::as_str)
        .collect();
    assert_eq!(echo_methods, ECHO_METHODS);

    match source.find_symbol("echo.EchoService").await.unwrap() {
        SchemaNode::Service(s) => assert_eq!(s.methods().count(), 4),
        other => panic!("Expected a service, got {other:?}"),
    }

    // Messages and enums live in an imported file.
    match source.find_symbol("echo.EchoRequest").await.unwrap() {
        SchemaNode::Message(m) => assert!(m.fields().any(|f| f.name() == "message")),
        other => panic!("Expected a message, got {other:?}"),
    }
    match source.find_symbol("echo.Tone").await.unwrap() {
        SchemaNode::Enum(e) => assert!(e.get_value_by_name("TONE_LOUD").is_some()),
        other => panic!("Expected an enum, got {other:?}"),
    }

    let method = source
        .find_method("echo.EchoService.ServerStreamingEcho")
        .await
        .unwrap();
    assert_eq!(method.stream_shape().kind(), StreamKind::ServerStreaming);
    assert_eq!(
        method.wire_path().unwrap().as_str(),
        "/echo.EchoService/ServerStreamingEcho"
    );

    assert!(matches!(
        source.find_method("echo.EchoRequest").await,
        Err(SchemaError::NotAMethod(name)) if name == "echo.EchoRequest"
    ));
}

#[tokio::test]
async fn test_static_source() {
    assert_echo_schema(static_source()).await;
}

#[tokio::test]
async fn test_reflective_source() {
    assert_echo_schema(reflective_source()).await;
}

#[tokio::test]
async fn test_static_source_lists_only_requested_files() {
    let mut source = static_source();

    // `echo_types.proto` is compiled as an import, its symbols resolve but it adds no services.
    assert_eq!(
        source.list_services().await.unwrap(),
        vec!["echo.EchoService".to_string()]
    );
}

#[tokio::test]
async fn test_static_source_keeps_requested_file_order() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("a.proto"),
        "syntax = \"proto3\";\npackage order;\nmessage Empty {}\nservice AService { rpc A(Empty) returns (Empty); }\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b.proto"),
        "syntax = \"proto3\";\npackage order;\nimport \"a.proto\";\nservice BService { rpc B(Empty) returns (Empty); }\n",
    )
    .unwrap();
    let include = dir.path().display().to_string();

    // `b.proto` imports `a.proto` but was requested first.
    let mut source: SchemaSource<Routes> =
        SchemaSource::compile(&[include.as_str()], &["b.proto", "a.proto"]).unwrap();

    assert_eq!(
        source.list_services().await.unwrap(),
        vec!["order.BService".to_string(), "order.AService".to_string()]
    );
    assert_eq!(
        source.list_methods().await.unwrap(),
        vec!["order.BService.B".to_string(), "order.AService.A".to_string()]
    );

    // Requesting the same file twice lists it once.
    let mut source: SchemaSource<Routes> =
        SchemaSource::compile(&[include.as_str()], &["a.proto", "a.proto"]).unwrap();
    assert_eq!(
        source.list_services().await.unwrap(),
        vec!["order.AService".to_string()]
    );
}

#[tokio::test]
async fn test_static_source_unknown_symbol() {
    let mut source = static_source();

    assert!(matches!(
        source.find_symbol("echo.Ghost").await,
        Err(SchemaError::SymbolNotFound(name)) if name == "echo.Ghost"
    ));
    assert!(matches!(
        source.find_method("echo.EchoService.Ghost").await,
        Err(SchemaError::SymbolNotFound(_))
    ));
}

#[test]
fn test_static_source_compile_errors() {
    let result = StaticSource::compile(&[PROTO_DIR], &["missing.proto"]);

    assert!(matches!(result, Err(SchemaError::CompileFailed(_))));
}

#[test]
fn test_static_source_from_descriptor_set() {
    let source = StaticSource::from_file_descriptor_set(FILE_DESCRIPTOR_SET).unwrap();

    assert_eq!(source.list_methods(), ECHO_METHODS);
}

#[tokio::test]
async fn test_reflective_source_unknown_symbol() {
    let mut source = reflective_source();

    let result = source.find_symbol("echo.Ghost").await;
    assert!(matches!(result, Err(SchemaError::SymbolNotFound(name)) if name == "echo.Ghost"));
}

#[tokio::test]
async fn test_reflective_source_without_reflection_service() {
    let mut source = SchemaSource::reflective(EchoServiceServer::new(EchoServiceImpl));

    let result = source.list_services().await;
    assert!(
        matches!(result, Err(SchemaError::ReflectionNotSupported(_))),
        "got {result:?}"
    );
}

#[tokio::test]
async fn test_reflection_client_fetches_imports() {
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .unwrap();
    let mut client = ReflectionClient::new(reflection_service);

    let fd_set = client
        .file_descriptor_set_by_symbol("echo.EchoService")
        .await
        .unwrap();

    let mut names: Vec<_> = fd_set.file.iter().map(|f| f.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["echo.proto", "echo_types.proto"]);

    let pool = DescriptorPool::from_file_descriptor_set(fd_set).unwrap();
    assert!(pool.get_message_by_name("echo.EchoResponse").is_some());
}

#[tokio::test]
async fn test_reflection_client_not_found() {
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .unwrap();
    let mut client = ReflectionClient::new(reflection_service);

    let err = client
        .file_descriptor_set_by_symbol("non.existent.Service")
        .await
        .unwrap_err();

    assert!(err.is_not_found(), "got {err:?}");
    assert!(!err.is_unimplemented());
}

#[tokio::test]
async fn test_reflection_client_unimplemented() {
    let mut client = ReflectionClient::new(EchoServiceServer::new(EchoServiceImpl));

    let err = client.list_services().await.unwrap_err();

    assert!(matches!(
        &err,
        ReflectionResolveError::ServerStreamInitFailed(status) if status.code() == Code::Unimplemented
    ));
    assert!(err.is_unimplemented());
}
