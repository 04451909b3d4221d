use dynrpc_core::call::CallEngine;
use dynrpc_core::format::{JsonMessageFormatter, JsonMessageParser};
use dynrpc_core::grpc::{ClientStream, GrpcWebTransport, Transport, TransportError};
use dynrpc_core::method::DynamicMethod;
use dynrpc_core::schema::SchemaSource;
use echo_service::{EchoServiceServer, FILE_DESCRIPTOR_SET};
use echo_service_impl::EchoServiceImpl;
use prost_reflect::{DescriptorPool, DynamicMessage};
use tonic::metadata::MetadataMap;
use tonic::service::Routes;
use tonic_web::{GrpcWebClientLayer, GrpcWebClientService, GrpcWebLayer, GrpcWebService};
use tower::ServiceBuilder;


fn method(name: &str) -> DynamicMethod {
    let pool = DescriptorPool::decode(FILE_DESCRIPTOR_SET).unwrap();
    let service = pool.get_service_by_name("echo.EchoService").unwrap();
    DynamicMethod::new(service.methods().find(|m| m.name() == name).unwrap())
}

/// A gRPC-web client talking to an in-process gRPC-web server.
type WebEcho = GrpcWebClientService<GrpcWebService<EchoServiceServer<EchoServiceImpl>>>;

fn web_transport() -> GrpcWebTransport<WebEcho> {
    let service = ServiceBuilder::new()
        .layer(GrpcWebClientLayer::new())
        .layer(GrpcWebLayer::new())
        .service(EchoServiceServer::new(EchoServiceImpl));

    GrpcWebTransport::new(service)
}

async fn run(method_name: &str, input: &str) -> String {
    let mut engine = CallEngine::new(web_transport());
    let mut parser = JsonMessageParser::new(input.as_bytes());
    let mut out = Vec::new();

    engine
        .call(
            &method(method_name),
            &mut parser,
            &JsonMessageFormatter::new(),
            &mut out,
        )
        .await
        .unwrap();

    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_web_unary() {
    let out = run("UnaryEcho", r#"{"message":"hi"}"#).await;

    assert_eq!(out, "{\"message\":\"hi\"}\n");
}

#[tokio::test]
async fn test_web_server_streaming() {
    let out = run("ServerStreamingEcho", r#"{"message":"hi"}"#).await;

    assert_eq!(out.lines().count(), 3);
    assert_eq!(out.lines().last(), Some("{\"message\":\"hi - seq 2\"}"));
}

#[tokio::test]
async fn test_web_client_streaming() {
    let out = run("ClientStreamingEcho", r#"{"message":"A"}{"message":"B"}"#).await;

    assert_eq!(out, "{\"message\":\"AB\"}\n");
}

#[tokio::test]
async fn test_web_bidirectional() {
    let out = run("BidirectionalEcho", r#"{"message":"a"} {"message":"b"}"#).await;

    assert_eq!(
        out,
        "{\"message\":\"echo: a\"}\n{\"message\":\"echo: b\"}\n"
    );
}

#[tokio::test]
async fn test_web_rejects_unary_streams() {
    let mut transport = web_transport();
    let target = method("UnaryEcho").call_target().unwrap();

    let result = transport.new_stream(&target, MetadataMap::new()).await;

    assert!(matches!(result, Err(TransportError::NotAStreamRequest)));
}

#[tokio::test]
async fn test_web_server_streaming_needs_exactly_one_request() {
    let mut transport = web_transport();
    let echo = method("ServerStreamingEcho");
    let target = echo.call_target().unwrap();

    let mut stream = transport
        .new_stream(&target, MetadataMap::new())
        .await
        .unwrap();
    stream.send_msg(echo.request_message()).await.unwrap();
    stream.send_msg(echo.request_message()).await.unwrap();
    stream.close_send().await.unwrap();

    assert!(matches!(
        stream.recv_msg().await,
        Err(TransportError::MissingRequest(2))
    ));
}

#[tokio::test]
async fn test_web_send_after_close() {
    let mut transport = web_transport();
    let echo = method("ClientStreamingEcho");
    let target = echo.call_target().unwrap();

    let mut stream = transport
        .new_stream(&target, MetadataMap::new())
        .await
        .unwrap();
    stream.close_send().await.unwrap();

    let message: DynamicMessage = echo.request_message();
    assert!(matches!(
        stream.send_msg(message).await,
        Err(TransportError::SendAfterClose)
    ));
}

#[tokio::test]
async fn test_web_reflection() {
    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .unwrap();
    let routes = Routes::new(reflection_service).add_service(EchoServiceServer::new(EchoServiceImpl));

    let service = ServiceBuilder::new()
        .layer(GrpcWebClientLayer::new())
        .layer(GrpcWebLayer::new())
        .service(routes);
    let mut source = SchemaSource::reflective(service);

    let services = source.list_services().await.unwrap();
    assert!(services.contains(&"echo.EchoService".to_string()));

    let method = source
        .find_method("echo.EchoService.BidirectionalEcho")
        .await
        .unwrap();
    assert_eq!(method.full_name(), "echo.EchoService.BidirectionalEcho");
}
