use prost::Message;
use std::env::var;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // List of proto files containing a service definition
    let proto_files = &["echo.proto"];

    // Name of the folder containing the proto definitions
    let proto_folder = "proto";
    let out_dir = PathBuf::from(var("OUT_DIR")?);

    // protox keeps the build free of a system protoc
    let file_descriptors = protox::compile(proto_files, [proto_folder])?;
    std::fs::write(
        out_dir.join("descriptors.bin"),
        file_descriptors.encode_to_vec(),
    )?;

    tonic_prost_build::configure()
        .build_client(false)
        .compile_fds(file_descriptors)?;

    println!("cargo:rerun-if-changed={proto_folder}");
    Ok(())
}
