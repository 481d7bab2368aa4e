// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_root = "proto";

    println!("cargo:rerun-if-changed={proto_root}/lockstride.proto");

    // Regenerate the gRPC/protobuf sources when `protoc` is available.
    // Environments without `protoc` (e.g. offline builds) fall back to the
    // committed output under `src/proto/lockstride.v1.rs`.
    let result = tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .out_dir("src/proto") // generated Rust goes here
        .compile(&[format!("{proto_root}/lockstride.proto")], &[proto_root]);

    if let Err(error) = result {
        let generated = std::path::Path::new("src/proto/lockstride.v1.rs");
        if generated.exists() {
            println!(
                "cargo:warning=protoc unavailable ({error}); building against committed src/proto/lockstride.v1.rs"
            );
        } else {
            return Err(Box::new(error));
        }
    }

    Ok(())
}
