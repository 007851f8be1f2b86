//! Build script for the statemachine crate
//!
//! Compiles the Protocol Buffer definitions under `proto/statemachine/v1/` into
//! `$OUT_DIR/statemachine.v1.rs`, included by `src/proto/mod.rs`. The protobuf
//! messages double as the binary record format written to the store.
//!
//! `protoc` comes from `protoc-bin-vendored` unless `PROTOC` is already set.

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let proto_root = manifest_dir.join("proto");

    // google/protobuf/timestamp.proto
    let well_known_types = protoc_bin_vendored::include_path()?;

    let proto_files = ["statemachine/v1/statemachine.proto"];

    let proto_paths: Vec<PathBuf> = proto_files
        .iter()
        .map(|f| proto_root.join(f))
        .collect();

    for path in &proto_paths {
        if !path.exists() {
            return Err(format!("Proto file not found: {}", path.display()).into());
        }
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .build_transport(true)
        .file_descriptor_set_path(
            PathBuf::from(std::env::var("OUT_DIR")?).join("statemachine_descriptor.bin"),
        )
        .emit_rerun_if_changed(true)
        .compile_protos(&proto_paths, &[proto_root.clone(), well_known_types])?;

    println!("cargo:rerun-if-changed={}", proto_root.display());

    Ok(())
}
