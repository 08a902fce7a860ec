//! Regenerates `crates/api/proto/gen` from the wire protocol definition.
//!
//! Run from this crate's directory, `protoc` must be on the PATH.

fn main() {
    std::env::set_var("OUT_DIR", "../api/proto/gen");
    prost_build::Config::new()
        .bytes(["."])
        .compile_protos(
            &[
                // Requests, responses and the envelope they travel in
                "../api/proto/wire.proto",
            ],
            &["../api/proto/"],
        )
        .expect("Failed to compile api protobuf protocol files");
}
