//! Protocol Buffer types generated from `proto/statemachine/v1/statemachine.proto`.
//!
//! The generated messages double as the binary record form in the store
//! (see [`crate::codec`]) and as the gRPC wire types.

pub mod conversions;

pub mod v1 {
    #![allow(clippy::all)]
    tonic::include_proto!("statemachine.v1");

    /// Encoded descriptor set for gRPC reflection
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("statemachine_descriptor");
}
