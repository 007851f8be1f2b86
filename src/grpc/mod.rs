//! gRPC server for the statemachine service.
//!
//! One service, `statemachine.v1.StatemachineService`, plus the standard
//! `grpc.health.v1` service and optional reflection.
//!
//! ```bash
//! grpcurl -plaintext localhost:7398 statemachine.v1.StatemachineService/Health
//! ```

pub mod server;
pub mod services;
pub mod state;

pub use server::{GrpcServer, GrpcServerError, GrpcServerHandle};
pub use services::StatemachineServiceImpl;
pub use state::GrpcState;
