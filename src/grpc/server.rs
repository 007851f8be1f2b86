//! gRPC server setup and lifecycle.
//!
//! The listener is bound before the server task starts so that a bad or
//! occupied address fails startup instead of a background task.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tracing::{error, info};

use crate::config::{ConfigurationError, GrpcConfig, TlsConfig, Verbosity};
use crate::grpc::services::StatemachineServiceImpl;
use crate::grpc::state::GrpcState;
use crate::proto::v1::statemachine_service_server::StatemachineServiceServer;
use crate::proto::v1::FILE_DESCRIPTOR_SET;

#[derive(Debug, Error)]
pub enum GrpcServerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to bind gRPC listener on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read TLS material {path}: {source}")]
    TlsMaterial {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build reflection service: {message}")]
    Reflection { message: String },

    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    #[error("gRPC server task failed: {message}")]
    Task { message: String },
}

async fn load_tls(tls: &TlsConfig) -> Result<ServerTlsConfig, GrpcServerError> {
    async fn read(tls: &TlsConfig, file: &str) -> Result<Vec<u8>, GrpcServerError> {
        let path = tls.path(file);
        tokio::fs::read(&path)
            .await
            .map_err(|source| GrpcServerError::TlsMaterial {
                path: path.display().to_string(),
                source,
            })
    }

    let ca = read(tls, TlsConfig::CA_FILE).await?;
    let cert = read(tls, TlsConfig::CERT_FILE).await?;
    let key = read(tls, TlsConfig::KEY_FILE).await?;

    Ok(ServerTlsConfig::new()
        .identity(Identity::from_pem(cert, key))
        .client_ca_root(Certificate::from_pem(ca)))
}

#[derive(Debug)]
pub struct GrpcServer {
    config: GrpcConfig,
    state: GrpcState,
    verbosity: Verbosity,
}

impl GrpcServer {
    pub fn new(config: GrpcConfig, state: GrpcState) -> Self {
        Self {
            config,
            state,
            verbosity: Verbosity::Normal,
        }
    }

    /// At `Trace` every request gets its own span
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Bind, register services and start serving in the background
    pub async fn start(self) -> Result<GrpcServerHandle, GrpcServerError> {
        self.config.validate()?;
        let address = self.config.socket_addr()?;

        let mut server = Server::builder();
        if self.config.tls.enabled {
            server = server.tls_config(load_tls(&self.config.tls).await?)?;
        }
        if self.verbosity >= Verbosity::Trace {
            server = server.trace_fn(|request| {
                tracing::trace_span!("grpc_request", path = %request.uri().path())
            });
        }

        let state = self.state.with_tls(self.config.tls.enabled);
        let mut router = server.add_service(StatemachineServiceServer::new(
            StatemachineServiceImpl::new(state),
        ));

        if self.config.enable_reflection {
            let reflection_service = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                .build_v1()
                .map_err(|e| GrpcServerError::Reflection {
                    message: e.to_string(),
                })?;
            router = router.add_service(reflection_service);
            info!("gRPC reflection service enabled");
        }

        let health_reporter = if self.config.enable_health_service {
            let (mut health_reporter, grpc_health_service) = tonic_health::server::health_reporter();
            health_reporter
                .set_serving::<StatemachineServiceServer<StatemachineServiceImpl>>()
                .await;
            router = router.add_service(grpc_health_service);
            info!("gRPC health service (grpc.health.v1) enabled");
            Some(health_reporter)
        } else {
            None
        };

        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| GrpcServerError::Bind { address, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GrpcServerError::Bind { address, source })?;

        info!(
            address = %local_addr,
            tls = self.config.tls.enabled,
            reflection = self.config.enable_reflection,
            health = self.config.enable_health_service,
            "gRPC server listening"
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let result = router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = &result {
                error!(error = %e, "gRPC server error");
            }
            result
        });

        Ok(GrpcServerHandle {
            shutdown_tx: Some(shutdown_tx),
            handle,
            local_addr,
            health_reporter,
        })
    }
}

/// Handle for a running gRPC server
#[derive(Debug)]
pub struct GrpcServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), tonic::transport::Error>>,
    local_addr: SocketAddr,
    health_reporter: Option<tonic_health::server::HealthReporter>,
}

impl GrpcServerHandle {
    /// Address actually bound, useful when configured with port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting requests and wait for in-flight ones to finish
    pub async fn stop(mut self) -> Result<(), GrpcServerError> {
        if let Some(reporter) = &mut self.health_reporter {
            reporter
                .set_not_serving::<StatemachineServiceServer<StatemachineServiceImpl>>()
                .await;
        }
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        self.handle
            .await
            .map_err(|e| GrpcServerError::Task {
                message: e.to_string(),
            })??;

        info!(address = %self.local_addr, "gRPC server stopped");
        Ok(())
    }
}
