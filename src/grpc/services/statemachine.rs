//! Statemachine service gRPC implementation.
//!
//! Queries go straight to the store. `SendEvent` only validates and forwards
//! onto the event channel; callers poll `GetEventOutcome` for the result.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::health;
use crate::grpc::state::GrpcState;
use crate::keyspace;
use crate::models::{Configuration, EventRequest, FiniteStateMachine};
use crate::proto::v1::{
    self as proto, get_fsm_request::Query,
    statemachine_service_server::StatemachineService as StatemachineServiceTrait,
};
use crate::state_machine;
use crate::storage::{EntityKind, StoreError};

const STREAM_BUFFER: usize = 16;

fn required(value: &str, field: &str) -> Result<(), Status> {
    if value.is_empty() {
        return Err(Status::invalid_argument(format!("{field} is required")));
    }
    Ok(())
}

#[derive(Debug)]
pub struct StatemachineServiceImpl {
    state: GrpcState,
}

impl StatemachineServiceImpl {
    pub fn new(state: GrpcState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl StatemachineServiceTrait for StatemachineServiceImpl {
    async fn health(
        &self,
        _request: Request<proto::HealthRequest>,
    ) -> Result<Response<proto::HealthResponse>, Status> {
        if let Err(e) = self.state.store.health().await {
            warn!(error = %e, "Store health check failed");
            return Err(Status::unavailable(format!(
                "{}: {e}",
                health::NOT_SERVING
            )));
        }

        Ok(Response::new(proto::HealthResponse {
            state: health::SERVING.to_string(),
            release: self.state.release.clone(),
            tls_enabled: self.state.tls_enabled,
        }))
    }

    async fn put_configuration(
        &self,
        request: Request<proto::Configuration>,
    ) -> Result<Response<proto::PutResponse>, Status> {
        let config = Configuration::from(request.into_inner());
        debug!(name = %config.name, version = %config.version, "gRPC put configuration");

        state_machine::validate(&config)?;
        self.state.store.put_config(&config).await?;

        let id = config.version_id();
        info!(version_id = %id, "Configuration stored");
        Ok(Response::new(proto::PutResponse { id }))
    }

    async fn get_configuration(
        &self,
        request: Request<proto::GetRequest>,
    ) -> Result<Response<proto::Configuration>, Status> {
        let id = request.into_inner().id;
        debug!(version_id = %id, "gRPC get configuration");
        required(&id, "id")?;

        let config = self.state.store.get_config(&id).await?;
        Ok(Response::new(config.into()))
    }

    type StreamAllConfigurationsStream = ReceiverStream<Result<proto::Configuration, Status>>;

    async fn stream_all_configurations(
        &self,
        request: Request<proto::StreamConfigurationsRequest>,
    ) -> Result<Response<Self::StreamAllConfigurationsStream>, Status> {
        let name = request.into_inner().name;
        debug!(name = %name, "gRPC stream configurations");
        required(&name, "name")?;

        let versions = self.state.store.list_versions(&name).await?;
        let store = self.state.store.clone();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            for version_id in versions {
                let item = store
                    .get_config(&version_id)
                    .await
                    .map(proto::Configuration::from)
                    .map_err(Status::from);
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn put_finite_state_machine(
        &self,
        request: Request<proto::PutFsmRequest>,
    ) -> Result<Response<proto::FsmResponse>, Status> {
        let req = request.into_inner();
        let requested = req
            .fsm
            .map(FiniteStateMachine::try_from)
            .transpose()
            .map_err(|e| Status::invalid_argument(e.to_string()))?
            .ok_or_else(|| Status::invalid_argument("fsm is required"))?;
        required(&requested.config_id, "fsm.config_id")?;
        if !req.id.is_empty() && !keyspace::is_valid_identifier(&req.id) {
            return Err(Status::invalid_argument(format!(
                "id '{}' contains a reserved separator (':' or '#')",
                req.id
            )));
        }
        debug!(id = %req.id, config_id = %requested.config_id, "gRPC put fsm");

        let config = match self.state.store.get_config(&requested.config_id).await {
            Ok(config) => config,
            Err(e) if e.is_not_found() => {
                return Err(Status::invalid_argument(format!(
                    "configuration {} does not exist",
                    requested.config_id
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let id = if req.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            req.id
        };

        let fsm = state_machine::new_instance(&config)?;
        self.state.store.create_instance(&id, &fsm).await?;

        info!(id = %id, config_id = %fsm.config_id, state = %fsm.state, "FSM created");
        Ok(Response::new(proto::FsmResponse {
            id,
            fsm: Some(fsm.into()),
        }))
    }

    async fn get_finite_state_machine(
        &self,
        request: Request<proto::GetFsmRequest>,
    ) -> Result<Response<proto::FsmResponse>, Status> {
        let req = request.into_inner();
        debug!(config = %req.config, query = ?req.query, "gRPC get fsm");
        required(&req.config, "config")?;

        let id = match req.query {
            Some(Query::Id(id)) => {
                required(&id, "id")?;
                id
            }
            Some(Query::State(state)) => {
                required(&state, "state")?;
                let mut ids = self
                    .state
                    .store
                    .list_instances_in_state(&req.config, &state)
                    .await?;
                ids.sort();
                ids.into_iter().next().ok_or_else(|| {
                    StoreError::not_found(EntityKind::Fsm, format!("{}#{state}", req.config))
                })?
            }
            None => return Err(Status::invalid_argument("id or state is required")),
        };

        let fsm = self.state.store.get_instance(&id, &req.config).await?;
        Ok(Response::new(proto::FsmResponse {
            id,
            fsm: Some(fsm.into()),
        }))
    }

    type StreamAllInstateStream = ReceiverStream<Result<proto::FsmResponse, Status>>;

    async fn stream_all_instate(
        &self,
        request: Request<proto::StreamFsmRequest>,
    ) -> Result<Response<Self::StreamAllInstateStream>, Status> {
        let req = request.into_inner();
        debug!(config = %req.config, state = %req.state, "gRPC stream fsms in state");
        required(&req.config, "config")?;
        required(&req.state, "state")?;

        let ids = self
            .state
            .store
            .list_instances_in_state(&req.config, &req.state)
            .await?;
        let store = self.state.store.clone();
        let cfg_name = req.config;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            for id in ids {
                let item = match store.get_instance(&id, &cfg_name).await {
                    Ok(fsm) => Ok(proto::FsmResponse {
                        id,
                        fsm: Some(fsm.into()),
                    }),
                    // Moved or removed since the set was read
                    Err(e) if e.is_not_found() => continue,
                    Err(e) => Err(Status::from(e)),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn send_event(
        &self,
        request: Request<proto::EventRequest>,
    ) -> Result<Response<proto::EventResponse>, Status> {
        let mut event_request = EventRequest::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let has_event_name = event_request
            .event
            .as_ref()
            .is_some_and(|event| !event.event_name().is_empty());
        if !has_event_name {
            return Err(Status::invalid_argument("event with a transition event is required"));
        }
        if !event_request.has_destination() {
            return Err(Status::invalid_argument(
                "missing destination: config and id are required",
            ));
        }

        let event_id = event_request.ensure_identity();
        let event = event_request.event.clone();
        debug!(
            event_id = %event_id,
            config = %event_request.config,
            id = %event_request.id,
            "gRPC send event"
        );

        self.state
            .events
            .send(event_request)
            .await
            .map_err(|_| Status::unavailable("event channel is closed"))?;

        Ok(Response::new(proto::EventResponse {
            event_id,
            event: event.map(Into::into),
        }))
    }

    async fn get_event(
        &self,
        request: Request<proto::EventLookupRequest>,
    ) -> Result<Response<proto::EventResponse>, Status> {
        let req = request.into_inner();
        debug!(config = %req.config, event_id = %req.id, "gRPC get event");
        required(&req.config, "config")?;
        required(&req.id, "id")?;

        let event = self.state.store.get_event(&req.id, &req.config).await?;
        Ok(Response::new(proto::EventResponse {
            event_id: req.id,
            event: Some(event.into()),
        }))
    }

    async fn get_event_outcome(
        &self,
        request: Request<proto::EventLookupRequest>,
    ) -> Result<Response<proto::EventOutcome>, Status> {
        let req = request.into_inner();
        debug!(config = %req.config, event_id = %req.id, "gRPC get event outcome");
        required(&req.config, "config")?;
        required(&req.id, "id")?;

        let outcome = self.state.store.get_outcome(&req.id, &req.config).await?;
        Ok(Response::new(outcome.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{channel, EventReceiver};
    use crate::models::{Event, Transition};
    use crate::storage::{InMemoryStore, StoreService};
    use std::sync::Arc;
    use tokio_stream::StreamExt;
    use tonic::Code;

    fn orders() -> proto::Configuration {
        Configuration {
            name: "orders".to_string(),
            version: "v2".to_string(),
            states: vec![
                "start".to_string(),
                "shipping".to_string(),
                "delivered".to_string(),
            ],
            transitions: vec![
                Transition::new("start", "shipping", "ship"),
                Transition::new("shipping", "delivered", "deliver"),
            ],
            starting_state: "start".to_string(),
        }
        .into()
    }

    fn service() -> (StatemachineServiceImpl, Arc<InMemoryStore>, EventReceiver) {
        let store = Arc::new(InMemoryStore::new());
        let (tx, rx) = channel(8);
        let state = GrpcState::new(store.clone(), tx, "test");
        (StatemachineServiceImpl::new(state), store, rx)
    }

    #[tokio::test]
    async fn test_health() {
        let (svc, _, _rx) = service();
        let response = svc
            .health(Request::new(proto::HealthRequest {}))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.state, health::SERVING);
        assert_eq!(response.release, "test");
        assert!(!response.tls_enabled);
    }

    #[tokio::test]
    async fn test_put_configuration_twice() {
        let (svc, _, _rx) = service();

        let response = svc
            .put_configuration(Request::new(orders()))
            .await
            .unwrap();
        assert_eq!(response.into_inner().id, "orders:v2");

        let status = svc
            .put_configuration(Request::new(orders()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::AlreadyExists);
    }

    #[tokio::test]
    async fn test_put_configuration_invalid() {
        let (svc, _, _rx) = service();
        let mut config = orders();
        config.states.clear();

        let status = svc
            .put_configuration(Request::new(config))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_put_fsm_lifecycle() {
        let (svc, store, _rx) = service();
        svc.put_configuration(Request::new(orders())).await.unwrap();

        let fsm = proto::FiniteStateMachine {
            config_id: "orders:v2".to_string(),
            ..Default::default()
        };
        let created = svc
            .put_finite_state_machine(Request::new(proto::PutFsmRequest {
                id: "ord-1".to_string(),
                fsm: Some(fsm.clone()),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(created.id, "ord-1");
        assert_eq!(created.fsm.unwrap().state, "start");
        assert_eq!(
            store.list_instances_in_state("orders", "start").await.unwrap(),
            vec!["ord-1".to_string()]
        );

        let duplicate = svc
            .put_finite_state_machine(Request::new(proto::PutFsmRequest {
                id: "ord-1".to_string(),
                fsm: Some(fsm.clone()),
            }))
            .await
            .unwrap_err();
        assert_eq!(duplicate.code(), Code::AlreadyExists);

        let generated = svc
            .put_finite_state_machine(Request::new(proto::PutFsmRequest {
                id: String::new(),
                fsm: Some(fsm),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(Uuid::parse_str(&generated.id).is_ok());
    }

    #[tokio::test]
    async fn test_put_fsm_unknown_config() {
        let (svc, _, _rx) = service();
        let status = svc
            .put_finite_state_machine(Request::new(proto::PutFsmRequest {
                id: "ord-1".to_string(),
                fsm: Some(proto::FiniteStateMachine {
                    config_id: "orders:v9".to_string(),
                    ..Default::default()
                }),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_get_fsm_not_found() {
        let (svc, _, _rx) = service();
        let status = svc
            .get_finite_state_machine(Request::new(proto::GetFsmRequest {
                config: "orders".to_string(),
                query: Some(Query::Id("nope".to_string())),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        let status = svc
            .get_finite_state_machine(Request::new(proto::GetFsmRequest {
                config: "orders".to_string(),
                query: None,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    async fn put_fsm(svc: &StatemachineServiceImpl, id: &str) -> Result<String, Status> {
        svc.put_finite_state_machine(Request::new(proto::PutFsmRequest {
            id: id.to_string(),
            fsm: Some(proto::FiniteStateMachine {
                config_id: "orders:v2".to_string(),
                ..Default::default()
            }),
        }))
        .await
        .map(|response| response.into_inner().id)
    }

    #[tokio::test]
    async fn test_get_fsm_by_state() {
        let (svc, store, _rx) = service();
        svc.put_configuration(Request::new(orders())).await.unwrap();
        for id in ["ord-3", "ord-1", "ord-2"] {
            put_fsm(&svc, id).await.unwrap();
        }
        let mut shipped = store.get_instance("ord-1", "orders").await.unwrap();
        shipped.state = "shipping".to_string();
        store.put_instance("ord-1", &shipped).await.unwrap();
        store
            .update_state("orders", "ord-1", "start", "shipping")
            .await
            .unwrap();

        let by_state = |state: &str| proto::GetFsmRequest {
            config: "orders".to_string(),
            query: Some(Query::State(state.to_string())),
        };

        let first = svc
            .get_finite_state_machine(Request::new(by_state("start")))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(first.id, "ord-2");
        assert_eq!(first.fsm.unwrap().state, "start");

        let shipping = svc
            .get_finite_state_machine(Request::new(by_state("shipping")))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(shipping.id, "ord-1");

        let status = svc
            .get_finite_state_machine(Request::new(by_state("delivered")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_put_fsm_rejects_reserved_id() {
        let (svc, store, _rx) = service();
        svc.put_configuration(Request::new(orders())).await.unwrap();

        for id in ["ord:1", "ord#1"] {
            let status = put_fsm(&svc, id).await.unwrap_err();
            assert_eq!(status.code(), Code::InvalidArgument);
        }
        assert!(store
            .list_instances_in_state("orders", "start")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_put_fsm_creates_once() {
        let (svc, store, _rx) = service();
        svc.put_configuration(Request::new(orders())).await.unwrap();
        let svc = Arc::new(svc);

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { put_fsm(&svc, "ord-1").await })
            })
            .collect();

        let mut created = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => created += 1,
                Err(status) => assert_eq!(status.code(), Code::AlreadyExists),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(
            store.list_instances_in_state("orders", "start").await.unwrap(),
            vec!["ord-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_send_event_forwards_on_channel() {
        let (svc, _, mut rx) = service();
        let request: proto::EventRequest =
            EventRequest::new(Event::named("ship"), "orders", "ord-1").into();

        let response = svc
            .send_event(Request::new(request))
            .await
            .unwrap()
            .into_inner();
        assert!(!response.event_id.is_empty());

        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.event.unwrap().id(), response.event_id);
    }

    #[tokio::test]
    async fn test_send_event_validation() {
        let (svc, _, _rx) = service();

        let no_destination: proto::EventRequest =
            EventRequest::new(Event::named("ship"), "orders", "").into();
        let status = svc
            .send_event(Request::new(no_destination))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);

        let no_event = proto::EventRequest {
            event: None,
            config: "orders".to_string(),
            id: "ord-1".to_string(),
        };
        let status = svc.send_event(Request::new(no_event)).await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_send_event_closed_channel() {
        let (svc, _, rx) = service();
        drop(rx);

        let request: proto::EventRequest =
            EventRequest::new(Event::named("ship"), "orders", "ord-1").into();
        let status = svc.send_event(Request::new(request)).await.unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn test_stream_all_configurations() {
        let (svc, _, _rx) = service();
        svc.put_configuration(Request::new(orders())).await.unwrap();
        let mut v3 = orders();
        v3.version = "v3".to_string();
        svc.put_configuration(Request::new(v3)).await.unwrap();

        let stream = svc
            .stream_all_configurations(Request::new(proto::StreamConfigurationsRequest {
                name: "orders".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        let versions: Vec<String> = stream
            .map(|item| item.unwrap().version)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(versions, vec!["v2".to_string(), "v3".to_string()]);

        let status = svc
            .stream_all_configurations(Request::new(proto::StreamConfigurationsRequest {
                name: String::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_get_event_outcome_not_found() {
        let (svc, _, _rx) = service();
        let status = svc
            .get_event_outcome(Request::new(proto::EventLookupRequest {
                config: "orders".to_string(),
                id: "missing".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }
}
