//! LitClient: typed access to a local Lit SDK worker.
//!
//! The client owns:
//! - The request bridge to the worker's loopback address
//! - The worker supervisor, but only when this client started the worker
//!
//! Construction attaches to a worker that already answers `/isReady`, so several
//! clients (or processes) can share one worker; only the client that spawned it
//! will ever stop it.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::bridge::protocol::{
    self, AuthSigResponse, CreateSiweMessageParams, ExecuteJsParams, ExecuteJsResponse,
    GenerateAuthSigRequest, GetPropertyRequest, GetPropertyResponse, LitContractsClientConfig,
    LitNodeClientConfig, MintWithAuthParams, MintWithAuthResponse, PkpSignParams,
    PkpSignResponse, SessionSigsParams, SessionSigsResponse, SetAuthTokenRequest,
    SiweMessageResponse,
};
use crate::bridge::{BridgeError, JsonObject, RequestBridge};
use crate::health::WorkerState;
use crate::readiness::{DEFAULT_POLL_INTERVAL, ReadinessProbe, ReadinessTimeout};
use crate::supervisor::{SupervisorConfig, SupervisorError, WorkerArtifact, WorkerSupervisor};

/// How long a freshly spawned worker gets to report ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to start worker: {0}")]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Readiness(#[from] ReadinessTimeout),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    /// Port lives here so the supervisor and the bridge always agree on it.
    pub worker: SupervisorConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            worker: SupervisorConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.worker.port = port;
        self
    }

    pub fn with_artifact(mut self, artifact: WorkerArtifact) -> Self {
        self.worker.artifact = artifact;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_worker(mut self, worker: SupervisorConfig) -> Self {
        self.worker = worker;
        self
    }

    pub fn port(&self) -> u16 {
        self.worker.port
    }
}

pub struct LitClient {
    bridge: RequestBridge,
    supervisor: Option<WorkerSupervisor>,
}

impl LitClient {
    /// Attach to the worker on the default port, starting one if none answers.
    pub async fn connect() -> Result<Self, ClientError> {
        Self::new(ClientConfig::default()).await
    }

    pub async fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let port = config.port();
        let bridge = RequestBridge::loopback(&config.host, port)?;
        let probe = ReadinessProbe::new(bridge.clone()).with_interval(config.poll_interval);

        if probe.is_ready().await {
            tracing::info!(port, "Attached to running worker");
            return Ok(Self {
                bridge,
                supervisor: None,
            });
        }

        let mut supervisor = WorkerSupervisor::new(config.worker);
        supervisor.start().await?;

        if let Err(e) = probe.wait_until_ready(config.ready_timeout).await {
            let logs = String::from_utf8_lossy(&supervisor.logs()).into_owned();
            tracing::error!(port, logs = %logs.trim_end(), "Worker never became ready");
            if let Err(stop_err) = supervisor.stop().await {
                tracing::warn!(error = %stop_err, "Failed to stop worker after readiness timeout");
            }
            return Err(e.into());
        }

        tracing::info!(port, pid = ?supervisor.pid(), "Worker ready");
        Ok(Self {
            bridge,
            supervisor: Some(supervisor),
        })
    }

    /// Stop the worker if this client started it. Idempotent.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if let Some(supervisor) = self.supervisor.as_mut() {
            supervisor.stop().await?;
        }
        Ok(())
    }

    /// True when this client spawned (and will stop) the worker.
    pub fn owns_worker(&self) -> bool {
        self.supervisor.is_some()
    }

    pub fn supervisor(&self) -> Option<&WorkerSupervisor> {
        self.supervisor.as_ref()
    }

    /// State of the owned worker; `None` when attached to someone else's.
    pub fn worker_state(&self) -> Option<WorkerState> {
        self.supervisor.as_ref().map(WorkerSupervisor::state)
    }

    /// Captured worker output; `None` when attached to someone else's worker.
    pub fn logs(&self) -> Option<Vec<u8>> {
        self.supervisor.as_ref().map(WorkerSupervisor::logs)
    }

    pub fn bridge(&self) -> &RequestBridge {
        &self.bridge
    }

    /// Raw call for endpoints without a typed wrapper.
    pub async fn call<P>(&self, endpoint: &str, payload: Option<&P>) -> Result<JsonObject, ClientError>
    where
        P: Serialize + ?Sized,
    {
        Ok(self.bridge.call(endpoint, payload).await?)
    }

    async fn typed<P, R>(&self, endpoint: &str, payload: &P) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        Ok(self.bridge.call_typed(endpoint, Some(payload)).await?)
    }

    pub async fn is_ready(&self) -> bool {
        ReadinessProbe::new(self.bridge.clone()).is_ready().await
    }

    pub async fn set_auth_token(&self, auth_token: impl Into<String>) -> Result<JsonObject, ClientError> {
        let request = SetAuthTokenRequest {
            auth_token: auth_token.into(),
        };
        self.call(protocol::SET_AUTH_TOKEN, Some(&request)).await
    }

    /// Create the worker-side `LitNodeClient`.
    pub async fn init_node_client(&self, config: &LitNodeClientConfig) -> Result<JsonObject, ClientError> {
        self.call(protocol::NODE_CLIENT_NEW, Some(config)).await
    }

    /// Connect the worker-side `LitNodeClient` to the network.
    pub async fn connect_node_client(&self) -> Result<JsonObject, ClientError> {
        Ok(self.bridge.call_empty(protocol::NODE_CLIENT_CONNECT).await?)
    }

    pub async fn disconnect_node_client(&self) -> Result<JsonObject, ClientError> {
        Ok(self.bridge.call_empty(protocol::NODE_CLIENT_DISCONNECT).await?)
    }

    pub async fn get_property(&self, property: impl Into<String>) -> Result<GetPropertyResponse, ClientError> {
        let request = GetPropertyRequest {
            property: property.into(),
        };
        self.typed(protocol::NODE_CLIENT_GET_PROPERTY, &request).await
    }

    pub async fn execute_js(&self, params: &ExecuteJsParams) -> Result<ExecuteJsResponse, ClientError> {
        self.typed(protocol::NODE_CLIENT_EXECUTE_JS, params).await
    }

    pub async fn get_session_sigs(&self, params: &SessionSigsParams) -> Result<SessionSigsResponse, ClientError> {
        self.typed(protocol::NODE_CLIENT_GET_SESSION_SIGS, params).await
    }

    pub async fn pkp_sign(&self, params: &PkpSignParams) -> Result<PkpSignResponse, ClientError> {
        self.typed(protocol::NODE_CLIENT_PKP_SIGN, params).await
    }

    /// Create the worker-side contracts client.
    pub async fn init_contracts_client(
        &self,
        config: &LitContractsClientConfig,
    ) -> Result<JsonObject, ClientError> {
        self.call(protocol::CONTRACTS_CLIENT_NEW, Some(config)).await
    }

    /// Mint a PKP bound to `auth_method`. A structured access token is sent as a JSON string.
    pub async fn mint_with_auth(&self, params: MintWithAuthParams) -> Result<MintWithAuthResponse, ClientError> {
        let params = params.into_wire()?;
        self.typed(protocol::CONTRACTS_CLIENT_MINT_WITH_AUTH, &params).await
    }

    pub async fn create_siwe_message(
        &self,
        params: &CreateSiweMessageParams,
    ) -> Result<SiweMessageResponse, ClientError> {
        self.typed(protocol::AUTH_CREATE_SIWE_MESSAGE, params).await
    }

    pub async fn generate_auth_sig(&self, to_sign: impl Into<String>) -> Result<AuthSigResponse, ClientError> {
        let request = GenerateAuthSigRequest {
            to_sign: to_sign.into(),
        };
        self.typed(protocol::AUTH_GENERATE_AUTH_SIG, &request).await
    }
}
