//! Remote execution of command nodes.
//!
//! A proxied node sends a [`RemoteCommandRequest`] through the transport and
//! parks on a oneshot registered in the [`CompletionRegistry`] under the
//! request id. The inbound "command completed" handler resolves it with
//! [`CompletionRegistry::complete`]. A completion that does not arrive
//! within the proxy timeout becomes a failed result for that node only.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    ActionRunner, Command, CommandKey, CommandResult, Executable, ExecutionRecords, UndoCommand,
};
use crate::deployment::interfaces::{RemoteCommandTransport, RouteResolver};
use crate::models::{ActionSpec, ServerId, StepId};
use crate::operations::{OperationResult, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAction {
    /// Forward step
    Invoke,
    /// Compensating step
    Undo,
}

/// Serialized command sent to the server that must run it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommandRequest {
    pub request_id: Uuid,
    pub execution_id: Uuid,
    pub action: RemoteAction,
    pub step_id: StepId,
    pub origin: ServerId,
    pub destination: ServerId,
    pub spec: ActionSpec,
    pub params: Params,
}

/// "Command completed" message travelling back to the origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommandCompletion {
    pub request_id: Uuid,
    pub step_id: StepId,
    pub server_id: ServerId,
    pub result: OperationResult,
}

/// Waiting proxies keyed by request id
#[derive(Debug, Clone, Default)]
pub struct CompletionRegistry {
    waiters: Arc<DashMap<Uuid, oneshot::Sender<OperationResult>>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request_id: Uuid) -> oneshot::Receiver<OperationResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(request_id, tx);
        rx
    }

    /// Hand an inbound completion to its waiting proxy.
    ///
    /// Returns `false` for unknown, expired or duplicate completions.
    pub fn complete(&self, completion: RemoteCommandCompletion) -> bool {
        match self.waiters.remove(&completion.request_id) {
            Some((_, tx)) => tx.send(completion.result).is_ok(),
            None => {
                warn!(
                    request_id = %completion.request_id,
                    "📡 PROXY: Completion for unknown or expired request"
                );
                false
            }
        }
    }

    pub fn cancel(&self, request_id: &Uuid) {
        self.waiters.remove(request_id);
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}

/// Sends requests and waits for their completions
#[derive(Clone)]
pub struct RemoteDispatcher {
    transport: Arc<dyn RemoteCommandTransport>,
    routes: Arc<dyn RouteResolver>,
    completions: CompletionRegistry,
    origin: ServerId,
    timeout: Duration,
}

impl RemoteDispatcher {
    pub fn new(
        transport: Arc<dyn RemoteCommandTransport>,
        routes: Arc<dyn RouteResolver>,
        completions: CompletionRegistry,
        origin: ServerId,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            routes,
            completions,
            origin,
            timeout,
        }
    }

    pub fn origin(&self) -> ServerId {
        self.origin
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Route, send and wait. Every failure is reported as a failed result.
    pub async fn dispatch(&self, request: RemoteCommandRequest) -> OperationResult {
        let request_id = request.request_id;
        let destination = request.destination;

        let route = match self.routes.resolve(destination).await {
            Ok(route) => route,
            Err(e) => return OperationResult::failure(e.to_string()),
        };

        let completion = self.completions.register(request_id);
        debug!(
            request_id = %request_id,
            destination = %destination,
            address = %route.address,
            "📡 PROXY: Sending command"
        );
        if let Err(e) = self.transport.send(&route, request).await {
            self.completions.cancel(&request_id);
            return OperationResult::failure(e.to_string());
        }

        match tokio::time::timeout(self.timeout, completion).await {
            Ok(Ok(result)) => result.finish(),
            Ok(Err(_)) => OperationResult::failure(format!(
                "Completion channel for request {request_id} closed"
            )),
            Err(_) => {
                self.completions.cancel(&request_id);
                warn!(
                    request_id = %request_id,
                    destination = %destination,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "📡 PROXY: Timed out waiting for completion"
                );
                OperationResult::failure(format!(
                    "Timeout of {:.1}s reached waiting for server {destination}",
                    self.timeout.as_secs_f64()
                ))
            }
        }
    }
}

impl fmt::Debug for RemoteDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteDispatcher")
            .field("origin", &self.origin)
            .field("timeout", &self.timeout)
            .field("pending", &self.completions.pending())
            .finish()
    }
}

/// Runs a step on another server
#[derive(Debug)]
pub struct RemoteRunner {
    dispatcher: RemoteDispatcher,
    execution_id: Uuid,
    action: RemoteAction,
    key: CommandKey,
    spec: ActionSpec,
}

impl RemoteRunner {
    pub fn new(
        dispatcher: RemoteDispatcher,
        execution_id: Uuid,
        action: RemoteAction,
        key: CommandKey,
        spec: ActionSpec,
    ) -> Self {
        Self {
            dispatcher,
            execution_id,
            action,
            key,
            spec,
        }
    }
}

#[async_trait]
impl ActionRunner for RemoteRunner {
    async fn run(&self, params: &Params) -> OperationResult {
        let request = RemoteCommandRequest {
            request_id: Uuid::new_v4(),
            execution_id: self.execution_id,
            action: self.action,
            step_id: self.key.step_id,
            origin: self.dispatcher.origin(),
            destination: self.key.server_id,
            spec: self.spec.clone(),
            params: params.clone(),
        };
        self.dispatcher.dispatch(request).await
    }
}

/// [`Command`] whose forward step runs on `destination`
#[derive(Debug)]
pub struct ProxyCommand {
    command: Command,
    destination: ServerId,
}

impl ProxyCommand {
    /// `command` must be built around a [`RemoteRunner`]
    pub fn new(command: Command, destination: ServerId) -> Self {
        Self {
            command,
            destination,
        }
    }

    pub fn destination(&self) -> ServerId {
        self.destination
    }
}

/// [`UndoCommand`] whose compensating step runs on `destination`
#[derive(Debug)]
pub struct ProxyUndoCommand {
    command: UndoCommand,
    destination: ServerId,
}

impl ProxyUndoCommand {
    pub fn new(command: UndoCommand, destination: ServerId) -> Self {
        Self {
            command,
            destination,
        }
    }

    pub fn destination(&self) -> ServerId {
        self.destination
    }
}

macro_rules! delegate_executable {
    ($proxy:ty) => {
        #[async_trait]
        impl Executable for $proxy {
            fn key(&self) -> Option<CommandKey> {
                self.command.key()
            }

            fn name(&self) -> String {
                format!("{} -> {}", self.command.name(), self.destination)
            }

            async fn invoke(&self) -> CommandResult<Option<bool>> {
                self.command.invoke().await
            }

            async fn undo(&self) -> CommandResult<Option<bool>> {
                self.command.undo().await
            }

            fn invoked(&self) -> bool {
                self.command.invoked()
            }

            fn success(&self) -> Option<bool> {
                self.command.success()
            }

            fn undo_success(&self) -> Option<bool> {
                self.command.undo_success()
            }

            fn result(&self) -> ExecutionRecords {
                self.command.result()
            }

            fn stop_on_error(&self) -> bool {
                self.command.stop_on_error()
            }

            fn stop_undo_on_error(&self) -> bool {
                self.command.stop_undo_on_error()
            }
        }
    };
}

delegate_executable!(ProxyCommand);
delegate_executable!(ProxyUndoCommand);
