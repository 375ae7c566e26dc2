//! In-process transport between runtime contexts

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fleet_core::commands::{CompletionRegistry, RemoteCommandRequest};
use fleet_core::deployment::{
    execute_remote_request, RemoteCommandTransport, Route, RuntimeContext, StaticRoutes,
    TransportError,
};
use fleet_core::models::{Server, ServerId};
use fleet_core::scheduler::AsyncOperator;

use super::test_config;

/// Delivers requests to peer contexts and hands their completions back to
/// the origin's registry.
///
/// Peers listed as silent accept requests but never answer.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    peers: DashMap<ServerId, RuntimeContext>,
    silent: DashMap<ServerId, ()>,
    origin: CompletionRegistry,
    sent: AtomicUsize,
}

impl LoopbackTransport {
    pub fn new(origin: CompletionRegistry) -> Self {
        Self {
            origin,
            ..Self::default()
        }
    }

    pub fn add_peer(&self, ctx: RuntimeContext) {
        self.peers.insert(ctx.server().id, ctx);
    }

    pub fn add_silent_peer(&self, server_id: ServerId) {
        self.silent.insert(server_id, ());
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteCommandTransport for LoopbackTransport {
    async fn send(&self, route: &Route, request: RemoteCommandRequest) -> Result<(), TransportError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if self.silent.contains_key(&route.destination) {
            return Ok(());
        }
        let peer = self
            .peers
            .get(&route.destination)
            .map(|entry| entry.value().clone())
            .ok_or(TransportError::Unreachable {
                server_id: route.destination,
            })?;
        let completions = self.origin.clone();
        tokio::spawn(async move {
            let completion = execute_remote_request(&peer, request).await;
            completions.complete(completion);
        });
        Ok(())
    }
}

/// Origin context plus one answering peer per entry of `peers`
pub struct Cluster {
    pub origin: Server,
    pub ctx: RuntimeContext,
    pub transport: Arc<LoopbackTransport>,
    pub sink: Arc<fleet_core::deployment::MemorySink>,
}

impl Cluster {
    pub fn new(peers: &[Server], silent: &[Server], proxy_timeout_secs: u64) -> Self {
        let origin = Server::new("origin");
        let completions = CompletionRegistry::new();
        let transport = Arc::new(LoopbackTransport::new(completions.clone()));
        let routes = StaticRoutes::new();

        for peer in peers {
            transport.add_peer(
                RuntimeContext::builder(peer.clone())
                    .with_config(test_config())
                    .build(),
            );
            routes.insert(Route {
                destination: peer.id,
                address: format!("loopback://{}", peer.name),
                via: None,
            });
        }
        for peer in silent {
            transport.add_silent_peer(peer.id);
            routes.insert(Route {
                destination: peer.id,
                address: format!("loopback://{}", peer.name),
                via: None,
            });
        }

        let mut config = test_config();
        config.execution.proxy_timeout_secs = proxy_timeout_secs;
        let sink = Arc::new(fleet_core::deployment::MemorySink::new());
        let ctx = RuntimeContext::builder(origin.clone())
            .with_config(config)
            .with_operator(AsyncOperator::new(8, None))
            .with_transport(transport.clone())
            .with_routes(Arc::new(routes))
            .with_completions(completions)
            .with_sink(sink.clone())
            .build();

        Self {
            origin,
            ctx,
            transport,
            sink,
        }
    }
}
