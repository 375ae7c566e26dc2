//! Receiving side of proxied commands.

use tracing::warn;

use super::RuntimeContext;
use crate::commands::{RemoteCommandCompletion, RemoteCommandRequest};
use crate::logging::log_step_operation;
use crate::operations::OperationResult;

/// Execute an inbound request on this server.
///
/// The returned completion must travel back to the origin, where it is
/// handed to [`crate::commands::CompletionRegistry::complete`].
pub async fn execute_remote_request(
    ctx: &RuntimeContext,
    request: RemoteCommandRequest,
) -> RemoteCommandCompletion {
    let server_id = ctx.server().id;
    let result = if request.destination != server_id {
        warn!(
            request_id = %request.request_id,
            destination = %request.destination,
            "📡 PROXY: Request delivered to the wrong server"
        );
        OperationResult::failure(format!(
            "Request for server {} reached server {server_id}",
            request.destination
        ))
    } else {
        match ctx.registry().create(request.spec, ctx) {
            Ok(operation) => operation.execute(&request.params).await,
            Err(e) => OperationResult::failure(e.to_string()),
        }
    };

    log_step_operation(
        "remote_execute",
        &request.step_id.to_string(),
        &server_id.to_string(),
        None,
        if result.is_success() { "success" } else { "failure" },
        Some(&format!("origin {}", request.origin)),
    );

    RemoteCommandCompletion {
        request_id: request.request_id,
        step_id: request.step_id,
        server_id,
        result,
    }
}
