//! Worker dispatch: pop, validate, invoke, transmit, release.

use crate::action::{Handler, validate_request};
use crate::agent::Shared;
use crate::exec;
use std::sync::Arc;
use tether_types::{ActionRequest, ActionResult, CompletionStatus, PARAM_ERROR, Status};

/// One dispatch worker. Runs until the agent's cancellation token fires;
/// a request already in hand is finished first.
pub(crate) async fn worker_loop(shared: Arc<Shared>, worker: usize) {
    tracing::debug!(worker, "dispatch worker started");
    loop {
        if shared.quit.is_cancelled() {
            break;
        }
        if dispatch_one(&shared).await {
            continue;
        }
        tokio::select! {
            _ = shared.quit.cancelled() => break,
            _ = shared.queue.wait_ready() => {}
        }
    }
    tracing::debug!(worker, "dispatch worker stopped");
}

/// Dispatch at most one waiting request. Returns whether one was handled.
pub(crate) async fn dispatch_one(shared: &Shared) -> bool {
    let Some((index, request)) = shared.queue.dequeue() else {
        return false;
    };
    let action = request.action.clone();
    let result = process(shared, request).await;
    if let Err(e) = shared.plugin.transmit(&result).await {
        tracing::warn!(action = %action, error = %e, "failed to transmit request result");
    }
    shared.queue.release(index);
    true
}

/// Fail every waiting request with a shutdown diagnostic, transmitting
/// each completion. Called once the cancellation token has fired.
pub(crate) async fn fail_pending(shared: &Shared) {
    for request in shared.queue.drain() {
        let result = ActionResult::failed(request.action, Status::Failure, "library shutting down");
        if let Err(e) = shared.plugin.transmit(&result).await {
            tracing::warn!(error = %e, "failed to transmit shutdown result");
        }
    }
}

/// Match a request to its action, validate, and run the handler. Engine
/// locks are released before the handler runs; an exclusive action
/// additionally holds its per-action gate across the handler.
async fn process(shared: &Shared, mut request: ActionRequest) -> ActionResult {
    let looked_up = {
        let pool = crate::lock(&shared.actions);
        pool.find(&request.action).map(|index| {
            let item = pool.item(index);
            (
                item.decls.clone(),
                item.handler.clone(),
                item.flags,
                item.time_limit,
                item.exclusive_gate.clone(),
                item.registration.is_registered(),
            )
        })
    };
    let Some((decls, handler, flags, time_limit, gate, registered)) = looked_up else {
        tracing::debug!(action = %request.action, "request for unknown action");
        return ActionResult::failed(request.action, Status::NotFound, "action not registered");
    };
    if !registered {
        return ActionResult::failed(request.action, Status::NotFound, "action not registered");
    }

    if let Err((status, message)) = validate_request(&decls, &mut request) {
        tracing::debug!(action = %request.action, %message, "request failed validation");
        request.set_param(PARAM_ERROR, message.as_str());
        return ActionResult::from_request(request, CompletionStatus::Failed(status));
    }

    let _serialized = match &gate {
        Some(gate) if flags.exclusive => Some(gate.lock().await),
        _ => None,
    };

    let status = match handler {
        Handler::None => {
            request.set_param(PARAM_ERROR, "action has no handler");
            CompletionStatus::Failed(Status::NotInitialized)
        }
        Handler::Callback(callback) => match callback.call(&mut request).await {
            Ok(()) => CompletionStatus::Success,
            Err(status) => {
                request.set_param(PARAM_ERROR, status.describe());
                CompletionStatus::Failed(status)
            }
        },
        Handler::Command(path) => {
            exec::run_command(&path, &decls, &mut request, time_limit, flags.no_return).await
        }
    };

    ActionResult::from_request(request, status)
}
