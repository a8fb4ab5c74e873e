//! Built-in `system.System` service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::auth::{Group, Guards};
use crate::events::{EventBus, RELOAD};
use crate::lifecycle::state::StateCell;
use crate::rpc::error::{HandlerError, ERR_SERVICE_UNAVAILABLE};
use crate::rpc::handler::{Registry, RpcRequest};
use crate::rpc::REFLECTION_METHOD;

pub const SERVICE: &str = "system.System";
pub const HEALTH: &str = "/system.System/Health";
pub const RELOAD_METHOD: &str = "/system.System/Reload";

/// How long `Reload` waits for the reload handlers to accept the event.
const RELOAD_HANDOFF: Duration = Duration::from_secs(5);

/// Register `Health` and `Reload`.
pub fn register(registry: &mut Registry, state: Arc<StateCell>, bus: EventBus) {
    registry.unary(SERVICE, "Health", move |_req: RpcRequest| {
        let state = state.get();
        async move { Ok::<_, HandlerError>(json!({ "state": state.as_str() })) }
    });
    registry.unary(SERVICE, "Reload", move |req: RpcRequest| {
        let bus = bus.clone();
        async move {
            let user = req.identity.map(|id| id.username).unwrap_or_default();
            tracing::info!(user = %user, "Reload requested over rpc");
            let subscribers = bus.subscriber_count(RELOAD);
            if !bus.emit(RELOAD, Vec::new()).wait_timeout(RELOAD_HANDOFF).await {
                return Err(HandlerError::from(
                    ERR_SERVICE_UNAVAILABLE.with_info("reload handlers are busy"),
                ));
            }
            Ok::<_, HandlerError>(json!({ "subscribers": subscribers }))
        }
    });
}

/// Guard rules for the built-in methods, on top of `guards`.
pub fn guards(guards: Guards) -> Guards {
    guards
        .skip([HEALTH, REFLECTION_METHOD])
        .guard(Group::Admin, [RELOAD_METHOD])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::AppState;
    use crate::rpc::Reply;

    #[tokio::test]
    async fn health_reports_state() {
        let state = Arc::new(StateCell::new());
        state.set(AppState::Started);
        let mut registry = Registry::new();
        register(&mut registry, state, EventBus::new());

        let reply: Reply = registry
            .get(HEALTH)
            .unwrap()
            .call(RpcRequest::new(HEALTH, serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(reply.payload, json!({"state": "started"}));
    }

    #[tokio::test]
    async fn reload_emits_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe(RELOAD);
        let mut registry = Registry::new();
        register(&mut registry, Arc::new(StateCell::new()), bus.clone());

        let reply = registry
            .get(RELOAD_METHOD)
            .unwrap()
            .call(RpcRequest::new(RELOAD_METHOD, serde_json::Value::Null))
            .await
            .unwrap();
        assert_eq!(reply.payload, json!({"subscribers": 1}));
        let event = sub.recv().await.unwrap();
        assert_eq!(event.topic, RELOAD);
        assert!(event.payload.is_empty());
    }

    #[test]
    fn reload_needs_admin() {
        let guards = guards(Guards::new());
        assert_eq!(
            guards.requirement(RELOAD_METHOD),
            crate::auth::Requirement::AtLeast(Group::Admin)
        );
        assert_eq!(guards.requirement(HEALTH), crate::auth::Requirement::Skip);
    }
}
