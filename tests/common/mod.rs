//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dualserve::auth::{Group, Guards, Identity, TokenTable};
use dualserve::i18n::Catalog;
use dualserve::lifecycle::{AppState, StateCell};
use dualserve::rpc::system;
use dualserve::{Interceptor, Server, ServerOptions};
use serde_json::Value;

pub const ADMIN_TOKEN: &str = "admin-secret";
pub const USER_TOKEN: &str = "user-secret";

/// Options that bind both listeners on ephemeral loopback ports.
pub fn loopback_options() -> ServerOptions {
    let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
    ServerOptions::new(any, any)
}

/// Interceptor with one admin and one user token, English messages.
pub fn interceptor(state: &Arc<StateCell>) -> Arc<Interceptor> {
    let tokens = TokenTable::new()
        .insert(ADMIN_TOKEN, identity("root", Group::Admin))
        .insert(USER_TOKEN, identity("alice", Group::User));
    let interceptor = Interceptor::new(
        Arc::clone(state),
        Arc::new(tokens),
        Arc::new(Catalog::with_builtin("en")),
    )
    .with_guards(system::guards(Guards::new()));
    Arc::new(interceptor)
}

pub fn identity(username: &str, group: Group) -> Identity {
    Identity {
        username: username.to_string(),
        group,
        dept: String::new(),
    }
}

/// Bind and start a server whose state is already `Started`.
pub async fn start_server(options: ServerOptions) -> (Server, Arc<StateCell>) {
    let state = Arc::new(StateCell::new());
    state.set(AppState::Started);
    let mut server = Server::bind(options, interceptor(&state)).await.unwrap();
    server.start().await.unwrap();
    (server, state)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// POST a unary RPC call with a JSON body.
pub async fn call(
    client: &reqwest::Client,
    addr: SocketAddr,
    method: &str,
    token: Option<&str>,
    body: Value,
) -> reqwest::Response {
    let mut request = client.post(format!("http://{addr}{method}")).json(&body);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    request.send().await.expect("RPC listener unreachable")
}

/// The `rpc-status` header as a number.
pub fn rpc_status(response: &reqwest::Response) -> u8 {
    response
        .headers()
        .get("rpc-status")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("missing rpc-status header")
}
