//! Unary call interceptor.
//!
//! # Stages
//! ```text
//! admission (state cell) → authentication (Authenticator + Guards)
//!     → locale → handler (panics caught) → error normalization → access log
//! ```
//!
//! Every call produces exactly one record on the `access` target, whether it
//! was rejected at admission, failed, panicked or succeeded.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::{Authenticator, Guards};
use crate::i18n::Translator;
use crate::lifecycle::state::StateCell;
use crate::observability::metrics;
use crate::rpc::error::{Error, ERR_INTERNAL, ERR_SERVICE_UNAVAILABLE};
use crate::rpc::handler::{Handler, Reply, RpcRequest};
use crate::rpc::metadata;
use crate::rpc::recovery::{self, PanicReport};
use crate::rpc::status::Code;

pub struct Interceptor {
    state: Arc<StateCell>,
    authenticator: Arc<dyn Authenticator>,
    guards: Guards,
    translator: Arc<dyn Translator>,
    default_locale: String,
    debug: bool,
}

impl Interceptor {
    pub fn new(
        state: Arc<StateCell>,
        authenticator: Arc<dyn Authenticator>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            state,
            authenticator,
            guards: Guards::new(),
            translator,
            default_locale: "en".to_string(),
            debug: false,
        }
    }

    pub fn with_guards(mut self, guards: Guards) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into().to_lowercase();
        self
    }

    /// Debug mode logs payloads and panic backtraces.
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            recovery::install_hook();
        }
        self.debug = debug;
        self
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn resolve_locale(&self, headers: &axum::http::HeaderMap) -> String {
        metadata::locale(headers).unwrap_or_else(|| self.default_locale.clone())
    }

    /// Render `err` in `locale`.
    pub fn localize(&self, err: &Error, locale: &str) -> Error {
        err.exec(locale, None, self.translator.as_ref())
    }

    /// Run `handler` for `request` through every stage.
    pub async fn intercept(
        &self,
        mut request: RpcRequest,
        handler: Arc<dyn Handler>,
    ) -> Result<Reply, Error> {
        let start = Instant::now();
        let method = request.method.clone();
        let ip = metadata::client_ip(&request.metadata, request.peer);
        let payload = self.debug.then(|| request.payload.to_string());

        let admitted = self.admit().and_then(|()| self.authenticate(&mut request));
        let user = request.identity.as_ref().map(|id| id.username.clone());

        let locale = self.resolve_locale(&request.metadata);
        let mut panicked = None;
        let result = match admitted {
            Err(err) => Err(err),
            Ok(()) => {
                metadata::cache_locale(&mut request.metadata, &locale);
                request.locale = locale.clone();
                match recovery::catch(|| handler.call(request)).await {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(err)) => Err(Error::convert(err)),
                    Err(report) => {
                        let err = ERR_INTERNAL.with_info(report.message.clone());
                        panicked = Some(report);
                        Err(err)
                    }
                }
            }
        };
        let result = result.map_err(|err| self.localize(&err, &locale));

        let access = Access {
            method: &method,
            ip: ip.as_deref(),
            user: user.as_deref(),
            payload: payload.as_deref(),
            start,
        };
        access.log(&result, panicked.as_ref(), self.debug);
        result
    }

    fn admit(&self) -> Result<(), Error> {
        let state = self.state.get();
        if state.admits_traffic() {
            Ok(())
        } else {
            tracing::debug!(state = %state, "Rejecting call, service not ready");
            Err(ERR_SERVICE_UNAVAILABLE)
        }
    }

    fn authenticate(&self, request: &mut RpcRequest) -> Result<(), Error> {
        request.identity = metadata::auth_token(&request.metadata)
            .and_then(|token| self.authenticator.identify(token))
            .or_else(|| self.authenticator.identify(""));
        self.guards
            .authorize(&request.method, request.identity.as_ref())
    }
}

struct Access<'a> {
    method: &'a str,
    ip: Option<&'a str>,
    user: Option<&'a str>,
    payload: Option<&'a str>,
    start: Instant,
}

impl Access<'_> {
    fn log(&self, result: &Result<Reply, Error>, panicked: Option<&PanicReport>, verbose: bool) {
        let status = match result {
            Ok(_) => Code::Ok,
            Err(err) => err.status(),
        };
        metrics::record_call(self.method, status.as_str(), self.start);
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;

        match (result, panicked) {
            (Ok(_), _) => tracing::info!(
                target: "access",
                kind = "unary",
                rpc = self.method,
                ip = self.ip,
                duration_ms,
                status = %status,
                user = self.user,
                payload = self.payload,
                "RPC call"
            ),
            (Err(err), Some(report)) => {
                let backtrace = report.backtrace.as_deref().filter(|_| verbose);
                tracing::error!(
                    target: "access",
                    kind = "unary",
                    rpc = self.method,
                    ip = self.ip,
                    duration_ms,
                    status = %status,
                    user = self.user,
                    payload = self.payload,
                    code = err.code(),
                    error = %err,
                    panic_location = report.location.as_deref(),
                    backtrace,
                    "RPC call panicked"
                )
            }
            (Err(err), None) if status == Code::Internal => tracing::error!(
                target: "access",
                kind = "unary",
                rpc = self.method,
                ip = self.ip,
                duration_ms,
                status = %status,
                user = self.user,
                payload = self.payload,
                code = err.code(),
                error = %err,
                "RPC call failed"
            ),
            (Err(err), None) => tracing::warn!(
                target: "access",
                kind = "unary",
                rpc = self.method,
                ip = self.ip,
                duration_ms,
                status = %status,
                user = self.user,
                payload = self.payload,
                code = err.code(),
                error = %err,
                "RPC call failed"
            ),
        }
    }
}
