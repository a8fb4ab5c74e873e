//! Startup orchestration.
//!
//! # Boot Sequence
//! ```text
//! Preparing     build interceptor, bind RPC listener
//! Initializing  init() every service, fail fast
//! Loading       load() every service, then subscribe load() to `reload`
//! PreStart      start RPC + HTTP serving
//! Started       watch the config file, wait for signals
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing is rolled back
//! - Listeners start serving last, so traffic only arrives once loaded
//! - Every registry (state, bus, services) is owned here and shared by `Arc`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::task::JoinHandle;

use crate::auth::{Authenticator, Guards, TokenTable};
use crate::config::watcher::ConfigWatcher;
use crate::config::ConfigStore;
use crate::events::{EventBus, HandlerGuard, RELOAD};
use crate::i18n::{Catalog, MessagePacks};
use crate::lifecycle::service::{BoxError, LifecycleManager, Service};
use crate::lifecycle::shutdown::{shutdown, ShutdownOutcome};
use crate::lifecycle::signals::{Signal, Signals};
use crate::lifecycle::state::{AppState, StateCell};
use crate::rpc::{system, Interceptor};
use crate::server::{Server, ServerError, ServerOptions};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("Service init failed: {0}")]
    Init(BoxError),
    #[error("Failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
}

/// A process being assembled: services, auth and translation collaborators.
pub struct Application {
    config: Arc<ConfigStore>,
    state: Arc<StateCell>,
    bus: EventBus,
    services: LifecycleManager,
    catalog: Arc<Catalog>,
    authenticator: Arc<dyn Authenticator>,
    guards: Guards,
}

impl Application {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        let snapshot = config.get();
        let state = Arc::new(StateCell::new());
        let catalog = Arc::new(Catalog::with_builtin(snapshot.runtime.default_locale.as_str()));
        let mut services = LifecycleManager::new(Arc::clone(&state));
        services.register(MessagePacks::new(Arc::clone(&catalog), Arc::clone(&config)));

        Self {
            authenticator: Arc::new(TokenTable::from_config(&snapshot.auth)),
            config,
            state,
            bus: EventBus::new(),
            services,
            catalog,
            guards: Guards::new(),
        }
    }

    /// Add a sub-service. Registration order is init order.
    pub fn register<S: Service>(&mut self, service: S) -> &mut Self {
        self.services.register(service);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn with_guards(mut self, guards: Guards) -> Self {
        self.guards = guards;
        self
    }

    pub fn state(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    /// Run the boot sequence and start serving.
    pub async fn start(self, mut options: ServerOptions) -> Result<Running, StartupError> {
        let config = self.config.get();
        self.state.set(AppState::Preparing);

        let interceptor = Interceptor::new(
            Arc::clone(&self.state),
            self.authenticator,
            self.catalog,
        )
        .with_guards(system::guards(self.guards))
        .with_default_locale(config.runtime.default_locale.as_str())
        .with_debug(config.runtime.debug);

        let user_services = options.services.take();
        let (state, bus) = (Arc::clone(&self.state), self.bus.clone());
        options = options.services(move |registry| {
            system::register(registry, state, bus);
            if let Some(register) = user_services {
                register(registry);
            }
        });
        let mut server = Server::bind(options, Arc::new(interceptor)).await?;

        let services = Arc::new(self.services);
        services.initiate().await.map_err(StartupError::Init)?;
        services.load().await;
        let reload = self.bus.handle(RELOAD, {
            let services = Arc::clone(&services);
            move |_event| {
                let services = Arc::clone(&services);
                async move { services.load().await }
            }
        });

        self.state.set(AppState::PreStart);
        server.start().await?;
        self.state.set(AppState::Started);

        let (watcher, watch_task) = if config.reload.watch_config {
            watch_config(&self.config, &self.bus)
        } else {
            (None, None)
        };

        tracing::info!(services = services.len(), "Application started");
        Ok(Running {
            config: self.config,
            state: self.state,
            bus: self.bus,
            services,
            server,
            reload,
            _watcher: watcher,
            watch_task,
        })
    }
}

/// Store validated config changes and emit `reload` for each.
fn watch_config(
    store: &Arc<ConfigStore>,
    bus: &EventBus,
) -> (Option<RecommendedWatcher>, Option<JoinHandle<()>>) {
    let Some(path) = store.path() else {
        return (None, None);
    };
    let (watcher, mut updates) = ConfigWatcher::new(path, (*store.get()).clone());
    let watcher = match watcher.run() {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher not started, hot reload disabled");
            return (None, None);
        }
    };
    let task = tokio::spawn({
        let store = Arc::clone(store);
        let bus = bus.clone();
        async move {
            while let Some(config) = updates.recv().await {
                store.store(config);
                let _ = bus.emit(RELOAD, Vec::new());
            }
        }
    });
    (Some(watcher), Some(task))
}

/// A started application.
pub struct Running {
    config: Arc<ConfigStore>,
    state: Arc<StateCell>,
    bus: EventBus,
    services: Arc<LifecycleManager>,
    server: Server,
    reload: HandlerGuard,
    _watcher: Option<RecommendedWatcher>,
    watch_task: Option<JoinHandle<()>>,
}

impl Running {
    pub fn rpc_addr(&self) -> SocketAddr {
        self.server.rpc_addr()
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.server.http_addr()
    }

    pub fn state(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Serve until SIGINT/SIGTERM, reloading on SIGHUP, then shut down.
    pub async fn run_until_signal(self) -> Result<ShutdownOutcome, StartupError> {
        let mut signals = Signals::new()?;
        loop {
            match signals.recv().await {
                Signal::Reload => {
                    let _ = self.bus.emit(RELOAD, Vec::new());
                }
                Signal::Terminate => break,
            }
        }
        Ok(self.shutdown().await)
    }

    /// Stop the server, then delete every service, each within its grace period.
    pub async fn shutdown(mut self) -> ShutdownOutcome {
        if let Some(task) = self.watch_task.take() {
            task.abort();
        }
        self.reload.detach();
        let config = self.config.get();
        let grace = &config.shutdown;
        shutdown(
            &self.state,
            &mut self.server,
            &self.services,
            Duration::from_secs(grace.server_grace_secs),
            Duration::from_secs(grace.services_grace_secs),
        )
        .await
    }
}
