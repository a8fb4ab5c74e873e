//! Service lifecycle and application boot tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dualserve::config::{AppConfig, ConfigStore};
use dualserve::lifecycle::{
    AppState, Application, BoxError, LifecycleManager, Service, StateCell, TeardownOutcome,
};
use dualserve::rpc::system;
use serde_json::json;

mod common;

type Log = Arc<Mutex<Vec<String>>>;

struct Step {
    name: &'static str,
    log: Log,
    fail_init: bool,
    delete_delay: Duration,
}

impl Step {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            fail_init: false,
            delete_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Service for Step {
    fn name(&self) -> &str {
        self.name
    }

    async fn init(&self) -> Result<(), BoxError> {
        self.log.lock().unwrap().push(format!("{}.init", self.name));
        if self.fail_init {
            return Err("B broke".into());
        }
        Ok(())
    }

    async fn load(&self) {
        self.log.lock().unwrap().push(format!("{}.load", self.name));
    }

    async fn delete(&self) {
        tokio::time::sleep(self.delete_delay).await;
        self.log.lock().unwrap().push(format!("{}.delete", self.name));
    }
}

#[tokio::test]
async fn test_init_stops_at_first_failure() {
    let log = Log::default();
    let state = Arc::new(StateCell::new());
    let mut manager = LifecycleManager::new(Arc::clone(&state));
    manager.register(Step::new("A", &log));
    manager.register(Step {
        fail_init: true,
        ..Step::new("B", &log)
    });
    manager.register(Step::new("C", &log));

    let err = manager.initiate().await.unwrap_err();

    assert_eq!(err.to_string(), "B broke");
    assert_eq!(*log.lock().unwrap(), vec!["A.init", "B.init"]);
    assert_eq!(state.get(), AppState::Initializing);
}

#[tokio::test]
async fn test_delete_is_bounded_by_timeout() {
    let log = Log::default();
    let mut manager = LifecycleManager::new(Arc::new(StateCell::new()));
    manager.register(Step {
        delete_delay: Duration::from_secs(30),
        ..Step::new("stuck", &log)
    });
    manager.register(Step::new("quick", &log));

    let started = Instant::now();
    let outcome = manager.delete(Duration::from_millis(200)).wait().await;

    assert_eq!(outcome, TeardownOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert_eq!(*log.lock().unwrap(), vec!["quick.delete"]);
}

fn app_config() -> Arc<ConfigStore> {
    let mut config = AppConfig::default();
    config.reload.watch_config = false;
    config.shutdown.server_grace_secs = 2;
    config.shutdown.services_grace_secs = 2;
    Arc::new(ConfigStore::from_config(config))
}

#[tokio::test]
async fn test_application_boot_reload_and_shutdown() {
    let log = Log::default();
    let mut app = Application::new(app_config());
    app.register(Step::new("cache", &log));
    let state = app.state();

    let running = app.start(common::loopback_options()).await.unwrap();
    assert_eq!(state.get(), AppState::Started);
    assert_eq!(*log.lock().unwrap(), vec!["cache.init", "cache.load"]);

    let client = common::client();
    let health = common::call(&client, running.rpc_addr(), system::HEALTH, None, json!({})).await;
    assert_eq!(common::rpc_status(&health), 0);
    let body: serde_json::Value = health.json().await.unwrap();
    assert_eq!(body["state"], "started");

    // The default token table is empty, so Reload is refused.
    let denied = common::call(&client, running.rpc_addr(), system::RELOAD_METHOD, None, json!({})).await;
    assert_eq!(common::rpc_status(&denied), 16);

    let delivered = running.bus().emit(dualserve::events::RELOAD, Vec::new());
    assert!(delivered.wait_timeout(Duration::from_secs(1)).await);
    let reloaded = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if log.lock().unwrap().len() >= 3 && state.get() == AppState::Started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reloaded.is_ok(), "reload never reached the service");

    let outcome = running.shutdown().await;
    assert!(!outcome.is_forced());
    assert_eq!(state.get(), AppState::Terminating);
    assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("cache.delete"));
}

#[tokio::test]
async fn test_startup_fails_on_init_error() {
    let log = Log::default();
    let mut app = Application::new(app_config());
    app.register(Step {
        fail_init: true,
        ..Step::new("B", &log)
    });

    let result = app.start(common::loopback_options()).await;

    assert!(matches!(result, Err(dualserve::lifecycle::StartupError::Init(_))));
    assert_eq!(*log.lock().unwrap(), vec!["B.init"]);
}

struct PanicsOnSecondLoad {
    loads: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl Service for PanicsOnSecondLoad {
    async fn init(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn load(&self) {
        if self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 1 {
            panic!("cache refresh failed");
        }
    }

    async fn delete(&self) {}
}

#[tokio::test]
async fn test_reload_recovers_from_panicking_load() {
    use dualserve::events::{EventBus, RELOAD};
    use std::sync::atomic::Ordering;

    let loads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let state = Arc::new(StateCell::new());
    let mut manager = LifecycleManager::new(Arc::clone(&state));
    manager.register(PanicsOnSecondLoad {
        loads: Arc::clone(&loads),
    });
    let manager = Arc::new(manager);
    manager.load().await;
    state.set(AppState::Started);

    let bus = EventBus::new();
    let _reload = bus.handle(RELOAD, {
        let manager = Arc::clone(&manager);
        move |_event| {
            let manager = Arc::clone(&manager);
            async move { manager.load().await }
        }
    });

    let settled = |expected: usize| {
        let loads = Arc::clone(&loads);
        let state = Arc::clone(&state);
        async move {
            tokio::time::timeout(Duration::from_secs(2), async {
                while loads.load(Ordering::SeqCst) < expected || state.get() != AppState::Started {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .is_ok()
        }
    };

    bus.emit(RELOAD, Vec::new()).wait().await;
    assert!(settled(2).await, "state stuck at {}", state.get());
    assert!(state.get().admits_traffic());

    bus.emit(RELOAD, Vec::new()).wait().await;
    assert!(settled(3).await, "later reload never ran");
    assert_eq!(bus.subscriber_count(RELOAD), 1);
}
