//! Infrastructure wiring: product store, intercom, dispatcher, realtime feed.

use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use facet_auth::AllowAll;
use facet_events::{EventBus, InMemoryEventBus, Message};
use facet_infra::{InMemoryProductStore, ProductApi, ProductListener, ProductStore};
use facet_products::{ProductCommand, Reply, from_message};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use crate::authz;
use crate::config::ApiConfig;
use crate::context::PrincipalContext;

pub type SharedStore = Arc<dyn ProductStore>;
pub type SharedBus = Arc<InMemoryEventBus<Message>>;
pub type SharedProductApi = ProductApi<SharedStore, SharedBus>;

/// Process-wide services shared by every request.
pub struct AppServices {
    api: Arc<SharedProductApi>,
    realtime_tx: broadcast::Sender<Message>,
    _listener: ProductListener,
    _feed: RealtimeFeed,
}

impl AppServices {
    /// Run `command` on behalf of the request principal.
    pub async fn handle(&self, principal: &PrincipalContext, command: ProductCommand) -> Reply {
        let guard = authz::guard_for(principal);
        self.api.handle_as(&guard, command).await
    }

    pub fn api(&self) -> &Arc<SharedProductApi> {
        &self.api
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<Message> {
        &self.realtime_tx
    }
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config).await?;
    let bus: SharedBus = Arc::new(InMemoryEventBus::new());

    // In-process intercom publishers are trusted; HTTP callers get a per-request guard.
    let api = Arc::new(ProductApi::new(store, bus.clone(), AllowAll));
    let listener = api.clone().listen()?;

    // Realtime channel (SSE): lossy broadcast of every reply on the intercom.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<Message>(256);
    let feed = RealtimeFeed::spawn(&bus, realtime_tx.clone());

    Ok(AppServices {
        api,
        realtime_tx,
        _listener: listener,
        _feed: feed,
    })
}

async fn build_store(config: &ApiConfig) -> anyhow::Result<SharedStore> {
    if !config.use_persistent_stores {
        return Ok(Arc::new(InMemoryProductStore::new()));
    }

    #[cfg(feature = "postgres")]
    {
        use anyhow::Context;

        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
        let pool = sqlx::PgPool::connect(url)
            .await
            .context("failed to connect to Postgres")?;
        let store = facet_infra::PostgresProductStore::new(pool);
        store.ensure_schema().await?;
        tracing::info!("using Postgres product store");
        Ok(Arc::new(store))
    }
    #[cfg(not(feature = "postgres"))]
    {
        tracing::warn!(
            "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
        );
        Ok(Arc::new(InMemoryProductStore::new()))
    }
}

/// Forwards replies seen on the intercom into the realtime broadcast.
struct RealtimeFeed {
    stop: Arc<AtomicBool>,
}

impl RealtimeFeed {
    fn spawn(bus: &SharedBus, tx: broadcast::Sender<Message>) -> Self {
        let subscription = bus.subscribe();
        let stop = Arc::new(AtomicBool::new(false));

        tokio::task::spawn_blocking({
            let stop = stop.clone();
            move || {
                while !stop.load(Ordering::Relaxed) {
                    match subscription.recv_timeout(Duration::from_millis(100)) {
                        Ok(message) => {
                            if from_message(&message).is_some() {
                                // No subscribers is fine.
                                let _ = tx.send(message);
                            }
                        }
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        });

        Self { stop }
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

pub fn reply_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(m.payload()).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic()).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
