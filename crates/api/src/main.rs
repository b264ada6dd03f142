use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;

use userhub_api::notifications::log_notifications;
use userhub_api::server::run_rpc_loop;
use userhub_api::{ServiceConfig, UserNotificationEnvelope, UserRequestHandler, health};
use userhub_events::{EventBus, InMemoryEventBus};
use userhub_infra::event_bus::RedisPubSubEventBus;
use userhub_infra::{InMemoryUserPersistence, PostgresUserPersistence};
use userhub_users::{UserPersistence, UserService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    userhub_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    if config.use_persistent_stores {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

        let persistence = PostgresUserPersistence::connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        persistence
            .ensure_schema()
            .await
            .context("failed to prepare the users schema")?;

        let bus = RedisPubSubEventBus::<UserNotificationEnvelope>::new(
            &config.redis_url,
            config.events_channel.clone(),
        )
        .map_err(|e| anyhow::anyhow!("failed to create Redis notification bus: {e}"))?;

        serve(&config, Arc::new(persistence), Arc::new(bus)).await
    } else {
        tracing::warn!("USE_PERSISTENT_STORES is not set; users are kept in memory");
        let bus: InMemoryEventBus<UserNotificationEnvelope> = InMemoryEventBus::new();
        let subscription = bus.subscribe();
        tokio::task::spawn_blocking(move || log_notifications(subscription));

        serve(&config, Arc::new(InMemoryUserPersistence::new()), Arc::new(bus)).await
    }
}

async fn serve<P, B>(config: &ServiceConfig, persistence: Arc<P>, bus: Arc<B>) -> anyhow::Result<()>
where
    P: UserPersistence + 'static,
    B: EventBus<UserNotificationEnvelope> + 'static,
{
    let handler = Arc::new(UserRequestHandler::new(
        UserService::new(Arc::clone(&persistence)),
        bus,
    ));

    let listener = tokio::net::TcpListener::bind(config.health_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.health_addr))?;
    tracing::info!("health endpoints listening on {}", listener.local_addr()?);

    let client = redis::Client::open(config.redis_url.as_str()).context("invalid REDIS_URL")?;

    tokio::select! {
        served = axum::serve(listener, health::router(persistence)).into_future() => {
            served.context("health server failed")
        }
        looped = run_rpc_loop(handler, client, &config.request_channel) => {
            looped.context("request loop stopped")
        }
    }
}
