use std::sync::Arc;

use guardiao_shared::clients::db::create_pool;
use guardiao_shared::clients::rabbitmq::RabbitMQClient;
use guardiao_shared::middleware::{init_metrics, init_tracing};

use guardiao_voting::clients::BotApiClient;
use guardiao_voting::clock::SystemClock;
use guardiao_voting::config::AppConfig;
use guardiao_voting::dispatch::PunishmentDispatcher;
use guardiao_voting::events::{EventSink, NullEventSink};
use guardiao_voting::services::ModerationService;
use guardiao_voting::store::PgReviewStore;
use guardiao_voting::{router, spawn_sweeper, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("guardiao-voting");

    let config = AppConfig::load()?;
    let port = config.port;

    let pool = create_pool(&config.database_url, config.db_pool_size)?;
    let store = Arc::new(PgReviewStore::new(pool));

    let events: Arc<dyn EventSink> = match RabbitMQClient::connect(&config.rabbitmq_url).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "RabbitMQ unavailable, domain events disabled");
            Arc::new(NullEventSink)
        }
    };

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed");
            None
        }
    };

    let bot = Arc::new(BotApiClient::new(&config.bot_api_url, config.bot_timeout())?);
    let dispatcher = PunishmentDispatcher::new(bot.clone(), bot, config.bot_timeout());

    let service = ModerationService::new(
        store,
        Arc::new(SystemClock),
        dispatcher,
        events,
        config.panel(),
        config.elevated_level,
    );

    let sweep_interval = config.sweep_interval();
    let state = Arc::new(AppState {
        service,
        config,
        metrics,
    });

    match sweep_interval {
        Some(period) => {
            tracing::info!(period_secs = period.as_secs(), "expired session sweeper enabled");
            spawn_sweeper(state.clone(), period);
        }
        None => tracing::info!("expired session sweeper disabled, relying on lazy expiry"),
    }

    let app = router(state.clone());

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "guardiao-voting starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("draining pending bot dispatches");
    state.service.drain_dispatches().await;

    Ok(())
}
