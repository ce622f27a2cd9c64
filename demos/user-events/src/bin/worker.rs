//! User events worker.
//!
//! Consumes the `user.created`, `user.updated` and `user.deleted` queues, one consumer
//! per queue, until SIGINT or SIGTERM.

use anyhow::Context;
use courier_aws::{AwsSettings, SqsQueueClient, load_sdk_config};
use courier_core::backend::QueueClient;
use courier_core::codec::JsonDeserializer;
use courier_runtime::metrics::MetricsServer;
use courier_runtime::{ConsumerConfig, ConsumerHandle, QueueConsumer};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use user_events::config::{AppConfig, Config, EnvFiles};
use user_events::events::{
    USER_CREATED, USER_DELETED, USER_UPDATED, UserCreated, UserDeleted, UserUpdated,
};
use user_events::handlers::{UserCreatedHandler, UserDeletedHandler, UserUpdatedHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_files = EnvFiles::load();
    let config = Config::from_env();
    let fallback = AppConfig::default();
    init_tracing(config.as_ref().map_or(&fallback, |config| &config.app));
    env_files.report();
    let config = config.context("Failed to load configuration")?;

    info!(
        environment = %config.app.environment,
        region = %config.aws.region,
        use_localstack = config.aws.use_localstack,
        "Starting user events worker"
    );

    if let Some(addr) = config.worker.metrics_addr {
        MetricsServer::new(addr)
            .serve()
            .context("Failed to start metrics server")?;
    }

    let mut settings =
        AwsSettings::new(&config.aws.region).with_localstack(config.aws.use_localstack);
    if let Some(endpoint) = &config.aws.endpoint {
        settings = settings.with_endpoint(endpoint);
    }
    let sdk_config = load_sdk_config(&settings).await;

    let queues: Arc<dyn QueueClient> = Arc::new(
        SqsQueueClient::builder()
            .sdk_config(&sdk_config)
            .unwrap_sns_envelope(true)
            .build()?,
    );
    let consumer_config =
        |queue: &str| ConsumerConfig::new(queue).with_max_batch_size(config.worker.max_batch_size);

    let root = CancellationToken::new();
    let handles = vec![
        QueueConsumer::<UserCreated>::new(
            Arc::clone(&queues),
            consumer_config(&config.events.user_created_queue_url),
        )
        .start(
            JsonDeserializer::expecting(USER_CREATED),
            UserCreatedHandler,
            root.child_token(),
        ),
        QueueConsumer::<UserUpdated>::new(
            Arc::clone(&queues),
            consumer_config(&config.events.user_updated_queue_url),
        )
        .start(
            JsonDeserializer::expecting(USER_UPDATED),
            UserUpdatedHandler,
            root.child_token(),
        ),
        QueueConsumer::<UserDeleted>::new(
            Arc::clone(&queues),
            consumer_config(&config.events.user_deleted_queue_url),
        )
        .start(
            JsonDeserializer::expecting(USER_DELETED),
            UserDeletedHandler,
            root.child_token(),
        ),
    ];
    info!(consumers = handles.len(), "Worker running");

    shutdown_signal().await;
    root.cancel();

    let timeout = config.worker.shutdown_timeout();
    let results =
        futures::future::join_all(handles.into_iter().map(|handle| stop(handle, timeout))).await;
    let failed = results.iter().filter(|stopped| !**stopped).count();

    if failed > 0 {
        anyhow::bail!("{failed} consumer(s) did not stop cleanly");
    }
    info!("Worker stopped");
    Ok(())
}

/// Wait for one consumer to stop, returning whether it did so cleanly.
async fn stop(handle: ConsumerHandle, timeout: std::time::Duration) -> bool {
    let queue = handle.queue().to_string();
    match handle.shutdown_within(timeout).await {
        Ok(()) => true,
        Err(e) => {
            error!(queue = %queue, error = %e, "Consumer did not stop cleanly");
            false
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(app: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},aws_config=warn,aws_smithy_runtime=warn",
            app.log_level
        ))
    });

    let json = app.json_logs();
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
