//! Headless realtime client.
//!
//! Connects the three domain channels for the stored session, keeps them
//! healthy and logs every toast until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use ledgerplay_client::{
    logging::{init_tracing, DEFAULT_DIRECTIVE},
    storage::FileStore,
    ws::Connector,
    ApiClient, BridgeContext, ChannelClient, DomainBridge, GamingBridge, InitOutcome,
    LeaderboardBridge, LoopbackConnector, NotificationBridge, NotificationSink, Orchestrator,
    OrchestratorOptions, RealtimeConfig, SessionIdentity, TracingSink, TungsteniteConnector,
};
use ledgerplay_shared::ChannelKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(DEFAULT_DIRECTIVE);

    let config = RealtimeConfig::from_env().context("reading LEDGERPLAY_* configuration")?;
    let session = Arc::new(match FileStore::default_location() {
        Some(store) => SessionIdentity::restore(store),
        None => SessionIdentity::new(None),
    });
    if !session.is_authenticated() {
        tracing::warn!("No stored session; channels will connect anonymously");
    }

    let connector: Arc<dyn Connector> = if config.gateway_url.starts_with("loopback") {
        tracing::info!("Using in-process loopback gateway");
        Arc::new(LoopbackConnector::new())
    } else {
        Arc::new(TungsteniteConnector::new(config.gateway_url.clone()).with_session(session.clone()))
    };
    let notifier: Arc<dyn NotificationSink> = Arc::new(TracingSink);
    let context = BridgeContext {
        identity: session.clone(),
        notifier: notifier.clone(),
        api: Arc::new(ApiClient::new(config.api_url.clone()).with_session(session.clone())),
    };

    let channel = |kind: ChannelKind| {
        ChannelClient::with_outbox_capacity(kind.path(), connector.clone(), config.outbox_capacity)
    };
    let bridges: Vec<Arc<dyn DomainBridge>> = vec![
        Arc::new(GamingBridge::new(channel(ChannelKind::Gaming), context.clone(), &config)),
        Arc::new(NotificationBridge::new(
            channel(ChannelKind::Notifications),
            context.clone(),
            &config,
        )),
        Arc::new(LeaderboardBridge::new(
            channel(ChannelKind::Leaderboards),
            context,
            &config,
        )),
    ];

    let orchestrator = Orchestrator::with_session(
        bridges,
        notifier,
        OrchestratorOptions::from(&config),
        session.clone(),
    );
    if let InitOutcome::Completed(report) = orchestrator.initialize_all().await {
        for failure in &report.failed {
            tracing::warn!("{}", failure);
        }
        tracing::info!(
            "Realtime ready: {} connected, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
    }
    let watcher = orchestrator.watch_session(session.subscribe());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    tracing::info!("Shutting down");
    watcher.abort();
    orchestrator.shutdown();
    for bridge in orchestrator.bridges() {
        bridge.teardown();
    }
    Ok(())
}
