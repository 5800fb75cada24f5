//! Headless listener: signs in with a bearer token, attaches the
//! notification session and logs toasts, unread count and who is online.

use std::sync::Arc;

use spark_notify::client::{
    ActiveView, ApiClient, BusClient, ClientConfig, ClientStores, NotificationSession,
    NotificationUi, RosterState, Toast, WsTransport,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct LogUi;

impl NotificationUi for LogUi {
    fn active_view(&self) -> ActiveView {
        ActiveView::Other
    }

    fn refresh(&self) {}

    fn toast(&self, toast: Toast) {
        tracing::info!(kind = ?toast.kind, text = %toast.text, "toast");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;
    let api = ApiClient::new(&config.api_url, &config.token)?;
    let info = api.session().await?;
    if info.active_user().is_none() {
        anyhow::bail!("profile incomplete; nothing to listen to");
    }

    let stores = ClientStores::default();
    match api.unread_count().await {
        Ok(count) => stores.unread.set_unread_count(count),
        Err(e) => tracing::warn!(error = %e, "could not seed unread count"),
    }

    let bus = BusClient::new();
    let session = NotificationSession::start(&bus, &info, stores.clone(), Arc::new(LogUi));
    let _transport = WsTransport::connect(config, &bus)?;

    let mut unread = stores.unread.subscribe();
    let mut roster = stores.roster.subscribe();
    tracing::info!(unread = stores.unread.get(), "listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = unread.changed() => {
                tracing::info!(unread = *unread.borrow_and_update(), "unread count");
            }
            Ok(()) = roster.changed() => {
                let synced = matches!(*roster.borrow_and_update(), RosterState::Synced(_));
                if synced {
                    tracing::info!(online = ?stores.roster.online_ids(), "online");
                }
            }
        }
    }

    session.end();
    bus.detach_transport();
    Ok(())
}
