use std::sync::Arc;

use snafu::ResultExt;
use tokio::net::TcpListener;

use crate::api::{self, App};
use crate::config::Config;
use crate::error::{
    ApplicationError, BindAddressSnafu, ConnectMailerSnafu, ConnectStoreSnafu, CorsOriginSnafu, WebServerSnafu,
};
use crate::mail::ResendMailer;
use crate::store::SurrealStore;
use crate::tracker::Tracker;

/// Connects the backing services and serves the API until ctrl-c.
pub async fn run(config: Config) -> Result<(), ApplicationError> {
    let store = SurrealStore::connect(&config.surreal).await.context(ConnectStoreSnafu)?;
    let mailer = ResendMailer::connect(&config.mail.resend_api_key, config.mail.resend_endpoint.clone())
        .context(ConnectMailerSnafu)?;

    let app = App::new(
        Tracker::new(Arc::new(store)),
        Arc::new(mailer),
        Arc::new(config.mail.settings()),
        Arc::new(config.card.vcard()),
    );

    let cors = api::cors(config.cors_origin.as_deref()).with_context(|_| CorsOriginSnafu {
        origin: config.cors_origin.clone().unwrap_or_default(),
    })?;
    let router = api::create_router(app, cors);

    let address = config.host_address;
    let listener = TcpListener::bind(address).await.context(BindAddressSnafu { address })?;
    tracing::info!(%address, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(WebServerSnafu)?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "could not listen for ctrl-c");
    }
}
