use std::net::SocketAddr;

use axum::http::header::InvalidHeaderValue;
use snafu::{Location, Snafu};

use crate::mail::MailError;
use crate::store::StoreError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApplicationError {
    /// could not read the configuration from the environment
    ConfigLoad {
        source: envy::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not initialize the logger
    InitializeLogger {
        source: tracing::subscriber::SetGlobalDefaultError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not connect to the stats store
    ConnectStore {
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not build the email client
    ConnectMailer {
        source: MailError,
        #[snafu(implicit)]
        location: Location,
    },

    /// The configured CORS origin is not a valid header value
    CorsOrigin {
        origin: String,
        source: InvalidHeaderValue,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not bind to the given address, check if it's already in use
    BindAddress {
        address: SocketAddr,
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// Could not serve the application
    WebServer {
        source: std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}
