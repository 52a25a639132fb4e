use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use snafu::{ensure, ResultExt};

use super::error::{InvalidBodySnafu, NoDataSnafu, SendMailSnafu};
use super::state::App;
use super::{ApiError, Result};
use crate::mail::{ContactMessage, Email};

/// Relays a contact form submission to the site owner's inbox.
pub async fn send(State(app): State<App>, body: Bytes) -> Result<Json<Value>> {
    ensure!(!body.iter().all(u8::is_ascii_whitespace), NoDataSnafu);

    let message: ContactMessage = serde_json::from_slice(&body).context(InvalidBodySnafu)?;
    let email = Email::contact(&message, &app.mail).context(SendMailSnafu)?;
    let data = app.mailer.send(&email).await.context(SendMailSnafu)?;

    Ok(Json(json!({ "success": true, "data": data })))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
