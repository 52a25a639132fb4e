use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;

use super::state::App;
use crate::vcard::VCard;

pub async fn download(State(app): State<App>) -> impl IntoResponse {
    let disposition = format!("attachment; filename=\"{}\"", app.card.file_name());

    (
        [(CONTENT_TYPE, VCard::CONTENT_TYPE.to_owned()), (CONTENT_DISPOSITION, disposition)],
        app.card.render(),
    )
}
