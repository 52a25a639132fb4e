use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::header::{ACCEPT_LANGUAGE, USER_AGENT};
use axum::http::{HeaderMap, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use axum_extra::extract::CookieJar;
use futures::stream::{self, Stream};
use serde::Deserialize;

use super::state::App;
use crate::display::StatsDisplay;
use crate::session::{CookieStorage, Fingerprint, SessionId};
use crate::store::Stats;
use crate::time::now;

/// Fingerprint fields only the browser's script can see.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ClientHints {
    pub timezone_offset: i32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
}

pub async fn track(
    State(app): State<App>,
    Query(hints): Query<ClientHints>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Json<Stats>) {
    let (session_id, jar) = resolve_session(jar, &headers, hints);

    app.tracker.track(&session_id).await;
    let stats = app.tracker.stats().await;

    (jar, Json(stats))
}

pub async fn stats(State(app): State<App>) -> Json<Stats> {
    Json(app.tracker.stats().await)
}

/// Live counter widget over server-sent events. The connection closing unmounts the widget.
pub async fn live(
    State(app): State<App>,
    Query(hints): Query<ClientHints>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (CookieJar, Sse<impl Stream<Item = Result<Event, Infallible>>>) {
    let (session_id, jar) = resolve_session(jar, &headers, hints);
    let display = StatsDisplay::mount(app.tracker.clone(), &session_id).await;

    let sse = Sse::new(display_events(display)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    (jar, sse)
}

/// Emits the current display state, then one `stats` event per change.
pub(crate) fn display_events(display: StatsDisplay) -> impl Stream<Item = Result<Event, Infallible>> {
    let receiver = display.watch();

    stream::unfold((display, receiver, true), |(display, mut receiver, first)| async move {
        if !first && receiver.changed().await.is_err() {
            return None;
        }

        let state = *receiver.borrow_and_update();
        let event = match Event::default().event("stats").json_data(state) {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(%error, "could not encode display state");
                Event::default().event("error")
            }
        };

        Some((Ok(event), (display, receiver, false)))
    })
}

fn resolve_session(jar: CookieJar, headers: &HeaderMap, hints: ClientHints) -> (SessionId, CookieJar) {
    let fingerprint = fingerprint(headers, hints);

    let mut storage = CookieStorage::new(jar);
    let session_id = SessionId::resolve(&mut storage, &fingerprint, now());

    (session_id, storage.into_jar())
}

fn fingerprint(headers: &HeaderMap, hints: ClientHints) -> Fingerprint {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    };

    let language = header(ACCEPT_LANGUAGE)
        .split([',', ';'])
        .next()
        .unwrap_or_default()
        .trim();

    Fingerprint::new(
        header(USER_AGENT).to_owned(),
        language.to_owned(),
        hints.timezone_offset,
        hints.screen_width,
        hints.screen_height,
        hints.color_depth,
    )
}
