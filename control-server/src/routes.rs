//! warp filters for the control surface.
//!
//! - `GET /start/{type}/{extension}`
//! - `GET /stop/{extension}`
//! - `GET /getall`
//! - `GET /events/{topic}` (server-sent events)

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::control::MonitoringControl;

type Control = Arc<dyn MonitoringControl>;

/// Every route, with rejections turned into plain-text responses.
pub fn routes(
    control: Control,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone + Send + Sync + 'static {
    let with_control = warp::any().map(move || control.clone());

    let start = warp::path!("start" / String / String)
        .and(warp::get())
        .and(with_control.clone())
        .and_then(handle_start);

    let stop = warp::path!("stop" / String)
        .and(warp::get())
        .and(with_control.clone())
        .and_then(handle_stop);

    let list = warp::path!("getall")
        .and(warp::get())
        .and(with_control.clone())
        .and_then(handle_list);

    let events = warp::path!("events" / String)
        .and(warp::get())
        .and(with_control)
        .and_then(handle_events);

    start
        .or(stop)
        .unify()
        .or(list)
        .unify()
        .or(events)
        .unify()
        .recover(handle_rejection)
        .unify()
}

fn text(status: StatusCode, body: String) -> Response {
    warp::reply::with_status(body, status).into_response()
}

async fn handle_start(
    monitor_type: String,
    extension: String,
    control: Control,
) -> Result<Response, Infallible> {
    match control.start(&monitor_type, &extension).await {
        Ok(started) => {
            tracing::info!(
                "Monitoring on {}: {} started (MonitorCrossRefID: {})",
                started.monitor_type,
                started.extension,
                started.monitor_cross_ref_id
            );
            Ok(text(
                StatusCode::OK,
                format!(
                    "Monitoring on {}: {} (MonitorCrossRefID: {}) has been started",
                    started.monitor_type, started.extension, started.monitor_cross_ref_id
                ),
            ))
        }
        Err(e) => {
            tracing::warn!("Failed to start monitoring on {}: {}", extension, e);
            Ok(text(StatusCode::BAD_REQUEST, e))
        }
    }
}

async fn handle_stop(extension: String, control: Control) -> Result<Response, Infallible> {
    match control.stop(&extension).await {
        Ok(stopped) => {
            let mut body = format!(
                "Monitoring on {} (MonitorCrossRefID: {}) has been stopped",
                stopped.extension, stopped.monitor_cross_ref_id
            );
            if let Some(warning) = stopped.warning {
                body.push_str(&format!(" (provider reported: {})", warning));
            }
            Ok(text(StatusCode::OK, body))
        }
        Err(e) => {
            tracing::warn!("Failed to stop monitoring on {}: {}", extension, e);
            Ok(text(StatusCode::BAD_REQUEST, e))
        }
    }
}

async fn handle_list(control: Control) -> Result<Response, Infallible> {
    match control.list().await {
        Ok(extensions) => {
            let mut body = format!("List of extensions being monitored: {}\n", extensions.len());
            for extension in extensions {
                body.push_str(&extension);
                body.push('\n');
            }
            Ok(text(StatusCode::OK, body))
        }
        Err(e) => Ok(text(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

async fn handle_events(topic: String, control: Control) -> Result<Response, Infallible> {
    match control.subscribe(&topic) {
        Some(receiver) => {
            tracing::debug!("Event feed opened for topic {}", topic);
            Ok(warp::sse::reply(warp::sse::keep_alive().stream(event_stream(receiver)))
                .into_response())
        }
        None => Ok(text(
            StatusCode::NOT_FOUND,
            format!("No event feed for topic {}", topic),
        )),
    }
}

/// Adapt a broadcast receiver into an SSE stream. Lagging subscribers skip
/// the missed events; the stream ends when the topic is deleted.
fn event_stream(
    receiver: broadcast::Receiver<Bytes>,
) -> impl Stream<Item = Result<warp::sse::Event, Infallible>> + Send + 'static {
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let event = warp::sse::Event::default()
                        .event("csta")
                        .data(String::from_utf8_lossy(&payload));
                    return Some((Ok(event), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event feed lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

async fn handle_rejection(err: warp::Rejection) -> Result<Response, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(text(code, message.to_string()))
}
