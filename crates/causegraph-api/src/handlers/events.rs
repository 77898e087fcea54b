//! Job progress channel over server-sent events
//!
//! Opening the stream joins the job's room and closing it leaves. The first
//! event is a snapshot of the job's current state; the stream ends after
//! the terminal event.
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use causegraph_core::JobEvent;
use causegraph_jobs::{JobService, Subscription};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Leaves the room when the client disconnects
struct RoomMembership {
    service: Arc<JobService>,
    job_id: Uuid,
    subscriber_id: u64,
}

impl Drop for RoomMembership {
    fn drop(&mut self) {
        self.service.unsubscribe(self.job_id, self.subscriber_id);
    }
}

struct Channel {
    snapshot: Option<JobEvent>,
    subscription: Subscription,
    _membership: RoomMembership,
    done: bool,
}

fn to_sse(event: &JobEvent) -> Event {
    Event::default()
        .event(event.status.as_str())
        .json_data(event)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Stream a job's status events
#[utoipa::path(
    get,
    path = "/api/v1/jobs/{id}/events",
    tag = "jobs",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Event stream started"),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn job_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Join before taking the snapshot so no event is missed in between
    let subscription = state.service.subscribe(id).await?;
    let membership = RoomMembership {
        service: Arc::clone(&state.service),
        job_id: id,
        subscriber_id: subscription.subscriber_id,
    };

    let job = state.service.job(id).await?;
    let snapshot = JobEvent {
        job_id: job.id,
        status: job.status,
        progress: job.progress,
        total: job.total,
        result: job.result,
        failure: job.failure,
    };
    tracing::debug!(job_id = %id, status = %snapshot.status, "Event stream opened");

    let channel = Channel {
        snapshot: Some(snapshot),
        subscription,
        _membership: membership,
        done: false,
    };

    let stream = stream::unfold(channel, |mut channel| async move {
        if channel.done {
            return None;
        }
        let event = match channel.snapshot.take() {
            Some(event) => event,
            None => channel.subscription.recv().await?,
        };
        channel.done = event.is_terminal();
        Some((Ok(to_sse(&event)), channel))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
