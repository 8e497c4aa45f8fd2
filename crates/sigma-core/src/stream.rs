//! Server-push stream: re-render a component on a timer and write each
//! result as an event frame until the client goes away.

use crate::Result;
use crate::component::Component;
use crate::context::Context;
use crate::dispatcher::Handler;
use crate::error::SigmaError;
use axum::http::{
    HeaderValue,
    header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
};
use sigma_types::EventFrame;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Interval between frames unless configured otherwise.
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest accepted interval; tokio timers reject a zero period.
pub const MIN_PUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of one push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Headers set, flush capability verified, timer armed.
    Open,
    /// At least one tick has fired.
    Ticking,
    /// Terminal. The timer has been released.
    Closed,
}

/// What happened over the life of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Frames written, including error frames.
    pub frames: usize,
    /// Ticks whose render failed and produced an error frame.
    pub render_errors: usize,
    /// Last state reached before closing. `None` when the capability
    /// check failed and the stream never opened.
    pub reached: Option<StreamState>,
    pub final_state: StreamState,
}

impl StreamSummary {
    /// Whether the stream got past its capability check.
    pub fn established(&self) -> bool {
        self.reached.is_some()
    }
}

/// Source of timer ticks for the push loop.
pub trait TickSource: Send {
    fn tick(&mut self) -> impl Future<Output = ()> + Send;
}

/// Tokio interval whose first tick comes one full period after start.
pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    /// Periods below [`MIN_PUSH_INTERVAL`] are raised to it.
    pub fn new(period: Duration) -> Self {
        let period = period.max(MIN_PUSH_INTERVAL);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl TickSource for IntervalTicks {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Push-stream handler bound to one component.
#[derive(Debug, Clone)]
pub struct PushStream {
    component: Arc<Component>,
    interval: Duration,
}

/// Handler that streams `component` at the default interval.
pub fn push_stream(component: Arc<Component>) -> impl Handler {
    PushStream::new(component).into_handler()
}

impl PushStream {
    pub fn new(component: Arc<Component>) -> Self {
        Self {
            component,
            interval: DEFAULT_PUSH_INTERVAL,
        }
    }

    /// Set the frame interval, clamped to at least [`MIN_PUSH_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_PUSH_INTERVAL);
        self
    }

    pub fn into_handler(self) -> impl Handler {
        let stream = Arc::new(self);
        move |ctx: Context| {
            let stream = stream.clone();
            async move {
                let ticks = IntervalTicks::new(stream.interval);
                stream.run(ctx, ticks).await;
            }
        }
    }

    /// Drive one connection to completion.
    ///
    /// Cancellation is checked before every tick and wins over a tick that
    /// is ready at the same time; once observed, nothing more is written.
    /// `ticks` is dropped exactly once, when the loop exits.
    pub async fn run(&self, mut ctx: Context, ticks: impl TickSource) -> StreamSummary {
        let name = self.component.name().to_string();
        let mut summary = StreamSummary {
            frames: 0,
            render_errors: 0,
            reached: None,
            final_state: StreamState::Closed,
        };

        {
            let headers = ctx.response().headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
        if !ctx.response().supports_flush() {
            let e = SigmaError::StreamingUnsupported;
            warn!(target: "sigma::stream", "{} for {}", e, name);
            ctx.error(e.status_code(), "Streaming not supported");
            return summary;
        }
        let mut state = StreamState::Open;
        debug!(target: "sigma::stream", "Push stream for {} is {:?}", name, state);

        let cancel = ctx.cancel_signal();
        let mut ticks = ticks;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(target: "sigma::stream", "Push stream for {} cancelled", name);
                    break;
                }
                _ = ticks.tick() => {
                    if state == StreamState::Open {
                        state = advance(&name, state, StreamState::Ticking);
                    }
                    let frame = match self.component.render() {
                        Ok(html) => EventFrame::data(html),
                        Err(e) => {
                            summary.render_errors += 1;
                            warn!(target: "sigma::stream", "Render failed for {}: {}", name, e);
                            EventFrame::error(e)
                        }
                    };
                    if let Err(e) = write_frame(&mut ctx, &frame) {
                        debug!(target: "sigma::stream", "Push stream for {} lost its client: {}", name, e);
                        break;
                    }
                    summary.frames += 1;
                }
            }
        }

        drop(ticks);
        summary.reached = Some(state);
        summary.final_state = advance(&name, state, StreamState::Closed);
        info!(
            target: "sigma::stream",
            "Push stream for {} closed after {} frames",
            name,
            summary.frames
        );
        summary
    }
}

fn advance(name: &str, from: StreamState, to: StreamState) -> StreamState {
    debug!(target: "sigma::stream", "Push stream for {}: {:?} -> {:?}", name, from, to);
    to
}

fn write_frame(ctx: &mut Context, frame: &EventFrame) -> Result<()> {
    let response = ctx.response();
    response.write(frame.encode().as_bytes())?;
    response.flush()?;
    Ok(())
}
