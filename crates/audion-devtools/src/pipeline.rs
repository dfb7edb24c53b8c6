//! The graph pipeline: debugger events in, serialized graph contexts out.
//!
//! ```text
//! web_audio_events -> integrate (+ realtime polls) -> serialize
//!     -> partition by context id -> throttle each -> merge
//! ```
//!
//! The integrator lives inside the stream and is only touched while the
//! stream is polled, so the contexts table is mutated serially by exactly one
//! owner. Each emission is serialized on the spot. Dropping the stream drops
//! every stage: the event subscription (and with it the attach interest),
//! the open partitions, their throttle timers, and the realtime pollers.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use audion_core::protocol::ContextType;
use audion_core::{GraphIntegrator, GraphObjectId, Outcome, WebAudioEvent};
use audion_transfer::{serialize, SerializedGraphContext};

use crate::attach::AttachController;
use crate::config::PipelineConfig;
use crate::error::DevtoolsError;
use crate::events::{web_audio_events, EventStream};
use crate::partition::partition_map;
use crate::realtime::{RealtimePoller, RealtimeSample};
use crate::throttle::throttle;

type Update = Result<SerializedGraphContext, DevtoolsError>;

/// Raised once per pipeline when an event referenced something the
/// integrator never saw, or events were lost.
#[derive(Debug)]
pub struct MissedUpdates {
    tx: watch::Sender<bool>,
}

impl MissedUpdates {
    pub fn channel() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (MissedUpdates { tx }, rx)
    }

    /// Flags missed updates. Returns true the first time only.
    pub fn report(&self) -> bool {
        self.tx.send_if_modified(|missed| !std::mem::replace(missed, true))
    }
}

struct Integration {
    events: EventStream<WebAudioEvent>,
    integrator: GraphIntegrator,
    poller: RealtimePoller,
    samples: mpsc::UnboundedReceiver<RealtimeSample>,
    missed: MissedUpdates,
}

impl Integration {
    fn apply(&mut self, event: WebAudioEvent) -> Option<SerializedGraphContext> {
        match &event {
            WebAudioEvent::ContextCreated(e) => {
                let id = e.context.context_id.clone();
                match e.context.context_type {
                    ContextType::Realtime => self.poller.start(id),
                    ContextType::Offline => self.poller.stop(&id),
                }
            }
            WebAudioEvent::ContextWillBeDestroyed(e) => self.poller.stop(&e.context_id),
            _ => {}
        }

        let method = event.method();
        let mut serialized = None;
        match self
            .integrator
            .apply(event, |update| serialized = Some(serialize(update)))
        {
            Ok(Outcome::Ignored(miss)) => {
                debug!(method, ?miss, "event references an unobserved object");
                if self.missed.report() {
                    warn!("events reference objects created before observation began");
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(method, error = %e, "event rejected by the graph integrator");
                self.missed.report();
            }
        }
        serialized
    }

    fn apply_sample(&mut self, (id, data): RealtimeSample) -> Option<SerializedGraphContext> {
        let mut serialized = None;
        self.integrator
            .apply_realtime_data(&id, data, |update| serialized = Some(serialize(update)));
        serialized
    }

    /// Waits for the next emission. `None` ends the integration.
    async fn next(&mut self) -> Option<Result<SerializedGraphContext, DevtoolsError>> {
        loop {
            tokio::select! {
                item = self.events.next() => match item {
                    None => return None,
                    Some(Ok(event)) => {
                        if let Some(serialized) = self.apply(event) {
                            return Some(Ok(serialized));
                        }
                    }
                    Some(Err(e)) if e.is_recoverable() => {
                        warn!(error = %e, "graph events lost");
                        self.missed.report();
                    }
                    Some(Err(e)) => return Some(Err(e)),
                },
                Some(sample) = self.samples.recv() => {
                    if let Some(serialized) = self.apply_sample(sample) {
                        return Some(Ok(serialized));
                    }
                }
            }
        }
    }
}

/// Serialized contexts straight out of the integrator, one per emission.
pub fn integrate(
    controller: &Arc<AttachController>,
    config: PipelineConfig,
    missed: MissedUpdates,
) -> EventStream<SerializedGraphContext> {
    let (poller, samples) = RealtimePoller::new(
        Arc::clone(controller),
        config.realtime_interval,
        config.realtime_timeout,
    );
    let integration = Integration {
        events: web_audio_events(controller),
        integrator: GraphIntegrator::new(config.integrator),
        poller,
        samples,
        missed,
    };

    stream::unfold(Some(integration), |state| async move {
        let mut integration = state?;
        match integration.next().await? {
            Ok(serialized) => Some((Ok(serialized), Some(integration))),
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// The full pipeline: integrated, partitioned per context, rate limited per
/// context, and merged back into one stream.
///
/// Updates of one context keep their order; updates of different contexts
/// may interleave freely. A context's destruction sentinel closes its
/// partition and always comes through. A reused context id opens a new
/// partition that starts only after the previous one for that id has
/// drained, so a stale sentinel never overtakes the new context. A terminal
/// error appears once and ends the stream.
pub fn graph_updates(
    controller: &Arc<AttachController>,
    config: PipelineConfig,
    missed: MissedUpdates,
) -> EventStream<SerializedGraphContext> {
    let interval = config.throttle;
    let partitions = partition_map(
        integrate(controller, config, missed),
        |serialized: &SerializedGraphContext| -> GraphObjectId { serialized.id.clone() },
        SerializedGraphContext::is_destroyed,
    );

    // Completion signal of the latest partition per context id.
    let mut drained: HashMap<GraphObjectId, oneshot::Receiver<()>> = HashMap::new();

    partitions
        .map(move |partition| match partition {
            Ok(partition) => {
                drained.retain(|_, done| matches!(done.try_recv(), Err(TryRecvError::Empty)));
                let (done_tx, done_rx) = oneshot::channel();
                let previous = drained.insert(partition.key().clone(), done_rx);

                let wait_previous = stream::once(async move {
                    if let Some(previous) = previous {
                        let _ = previous.await;
                    }
                })
                .filter_map(|()| future::ready(None::<Update>));
                // Each partition sees the error too; report it once, from
                // the outer stream.
                let updates = throttle(partition, interval)
                    .filter_map(|item| future::ready(item.ok().map(Ok::<_, DevtoolsError>)));
                let signal_drained = stream::once(async move {
                    let _ = done_tx.send(());
                })
                .filter_map(|()| future::ready(None::<Update>));

                wait_previous.chain(updates).chain(signal_drained).boxed()
            }
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        })
        .flatten_unordered(None)
        .boxed()
}
