//! EventSource: domain-filtered debugger event streams.
//!
//! Every stream returned by [`observe`] holds one unit of attach interest and
//! one unit of interest in its domain for as long as it lives, so the first
//! stream attaches the debugger and dropping the last one detaches it.
//! Events arrive in exactly the order the debugger sent them.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use audion_core::{ProtocolEvent, WebAudioEvent};

use crate::attach::{AttachController, Domain, Fault, Interest, InterestGuard};
use crate::debugger::DebuggerNotification;
use crate::error::DevtoolsError;

/// A stream of debugger items that ends after its first terminal error.
pub type EventStream<T> = BoxStream<'static, Result<T, DevtoolsError>>;

struct Subscription {
    domain: Domain,
    notifications: broadcast::Receiver<DebuggerNotification>,
    faults: broadcast::Receiver<Fault>,
    _guards: [InterestGuard; 2],
}

/// Raw `{method, params}` events of one domain.
///
/// A subscriber that falls behind gets [`DevtoolsError::Lagged`] and keeps
/// receiving. A failed attach, or a failed enable of this stream's domain,
/// is delivered as an error and ends the stream.
pub fn observe(controller: &Arc<AttachController>, domain: Domain) -> EventStream<ProtocolEvent> {
    // Subscribe before taking interest so nothing sent right after the
    // attach is missed.
    let subscription = Subscription {
        domain,
        notifications: controller.notifications(),
        faults: controller.faults(),
        _guards: [
            controller.acquire(Interest::Attach),
            controller.acquire(Interest::Events(domain)),
        ],
    };

    stream::unfold(Some(subscription), |state| async move {
        let mut sub = state?;
        loop {
            tokio::select! {
                biased;
                note = sub.notifications.recv() => match note {
                    Ok(DebuggerNotification::Event(event))
                        if event.method.starts_with(sub.domain.prefix()) =>
                    {
                        return Some((Ok(event), Some(sub)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(missed)) => {
                        return Some((Err(DevtoolsError::Lagged(missed)), Some(sub)));
                    }
                    Err(RecvError::Closed) => return None,
                },
                fault = sub.faults.recv() => match fault {
                    Ok(fault) if fault.affects(sub.domain) => {
                        return Some((Err(fault.error), None));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    })
    .boxed()
}

/// `WebAudio` events parsed into [`WebAudioEvent`].
///
/// Methods outside the handled vocabulary are dropped. A known method with
/// a malformed payload yields a recoverable [`DevtoolsError::Protocol`].
pub fn web_audio_events(controller: &Arc<AttachController>) -> EventStream<WebAudioEvent> {
    observe(controller, Domain::WebAudio)
        .filter_map(|item| async move {
            match item {
                Ok(event) => match WebAudioEvent::from_protocol(event) {
                    Ok(Some(event)) => Some(Ok(event)),
                    Ok(None) => None,
                    Err(error) => Some(Err(DevtoolsError::from(error))),
                },
                Err(error) => Some(Err(error)),
            }
        })
        .boxed()
}
