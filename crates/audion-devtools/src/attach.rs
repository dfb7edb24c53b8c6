//! AttachController: permission and reference-counted interest in the
//! debugger connection.
//!
//! Callers only say what they want (interest counters, permission grants).
//! A single driver task compares that against what the debugger currently is
//! and performs one transition at a time (attach, enable a domain, disable a
//! domain, detach) until the two agree. Transitions are therefore strictly
//! serial, and a burst of increments and decrements that cancels out before
//! the driver runs causes no traffic at all.
//!
//! A failed attach or enable is reported on [`AttachController::faults`] and
//! not retried until interest rises again or permission is re-granted.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use audion_core::protocol::method;

use crate::debugger::{Debugger, DebuggerNotification, DetachReason};
use crate::error::DevtoolsError;

/// Whether the user allowed a debugging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    /// Nothing decided yet; no attach happens.
    Unknown,
    /// Allowed for this run of the service.
    Temporary,
    /// The user dismissed a session; nothing attaches until a new grant.
    Rejected,
}

/// The debugger session as the controller last saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachState {
    Detached,
    Attaching,
    Attached,
    Detaching,
}

/// Per-domain event delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DomainState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

/// A protocol domain whose events can be switched on and off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Domain {
    Page,
    WebAudio,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::Page, Domain::WebAudio];

    /// Method prefix of this domain's events, including the dot.
    pub fn prefix(self) -> &'static str {
        match self {
            Domain::Page => "Page.",
            Domain::WebAudio => "WebAudio.",
        }
    }

    pub fn enable_method(self) -> &'static str {
        match self {
            Domain::Page => "Page.enable",
            Domain::WebAudio => method::ENABLE,
        }
    }

    pub fn disable_method(self) -> &'static str {
        match self {
            Domain::Page => "Page.disable",
            Domain::WebAudio => method::DISABLE,
        }
    }

    /// Returns the domain a protocol method belongs to.
    pub fn of_method(method: &str) -> Option<Domain> {
        Domain::ALL
            .into_iter()
            .find(|domain| method.starts_with(domain.prefix()))
    }

    fn index(self) -> usize {
        match self {
            Domain::Page => 0,
            Domain::WebAudio => 1,
        }
    }
}

/// One of the three independent interest counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    /// Someone needs the debugger attached.
    Attach,
    /// Someone needs events from a domain.
    Events(Domain),
}

impl Interest {
    fn index(self) -> usize {
        match self {
            Interest::Attach => 0,
            Interest::Events(domain) => 1 + domain.index(),
        }
    }
}

/// Snapshot of the controller, as served by `GET /debugger/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachStatus {
    pub permission: Permission,
    pub state: AttachState,
    pub attach_interest: usize,
    pub page_interest: usize,
    pub web_audio_interest: usize,
    pub page: DomainState,
    pub web_audio: DomainState,
}

impl AttachStatus {
    pub fn domain(&self, domain: Domain) -> DomainState {
        match domain {
            Domain::Page => self.page,
            Domain::WebAudio => self.web_audio,
        }
    }
}

/// A failed attach (`domain: None`) or a failed enable of one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub domain: Option<Domain>,
    pub error: DevtoolsError,
}

impl Fault {
    /// Whether a subscriber of `domain` is affected. A failed attach affects
    /// everyone.
    pub fn affects(&self, domain: Domain) -> bool {
        match self.domain {
            None => true,
            Some(failed) => failed == domain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Attach,
    Enable(Domain),
    Disable(Domain),
    Detach,
}

#[derive(Debug)]
struct Inner {
    permission: Permission,
    state: AttachState,
    counts: [usize; 3],
    domains: [DomainState; 2],
    // Set after a failed attach or enable; cleared by new interest or a grant.
    blocked: bool,
}

impl Inner {
    fn new() -> Self {
        Inner {
            permission: Permission::Unknown,
            state: AttachState::Detached,
            counts: [0; 3],
            domains: [DomainState::Disabled; 2],
            blocked: false,
        }
    }

    fn count(&self, interest: Interest) -> usize {
        self.counts[interest.index()]
    }

    fn wants_attach(&self) -> bool {
        self.permission == Permission::Temporary && self.count(Interest::Attach) > 0
    }

    fn next_step(&self) -> Option<Step> {
        match self.state {
            AttachState::Detached => {
                (self.wants_attach() && !self.blocked).then_some(Step::Attach)
            }
            AttachState::Attached => {
                for domain in Domain::ALL {
                    if self.domains[domain.index()] == DomainState::Enabled
                        && (self.count(Interest::Events(domain)) == 0 || !self.wants_attach())
                    {
                        return Some(Step::Disable(domain));
                    }
                }
                if !self.wants_attach() {
                    return Some(Step::Detach);
                }
                if self.blocked {
                    return None;
                }
                Domain::ALL
                    .into_iter()
                    .find(|&domain| {
                        self.domains[domain.index()] == DomainState::Disabled
                            && self.count(Interest::Events(domain)) > 0
                    })
                    .map(Step::Enable)
            }
            AttachState::Attaching | AttachState::Detaching => None,
        }
    }

    fn begin(&mut self, step: Step) {
        match step {
            Step::Attach => self.state = AttachState::Attaching,
            Step::Detach => self.state = AttachState::Detaching,
            Step::Enable(domain) => self.domains[domain.index()] = DomainState::Enabling,
            Step::Disable(domain) => self.domains[domain.index()] = DomainState::Disabling,
        }
    }

    fn finish(&mut self, step: Step, ok: bool) {
        match step {
            Step::Attach if ok => self.state = AttachState::Attached,
            Step::Attach => {
                self.state = AttachState::Detached;
                self.blocked = true;
            }
            Step::Detach => self.reset_session(),
            Step::Enable(domain) if ok => self.domains[domain.index()] = DomainState::Enabled,
            Step::Enable(domain) => {
                self.domains[domain.index()] = DomainState::Disabled;
                self.blocked = true;
            }
            Step::Disable(domain) => self.domains[domain.index()] = DomainState::Disabled,
        }
    }

    fn reset_session(&mut self) {
        self.state = AttachState::Detached;
        self.domains = [DomainState::Disabled; 2];
    }

    fn status(&self) -> AttachStatus {
        AttachStatus {
            permission: self.permission,
            state: self.state,
            attach_interest: self.count(Interest::Attach),
            page_interest: self.count(Interest::Events(Domain::Page)),
            web_audio_interest: self.count(Interest::Events(Domain::WebAudio)),
            page: self.domains[Domain::Page.index()],
            web_audio: self.domains[Domain::WebAudio.index()],
        }
    }
}

/// State shared with the driver task.
struct Shared {
    debugger: Arc<dyn Debugger>,
    inner: Mutex<Inner>,
    wake: Notify,
    status: watch::Sender<AttachStatus>,
    faults: broadcast::Sender<Fault>,
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.status.send_replace(inner.status());
    }

    async fn reconcile(&self) {
        loop {
            let step = {
                let mut inner = self.inner.lock();
                let step = inner.next_step();
                if let Some(step) = step {
                    inner.begin(step);
                    self.publish(&inner);
                }
                step
            };
            let Some(step) = step else {
                return;
            };

            debug!(?step, "debugger transition");
            let result = self.execute(step).await;

            {
                let mut inner = self.inner.lock();
                inner.finish(step, result.is_ok());
                self.publish(&inner);
            }

            match result {
                Ok(()) => match step {
                    Step::Attach => info!("debugger attached"),
                    Step::Detach => info!("debugger detached"),
                    _ => {}
                },
                Err(error) => {
                    warn!(?step, %error, "debugger transition failed");
                    let fault = match step {
                        Step::Attach => Some(Fault { domain: None, error }),
                        Step::Enable(domain) => Some(Fault {
                            domain: Some(domain),
                            error,
                        }),
                        Step::Detach | Step::Disable(_) => None,
                    };
                    if let Some(fault) = fault {
                        let _ = self.faults.send(fault);
                    }
                }
            }
        }
    }

    async fn execute(&self, step: Step) -> Result<(), DevtoolsError> {
        match step {
            Step::Attach => self.debugger.attach().await,
            Step::Detach => self.debugger.detach().await,
            Step::Enable(domain) => self
                .debugger
                .send_command(domain.enable_method(), json!({}))
                .await
                .map(drop),
            Step::Disable(domain) => self
                .debugger
                .send_command(domain.disable_method(), json!({}))
                .await
                .map(drop),
        }
    }

    fn on_detached(&self, reason: DetachReason) {
        let mut inner = self.inner.lock();
        if reason == DetachReason::CanceledByUser {
            info!("debugging session canceled by the user; permission rejected");
            inner.permission = Permission::Rejected;
        } else {
            warn!(?reason, "debugger session ended");
        }
        inner.reset_session();
        self.publish(&inner);
    }
}

async fn drive(shared: Arc<Shared>) {
    let mut notifications = shared.debugger.subscribe();
    loop {
        shared.reconcile().await;
        loop {
            tokio::select! {
                _ = shared.wake.notified() => break,
                note = notifications.recv() => match note {
                    Ok(DebuggerNotification::Detached(reason)) => {
                        shared.on_detached(reason);
                        break;
                    }
                    Ok(DebuggerNotification::Event(_)) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return,
                },
            }
        }
    }
}

/// Decides when the debugger attaches and which domains are enabled.
pub struct AttachController {
    shared: Arc<Shared>,
    driver: JoinHandle<()>,
}

impl AttachController {
    /// Creates a controller driving `debugger`. Must be called inside a tokio
    /// runtime.
    pub fn new(debugger: Arc<dyn Debugger>) -> Arc<Self> {
        let inner = Inner::new();
        let (status, _) = watch::channel(inner.status());
        let (faults, _) = broadcast::channel(16);
        let shared = Arc::new(Shared {
            debugger,
            inner: Mutex::new(inner),
            wake: Notify::new(),
            status,
            faults,
        });
        let driver = tokio::spawn(drive(Arc::clone(&shared)));
        Arc::new(AttachController { shared, driver })
    }

    /// `Unknown -> Temporary`. After the user rejected a session this is the
    /// explicit new grant that allows attaching again. Returns whether the
    /// permission changed.
    pub fn grant_temporary(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.permission == Permission::Temporary {
            return false;
        }
        info!(from = ?inner.permission, "attach permission granted");
        inner.permission = Permission::Temporary;
        inner.blocked = false;
        self.shared.publish(&inner);
        drop(inner);
        self.shared.wake.notify_one();
        true
    }

    pub fn permission(&self) -> Permission {
        self.shared.inner.lock().permission
    }

    pub fn increment(&self, interest: Interest) {
        let mut inner = self.shared.inner.lock();
        let count = &mut inner.counts[interest.index()];
        *count += 1;
        if *count == 1 {
            inner.blocked = false;
        }
        self.shared.publish(&inner);
        drop(inner);
        self.shared.wake.notify_one();
    }

    /// # Panics
    ///
    /// Panics if the counter is already zero.
    pub fn decrement(&self, interest: Interest) {
        let mut inner = self.shared.inner.lock();
        let count = &mut inner.counts[interest.index()];
        assert!(*count > 0, "{interest:?} interest decremented below zero");
        *count -= 1;
        self.shared.publish(&inner);
        drop(inner);
        self.shared.wake.notify_one();
    }

    /// Increments `interest` until the returned guard is dropped.
    pub fn acquire(self: &Arc<Self>, interest: Interest) -> InterestGuard {
        self.increment(interest);
        InterestGuard {
            controller: Arc::clone(self),
            interest,
        }
    }

    /// Forwards a protocol command on the current session.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, DevtoolsError> {
        let attached = self.shared.inner.lock().state == AttachState::Attached;
        if !attached {
            return Err(DevtoolsError::NotAttached);
        }
        self.shared.debugger.send_command(method, params).await
    }

    pub fn status(&self) -> AttachStatus {
        self.shared.inner.lock().status()
    }

    /// Watches every status change.
    pub fn watch_status(&self) -> watch::Receiver<AttachStatus> {
        self.shared.status.subscribe()
    }

    /// Failed attaches and enables.
    pub fn faults(&self) -> broadcast::Receiver<Fault> {
        self.shared.faults.subscribe()
    }

    /// Raw debugger notifications, for the event source.
    pub(crate) fn notifications(&self) -> broadcast::Receiver<DebuggerNotification> {
        self.shared.debugger.subscribe()
    }
}

impl Drop for AttachController {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Holds one unit of interest; dropping it gives the unit back.
pub struct InterestGuard {
    controller: Arc<AttachController>,
    interest: Interest,
}

impl InterestGuard {
    pub fn interest(&self) -> Interest {
        self.interest
    }
}

impl std::fmt::Debug for InterestGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterestGuard")
            .field("interest", &self.interest)
            .finish()
    }
}

impl Drop for InterestGuard {
    fn drop(&mut self) {
        self.controller.decrement(self.interest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::InMemoryDebugger;
    use std::time::Duration;

    async fn wait_for(controller: &AttachController, check: impl Fn(&AttachStatus) -> bool) {
        let mut rx = controller.watch_status();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| check(s)))
            .await
            .expect("status never reached")
            .expect("controller dropped");
    }

    fn web_audio_enabled(status: &AttachStatus) -> bool {
        status.state == AttachState::Attached && status.web_audio == DomainState::Enabled
    }

    #[tokio::test]
    async fn interest_without_permission_never_attaches() {
        let debugger = Arc::new(InMemoryDebugger::new());
        let controller = AttachController::new(debugger.clone());

        let _attach = controller.acquire(Interest::Attach);
        let _events = controller.acquire(Interest::Events(Domain::WebAudio));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(debugger.attach_count(), 0);
        assert_eq!(controller.status().state, AttachState::Detached);
        assert_eq!(controller.status().attach_interest, 1);
    }

    #[tokio::test]
    async fn grant_attaches_and_last_release_detaches() {
        let debugger = Arc::new(InMemoryDebugger::new());
        let controller = AttachController::new(debugger.clone());

        let attach = controller.acquire(Interest::Attach);
        let events = controller.acquire(Interest::Events(Domain::WebAudio));
        assert!(controller.grant_temporary());
        assert!(!controller.grant_temporary());
        wait_for(&controller, web_audio_enabled).await;
        assert_eq!(controller.status().page, DomainState::Disabled);

        drop(events);
        drop(attach);
        wait_for(&controller, |s| s.state == AttachState::Detached).await;

        assert_eq!(debugger.attach_count(), 1);
        assert_eq!(debugger.detach_count(), 1);
        assert_eq!(
            debugger.command_methods(),
            vec![method::ENABLE, method::DISABLE]
        );
    }

    #[tokio::test]
    async fn user_cancel_rejects_until_regranted() {
        let debugger = Arc::new(InMemoryDebugger::new());
        let controller = AttachController::new(debugger.clone());
        controller.grant_temporary();
        let _attach = controller.acquire(Interest::Attach);
        let _events = controller.acquire(Interest::Events(Domain::WebAudio));
        wait_for(&controller, web_audio_enabled).await;

        debugger.user_detach();
        wait_for(&controller, |s| s.permission == Permission::Rejected).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.status().state, AttachState::Detached);
        assert_eq!(debugger.attach_count(), 1);

        assert!(controller.grant_temporary());
        wait_for(&controller, web_audio_enabled).await;
        assert_eq!(debugger.attach_count(), 2);
    }

    #[tokio::test]
    async fn failed_attach_is_reported_and_retried_on_new_interest() {
        let debugger = Arc::new(InMemoryDebugger::new());
        let controller = AttachController::new(debugger.clone());
        let mut faults = controller.faults();
        debugger.fail_next_attach(DevtoolsError::Transport("refused".into()));

        controller.grant_temporary();
        let first = controller.acquire(Interest::Attach);
        let fault = tokio::time::timeout(Duration::from_secs(5), faults.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fault.domain, None);
        assert_eq!(fault.error, DevtoolsError::Transport("refused".into()));
        assert_eq!(controller.status().state, AttachState::Detached);

        drop(first);
        let _second = controller.acquire(Interest::Attach);
        wait_for(&controller, |s| s.state == AttachState::Attached).await;
        assert_eq!(debugger.attach_count(), 1);
    }

    #[tokio::test]
    async fn commands_need_an_attached_session() {
        let debugger = Arc::new(InMemoryDebugger::new());
        let controller = AttachController::new(debugger.clone());
        assert_eq!(
            controller
                .send_command("HeapProfiler.collectGarbage", json!({}))
                .await,
            Err(DevtoolsError::NotAttached)
        );

        controller.grant_temporary();
        let _attach = controller.acquire(Interest::Attach);
        wait_for(&controller, |s| s.state == AttachState::Attached).await;
        controller
            .send_command("HeapProfiler.collectGarbage", json!({}))
            .await
            .unwrap();
        assert_eq!(debugger.command_methods(), vec!["HeapProfiler.collectGarbage"]);
    }

    #[tokio::test]
    #[should_panic(expected = "decremented below zero")]
    async fn decrement_below_zero_panics() {
        let controller = AttachController::new(Arc::new(InMemoryDebugger::new()));
        controller.decrement(Interest::Events(Domain::Page));
    }

    #[test]
    fn domains_match_their_methods() {
        assert_eq!(Domain::of_method("WebAudio.contextCreated"), Some(Domain::WebAudio));
        assert_eq!(Domain::of_method("Page.frameNavigated"), Some(Domain::Page));
        assert_eq!(Domain::of_method("Inspector.detached"), None);
        assert_eq!(Domain::WebAudio.enable_method(), "WebAudio.enable");
    }
}
