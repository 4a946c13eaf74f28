//! Detail panel for the selected account or contact.
//!
//! The panel subscribes to selections when connected, runs them through a
//! [`SelectionGate`], fetches on change and keeps the projection of the
//! latest record. It never talks to the browser directly.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

use crate::channel::{MessageChannel, Scope, Subscription, Topic};
use crate::config::SyncConfig;
use crate::error::{BoxError, SyncError};
use crate::event_loop::EventLoop;
use crate::gate::{FetchRequest, ResponseOutcome, SelectionGate};
use crate::notify::{Notification, Notifier};
use crate::projection::{project, FieldValue, LogicalField, Record, RecordProjection};
use crate::resolver::Selection;
use crate::source::RecordSource;
use crate::tree::Kind;

#[derive(Default)]
struct SummaryState {
    gate: SelectionGate,
    /// Last selection received, whether or not it caused a fetch.
    current: Option<Selection>,
    projection: Option<RecordProjection>,
    fetches: usize,
}

struct SummaryCore {
    state: RefCell<SummaryState>,
    records: Rc<dyn RecordSource>,
    notifier: Rc<dyn Notifier>,
    event_loop: EventLoop,
    fetch_timeout_ms: u64,
}

impl SummaryCore {
    fn on_message(self: &Rc<Self>, incoming: &Selection) {
        let request = {
            let mut state = self.state.borrow_mut();
            state.current = Some(incoming.clone());
            let request = state.gate.on_message(incoming.clone());
            if request.is_some() {
                state.projection = None;
                state.fetches += 1;
            }
            request
        };
        if let Some(request) = request {
            self.issue(request);
        }
    }

    fn issue(self: &Rc<Self>, request: FetchRequest) {
        let core = Rc::clone(self);
        self.event_loop.spawn(async move {
            let Selection { id, kind } = request.selection.clone();
            let limit = Duration::from_millis(core.fetch_timeout_ms);
            let fetched = tokio::time::timeout(limit, core.records.fetch(&id, kind)).await;
            let result = match fetched {
                Ok(result) => result,
                Err(_) => Err(SyncError::FetchTimeout {
                    id,
                    kind,
                    timeout_ms: core.fetch_timeout_ms,
                }),
            };
            core.complete(request, result);
        });
    }

    fn complete(&self, request: FetchRequest, result: Result<Record, SyncError>) {
        let kind = request.selection.kind;
        let outcome = {
            let mut state = self.state.borrow_mut();
            let outcome = state.gate.on_response(request.respond(result));
            match &outcome {
                ResponseOutcome::Loaded => {
                    let projection = state.gate.data().map(|record| project(record, kind));
                    state.projection = projection;
                }
                ResponseOutcome::Failed(_) => state.projection = None,
                ResponseOutcome::Discarded => {}
            }
            outcome
        };

        if let ResponseOutcome::Failed(message) = outcome {
            warn!(%message, "record fetch failed");
            self.notifier.notify(Notification::error(message));
        }
    }
}

pub struct SummaryPanel {
    core: Rc<SummaryCore>,
    channel: MessageChannel<Selection>,
    topic: Topic,
    subscription: Option<Subscription>,
}

impl SummaryPanel {
    pub fn new(
        channel: MessageChannel<Selection>,
        event_loop: &EventLoop,
        records: Rc<dyn RecordSource>,
        notifier: Rc<dyn Notifier>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            core: Rc::new(SummaryCore {
                state: RefCell::new(SummaryState::default()),
                records,
                notifier,
                event_loop: event_loop.clone(),
                fetch_timeout_ms: config.fetch_timeout_ms,
            }),
            channel,
            topic: config.topic(),
            subscription: None,
        }
    }

    /// Subscribes application-wide. Does nothing when already subscribed.
    pub fn connect(&mut self) {
        if self.subscription.is_some() {
            return;
        }

        let core: Weak<SummaryCore> = Rc::downgrade(&self.core);
        let subscription = self.channel.subscribe(
            Scope::Application,
            self.topic.clone(),
            move |selection: &Selection| -> Result<(), BoxError> {
                if let Some(core) = core.upgrade() {
                    core.on_message(selection);
                }
                Ok(())
            },
        );
        debug!(subscription = %subscription.id(), "summary connected");
        self.subscription = Some(subscription);
    }

    pub fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.channel.unsubscribe(subscription);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.core.state.borrow().current.clone()
    }

    pub fn projection(&self) -> Option<RecordProjection> {
        self.core.state.borrow().projection.clone()
    }

    pub fn field(&self, field: LogicalField) -> FieldValue {
        self.core
            .state
            .borrow()
            .projection
            .as_ref()
            .map(|p| p.get(field).clone())
            .unwrap_or(FieldValue::Absent)
    }

    pub fn error(&self) -> Option<String> {
        self.core.state.borrow().gate.error().map(|e| e.join(", "))
    }

    pub fn is_loading(&self) -> bool {
        self.core.state.borrow().gate.is_loading()
    }

    pub fn type_is_contact(&self) -> bool {
        self.selection().map(|s| s.kind) == Some(Kind::Contact)
    }

    /// Fetches issued since the panel was created.
    pub fn fetch_count(&self) -> usize {
        self.core.state.borrow().fetches
    }
}

impl Drop for SummaryPanel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
