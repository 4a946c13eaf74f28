//! Scoped publish/subscribe channel.
//!
//! `publish` never calls subscribers inline. It records the subscribers that
//! are live at that moment and queues an envelope; the [`EventLoop`] delivers
//! it on a later turn, calling callbacks in subscription order. A callback may
//! publish, subscribe or unsubscribe while being delivered to.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{BoxError, SyncError};
use crate::event_loop::{EventLoop, Pump};

/// Delivery breadth of a subscription, or the region a publish originates in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Receives publishes from every region of the application.
    Application,
    /// Receives only publishes originating in the named region.
    Region(String),
}

impl Scope {
    /// Whether a subscriber with this scope receives a publish from `origin`.
    pub fn accepts(&self, origin: &Scope) -> bool {
        match self {
            Scope::Application => true,
            Scope::Region(name) => matches!(origin, Scope::Region(o) if o == name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic(Cow<'static, str>);

impl Topic {
    pub const fn from_static(name: &'static str) -> Self {
        Topic(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Topic(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Topic the account browser publishes selections on.
pub const ACCOUNTS_TOPIC: Topic = Topic::from_static("AccountsMessageChannel");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type Callback<M> = Rc<dyn Fn(&M) -> Result<(), BoxError>>;

struct Subscriber<M> {
    id: SubscriptionId,
    scope: Scope,
    topic: Topic,
    callback: Callback<M>,
}

struct Envelope<M> {
    topic: Topic,
    recipients: Vec<SubscriptionId>,
    message: M,
}

trait Release {
    fn release(&self, id: SubscriptionId) -> bool;
}

/// Handle for one registered callback. The channel only reaches the callback
/// while this handle is alive; dropping it releases the subscription.
#[must_use = "dropping a Subscription releases it immediately"]
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    registry: Weak<dyn Release>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    fn release(&self) -> bool {
        self.registry
            .upgrade()
            .map(|r| r.release(self.id))
            .unwrap_or(false)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

struct ChannelShared<M> {
    subscribers: RefCell<Vec<Subscriber<M>>>,
    tx: mpsc::UnboundedSender<Envelope<M>>,
    rx: RefCell<mpsc::UnboundedReceiver<Envelope<M>>>,
    queued: Cell<usize>,
    failures: Cell<u64>,
}

impl<M> ChannelShared<M> {
    fn is_live(&self, id: SubscriptionId) -> bool {
        self.subscribers.borrow().iter().any(|s| s.id == id)
    }

    fn deliver(&self, envelope: Envelope<M>) {
        let targets: Vec<(SubscriptionId, Callback<M>)> = {
            let subscribers = self.subscribers.borrow();
            envelope
                .recipients
                .iter()
                .filter_map(|id| {
                    subscribers
                        .iter()
                        .find(|s| s.id == *id)
                        .map(|s| (s.id, Rc::clone(&s.callback)))
                })
                .collect()
        };

        for (id, callback) in targets {
            // released by an earlier callback of this round
            if !self.is_live(id) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&envelope.message)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            self.failures.set(self.failures.get() + 1);
            let err = SyncError::ChannelDelivery {
                subscription: id.to_string(),
                topic: envelope.topic.to_string(),
                reason,
            };
            warn!(error = %err, "subscriber failed; continuing delivery");
        }
    }
}

impl<M> Release for ChannelShared<M> {
    fn release(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }
}

impl<M> Pump for ChannelShared<M> {
    fn pump(&self) -> usize {
        let due = self.queued.get();
        let mut delivered = 0;
        while delivered < due {
            let next = self.rx.borrow_mut().try_recv();
            let Ok(envelope) = next else {
                break;
            };
            self.queued.set(self.queued.get().saturating_sub(1));
            delivered += 1;
            self.deliver(envelope);
        }
        delivered
    }

    fn has_pending(&self) -> bool {
        self.queued.get() > 0
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// A pub/sub bus for messages of type `M`, constructed explicitly and passed
/// to every component that uses it. Clones share the same subscribers.
pub struct MessageChannel<M> {
    shared: Rc<ChannelShared<M>>,
}

impl<M> Clone for MessageChannel<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<M: 'static> MessageChannel<M> {
    pub fn new(event_loop: &EventLoop) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Rc::new(ChannelShared {
            subscribers: RefCell::new(Vec::new()),
            tx,
            rx: RefCell::new(rx),
            queued: Cell::new(0),
            failures: Cell::new(0),
        });
        let pump: Rc<dyn Pump> = shared.clone();
        event_loop.register(Rc::downgrade(&pump));

        Self { shared }
    }

    /// Queues `message` for every subscriber of `topic` whose scope accepts
    /// `origin`. Returns how many subscribers it was queued for.
    pub fn publish(&self, origin: &Scope, topic: &Topic, message: M) -> usize {
        let recipients: Vec<SubscriptionId> = self
            .shared
            .subscribers
            .borrow()
            .iter()
            .filter(|s| s.topic == *topic && s.scope.accepts(origin))
            .map(|s| s.id)
            .collect();

        if recipients.is_empty() {
            trace!(%topic, "publish without subscribers dropped");
            return 0;
        }

        let count = recipients.len();
        let envelope = Envelope {
            topic: topic.clone(),
            recipients,
            message,
        };
        if self.shared.tx.send(envelope).is_ok() {
            self.shared.queued.set(self.shared.queued.get() + 1);
        }
        debug!(%topic, recipients = count, "message queued");
        count
    }

    pub fn subscribe<F>(&self, scope: Scope, topic: Topic, callback: F) -> Subscription
    where
        F: Fn(&M) -> Result<(), BoxError> + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.shared.subscribers.borrow_mut().push(Subscriber {
            id,
            scope,
            topic: topic.clone(),
            callback: Rc::new(callback),
        });
        debug!(%topic, subscription = %id, "subscribed");

        let registry: Rc<dyn Release> = self.shared.clone();
        Subscription {
            id,
            topic,
            registry: Rc::downgrade(&registry),
        }
    }

    /// Releases `subscription`. Returns false if it was no longer registered.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let released = subscription.release();
        debug!(subscription = %subscription.id, released, "unsubscribed");
        released
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.shared
            .subscribers
            .borrow()
            .iter()
            .filter(|s| s.topic == *topic)
            .count()
    }

    /// Messages queued and not yet delivered.
    pub fn pending(&self) -> usize {
        self.shared.queued.get()
    }

    /// Subscriber callbacks that failed since the channel was created.
    pub fn delivery_failures(&self) -> u64 {
        self.shared.failures.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Selection;
    use crate::tree::Kind;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&Selection) -> Result<(), BoxError>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |s: &Selection| {
            sink.borrow_mut().push(s.id.clone());
            Ok(())
        })
    }

    #[test]
    fn test_publish_is_deferred_to_next_turn() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (seen, cb) = recorder();
        let _sub = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb);

        let queued = channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        assert_eq!(queued, 1);
        assert!(seen.borrow().is_empty());
        assert_eq!(channel.pending(), 1);

        assert_eq!(event_loop.turn(), 1);
        assert_eq!(*seen.borrow(), vec!["A1"]);
        assert_eq!(channel.pending(), 0);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let event_loop = EventLoop::new();
        let channel: MessageChannel<Selection> = MessageChannel::new(&event_loop);

        let queued = channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        assert_eq!(queued, 0);
        assert_eq!(event_loop.turn(), 0);
    }

    #[test]
    fn test_callbacks_run_in_subscription_order() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let order = Rc::new(RefCell::new(Vec::new()));

        let subs: Vec<Subscription> = (0..3)
            .map(|n| {
                let order = order.clone();
                channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, move |_: &Selection| {
                    order.borrow_mut().push(n);
                    Ok(())
                })
            })
            .collect();

        channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        event_loop.turn();

        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);

        let _failing = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, |_: &Selection| {
            Err("detail panel exploded".into())
        });
        let _panicking = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, |_: &Selection| {
            panic!("render failed")
        });
        let (seen, cb) = recorder();
        let _healthy = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb);

        channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("C1", Kind::Contact),
        );
        event_loop.turn();

        assert_eq!(*seen.borrow(), vec!["C1"]);
        assert_eq!(channel.delivery_failures(), 2);
    }

    #[test]
    fn test_two_subscribers_receive_identical_message() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (first, cb1) = recorder();
        let (second, cb2) = recorder();
        let _s1 = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb1);
        let _s2 = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb2);

        channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        event_loop.turn();

        assert_eq!(*first.borrow(), vec!["A1"]);
        assert_eq!(*second.borrow(), vec!["A1"]);
    }

    #[test]
    fn test_unsubscribed_callback_is_not_invoked() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (seen, cb) = recorder();
        let sub = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb);

        assert!(channel.unsubscribe(sub));
        channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        event_loop.turn();

        assert!(seen.borrow().is_empty());
        assert_eq!(channel.subscriber_count(&ACCOUNTS_TOPIC), 0);
    }

    #[test]
    fn test_release_between_publish_and_delivery() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (seen, cb) = recorder();
        let sub = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb);

        channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        drop(sub);
        event_loop.turn();

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_clones_share_subscribers() {
        let event_loop = EventLoop::new();
        let channel: MessageChannel<Selection> = MessageChannel::new(&event_loop);
        let sub = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, |_| Ok(()));
        let other = channel.clone();
        drop(channel);

        assert_eq!(other.subscriber_count(&ACCOUNTS_TOPIC), 1);
        assert!(other.unsubscribe(sub));
        assert_eq!(other.subscriber_count(&ACCOUNTS_TOPIC), 0);
    }

    #[test]
    fn test_release_after_channel_dropped_is_noop() {
        let event_loop = EventLoop::new();
        let channel: MessageChannel<Selection> = MessageChannel::new(&event_loop);
        let sub = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, |_| Ok(()));
        drop(channel);

        drop(sub);
        assert_eq!(event_loop.turn(), 0);
    }

    #[test]
    fn test_region_scope_filters_origin() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (app_seen, app_cb) = recorder();
        let (sidebar_seen, sidebar_cb) = recorder();
        let _app = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, app_cb);
        let _sidebar = channel.subscribe(
            Scope::Region("sidebar".into()),
            ACCOUNTS_TOPIC,
            sidebar_cb,
        );

        channel.publish(
            &Scope::Region("main".into()),
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        channel.publish(
            &Scope::Region("sidebar".into()),
            &ACCOUNTS_TOPIC,
            Selection::new("A2", Kind::Account),
        );
        event_loop.turn();

        assert_eq!(*app_seen.borrow(), vec!["A1", "A2"]);
        assert_eq!(*sidebar_seen.borrow(), vec!["A2"]);
    }

    #[test]
    fn test_topics_are_isolated() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (seen, cb) = recorder();
        let _sub = channel.subscribe(Scope::Application, Topic::new("Opportunities"), cb);

        let queued = channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        event_loop.turn();

        assert_eq!(queued, 0);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_publish_from_callback_is_queued_for_a_later_turn() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (seen, cb) = recorder();
        let _sink = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb);

        let relay = channel.clone();
        let _echo = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, move |s: &Selection| {
            if s.kind == Kind::Contact {
                relay.publish(
                    &Scope::Application,
                    &ACCOUNTS_TOPIC,
                    Selection::new("A1", Kind::Account),
                );
            }
            Ok(())
        });

        channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("C1", Kind::Contact),
        );

        assert_eq!(event_loop.turn(), 1);
        assert_eq!(*seen.borrow(), vec!["C1"]);
        assert_eq!(channel.pending(), 1);

        assert_eq!(event_loop.turn(), 1);
        assert_eq!(*seen.borrow(), vec!["C1", "A1"]);
    }

    #[test]
    fn test_callback_releasing_a_later_subscriber() {
        let event_loop = EventLoop::new();
        let channel = MessageChannel::new(&event_loop);
        let (seen, cb) = recorder();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let slot = victim.clone();
        let _first = channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, move |_: &Selection| {
            slot.borrow_mut().take();
            Ok(())
        });
        *victim.borrow_mut() = Some(channel.subscribe(Scope::Application, ACCOUNTS_TOPIC, cb));

        channel.publish(
            &Scope::Application,
            &ACCOUNTS_TOPIC,
            Selection::new("A1", Kind::Account),
        );
        event_loop.turn();

        assert!(seen.borrow().is_empty());
    }
}
