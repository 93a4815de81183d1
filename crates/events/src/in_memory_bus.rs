//! Single-process bus: fan-out over `std::sync::mpsc` channels.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// A publisher panicked while holding the subscriber list.
    Poisoned,
}

type Filter<M> = Box<dyn Fn(&M) -> bool + Send + Sync>;

struct Subscriber<M> {
    filter: Option<Filter<M>>,
    sender: mpsc::Sender<M>,
}

/// Broadcast bus for tests and single-process deployments.
///
/// Disconnected subscribers are dropped on the next publish.
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<Subscriber<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the messages `filter` accepts, e.g. one learner's envelopes.
    pub fn subscribe_where<F>(&self, filter: F) -> Subscription<M>
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        self.register(Some(Box::new(filter)))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }

    fn register(&self, filter: Option<Filter<M>>) -> Subscription<M> {
        let (sender, receiver) = mpsc::channel();
        // On a poisoned list the subscription is valid but never receives.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(Subscriber { filter, sender });
        }
        Subscription::new(receiver)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|sub| match &sub.filter {
            Some(accepts) if !accepts(&message) => true,
            _ => sub.sender.send(message.clone()).is_ok(),
        });
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        self.register(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_each_message() {
        let bus = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish("streak.advanced").unwrap();

        assert_eq!(a.drain(), vec!["streak.advanced"]);
        assert_eq!(b.drain(), vec!["streak.advanced"]);
    }

    #[test]
    fn filtered_subscribers_only_see_accepted_messages() {
        let bus = InMemoryEventBus::new();
        let all = bus.subscribe();
        let grants = bus.subscribe_where(|m: &&str| m.starts_with("achievement."));

        bus.publish("lesson.recorded").unwrap();
        bus.publish("achievement.granted").unwrap();

        assert_eq!(all.drain().len(), 2);
        assert_eq!(grants.drain(), vec!["achievement.granted"]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = InMemoryEventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(1u32).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), 1);
    }
}
