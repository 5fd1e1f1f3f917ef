use crate::models::RefreshState;
use std::sync::{Arc, RwLock};

/// Receives the refresher state after every completed fetch.
pub trait RefreshObserver: Send + Sync {
    fn on_refresh(&self, state: &RefreshState);
}

impl<F> RefreshObserver for F
where
    F: Fn(&RefreshState) + Send + Sync,
{
    fn on_refresh(&self, state: &RefreshState) {
        self(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn RefreshObserver>)>,
}

impl ObserverRegistry {
    pub fn subscribe(&self, observer: Arc<dyn RefreshObserver>) -> SubscriptionId {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let before = inner.observers.len();
        inner.observers.retain(|(existing, _)| *existing != id);
        inner.observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .observers
            .len()
    }

    /// Observers are called outside the lock so they may subscribe or unsubscribe.
    pub fn notify(&self, state: &RefreshState) {
        let observers: Vec<Arc<dyn RefreshObserver>> = {
            let inner = self.inner.read().unwrap_or_else(|p| p.into_inner());
            inner.observers.iter().map(|(_, o)| o.clone()).collect()
        };

        for observer in observers {
            observer.on_refresh(state);
        }
    }
}
