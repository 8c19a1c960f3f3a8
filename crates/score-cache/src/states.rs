use crate::types::CacheState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable map of score key to [`CacheState`].
///
/// Every transition is published to subscribers; transitions not allowed by
/// [`CacheState::can_follow`] are rejected.
#[derive(Clone)]
pub struct CacheStates {
    tx: Arc<watch::Sender<HashMap<String, CacheState>>>,
}

impl Default for CacheStates {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStates {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HashMap::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self, score_key: &str) -> Option<CacheState> {
        self.tx.borrow().get(score_key).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, CacheState> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, CacheState>> {
        self.tx.subscribe()
    }

    pub(crate) fn transition(&self, score_key: &str, next: CacheState) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|states| {
            let previous = states.get(score_key).copied();
            if CacheState::can_follow(previous, next) {
                states.insert(score_key.to_string(), next);
                applied = true;
            } else {
                log::warn!(
                    "Ignoring cache state change {:?} -> {:?} for {}",
                    previous,
                    next,
                    score_key
                );
            }
            applied
        });
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let states = CacheStates::new();
        assert_eq!(states.get("s"), None);
        assert!(!states.transition("s", CacheState::Success));
        assert!(states.transition("s", CacheState::Working));
        assert!(!states.transition("s", CacheState::Working));
        assert!(states.transition("s", CacheState::Failed));
        assert!(states.transition("s", CacheState::Working));
        assert!(states.transition("s", CacheState::Success));
        assert_eq!(states.get("s"), Some(CacheState::Success));
    }

    #[test]
    fn test_subscribers_see_transitions() {
        let states = CacheStates::new();
        let mut rx = states.subscribe();
        states.transition("s", CacheState::Working);
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(
            rx.borrow_and_update().get("s").copied(),
            Some(CacheState::Working)
        );
    }
}
