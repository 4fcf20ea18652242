//! Stable stream identities.

use crate::record::StreamId;
use std::collections::HashMap;
use tracing::trace;

/// Assigns identities to stream URLs.
///
/// The first sighting of a URL allocates the next id; every later sighting
/// returns the same id. Mappings are never removed or repointed, so an id
/// refers to one URL for the lifetime of the registry even if the stream
/// drops out of every feed and comes back.
#[derive(Debug, Default)]
pub struct StreamIdentityRegistry {
    ids: HashMap<String, StreamId>,
    last: u64,
}

impl StreamIdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or allocate the identity for `url`.
    pub fn assign(&mut self, url: &str) -> StreamId {
        if let Some(&id) = self.ids.get(url) {
            return id;
        }
        self.last += 1;
        let id = StreamId(self.last);
        self.ids.insert(url.to_string(), id);
        trace!(%url, %id, "allocated stream identity");
        id
    }

    /// Identity previously assigned to `url`, if any.
    pub fn get(&self, url: &str) -> Option<StreamId> {
        self.ids.get(url).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_is_stable() {
        let mut registry = StreamIdentityRegistry::new();
        let a = registry.assign("https://x/1");
        let b = registry.assign("https://x/2");

        assert_ne!(a, b);
        assert_eq!(registry.assign("https://x/1"), a);
        assert_eq!(registry.assign("https://x/2"), b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ids_increase_monotonically() {
        let mut registry = StreamIdentityRegistry::new();
        let ids: Vec<_> = (0..5)
            .map(|i| registry.assign(&format!("https://x/{}", i)))
            .collect();

        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn get_does_not_allocate() {
        let mut registry = StreamIdentityRegistry::new();
        assert_eq!(registry.get("https://x/1"), None);
        assert!(registry.is_empty());

        let id = registry.assign("https://x/1");
        assert_eq!(registry.get("https://x/1"), Some(id));
    }
}
