//! In-memory registry of active channel pairs, keyed by normalized language.
//!
//! Writers only ever add, overwrite or remove whole entries. A published
//! `ChannelPair` is never mutated in place.

use crate::gateway::{ChannelHandle, ChannelId};
use crate::language::ChannelSide;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

/// The two channels that relay messages for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    /// Members read and write the target language here
    pub translation_channel: ChannelHandle,
    /// Members read and write the standard language here
    pub standard_channel: ChannelHandle,
}

impl ChannelPair {
    pub fn new(standard_channel: ChannelHandle, translation_channel: ChannelHandle) -> Self {
        Self {
            translation_channel,
            standard_channel,
        }
    }

    pub fn contains(&self, channel_id: ChannelId) -> bool {
        self.side_of(channel_id).is_some()
    }

    pub fn side_of(&self, channel_id: ChannelId) -> Option<ChannelSide> {
        if channel_id == self.standard_channel.id {
            Some(ChannelSide::Standard)
        } else if channel_id == self.translation_channel.id {
            Some(ChannelSide::Translation)
        } else {
            None
        }
    }

    pub fn channel(&self, side: ChannelSide) -> &ChannelHandle {
        match side {
            ChannelSide::Standard => &self.standard_channel,
            ChannelSide::Translation => &self.translation_channel,
        }
    }
}

/// Outcome of [`ChannelPairRegistry::insert_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// The proposed pair is now the registry's value
    Inserted(ChannelPair),
    /// Another pair already held the key; it is returned unchanged
    Existing(ChannelPair),
}

impl Insertion {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Insertion::Inserted(_))
    }

    pub fn pair(&self) -> &ChannelPair {
        match self {
            Insertion::Inserted(pair) | Insertion::Existing(pair) => pair,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChannelPairRegistry {
    pairs: DashMap<String, ChannelPair>,
}

impl ChannelPairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<ChannelPair> {
        self.pairs.get(key).map(|entry| entry.value().clone())
    }

    /// Atomically publish `pair` under `key` unless the key is already taken.
    pub fn insert_if_absent(&self, key: &str, pair: ChannelPair) -> Insertion {
        match self.pairs.entry(key.to_string()) {
            Entry::Occupied(occupied) => Insertion::Existing(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(pair.clone());
                Insertion::Inserted(pair)
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<ChannelPair> {
        self.pairs.remove(key).map(|(_, pair)| pair)
    }

    /// Drop the entry whose pair contains `channel_id`. Returns the removed key.
    pub fn remove_by_channel_id(&self, channel_id: ChannelId) -> Option<String> {
        // Collect first: removing while iterating would deadlock on the shard lock.
        let key = self
            .pairs
            .iter()
            .find(|entry| entry.value().contains(channel_id))
            .map(|entry| entry.key().clone())?;

        self.pairs
            .remove_if(&key, |_, pair| pair.contains(channel_id))
            .map(|(key, _)| key)
    }

    /// Insert or overwrite every scanned pair. Keys missing from the scan are kept.
    pub fn rebuild_from_scan(&self, scanned: HashMap<String, ChannelPair>) {
        for (key, pair) in scanned {
            debug!(lang = %key, "Adding pair from guild scan");
            self.pairs.insert(key, pair);
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.pairs.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}
