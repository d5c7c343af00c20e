use super::dedupe::dedupe;
use crate::db::models::{DayKey, Message};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All messages of one local calendar day, oldest first.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConversationGroup {
    pub key: DayKey,
    pub messages: Vec<Message>,
}

/// Partitions the log into per-day conversations, most recent day first.
/// Each day is sorted by `created_at` (ties keep log order) and deduplicated.
pub fn group(messages: &[Message]) -> Vec<ConversationGroup> {
    let mut buckets: BTreeMap<DayKey, Vec<Message>> = BTreeMap::new();
    for message in messages {
        buckets
            .entry(message.day_key())
            .or_default()
            .push(message.clone());
    }

    buckets
        .into_iter()
        .rev()
        .map(|(key, mut day)| {
            day.sort_by_key(|m| m.created_at);
            ConversationGroup {
                key,
                messages: dedupe(&day),
            }
        })
        .collect()
}

/// Keeps `selected` if that day still has a conversation, otherwise points
/// at the most recent one. With no conversations at all, `selected` stays.
pub fn resolve_selection(selected: DayKey, groups: &[ConversationGroup]) -> DayKey {
    if groups.iter().any(|g| g.key == selected) {
        return selected;
    }
    groups.first().map(|g| g.key).unwrap_or(selected)
}
