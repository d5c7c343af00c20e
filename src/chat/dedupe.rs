use crate::db::models::Message;

/// Whether `candidate` repeats `kept`: same role, kind, image and trimmed text.
/// Ids and timestamps are ignored.
pub fn is_repeat(kept: &Message, candidate: &Message) -> bool {
    kept.role == candidate.role
        && kept.kind == candidate.kind
        && kept.image_ref == candidate.image_ref
        && kept.text.trim() == candidate.text.trim()
}

/// Drops each message that repeats the message kept right before it.
/// Repeats with anything in between are kept.
pub fn dedupe(messages: &[Message]) -> Vec<Message> {
    let mut kept: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        if kept.last().is_some_and(|last| is_repeat(last, message)) {
            continue;
        }
        kept.push(message.clone());
    }
    kept
}
