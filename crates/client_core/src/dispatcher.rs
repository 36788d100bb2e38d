use std::sync::Arc;

use anyhow::Result;
use shared::{
    domain::is_collapsed_id,
    protocol::{ContactQuery, MediaVariant, MessageKind, MessageRecord, SyncDelta},
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    directory::ContactDirectory,
    gateway::Gateway,
    resolver::{BatchResolver, BATCH_LIMIT},
    SessionEvent,
};

/// Interprets one long-poll delta: applies directory changes, classifies
/// inbound message records, performs media side-fetches and emits events.
pub struct SyncDispatcher {
    gateway: Arc<dyn Gateway>,
    directory: Arc<ContactDirectory>,
    resolver: BatchResolver,
    events: broadcast::Sender<SessionEvent>,
}

impl SyncDispatcher {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        directory: Arc<ContactDirectory>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let resolver = BatchResolver::new(Arc::clone(&gateway), Arc::clone(&directory));
        Self {
            gateway,
            directory,
            resolver,
            events,
        }
    }

    /// Directory deltas apply before any message dispatch; sender resolution
    /// must observe this cycle's merges and removals.
    pub async fn dispatch(&self, delta: SyncDelta) -> Result<()> {
        for record in &delta.mod_contact_list {
            self.directory.merge_record(record).await;
        }
        for record in &delta.mod_chat_room_member_list {
            self.directory.merge_member(record).await;
        }
        for record in &delta.del_contact_list {
            self.directory.remove(&record.user_name).await;
        }
        for message in delta.add_msg_list {
            self.dispatch_message(message).await?;
        }
        Ok(())
    }

    async fn dispatch_message(&self, message: MessageRecord) -> Result<()> {
        let kind = message.kind();
        debug!("inbound message id={} type={}", message.msg_id, message.msg_type);
        match kind {
            MessageKind::Notify => {
                self.resolve_notify_targets(&message).await?;
                self.emit(SessionEvent::Notify { record: message });
                return Ok(());
            }
            MessageKind::System => {
                self.emit(SessionEvent::System { record: message });
                return Ok(());
            }
            _ => {}
        }

        let container = self.directory.lookup(&message.from_user_name).await;
        let sender = self.directory.lookup(message.sender_id()).await;
        let msg_id = message.msg_id.clone();

        let event = match kind {
            MessageKind::Text => SessionEvent::Text {
                msg_id,
                container,
                sender,
                text: message.body().to_string(),
            },
            MessageKind::Image => SessionEvent::Image {
                msg_id: msg_id.clone(),
                container,
                sender,
                image: self
                    .gateway
                    .fetch_media(&msg_id, MediaVariant::Thumbnail)
                    .await?,
            },
            // An emoji is delivered as an image message, full-size.
            MessageKind::Emoji => SessionEvent::Image {
                msg_id: msg_id.clone(),
                container,
                sender,
                image: self.gateway.fetch_media(&msg_id, MediaVariant::Full).await?,
            },
            MessageKind::Voice => SessionEvent::Voice {
                msg_id: msg_id.clone(),
                container,
                sender,
                audio: self
                    .gateway
                    .fetch_media(&msg_id, MediaVariant::Audio)
                    .await?,
            },
            MessageKind::Video => SessionEvent::Video {
                msg_id: msg_id.clone(),
                container,
                sender,
                thumbnail: self
                    .gateway
                    .fetch_media(&msg_id, MediaVariant::Thumbnail)
                    .await?,
                video: self
                    .gateway
                    .fetch_media(&msg_id, MediaVariant::Video)
                    .await?,
            },
            MessageKind::Card => SessionEvent::Card {
                msg_id,
                container,
                sender,
                recommended_id: message.recommend_info.user_name.clone(),
                display_name: message.recommend_info.nick_name.clone(),
                gender: message.recommend_info.sex,
            },
            _ => SessionEvent::Other {
                msg_id,
                container,
                sender,
            },
        };
        self.emit(event);
        Ok(())
    }

    /// Resolves unresolved collapsed identifiers from a notify target list.
    /// The pending batch flushes at `BATCH_LIMIT` and at end of scan; it is
    /// never carried across message records.
    async fn resolve_notify_targets(&self, message: &MessageRecord) -> Result<()> {
        let mut pending: Vec<ContactQuery> = Vec::new();
        for target in message.status_notify_user_name.split(',') {
            let target = target.trim();
            if target.is_empty() || !is_collapsed_id(target) {
                continue;
            }
            if self.directory.lookup(target).await.is_some() {
                continue;
            }
            pending.push(ContactQuery::bare(target));
            if pending.len() >= BATCH_LIMIT {
                self.resolver.resolve(&pending).await?;
                pending.clear();
            }
        }
        if !pending.is_empty() {
            self.resolver.resolve(&pending).await?;
        }
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
