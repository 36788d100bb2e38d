use std::collections::HashMap;

use shared::{
    domain::{is_chatroom_id, ContactRole, Participant},
    protocol::{ContactRecord, VERIFY_FLAG_PUBLIC},
};
use tokio::sync::RwLock;

/// In-memory cache of known participants, keyed by identifier. A present
/// identifier counts as resolved; lookups for anything else return `None`
/// until a batch fetch merges it. Exactly one task mutates the directory;
/// each individual operation is atomic with respect to concurrent readers,
/// with no cross-call consistency guarantee.
#[derive(Default)]
pub struct ContactDirectory {
    contacts: RwLock<HashMap<String, Participant>>,
    me_id: RwLock<Option<String>>,
}

fn role_for(record: &ContactRecord) -> ContactRole {
    if is_chatroom_id(&record.user_name) {
        let owner = (!record.chat_room_owner.is_empty()).then(|| record.chat_room_owner.clone());
        ContactRole::Chatroom { owner }
    } else if record.verify_flag & VERIFY_FLAG_PUBLIC != 0 {
        ContactRole::PublicAccount
    } else {
        ContactRole::Friend
    }
}

fn participant_from(record: &ContactRecord, role: ContactRole) -> Participant {
    Participant {
        id: record.user_name.clone(),
        display_name: record.nick_name.clone(),
        remark: record.remark_name.clone(),
        avatar_url: record.head_img_url.clone(),
        role,
    }
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the session owner. Called once during initialization.
    pub async fn set_me(&self, record: &ContactRecord) -> Participant {
        let me = participant_from(record, ContactRole::Me);
        *self.me_id.write().await = Some(me.id.clone());
        self.merge(me.clone()).await;
        me
    }

    pub async fn me(&self) -> Option<Participant> {
        let id = self.me_id.read().await.clone()?;
        self.lookup(&id).await
    }

    /// Upsert; the latest merge wins for every field.
    pub async fn merge(&self, participant: Participant) {
        self.contacts
            .write()
            .await
            .insert(participant.id.clone(), participant);
    }

    /// Merges a wire record, inferring its role from the identifier shape
    /// and verify flag. A chatroom's member list merges alongside it.
    pub async fn merge_record(&self, record: &ContactRecord) {
        // A delta may re-deliver the session owner; the owner role sticks.
        if self.me_id.read().await.as_deref() == Some(record.user_name.as_str()) {
            self.merge(participant_from(record, ContactRole::Me)).await;
            return;
        }
        let role = role_for(record);
        if role.is_chatroom() {
            for member in &record.member_list {
                self.merge_member(member).await;
            }
        }
        self.merge(participant_from(record, role)).await;
    }

    /// Merges a record known from context to be a chatroom member. An entry
    /// already resolved under a stronger role keeps that role.
    pub async fn merge_member(&self, record: &ContactRecord) {
        let role = match self.lookup(&record.user_name).await {
            Some(existing) if existing.role != ContactRole::ChatroomMember => existing.role,
            _ => ContactRole::ChatroomMember,
        };
        self.merge(participant_from(record, role)).await;
    }

    /// Removes an identifier. The session owner never leaves the directory.
    pub async fn remove(&self, id: &str) {
        if self.me_id.read().await.as_deref() == Some(id) {
            return;
        }
        self.contacts.write().await.remove(id);
    }

    pub async fn lookup(&self, id: &str) -> Option<Participant> {
        self.contacts.read().await.get(id).cloned()
    }

    pub async fn friends(&self) -> Vec<Participant> {
        self.of_role(|role| matches!(role, ContactRole::Friend)).await
    }

    pub async fn public_accounts(&self) -> Vec<Participant> {
        self.of_role(|role| matches!(role, ContactRole::PublicAccount))
            .await
    }

    pub async fn chatrooms(&self) -> Vec<Participant> {
        self.of_role(ContactRole::is_chatroom).await
    }

    async fn of_role(&self, matches: impl Fn(&ContactRole) -> bool) -> Vec<Participant> {
        self.contacts
            .read()
            .await
            .values()
            .filter(|participant| matches(&participant.role))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
