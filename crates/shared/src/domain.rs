use serde::{Deserialize, Serialize};

/// Chatroom identifiers carry a double `@` prefix on the wire.
pub fn is_chatroom_id(id: &str) -> bool {
    id.starts_with("@@")
}

/// A collapsed identifier is a chatroom placeholder delivered without full
/// membership data; it needs a follow-up batch resolve.
pub fn is_collapsed_id(id: &str) -> bool {
    id.starts_with('@')
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRole {
    Me,
    Friend,
    PublicAccount,
    Chatroom { owner: Option<String> },
    ChatroomMember,
}

impl ContactRole {
    pub fn is_chatroom(&self) -> bool {
        matches!(self, ContactRole::Chatroom { .. })
    }
}

/// A resolved directory entry. The identifier is globally unique and stable
/// for the lifetime of the session; every other field is overwritten by the
/// latest directory merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub remark: String,
    pub avatar_url: String,
    pub role: ContactRole,
}
