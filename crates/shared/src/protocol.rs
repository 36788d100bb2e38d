use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::is_chatroom_id;

/// Contacts with this bit set in `VerifyFlag` are public accounts.
pub const VERIFY_FLAG_PUBLIC: i64 = 8;

/// Login poll status codes observed on the wire.
pub const LOGIN_CONFIRMED: i64 = 200;
pub const LOGIN_AVATAR: i64 = 201;
pub const LOGIN_PENDING: i64 = 408;

/// Numeric message type tags.
pub const TYPE_TEXT: i64 = 1;
pub const TYPE_IMAGE: i64 = 3;
pub const TYPE_VOICE: i64 = 34;
pub const TYPE_CARD: i64 = 42;
pub const TYPE_VIDEO: i64 = 43;
pub const TYPE_EMOJI: i64 = 47;
pub const TYPE_NOTIFY: i64 = 51;
pub const TYPE_SYSTEM: i64 = 10_000;

/// In chatroom messages the true sender id is prefixed to the body,
/// separated by this delimiter.
pub const SENDER_DELIMITER: &str = ":<br/>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Card,
    Video,
    Emoji,
    Notify,
    System,
    Other,
}

impl MessageKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            TYPE_TEXT => MessageKind::Text,
            TYPE_IMAGE => MessageKind::Image,
            TYPE_VOICE => MessageKind::Voice,
            TYPE_CARD => MessageKind::Card,
            TYPE_VIDEO => MessageKind::Video,
            TYPE_EMOJI => MessageKind::Emoji,
            TYPE_NOTIFY => MessageKind::Notify,
            TYPE_SYSTEM => MessageKind::System,
            _ => MessageKind::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContactRecord {
    pub user_name: String,
    pub nick_name: String,
    pub remark_name: String,
    pub head_img_url: String,
    pub verify_flag: i64,
    pub chat_room_owner: String,
    pub member_list: Vec<ContactRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RecommendInfo {
    pub user_name: String,
    pub nick_name: String,
    pub sex: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MessageRecord {
    pub msg_id: String,
    pub msg_type: i64,
    pub from_user_name: String,
    pub to_user_name: String,
    pub content: String,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub create_time: Option<DateTime<Utc>>,
    pub recommend_info: RecommendInfo,
    pub status_notify_user_name: String,
}

impl MessageRecord {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_code(self.msg_type)
    }

    /// The true sender id. Messages arriving through a chatroom carry the
    /// sending member's id as a structured content prefix; everywhere else
    /// the sender is the source container itself.
    pub fn sender_id(&self) -> &str {
        if is_chatroom_id(&self.from_user_name) {
            if let Some((sender, _)) = self.content.split_once(SENDER_DELIMITER) {
                return sender;
            }
        }
        &self.from_user_name
    }

    /// The message body with any sender prefix stripped.
    pub fn body(&self) -> &str {
        if is_chatroom_id(&self.from_user_name) {
            if let Some((_, body)) = self.content.split_once(SENDER_DELIMITER) {
                return body;
            }
        }
        &self.content
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncCheck {
    pub retcode: i64,
    pub selector: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SyncDelta {
    pub mod_contact_list: Vec<ContactRecord>,
    pub del_contact_list: Vec<ContactRecord>,
    pub mod_chat_room_member_list: Vec<ContactRecord>,
    pub add_msg_list: Vec<MessageRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginPoll {
    pub code: i64,
    pub avatar: Option<String>,
    pub redirect: Option<String>,
}

/// Batch-fetch input: a bare identifier plus the enclosing chatroom context,
/// empty when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactQuery {
    pub user_name: String,
    #[serde(default)]
    pub encry_chat_room_id: String,
}

impl ContactQuery {
    pub fn bare(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            encry_chat_room_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaVariant {
    Thumbnail,
    Full,
    Audio,
    Video,
}

impl MediaVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaVariant::Thumbnail => "thumbnail",
            MediaVariant::Full => "full",
            MediaVariant::Audio => "audio",
            MediaVariant::Video => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberOp {
    Add,
    Remove,
}

impl MemberOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberOp::Add => "addmember",
            MemberOp::Remove => "delmember",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chatroom_message_splits_sender_prefix_from_body() {
        let record = MessageRecord {
            msg_type: TYPE_TEXT,
            from_user_name: "@@room1".to_string(),
            content: "@member7:<br/>see you at nine".to_string(),
            ..MessageRecord::default()
        };
        assert_eq!(record.sender_id(), "@member7");
        assert_eq!(record.body(), "see you at nine");
    }

    #[test]
    fn direct_message_sender_is_the_container() {
        let record = MessageRecord {
            msg_type: TYPE_TEXT,
            from_user_name: "@friend1".to_string(),
            content: "hello:<br/>not a prefix here".to_string(),
            ..MessageRecord::default()
        };
        assert_eq!(record.sender_id(), "@friend1");
        assert_eq!(record.body(), "hello:<br/>not a prefix here");
    }

    #[test]
    fn chatroom_message_without_prefix_falls_back_to_container() {
        let record = MessageRecord {
            from_user_name: "@@room1".to_string(),
            content: "topic changed".to_string(),
            ..MessageRecord::default()
        };
        assert_eq!(record.sender_id(), "@@room1");
        assert_eq!(record.body(), "topic changed");
    }

    #[test]
    fn unknown_type_codes_classify_as_other() {
        assert_eq!(MessageKind::from_code(TYPE_EMOJI), MessageKind::Emoji);
        assert_eq!(MessageKind::from_code(TYPE_SYSTEM), MessageKind::System);
        assert_eq!(MessageKind::from_code(9999), MessageKind::Other);
        assert_eq!(MessageKind::from_code(-1), MessageKind::Other);
    }

    #[test]
    fn delta_deserializes_from_wire_shape() {
        let raw = r#"{
            "ModContactList": [
                {"UserName": "@@room1", "NickName": "team", "ChatRoomOwner": "@alice"}
            ],
            "DelContactList": [{"UserName": "@bob"}],
            "AddMsgList": [
                {
                    "MsgId": "41",
                    "MsgType": 1,
                    "FromUserName": "@alice",
                    "ToUserName": "@me",
                    "Content": "hi",
                    "CreateTime": 1700000000
                }
            ]
        }"#;
        let delta: SyncDelta = serde_json::from_str(raw).expect("delta");
        assert_eq!(delta.mod_contact_list.len(), 1);
        assert_eq!(delta.mod_contact_list[0].chat_room_owner, "@alice");
        assert_eq!(delta.del_contact_list[0].user_name, "@bob");
        assert!(delta.mod_chat_room_member_list.is_empty());
        assert_eq!(delta.add_msg_list[0].kind(), MessageKind::Text);
        assert!(delta.add_msg_list[0].create_time.is_some());
    }
}
