use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{
    ContactQuery, ContactRecord, LoginPoll, MediaVariant, MemberOp, SyncCheck, SyncDelta,
};

/// Boundary to the transport/API gateway. Implementations own the wire
/// encoding and the cookie jar; callers see parsed payloads only. All
/// calls are blocking from the session task's point of view.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Requests a scannable login challenge and returns its reference URL.
    async fn request_login_challenge(&self) -> Result<String>;

    /// One blocking poll of the login status endpoint.
    async fn poll_login_status(&self) -> Result<LoginPoll>;

    /// Follows the confirmed-login redirect, establishing session cookies.
    async fn finalize_session(&self, redirect: &str) -> Result<()>;

    /// Name/value pairs of the cookies established by `finalize_session`.
    fn session_cookies(&self) -> Vec<(String, String)>;

    async fn fetch_self(&self) -> Result<ContactRecord>;

    async fn fetch_contact_snapshot(&self) -> Result<Vec<ContactRecord>>;

    /// One batch-fetch call. Callers are responsible for chunking input to
    /// the protocol's batch cap.
    async fn batch_fetch_contacts(&self, queries: &[ContactQuery]) -> Result<Vec<ContactRecord>>;

    async fn announce_online(&self, self_id: &str) -> Result<()>;

    /// One long-poll cycle; returns when data is available or the server's
    /// wait window elapses.
    async fn long_poll_check(&self) -> Result<SyncCheck>;

    async fn fetch_delta(&self) -> Result<SyncDelta>;

    async fn fetch_media(&self, msg_id: &str, variant: MediaVariant) -> Result<Vec<u8>>;

    async fn send_text(&self, from: &str, to: &str, text: &str) -> Result<()>;

    /// Uploads media for an outbound message and returns its media id.
    async fn upload_media(&self, from: &str, to: &str, filename: &str, bytes: &[u8])
        -> Result<String>;

    async fn send_image(&self, from: &str, to: &str, media_id: &str) -> Result<()>;

    async fn verify_friend(&self, user_name: &str, message: &str) -> Result<()>;

    async fn set_remark(&self, user_name: &str, remark: &str) -> Result<()>;

    /// Creates a chatroom and returns its identifier.
    async fn create_chatroom(&self, topic: &str, members: &[String]) -> Result<String>;

    async fn update_chatroom_members(
        &self,
        chatroom_id: &str,
        op: MemberOp,
        members: &[String],
    ) -> Result<()>;
}

/// Placeholder gateway for sessions constructed without a transport; every
/// call fails.
pub struct MissingGateway;

#[async_trait]
impl Gateway for MissingGateway {
    async fn request_login_challenge(&self) -> Result<String> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn poll_login_status(&self) -> Result<LoginPoll> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn finalize_session(&self, _redirect: &str) -> Result<()> {
        Err(anyhow!("gateway is unavailable"))
    }

    fn session_cookies(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn fetch_self(&self) -> Result<ContactRecord> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn fetch_contact_snapshot(&self) -> Result<Vec<ContactRecord>> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn batch_fetch_contacts(&self, _queries: &[ContactQuery]) -> Result<Vec<ContactRecord>> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn announce_online(&self, _self_id: &str) -> Result<()> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn long_poll_check(&self) -> Result<SyncCheck> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn fetch_delta(&self) -> Result<SyncDelta> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn fetch_media(&self, _msg_id: &str, _variant: MediaVariant) -> Result<Vec<u8>> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn send_text(&self, _from: &str, _to: &str, _text: &str) -> Result<()> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn upload_media(
        &self,
        _from: &str,
        _to: &str,
        _filename: &str,
        _bytes: &[u8],
    ) -> Result<String> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn send_image(&self, _from: &str, _to: &str, _media_id: &str) -> Result<()> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn verify_friend(&self, _user_name: &str, _message: &str) -> Result<()> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn set_remark(&self, _user_name: &str, _remark: &str) -> Result<()> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn create_chatroom(&self, _topic: &str, _members: &[String]) -> Result<String> {
        Err(anyhow!("gateway is unavailable"))
    }

    async fn update_chatroom_members(
        &self,
        _chatroom_id: &str,
        _op: MemberOp,
        _members: &[String],
    ) -> Result<()> {
        Err(anyhow!("gateway is unavailable"))
    }
}
