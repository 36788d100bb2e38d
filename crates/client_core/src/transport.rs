use std::{
    sync::{PoisonError, RwLock},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::SET_COOKIE, Client};
use serde::{Deserialize, Serialize};
use shared::protocol::{
    ContactQuery, ContactRecord, LoginPoll, MediaVariant, MemberOp, SyncCheck, SyncDelta,
};
use url::Url;
use uuid::Uuid;

use crate::{config::GatewayConfig, gateway::Gateway};

/// HTTP implementation of the gateway boundary. Speaks JSON against a
/// configurable endpoint base; session cookies are captured when the
/// confirmed-login redirect is followed and re-sent by the cookie store.
pub struct HttpGateway {
    http: Client,
    base: Url,
    cookies: RwLock<Vec<(String, String)>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChallengeResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SelfResponse {
    user: ContactRecord,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SnapshotResponse {
    member_list: Vec<ContactRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchContactsRequest<'a> {
    count: usize,
    list: &'a [ContactQuery],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BatchContactsResponse {
    contact_list: Vec<ContactRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct OnlineRequest<'a> {
    user_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TextMessageRequest<'a> {
    client_msg_id: String,
    from_user_name: &'a str,
    to_user_name: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UploadMediaResponse {
    media_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ImageMessageRequest<'a> {
    client_msg_id: String,
    from_user_name: &'a str,
    to_user_name: &'a str,
    media_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct VerifyFriendRequest<'a> {
    user_name: &'a str,
    verify_content: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RemarkRequest<'a> {
    user_name: &'a str,
    remark_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateChatroomRequest<'a> {
    topic: &'a str,
    member_list: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateChatroomResponse {
    chat_room_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateChatroomRequest<'a> {
    chat_room_name: &'a str,
    op: &'a str,
    member_list: &'a [String],
}

fn client_msg_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.poll_timeout_secs))
            .build()
            .context("failed to build http client")?;
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid gateway base url: {}", config.base_url))?;
        Ok(Self {
            http,
            base,
            cookies: RwLock::new(Vec::new()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid gateway endpoint: {path}"))
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn request_login_challenge(&self) -> Result<String> {
        let response: ChallengeResponse = self
            .http
            .get(self.endpoint("login/challenge")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.url)
    }

    async fn poll_login_status(&self) -> Result<LoginPoll> {
        Ok(self
            .http
            .get(self.endpoint("login/status")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn finalize_session(&self, redirect: &str) -> Result<()> {
        let target = Url::parse(redirect).or_else(|_| self.base.join(redirect))?;
        let response = self.http.get(target).send().await?.error_for_status()?;

        let mut captured = Vec::new();
        for header in response.headers().get_all(SET_COOKIE) {
            let raw = header.to_str().unwrap_or_default();
            let pair = raw.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                captured.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        *self
            .cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner) = captured;
        Ok(())
    }

    fn session_cookies(&self) -> Vec<(String, String)> {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_self(&self) -> Result<ContactRecord> {
        let response: SelfResponse = self
            .http
            .post(self.endpoint("session/init")?)
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.user)
    }

    async fn fetch_contact_snapshot(&self) -> Result<Vec<ContactRecord>> {
        let response: SnapshotResponse = self
            .http
            .get(self.endpoint("contacts/snapshot")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.member_list)
    }

    async fn batch_fetch_contacts(&self, queries: &[ContactQuery]) -> Result<Vec<ContactRecord>> {
        let response: BatchContactsResponse = self
            .http
            .post(self.endpoint("contacts/batch")?)
            .json(&BatchContactsRequest {
                count: queries.len(),
                list: queries,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.contact_list)
    }

    async fn announce_online(&self, self_id: &str) -> Result<()> {
        self.http
            .post(self.endpoint("status/online")?)
            .json(&OnlineRequest { user_name: self_id })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn long_poll_check(&self) -> Result<SyncCheck> {
        Ok(self
            .http
            .get(self.endpoint("sync/check")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn fetch_delta(&self) -> Result<SyncDelta> {
        Ok(self
            .http
            .post(self.endpoint("sync/delta")?)
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn fetch_media(&self, msg_id: &str, variant: MediaVariant) -> Result<Vec<u8>> {
        let mut url = self.endpoint(&format!("media/{msg_id}"))?;
        url.query_pairs_mut().append_pair("variant", variant.as_str());
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn send_text(&self, from: &str, to: &str, text: &str) -> Result<()> {
        self.http
            .post(self.endpoint("messages/text")?)
            .json(&TextMessageRequest {
                client_msg_id: client_msg_id(),
                from_user_name: from,
                to_user_name: to,
                content: text,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn upload_media(
        &self,
        from: &str,
        to: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let mut url = self.endpoint("media/upload")?;
        url.query_pairs_mut()
            .append_pair("from", from)
            .append_pair("to", to)
            .append_pair("filename", filename);
        let response: UploadMediaResponse = self
            .http
            .post(url)
            .body(bytes.to_vec())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.media_id)
    }

    async fn send_image(&self, from: &str, to: &str, media_id: &str) -> Result<()> {
        self.http
            .post(self.endpoint("messages/image")?)
            .json(&ImageMessageRequest {
                client_msg_id: client_msg_id(),
                from_user_name: from,
                to_user_name: to,
                media_id,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn verify_friend(&self, user_name: &str, message: &str) -> Result<()> {
        self.http
            .post(self.endpoint("contacts/verify")?)
            .json(&VerifyFriendRequest {
                user_name,
                verify_content: message,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn set_remark(&self, user_name: &str, remark: &str) -> Result<()> {
        self.http
            .post(self.endpoint("contacts/remark")?)
            .json(&RemarkRequest {
                user_name,
                remark_name: remark,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn create_chatroom(&self, topic: &str, members: &[String]) -> Result<String> {
        let response: CreateChatroomResponse = self
            .http
            .post(self.endpoint("chatrooms/create")?)
            .json(&CreateChatroomRequest {
                topic,
                member_list: members,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.chat_room_name)
    }

    async fn update_chatroom_members(
        &self,
        chatroom_id: &str,
        op: MemberOp,
        members: &[String],
    ) -> Result<()> {
        self.http
            .post(self.endpoint("chatrooms/update")?)
            .json(&UpdateChatroomRequest {
                chat_room_name: chatroom_id,
                op: op.as_str(),
                member_list: members,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
