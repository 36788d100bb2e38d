use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    domain::{is_collapsed_id, ContactRole, Participant},
    protocol::{
        ContactQuery, MediaVariant, MemberOp, MessageRecord, LOGIN_AVATAR, LOGIN_CONFIRMED,
        LOGIN_PENDING,
    },
};
use tokio::{
    sync::{broadcast, RwLock},
    task::JoinHandle,
};
use tracing::{error, info, warn};

pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod resolver;
pub mod transport;

use directory::ContactDirectory;
use dispatcher::SyncDispatcher;
use error::SessionFault;
use gateway::Gateway;
use resolver::BatchResolver;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Cookie names carrying the session tokens, matched case-insensitively.
const COOKIE_SID: &str = "wxsid";
const COOKIE_UIN: &str = "wxuin";
const COOKIE_DATA_TICKET: &str = "webwx_data_ticket";

/// Session tokens extracted from the login cookies. Written once after
/// login; every later gateway call rides on the same cookie jar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub sid: String,
    pub uin: i64,
    pub data_ticket: String,
    pub redirect: String,
}

/// Everything the session reports to its consumer, in production order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A scannable login challenge is ready.
    ChallengeReady { url: String },
    /// The account holder scanned the challenge; decoded preview avatar.
    AvatarPreview { image: Vec<u8> },
    LoginSucceeded,
    Failure {
        reason: String,
    },
    Text {
        msg_id: String,
        container: Option<Participant>,
        sender: Option<Participant>,
        text: String,
    },
    Image {
        msg_id: String,
        container: Option<Participant>,
        sender: Option<Participant>,
        image: Vec<u8>,
    },
    Voice {
        msg_id: String,
        container: Option<Participant>,
        sender: Option<Participant>,
        audio: Vec<u8>,
    },
    Card {
        msg_id: String,
        container: Option<Participant>,
        sender: Option<Participant>,
        recommended_id: String,
        display_name: String,
        gender: i64,
    },
    Video {
        msg_id: String,
        container: Option<Participant>,
        sender: Option<Participant>,
        thumbnail: Vec<u8>,
        video: Vec<u8>,
    },
    Other {
        msg_id: String,
        container: Option<Participant>,
        sender: Option<Participant>,
    },
    Notify {
        record: MessageRecord,
    },
    System {
        record: MessageRecord,
    },
    Logout,
}

/// Simulated browser session with the messaging platform's web protocol.
/// One background task drives login, initialization and the long-poll
/// listen loop sequentially, broadcasting `SessionEvent`s as it goes.
pub struct SessionClient {
    gateway: Arc<dyn Gateway>,
    directory: Arc<ContactDirectory>,
    resolver: BatchResolver,
    dispatcher: SyncDispatcher,
    events: broadcast::Sender<SessionEvent>,
    cancelled: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    session: RwLock<Option<SessionContext>>,
}

impl SessionClient {
    pub fn new(gateway: Arc<dyn Gateway>) -> Arc<Self> {
        let directory = Arc::new(ContactDirectory::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let resolver = BatchResolver::new(Arc::clone(&gateway), Arc::clone(&directory));
        let dispatcher = SyncDispatcher::new(
            Arc::clone(&gateway),
            Arc::clone(&directory),
            events.clone(),
        );
        Arc::new(Self {
            gateway,
            directory,
            resolver,
            dispatcher,
            events,
            cancelled: AtomicBool::new(false),
            task: Mutex::new(None),
            session: RwLock::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Spawns the session task. An instance can only be started once.
    pub fn startup(self: &Arc<Self>) {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("session already started");
            return;
        }
        let client = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { client.run().await }));
    }

    /// Requests cooperative shutdown. The flag is observed once per listen
    /// iteration; login and initialization run to completion regardless.
    pub fn shutdown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub async fn session(&self) -> Option<SessionContext> {
        self.session.read().await.clone()
    }

    async fn run(self: Arc<Self>) {
        let redirect = match self.login().await {
            Ok(redirect) => redirect,
            Err(fault) => return self.fail(fault),
        };
        if let Err(fault) = self.initialize(&redirect).await {
            return self.fail(fault);
        }
        self.emit(SessionEvent::LoginSucceeded);
        match self.listen().await {
            Ok(()) => {
                info!("session ended normally");
                self.emit(SessionEvent::Logout);
            }
            Err(fault) => self.fail(fault),
        }
    }

    fn fail(&self, fault: SessionFault) {
        let reason = fault.to_string();
        error!("session failed reason={reason}");
        self.emit(SessionEvent::Failure { reason });
    }

    async fn login(&self) -> Result<String, SessionFault> {
        match self.login_inner().await {
            Ok(Some(redirect)) => Ok(redirect),
            Ok(None) => Err(SessionFault::LoginTimeout),
            Err(source) => Err(SessionFault::Login { source }),
        }
    }

    /// Polls the login status until confirmation. `Ok(None)` means the
    /// challenge expired without confirmation.
    async fn login_inner(&self) -> Result<Option<String>> {
        let challenge = self.gateway.request_login_challenge().await?;
        self.emit(SessionEvent::ChallengeReady { url: challenge });
        loop {
            let poll = self.gateway.poll_login_status().await?;
            match poll.code {
                LOGIN_CONFIRMED => {
                    let redirect = poll
                        .redirect
                        .context("confirmed login carried no redirect target")?;
                    self.gateway.finalize_session(&redirect).await?;
                    return Ok(Some(redirect));
                }
                LOGIN_AVATAR => {
                    if let Some(avatar) = poll.avatar.as_deref() {
                        match decode_avatar(avatar) {
                            Ok(image) => self.emit(SessionEvent::AvatarPreview { image }),
                            Err(err) => warn!("ignoring malformed avatar preview: {err}"),
                        }
                    }
                }
                LOGIN_PENDING => info!("waiting for login authorization"),
                code => {
                    info!("login challenge expired code={code}");
                    return Ok(None);
                }
            }
        }
    }

    async fn initialize(&self, redirect: &str) -> Result<(), SessionFault> {
        self.initialize_inner(redirect)
            .await
            .map_err(|source| SessionFault::Init { source })
    }

    async fn initialize_inner(&self, redirect: &str) -> Result<()> {
        let context = self.extract_session_context(redirect)?;
        info!("session established uin={}", context.uin);
        *self.session.write().await = Some(context);

        let me = self.gateway.fetch_self().await?;
        let me = self.directory.set_me(&me).await;
        info!("logged in as {}", me.display_name);

        let snapshot = self.gateway.fetch_contact_snapshot().await?;
        let mut collapsed = Vec::new();
        for record in &snapshot {
            self.directory.merge_record(record).await;
            if is_collapsed_id(&record.user_name) {
                collapsed.push(ContactQuery::bare(&record.user_name));
            }
        }
        info!(
            "contact snapshot loaded total={} collapsed={}",
            snapshot.len(),
            collapsed.len()
        );
        self.resolver.resolve(&collapsed).await?;
        Ok(())
    }

    fn extract_session_context(&self, redirect: &str) -> Result<SessionContext> {
        let mut sid = None;
        let mut uin = None;
        let mut data_ticket = None;
        for (name, value) in self.gateway.session_cookies() {
            if name.eq_ignore_ascii_case(COOKIE_SID) {
                sid = Some(value);
            } else if name.eq_ignore_ascii_case(COOKIE_UIN) {
                uin = Some(value);
            } else if name.eq_ignore_ascii_case(COOKIE_DATA_TICKET) {
                data_ticket = Some(value);
            }
        }
        let sid = sid.with_context(|| format!("session cookie {COOKIE_SID} missing"))?;
        let uin = uin.with_context(|| format!("session cookie {COOKIE_UIN} missing"))?;
        let uin = uin
            .parse::<i64>()
            .with_context(|| format!("session cookie {COOKIE_UIN} is not numeric: {uin}"))?;
        let data_ticket =
            data_ticket.with_context(|| format!("session cookie {COOKIE_DATA_TICKET} missing"))?;
        Ok(SessionContext {
            sid,
            uin,
            data_ticket,
            redirect: redirect.to_string(),
        })
    }

    async fn listen(&self) -> Result<(), SessionFault> {
        self.listen_inner()
            .await
            .map_err(|source| SessionFault::Listen { source })
    }

    async fn listen_inner(&self) -> Result<()> {
        let me = self
            .directory
            .me()
            .await
            .context("self participant missing after initialization")?;
        self.gateway.announce_online(&me.id).await?;
        while !self.cancelled.load(Ordering::SeqCst) {
            let check = self.gateway.long_poll_check().await?;
            if check.retcode > 0 {
                info!("server ended session retcode={}", check.retcode);
                return Ok(());
            }
            if check.selector > 0 {
                let delta = self.gateway.fetch_delta().await?;
                self.dispatcher.dispatch(delta).await?;
            }
        }
        info!("listen loop cancelled");
        Ok(())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub async fn me(&self) -> Option<Participant> {
        self.directory.me().await
    }

    pub async fn contact(&self, id: &str) -> Option<Participant> {
        self.directory.lookup(id).await
    }

    pub async fn friend(&self, id: &str) -> Option<Participant> {
        self.directory
            .lookup(id)
            .await
            .filter(|participant| participant.role == ContactRole::Friend)
    }

    pub async fn friends(&self) -> Vec<Participant> {
        self.directory.friends().await
    }

    pub async fn public_account(&self, id: &str) -> Option<Participant> {
        self.directory
            .lookup(id)
            .await
            .filter(|participant| participant.role == ContactRole::PublicAccount)
    }

    pub async fn public_accounts(&self) -> Vec<Participant> {
        self.directory.public_accounts().await
    }

    pub async fn chatroom(&self, id: &str) -> Option<Participant> {
        self.directory
            .lookup(id)
            .await
            .filter(|participant| participant.role.is_chatroom())
    }

    pub async fn chatrooms(&self) -> Vec<Participant> {
        self.directory.chatrooms().await
    }

    async fn self_id(&self) -> Result<String> {
        Ok(self
            .directory
            .me()
            .await
            .context("session is not logged in")?
            .id)
    }

    pub async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let from = self.self_id().await?;
        info!("sending text to={to}");
        self.gateway.send_text(&from, to, text).await
    }

    /// Uploads the image bytes, then sends the resulting media id.
    pub async fn send_image(&self, to: &str, filename: &str, bytes: &[u8]) -> Result<()> {
        let from = self.self_id().await?;
        info!("sending image to={to} filename={filename}");
        let media_id = self.gateway.upload_media(&from, to, filename, bytes).await?;
        self.gateway.send_image(&from, to, &media_id).await
    }

    pub async fn fetch_image(&self, msg_id: &str, variant: MediaVariant) -> Result<Vec<u8>> {
        self.gateway.fetch_media(msg_id, variant).await
    }

    pub async fn apply_friend_verify(&self, user: &str, message: &str) -> Result<()> {
        info!("sending friend request to={user}");
        self.gateway.verify_friend(user, message).await
    }

    pub async fn edit_remark(&self, user: &str, remark: &str) -> Result<()> {
        info!("updating remark for={user}");
        self.gateway.set_remark(user, remark).await
    }

    pub async fn create_chatroom(&self, topic: &str, members: &[String]) -> Result<String> {
        info!("creating chatroom topic={topic} members={}", members.len());
        self.gateway.create_chatroom(topic, members).await
    }

    pub async fn add_chatroom_member(&self, chatroom: &str, members: &[String]) -> Result<()> {
        info!("adding {} members to {chatroom}", members.len());
        self.gateway
            .update_chatroom_members(chatroom, MemberOp::Add, members)
            .await
    }

    pub async fn remove_chatroom_member(&self, chatroom: &str, members: &[String]) -> Result<()> {
        info!("removing {} members from {chatroom}", members.len());
        self.gateway
            .update_chatroom_members(chatroom, MemberOp::Remove, members)
            .await
    }
}

/// Avatar previews arrive as a base64 data URI; strip the media prefix and
/// decode the payload.
fn decode_avatar(avatar: &str) -> Result<Vec<u8>> {
    let payload = avatar
        .split_once("base64,")
        .map(|(_, payload)| payload)
        .unwrap_or(avatar);
    Ok(STANDARD.decode(payload.trim())?)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
