use std::{collections::VecDeque, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use shared::protocol::{
    ContactQuery, ContactRecord, LoginPoll, MediaVariant, MemberOp, MessageRecord, SyncCheck,
    SyncDelta, LOGIN_CONFIRMED, LOGIN_PENDING, TYPE_TEXT,
};
use tokio::sync::Mutex;

use super::*;
use crate::gateway::MissingGateway;

/// Gateway driven by pre-loaded response scripts. Scripts running dry on
/// the poll endpoints yield an idle check (so cancellation can be observed)
/// or an error (so fault paths stay deterministic).
struct ScriptedGateway {
    challenge: String,
    login_polls: Mutex<VecDeque<LoginPoll>>,
    cookies: Vec<(String, String)>,
    me: ContactRecord,
    snapshot: Vec<ContactRecord>,
    checks: Mutex<VecDeque<SyncCheck>>,
    deltas: Mutex<VecDeque<SyncDelta>>,
    finalize_calls: Arc<Mutex<Vec<String>>>,
    online_calls: Arc<Mutex<Vec<String>>>,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

fn contact(user_name: &str, nick_name: &str) -> ContactRecord {
    ContactRecord {
        user_name: user_name.to_string(),
        nick_name: nick_name.to_string(),
        ..ContactRecord::default()
    }
}

impl ScriptedGateway {
    fn new() -> Self {
        Self {
            challenge: "https://login.example/qr/1".to_string(),
            login_polls: Mutex::new(VecDeque::new()),
            cookies: vec![
                ("WXSid".to_string(), "sid-1".to_string()),
                ("wxuin".to_string(), "4242".to_string()),
                ("Webwx_Data_Ticket".to_string(), "ticket-1".to_string()),
            ],
            me: contact("@me", "owner"),
            snapshot: Vec::new(),
            checks: Mutex::new(VecDeque::new()),
            deltas: Mutex::new(VecDeque::new()),
            finalize_calls: Arc::new(Mutex::new(Vec::new())),
            online_calls: Arc::new(Mutex::new(Vec::new())),
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_login_script(self, polls: Vec<LoginPoll>) -> Self {
        Self {
            login_polls: Mutex::new(polls.into()),
            ..self
        }
    }

    fn with_checks(self, checks: Vec<SyncCheck>) -> Self {
        Self {
            checks: Mutex::new(checks.into()),
            ..self
        }
    }
}

fn pending() -> LoginPoll {
    LoginPoll {
        code: LOGIN_PENDING,
        ..LoginPoll::default()
    }
}

fn confirmed(redirect: &str) -> LoginPoll {
    LoginPoll {
        code: LOGIN_CONFIRMED,
        redirect: Some(redirect.to_string()),
        ..LoginPoll::default()
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn request_login_challenge(&self) -> anyhow::Result<String> {
        Ok(self.challenge.clone())
    }

    async fn poll_login_status(&self) -> anyhow::Result<LoginPoll> {
        self.login_polls
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow!("login poll script exhausted"))
    }

    async fn finalize_session(&self, redirect: &str) -> anyhow::Result<()> {
        self.finalize_calls.lock().await.push(redirect.to_string());
        Ok(())
    }

    fn session_cookies(&self) -> Vec<(String, String)> {
        self.cookies.clone()
    }

    async fn fetch_self(&self) -> anyhow::Result<ContactRecord> {
        Ok(self.me.clone())
    }

    async fn fetch_contact_snapshot(&self) -> anyhow::Result<Vec<ContactRecord>> {
        Ok(self.snapshot.clone())
    }

    async fn batch_fetch_contacts(
        &self,
        queries: &[ContactQuery],
    ) -> anyhow::Result<Vec<ContactRecord>> {
        self.batch_sizes.lock().await.push(queries.len());
        Ok(queries
            .iter()
            .map(|query| contact(&query.user_name, "resolved"))
            .collect())
    }

    async fn announce_online(&self, self_id: &str) -> anyhow::Result<()> {
        self.online_calls.lock().await.push(self_id.to_string());
        Ok(())
    }

    async fn long_poll_check(&self) -> anyhow::Result<SyncCheck> {
        if let Some(check) = self.checks.lock().await.pop_front() {
            return Ok(check);
        }
        // Idle long-poll cycle; lets the cancellation flag get observed.
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(SyncCheck {
            retcode: 0,
            selector: 0,
        })
    }

    async fn fetch_delta(&self) -> anyhow::Result<SyncDelta> {
        self.deltas
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow!("delta script exhausted"))
    }

    async fn fetch_media(&self, msg_id: &str, variant: MediaVariant) -> anyhow::Result<Vec<u8>> {
        Ok(format!("{}-{msg_id}", variant.as_str()).into_bytes())
    }

    async fn send_text(&self, _from: &str, _to: &str, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn upload_media(
        &self,
        _from: &str,
        _to: &str,
        _filename: &str,
        _bytes: &[u8],
    ) -> anyhow::Result<String> {
        Ok("media-1".to_string())
    }

    async fn send_image(&self, _from: &str, _to: &str, _media_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn verify_friend(&self, _user_name: &str, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_remark(&self, _user_name: &str, _remark: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn create_chatroom(&self, _topic: &str, _members: &[String]) -> anyhow::Result<String> {
        Ok("@@created".to_string())
    }

    async fn update_chatroom_members(
        &self,
        _chatroom_id: &str,
        _op: MemberOp,
        _members: &[String],
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event timeout")
        .expect("event stream closed")
}

fn text_message(msg_id: &str, from: &str, content: &str) -> MessageRecord {
    MessageRecord {
        msg_id: msg_id.to_string(),
        msg_type: TYPE_TEXT,
        from_user_name: from.to_string(),
        to_user_name: "@me".to_string(),
        content: content.to_string(),
        ..MessageRecord::default()
    }
}

#[tokio::test]
async fn full_session_reaches_listen_and_delivers_messages() {
    let mut gateway = ScriptedGateway::new()
        .with_login_script(vec![
            pending(),
            confirmed("https://web.example/newlogin?ticket=t1"),
        ])
        .with_checks(vec![
            SyncCheck {
                retcode: 0,
                selector: 2,
            },
            SyncCheck {
                retcode: 1101,
                selector: 0,
            },
        ]);
    // Two snapshot contacts; only the chatroom is a collapsed placeholder.
    gateway.snapshot = vec![contact("alice", "alice"), contact("@@room1", "team")];
    gateway.deltas = Mutex::new(
        vec![SyncDelta {
            add_msg_list: vec![text_message("1", "alice", "hello there")],
            ..SyncDelta::default()
        }]
        .into(),
    );
    let finalize_calls = gateway.finalize_calls.clone();
    let online_calls = gateway.online_calls.clone();
    let batch_sizes = gateway.batch_sizes.clone();

    let client = SessionClient::new(Arc::new(gateway));
    let mut rx = client.subscribe_events();
    client.startup();

    match next_event(&mut rx).await {
        SessionEvent::ChallengeReady { url } => assert_eq!(url, "https://login.example/qr/1"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::LoginSucceeded
    ));
    match next_event(&mut rx).await {
        SessionEvent::Text { sender, text, .. } => {
            assert_eq!(sender.expect("sender resolved").display_name, "alice");
            assert_eq!(text, "hello there");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Logout));

    assert_eq!(
        finalize_calls.lock().await.clone(),
        vec!["https://web.example/newlogin?ticket=t1".to_string()]
    );
    assert_eq!(online_calls.lock().await.clone(), vec!["@me".to_string()]);
    assert_eq!(batch_sizes.lock().await.clone(), vec![1]);

    let session = client.session().await.expect("session context");
    assert_eq!(session.sid, "sid-1");
    assert_eq!(session.uin, 4242);
    assert_eq!(session.data_ticket, "ticket-1");

    let me = client.me().await.expect("self participant");
    assert_eq!(me.display_name, "owner");
}

#[tokio::test]
async fn unknown_status_code_is_a_login_timeout() {
    let gateway = ScriptedGateway::new().with_login_script(vec![
        pending(),
        LoginPoll {
            code: 0,
            ..LoginPoll::default()
        },
    ]);
    let finalize_calls = gateway.finalize_calls.clone();
    let online_calls = gateway.online_calls.clone();

    let client = SessionClient::new(Arc::new(gateway));
    let mut rx = client.subscribe_events();
    client.startup();

    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::ChallengeReady { .. }
    ));
    match next_event(&mut rx).await {
        SessionEvent::Failure { reason } => assert_eq!(reason, "login timeout"),
        other => panic!("unexpected event: {other:?}"),
    }
    // Neither initialization nor listening ever started.
    assert!(finalize_calls.lock().await.is_empty());
    assert!(online_calls.lock().await.is_empty());
}

#[tokio::test]
async fn avatar_preview_surfaces_while_pending() {
    let gateway = ScriptedGateway::new().with_login_script(vec![
        LoginPoll {
            code: shared::protocol::LOGIN_AVATAR,
            avatar: Some("data:img/jpg;base64,aGVsbG8=".to_string()),
            ..LoginPoll::default()
        },
        confirmed("https://web.example/newlogin?ticket=t2"),
    ]);

    let client = SessionClient::new(Arc::new(gateway));
    let mut rx = client.subscribe_events();
    client.startup();

    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::ChallengeReady { .. }
    ));
    match next_event(&mut rx).await {
        SessionEvent::AvatarPreview { image } => assert_eq!(image, b"hello"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::LoginSucceeded
    ));
}

#[tokio::test]
async fn transport_fault_during_login_reports_failure() {
    let client = SessionClient::new(Arc::new(MissingGateway));
    let mut rx = client.subscribe_events();
    client.startup();

    match next_event(&mut rx).await {
        SessionEvent::Failure { reason } => {
            assert!(reason.starts_with("login exception"), "reason: {reason}");
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn missing_session_cookie_is_an_initialization_fault() {
    let mut gateway = ScriptedGateway::new()
        .with_login_script(vec![confirmed("https://web.example/newlogin?ticket=t3")]);
    gateway.cookies = vec![("WXSid".to_string(), "sid-1".to_string())];
    let online_calls = gateway.online_calls.clone();

    let client = SessionClient::new(Arc::new(gateway));
    let mut rx = client.subscribe_events();
    client.startup();

    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::ChallengeReady { .. }
    ));
    match next_event(&mut rx).await {
        SessionEvent::Failure { reason } => {
            assert!(
                reason.starts_with("initialization exception"),
                "reason: {reason}"
            );
            assert!(reason.contains("wxuin"), "reason: {reason}");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(online_calls.lock().await.is_empty());
}

#[tokio::test]
async fn cancellation_ends_the_listen_loop_with_a_logout() {
    let gateway = ScriptedGateway::new()
        .with_login_script(vec![confirmed("https://web.example/newlogin?ticket=t4")]);

    let client = SessionClient::new(Arc::new(gateway));
    let mut rx = client.subscribe_events();
    client.startup();

    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::ChallengeReady { .. }
    ));
    assert!(matches!(
        next_event(&mut rx).await,
        SessionEvent::LoginSucceeded
    ));

    client.shutdown();
    assert!(matches!(next_event(&mut rx).await, SessionEvent::Logout));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!client.is_running());
}

#[tokio::test]
async fn listen_fault_is_reported_exactly_once() {
    // selector=2 with an empty delta script forces a fetch fault mid-listen.
    let gateway = ScriptedGateway::new()
        .with_login_script(vec![confirmed("https://web.example/newlogin?ticket=t5")])
        .with_checks(vec![SyncCheck {
            retcode: 0,
            selector: 2,
        }]);

    let client = SessionClient::new(Arc::new(gateway));
    let mut rx = client.subscribe_events();
    client.startup();

    let mut terminal_events = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Ok(SessionEvent::Failure { reason })) => {
                assert!(reason.starts_with("listen exception"), "reason: {reason}");
                terminal_events += 1;
            }
            Ok(Ok(SessionEvent::Logout)) => terminal_events += 1,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert_eq!(terminal_events, 1);
}

#[tokio::test]
async fn startup_is_idempotent() {
    let gateway = ScriptedGateway::new()
        .with_login_script(vec![confirmed("https://web.example/newlogin?ticket=t6")])
        .with_checks(vec![SyncCheck {
            retcode: 1,
            selector: 0,
        }]);

    let client = SessionClient::new(Arc::new(gateway));
    let mut rx = client.subscribe_events();
    client.startup();
    client.startup();

    let mut logins = 0;
    let mut failures = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            Ok(Ok(SessionEvent::LoginSucceeded)) => logins += 1,
            Ok(Ok(SessionEvent::Failure { .. })) => failures += 1,
            Ok(Ok(SessionEvent::Logout)) => break,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert_eq!(logins, 1);
    assert_eq!(failures, 0);
}

#[tokio::test]
async fn outbound_operations_require_a_logged_in_session() {
    let client = SessionClient::new(Arc::new(MissingGateway));
    let err = client
        .send_text("@alice", "hello")
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("not logged in"));
}
