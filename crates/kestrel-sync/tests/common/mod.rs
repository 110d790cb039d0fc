//! In-memory network and cipher shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kestrel_sync::cipher::{CipherError, MessageCipher};
use kestrel_sync::network::{Network, NetworkError};
use kestrel_sync::time::now_nanos;
use kestrel_sync::{Engine, SyncConfig};
use kestrel_types::api::{
    ConversationDirectory, ConversationSummary, CredentialEntry, OutgoingMessage, RawMessage,
    SealedMessage, SendAck,
};
use kestrel_types::models::{
    AccountId, ConversationKey, ConversationKind, CredentialGroupId, CredentialMaterial,
    CredentialSet, Profile, ProfileMap,
};
use tokio::sync::Notify;

pub const ME: &str = "me";
pub const BOB: &str = "bob";
pub const CAROL: &str = "carol";
pub const OWNER: &str = "owner";
pub const GROUP: &str = "book-club";
pub const DEFAULT_GROUP: &str = "default-key";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("kestrel_sync=trace")
        .with_test_writer()
        .try_init();
}

/// Let every spawned task run until it blocks. The tests run on the
/// current-thread runtime, so this is deterministic.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// -- Gate --

/// Parks calls until released, so a test can act while one is in flight.
#[derive(Default)]
pub struct Gate {
    held: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    /// Wait until a call is parked at the gate.
    pub async fn entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("no call reached the gate");
    }

    async fn pass(&self) {
        if self.held.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

// -- Network --

#[derive(Default)]
pub struct Calls {
    pub list: AtomicUsize,
    pub direct: AtomicUsize,
    pub group: AtomicUsize,
    pub members: AtomicUsize,
    pub send: AtomicUsize,
    pub lookup: AtomicUsize,
}

impl Calls {
    pub fn total(&self) -> usize {
        [
            &self.list,
            &self.direct,
            &self.group,
            &self.members,
            &self.send,
            &self.lookup,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

#[derive(Default)]
struct State {
    directories: HashMap<AccountId, ConversationDirectory>,
    threads: HashMap<ConversationKey, Vec<RawMessage>>,
    members: HashMap<ConversationKey, ProfileMap>,
    profiles: ProfileMap,
    sent: Vec<SealedMessage>,
}

#[derive(Default)]
pub struct FakeNetwork {
    state: Mutex<State>,
    pub calls: Calls,
    pub fail_list: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_lookup: AtomicBool,
    pub fetch_gate: Gate,
    pub send_gate: Gate,
}

impl FakeNetwork {
    /// `me` talks to bob and carol and belongs to owner's book club. Bob
    /// has two messages, the group one.
    pub fn seeded() -> Arc<Self> {
        let net = Arc::new(Self::default());
        net.add_conversation(ME, dm_summary(BOB));
        net.add_conversation(ME, dm_summary(CAROL));
        net.add_conversation(ME, group_summary());
        for group in [
            CredentialGroupId::new(ME, DEFAULT_GROUP),
            CredentialGroupId::new(BOB, DEFAULT_GROUP),
            CredentialGroupId::new(CAROL, DEFAULT_GROUP),
            CredentialGroupId::new(OWNER, GROUP),
        ] {
            net.grant(ME, group);
        }
        net.set_thread(bob_key(), vec![dm(BOB, ME, 500), dm(ME, BOB, 300)]);
        net.set_thread(group_key(), vec![in_group(CAROL, 400)]);
        net
    }

    pub fn add_conversation(&self, account: &str, summary: ConversationSummary) {
        let mut state = self.state.lock().unwrap();
        state
            .directories
            .entry(AccountId::new(account))
            .or_default()
            .conversations
            .push(summary);
    }

    /// Make `group` part of `account`'s credential list from now on.
    pub fn grant(&self, account: &str, group: CredentialGroupId) {
        let mut state = self.state.lock().unwrap();
        let material = CredentialMaterial::new(format!("key-for-{}", group));
        state
            .directories
            .entry(AccountId::new(account))
            .or_default()
            .credentials
            .push(CredentialEntry {
                owner: group.owner,
                group_name: group.name,
                material,
            });
    }

    pub fn set_thread(&self, key: ConversationKey, messages: Vec<RawMessage>) {
        self.state.lock().unwrap().threads.insert(key, messages);
    }

    pub fn push_message(&self, key: ConversationKey, message: RawMessage) {
        self.state
            .lock()
            .unwrap()
            .threads
            .entry(key)
            .or_default()
            .insert(0, message);
    }

    pub fn set_profile(&self, account: &str, username: &str) {
        let account = AccountId::new(account);
        self.state.lock().unwrap().profiles.insert(
            account.clone(),
            Profile {
                account,
                username: Some(username.to_string()),
                description: None,
            },
        );
    }

    pub fn set_members(&self, key: ConversationKey, members: &[(&str, &str)]) {
        let members = members
            .iter()
            .map(|(id, name)| {
                let account = AccountId::new(*id);
                (
                    account.clone(),
                    Profile {
                        account,
                        username: Some(name.to_string()),
                        description: None,
                    },
                )
            })
            .collect();
        self.state.lock().unwrap().members.insert(key, members);
    }

    pub fn sent(&self) -> Vec<SealedMessage> {
        self.state.lock().unwrap().sent.clone()
    }

    fn window(&self, key: &ConversationKey, start: u64, max_count: u32) -> Vec<RawMessage> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<RawMessage> = state
            .threads
            .get(key)
            .map(|thread| {
                thread
                    .iter()
                    .filter(|m| m.timestamp_nanos <= start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by(|a, b| b.timestamp_nanos.cmp(&a.timestamp_nanos));
        messages.truncate(max_count as usize);
        messages
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn list_conversations(
        &self,
        account: &AccountId,
        _known_groups: &[CredentialGroupId],
    ) -> Result<ConversationDirectory, NetworkError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(NetworkError::Status(503));
        }
        let state = self.state.lock().unwrap();
        let mut directory = state.directories.get(account).cloned().unwrap_or_default();
        for summary in &directory.conversations {
            if let Some(profile) = state.profiles.get(&summary.counterpart) {
                directory
                    .profiles
                    .insert(summary.counterpart.clone(), profile.clone());
            }
        }
        Ok(directory)
    }

    async fn fetch_direct_thread(
        &self,
        _account: &AccountId,
        _account_group: &str,
        peer: &AccountId,
        _peer_group: &str,
        max_count: u32,
        start_timestamp_nanos: u64,
    ) -> Result<Vec<RawMessage>, NetworkError> {
        self.calls.direct.fetch_add(1, Ordering::SeqCst);
        self.fetch_gate.pass().await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("connection reset".into()));
        }
        Ok(self.window(&ConversationKey::direct(peer), start_timestamp_nanos, max_count))
    }

    async fn fetch_group_thread(
        &self,
        owner: &AccountId,
        group_name: &str,
        start_timestamp_nanos: u64,
        max_count: u32,
    ) -> Result<Vec<RawMessage>, NetworkError> {
        self.calls.group.fetch_add(1, Ordering::SeqCst);
        self.fetch_gate.pass().await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(NetworkError::Transport("connection reset".into()));
        }
        let key = ConversationKey::group(owner, group_name);
        Ok(self.window(&key, start_timestamp_nanos, max_count))
    }

    async fn fetch_group_members(
        &self,
        owner: &AccountId,
        group_name: &str,
        _max_count: u32,
    ) -> Result<ProfileMap, NetworkError> {
        self.calls.members.fetch_add(1, Ordering::SeqCst);
        let key = ConversationKey::group(owner, group_name);
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_encrypted_message(
        &self,
        message: &SealedMessage,
    ) -> Result<SendAck, NetworkError> {
        self.calls.send.fetch_add(1, Ordering::SeqCst);
        self.send_gate.pass().await;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(NetworkError::Status(500));
        }

        let timestamp_nanos = now_nanos();
        let mut state = self.state.lock().unwrap();
        let group_key = ConversationKey::group(&message.recipient, &message.recipient_group);
        let key = if state.threads.contains_key(&group_key) {
            group_key
        } else {
            ConversationKey::direct(&message.recipient)
        };
        state.threads.entry(key).or_default().insert(
            0,
            RawMessage {
                sender: message.sender.clone(),
                sender_group: message.sender_group.clone(),
                recipient: message.recipient.clone(),
                recipient_group: message.recipient_group.clone(),
                timestamp_nanos,
                credential: message.credential.clone(),
                ciphertext: message.ciphertext.clone(),
                nonce: message.nonce.clone(),
            },
        );
        state.sent.push(message.clone());
        Ok(SendAck {
            timestamp_nanos: Some(timestamp_nanos),
            transaction_id: Some(format!("tx-{}", state.sent.len())),
        })
    }

    async fn lookup_profiles(&self, accounts: &[AccountId]) -> Result<ProfileMap, NetworkError> {
        self.calls.lookup.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(NetworkError::Status(502));
        }
        let state = self.state.lock().unwrap();
        Ok(accounts
            .iter()
            .filter_map(|a| state.profiles.get(a).map(|p| (a.clone(), p.clone())))
            .collect())
    }
}

// -- Cipher --

/// Ciphertext is the plaintext. Opening needs the credential group to be
/// known; anything starting with "corrupt" never opens.
pub struct FakeCipher;

impl MessageCipher for FakeCipher {
    fn open(
        &self,
        _account: &AccountId,
        raw: &RawMessage,
        credentials: &CredentialSet,
    ) -> Result<String, CipherError> {
        if !credentials.contains_key(&raw.credential) {
            return Err(CipherError::MissingCredential(raw.credential.clone()));
        }
        if raw.ciphertext.starts_with("corrupt") {
            return Err(CipherError::Corrupt("bad tag".into()));
        }
        Ok(raw.ciphertext.clone())
    }

    fn seal(
        &self,
        outgoing: &OutgoingMessage,
        credentials: &CredentialSet,
    ) -> Result<SealedMessage, CipherError> {
        let credential =
            CredentialGroupId::new(outgoing.recipient.clone(), outgoing.recipient_group.clone());
        if !credentials.contains_key(&credential) {
            return Err(CipherError::MissingCredential(credential));
        }
        Ok(SealedMessage {
            sender: outgoing.sender.clone(),
            sender_group: outgoing.sender_group.clone(),
            recipient: outgoing.recipient.clone(),
            recipient_group: outgoing.recipient_group.clone(),
            credential,
            ciphertext: outgoing.plaintext.clone(),
            nonce: String::new(),
        })
    }
}

// -- Fixtures --

pub fn bob_key() -> ConversationKey {
    ConversationKey::direct(&AccountId::new(BOB))
}

pub fn carol_key() -> ConversationKey {
    ConversationKey::direct(&AccountId::new(CAROL))
}

pub fn group_key() -> ConversationKey {
    ConversationKey::group(&AccountId::new(OWNER), GROUP)
}

pub fn dm_summary(peer: &str) -> ConversationSummary {
    ConversationSummary {
        kind: ConversationKind::DirectMessage,
        counterpart: AccountId::new(peer),
        counterpart_group: DEFAULT_GROUP.into(),
        self_group: DEFAULT_GROUP.into(),
        newest_timestamp_nanos: None,
    }
}

pub fn group_summary() -> ConversationSummary {
    ConversationSummary {
        kind: ConversationKind::GroupChat,
        counterpart: AccountId::new(OWNER),
        counterpart_group: GROUP.into(),
        self_group: DEFAULT_GROUP.into(),
        newest_timestamp_nanos: None,
    }
}

/// A DM sealed under the recipient's default group, body "m<ts>".
pub fn dm(sender: &str, recipient: &str, ts: u64) -> RawMessage {
    RawMessage {
        sender: AccountId::new(sender),
        sender_group: DEFAULT_GROUP.into(),
        recipient: AccountId::new(recipient),
        recipient_group: DEFAULT_GROUP.into(),
        timestamp_nanos: ts,
        credential: CredentialGroupId::new(recipient, DEFAULT_GROUP),
        ciphertext: format!("m{}", ts),
        nonce: String::new(),
    }
}

pub fn in_group(sender: &str, ts: u64) -> RawMessage {
    RawMessage {
        sender: AccountId::new(sender),
        sender_group: DEFAULT_GROUP.into(),
        recipient: AccountId::new(OWNER),
        recipient_group: GROUP.into(),
        timestamp_nanos: ts,
        credential: CredentialGroupId::new(OWNER, GROUP),
        ciphertext: format!("m{}", ts),
        nonce: String::new(),
    }
}

pub fn engine_with(net: &Arc<FakeNetwork>, config: SyncConfig) -> Engine {
    init_tracing();
    Engine::new(config, net.clone(), Arc::new(FakeCipher))
}

pub fn engine(net: &Arc<FakeNetwork>) -> Engine {
    engine_with(net, SyncConfig::default())
}

/// Engine logged in as `me`.
pub async fn logged_in(net: &Arc<FakeNetwork>) -> Engine {
    let engine = engine(net);
    engine.login(AccountId::new(ME)).await.unwrap();
    engine
}

pub async fn stamps(engine: &Engine, key: &ConversationKey) -> Vec<u64> {
    engine
        .conversation(key)
        .await
        .map(|c| c.messages.iter().map(|m| m.timestamp_nanos).collect())
        .unwrap_or_default()
}
