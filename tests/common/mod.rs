//! Shared mock backend for integration tests.
//!
//! All mock hooks append to one shared event log so tests can assert the
//! exact order in which the core dispatched backend calls.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use mail_offline::backend::{
    CachedMessage, FolderBackend, FolderInfo, FolderLookup, Session, StoreBackend, UidMapping,
};
use mail_offline::{OfflineError, OfflineStore};

pub type EventLog = Arc<Mutex<Vec<String>>>;

static TRACING: std::sync::Once = std::sync::Once::new();

/// Honor RUST_LOG when debugging a failing test.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn new_log() -> EventLog {
    init_tracing();
    Arc::new(Mutex::new(Vec::new()))
}

pub fn record(log: &EventLog, event: impl Into<String>) {
    log.lock().unwrap().push(event.into());
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn count_events(log: &EventLog, event: &str) -> usize {
    log.lock().unwrap().iter().filter(|e| *e == event).count()
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct MockSession {
    network: AtomicBool,
    connecting: AtomicBool,
    pub warnings: Mutex<Vec<String>>,
}

impl MockSession {
    pub fn with_network(available: bool) -> Arc<Self> {
        Arc::new(Self {
            network: AtomicBool::new(available),
            connecting: AtomicBool::new(false),
            warnings: Mutex::new(Vec::new()),
        })
    }

    pub fn set_network(&self, available: bool) {
        self.network.store(available, Ordering::SeqCst);
    }

    pub fn set_connecting(&self, connecting: bool) {
        self.connecting.store(connecting, Ordering::SeqCst);
    }
}

impl Session for MockSession {
    fn network_available(&self) -> bool {
        self.network.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    fn notify_user(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

// ---------------------------------------------------------------------------
// Folder backend
// ---------------------------------------------------------------------------

pub struct MockFolder {
    pub name: String,
    log: EventLog,
    /// Locally cached messages available for append replay
    pub cached: Mutex<HashMap<String, CachedMessage>>,
    /// Permanent uid handed out by `append_raw` per temporary uid
    pub permanent_uids: Mutex<HashMap<String, String>>,
    /// Remap pairs returned by `transfer_uids`
    pub transfer_mappings: Mutex<Vec<UidMapping>>,
    /// Uids returned by `list_uids`
    pub uids: Mutex<Vec<String>>,
    pub offline_sync: bool,
    /// Fail `cache_message` for this uid
    pub fail_cache_uid: Mutex<Option<String>>,
    /// Make replay-level `expunge_uids` fail
    pub fail_expunge: AtomicBool,
    /// Set to observe store status from inside replay hooks
    pub store: Mutex<Option<Weak<OfflineStore>>>,
}

impl MockFolder {
    pub fn new(name: &str, log: EventLog, offline_sync: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log,
            cached: Mutex::new(HashMap::new()),
            permanent_uids: Mutex::new(HashMap::new()),
            transfer_mappings: Mutex::new(Vec::new()),
            uids: Mutex::new(Vec::new()),
            offline_sync,
            fail_cache_uid: Mutex::new(None),
            fail_expunge: AtomicBool::new(false),
            store: Mutex::new(None),
        })
    }

    pub fn add_cached_message(&self, uid: &str) {
        self.cached.lock().unwrap().insert(
            uid.to_string(),
            CachedMessage {
                uid: uid.to_string(),
                flags: vec!["\\Seen".to_string()],
                internal_date: None,
                raw: format!("Subject: {}\r\n\r\nbody", uid).into_bytes(),
            },
        );
    }

    pub fn set_permanent_uid(&self, temp: &str, permanent: &str) {
        self.permanent_uids
            .lock()
            .unwrap()
            .insert(temp.to_string(), permanent.to_string());
    }

    pub fn set_uids(&self, uids: &[&str]) {
        *self.uids.lock().unwrap() = uids.iter().map(|u| u.to_string()).collect();
    }

    pub fn observe_store(&self, store: &Arc<OfflineStore>) {
        *self.store.lock().unwrap() = Some(Arc::downgrade(store));
    }

    fn record_status_if_observed(&self) {
        let weak = self.store.lock().unwrap().clone();
        if let Some(store) = weak.and_then(|w| w.upgrade()) {
            record(
                &self.log,
                format!("status_during_replay:{}", store.status()),
            );
        }
    }
}

#[async_trait]
impl FolderBackend for MockFolder {
    async fn sync_online(&self, expunge: bool) -> Result<(), OfflineError> {
        record(&self.log, format!("sync_online:{}:{}", self.name, expunge));
        Ok(())
    }

    async fn sync_offline(&self, expunge: bool) -> Result<(), OfflineError> {
        record(&self.log, format!("sync_offline:{}:{}", self.name, expunge));
        Ok(())
    }

    async fn sync_resyncing(&self, expunge: bool) -> Result<(), OfflineError> {
        record(
            &self.log,
            format!("sync_resyncing:{}:{}", self.name, expunge),
        );
        Ok(())
    }

    async fn expunge_uids_online(&self, uids: &[String]) -> Result<(), OfflineError> {
        record(
            &self.log,
            format!("expunge_uids_online:{}:{}", self.name, uids.join(",")),
        );
        Ok(())
    }

    async fn expunge_uids_offline(&self, uids: &[String]) -> Result<(), OfflineError> {
        record(
            &self.log,
            format!("expunge_uids_offline:{}:{}", self.name, uids.join(",")),
        );
        Ok(())
    }

    async fn expunge_uids_resyncing(&self, uids: &[String]) -> Result<(), OfflineError> {
        record(
            &self.log,
            format!("expunge_uids_resyncing:{}:{}", self.name, uids.join(",")),
        );
        Ok(())
    }

    async fn append_online(&self, uid: &str, _raw: &[u8]) -> Result<(), OfflineError> {
        record(&self.log, format!("append_online:{}:{}", self.name, uid));
        Ok(())
    }

    async fn append_offline(&self, uid: &str, _raw: &[u8]) -> Result<(), OfflineError> {
        record(&self.log, format!("append_offline:{}:{}", self.name, uid));
        Ok(())
    }

    async fn append_resyncing(&self, uid: &str, _raw: &[u8]) -> Result<(), OfflineError> {
        record(&self.log, format!("append_resyncing:{}:{}", self.name, uid));
        Ok(())
    }

    async fn transfer_online(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<(), OfflineError> {
        record(
            &self.log,
            format!(
                "transfer_online:{}->{}:{}:{}",
                self.name,
                dest,
                uids.join(","),
                delete_originals
            ),
        );
        Ok(())
    }

    async fn transfer_offline(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<(), OfflineError> {
        record(
            &self.log,
            format!(
                "transfer_offline:{}->{}:{}:{}",
                self.name,
                dest,
                uids.join(","),
                delete_originals
            ),
        );
        Ok(())
    }

    async fn transfer_resyncing(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<(), OfflineError> {
        record(
            &self.log,
            format!(
                "transfer_resyncing:{}->{}:{}:{}",
                self.name,
                dest,
                uids.join(","),
                delete_originals
            ),
        );
        Ok(())
    }

    async fn refresh_info_online(&self) -> Result<(), OfflineError> {
        record(&self.log, format!("refresh_info_online:{}", self.name));
        Ok(())
    }

    async fn expunge_uids(&self, uids: &[String]) -> Result<(), OfflineError> {
        self.record_status_if_observed();
        if self.fail_expunge.load(Ordering::SeqCst) {
            return Err(OfflineError::Backend(format!(
                "expunge refused by server on {}",
                self.name
            )));
        }
        record(
            &self.log,
            format!("replay_expunge:{}:{}", self.name, uids.join(",")),
        );
        Ok(())
    }

    async fn cached_message(&self, uid: &str) -> Result<Option<CachedMessage>, OfflineError> {
        Ok(self.cached.lock().unwrap().get(uid).cloned())
    }

    async fn append_raw(&self, message: CachedMessage) -> Result<Option<String>, OfflineError> {
        self.record_status_if_observed();
        record(
            &self.log,
            format!("replay_append:{}:{}", self.name, message.uid),
        );
        Ok(self.permanent_uids.lock().unwrap().get(&message.uid).cloned())
    }

    async fn transfer_uids(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<Vec<UidMapping>, OfflineError> {
        self.record_status_if_observed();
        record(
            &self.log,
            format!(
                "replay_transfer:{}->{}:{}:{}",
                self.name,
                dest,
                uids.join(","),
                delete_originals
            ),
        );
        Ok(self.transfer_mappings.lock().unwrap().clone())
    }

    async fn cache_message(&self, uid: &str) -> Result<(), OfflineError> {
        if self.fail_cache_uid.lock().unwrap().as_deref() == Some(uid) {
            return Err(OfflineError::Backend(format!(
                "fetch of {} failed on {}",
                uid, self.name
            )));
        }
        record(&self.log, format!("cache:{}:{}", self.name, uid));
        Ok(())
    }

    async fn list_uids(&self, _expression: Option<&str>) -> Result<Vec<String>, OfflineError> {
        record(&self.log, format!("list_uids:{}", self.name));
        Ok(self.uids.lock().unwrap().clone())
    }

    async fn synchronize(&self) -> Result<(), OfflineError> {
        record(&self.log, format!("folder_synchronize:{}", self.name));
        Ok(())
    }

    fn offline_sync_enabled(&self) -> bool {
        self.offline_sync
    }
}

// ---------------------------------------------------------------------------
// Store backend
// ---------------------------------------------------------------------------

pub struct MockStore {
    log: EventLog,
    pub folders: Mutex<HashMap<String, Arc<MockFolder>>>,
    pub can_offline: bool,
    pub fail_open_connection: AtomicBool,
    /// When set, a failing `open_connection` also drops this session's
    /// network, modelling a connect attempt that discovers the link is gone.
    pub drop_network_on_failure: Mutex<Option<Arc<MockSession>>>,
}

impl MockStore {
    pub fn new(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            folders: Mutex::new(HashMap::new()),
            can_offline: true,
            fail_open_connection: AtomicBool::new(false),
            drop_network_on_failure: Mutex::new(None),
        })
    }

    /// A backend with no local cache (no journal is created for it).
    pub fn without_offline(log: EventLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            folders: Mutex::new(HashMap::new()),
            can_offline: false,
            fail_open_connection: AtomicBool::new(false),
            drop_network_on_failure: Mutex::new(None),
        })
    }

    pub fn add_folder(&self, folder: Arc<MockFolder>) {
        self.folders
            .lock()
            .unwrap()
            .insert(folder.name.clone(), folder);
    }
}

#[async_trait]
impl StoreBackend for MockStore {
    async fn open_connection(&self) -> Result<(), OfflineError> {
        if self.fail_open_connection.load(Ordering::SeqCst) {
            if let Some(session) = self.drop_network_on_failure.lock().unwrap().as_ref() {
                session.set_network(false);
                session.set_connecting(true);
            }
            return Err(OfflineError::Backend("network unreachable".to_string()));
        }
        record(&self.log, "open_connection");
        Ok(())
    }

    fn cancel_connection(&self) {
        record(&self.log, "cancel_connection");
    }

    async fn connect_online(&self) -> Result<(), OfflineError> {
        record(&self.log, "connect_online");
        Ok(())
    }

    async fn connect_offline(&self) -> Result<(), OfflineError> {
        record(&self.log, "connect_offline");
        Ok(())
    }

    async fn disconnect_online(&self, clean: bool) -> Result<(), OfflineError> {
        record(&self.log, format!("disconnect_online:{}", clean));
        Ok(())
    }

    async fn disconnect_offline(&self, clean: bool) -> Result<(), OfflineError> {
        record(&self.log, format!("disconnect_offline:{}", clean));
        Ok(())
    }

    async fn synchronize(&self) -> Result<(), OfflineError> {
        record(&self.log, "store_synchronize");
        Ok(())
    }

    async fn folder(
        &self,
        name: &str,
    ) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        match self.folders.lock().unwrap().get(name) {
            Some(folder) => Ok(folder.clone() as Arc<dyn FolderBackend>),
            None => Err(OfflineError::Backend(format!("no such folder {}", name))),
        }
    }

    async fn folder_online(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        record(&self.log, format!("folder_online:{}", name));
        self.folder(name).await
    }

    async fn folder_offline(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        record(&self.log, format!("folder_offline:{}", name));
        self.folder(name).await
    }

    async fn folder_resyncing(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        record(&self.log, format!("folder_resyncing:{}", name));
        self.folder(name).await
    }

    async fn folder_info(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        if !self.folders.lock().unwrap().contains_key(name) {
            return Err(OfflineError::Backend(format!("no such folder {}", name)));
        }
        Ok(FolderInfo {
            name: name.to_string(),
            total_messages: 10,
            unseen_messages: 3,
        })
    }

    async fn folder_info_online(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        record(&self.log, format!("folder_info_online:{}", name));
        self.folder_info(name).await
    }

    async fn folder_info_offline(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        record(&self.log, format!("folder_info_offline:{}", name));
        self.folder_info(name).await
    }

    async fn folder_info_resyncing(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        record(&self.log, format!("folder_info_resyncing:{}", name));
        self.folder_info(name).await
    }

    fn can_work_offline(&self) -> bool {
        self.can_offline
    }
}

/// Journal-level lookup without an OfflineStore in the loop.
#[async_trait]
impl FolderLookup for MockStore {
    async fn lookup(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        match self.folders.lock().unwrap().get(name) {
            Some(folder) => Ok(folder.clone() as Arc<dyn FolderBackend>),
            None => Err(OfflineError::FolderUnavailable(name.to_string())),
        }
    }
}
