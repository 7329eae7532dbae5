//! Shared fakes and wiring helpers for the integration suites.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vigil_config::{ActionsConfig, ValidationConfig};
use vigil_core::classify::Classifier;
use vigil_core::error::{CoreError, Result};
use vigil_core::gate::ReplacementGate;
use vigil_core::inventory::Inventory;
use vigil_core::manager::{LibraryManager, MediaRecord};
use vigil_core::notify::{JanitorEvent, Notifier};
use vigil_core::pipeline::ValidationPipeline;
use vigil_core::probe::{DecodeCheck, ProbeAdapter, ProbeError, ProbeReport};
use vigil_core::state::StateStore;
use vigil_core::ActionExecutor;
use vigil_model::{InstanceName, ItemKey, MediaKind, RecordId, ReplacementAction};

/// What the fake probe should do for one path.
#[derive(Clone)]
pub enum ProbeScript {
    Healthy1080p,
    /// Healthy media, custom title irrelevant; used for mismatch cases.
    Report(ProbeReport),
    Corrupt(String),
    Unavailable(String),
    DecodeTimeoutAtStart,
}

pub fn healthy_1080p_report() -> ProbeReport {
    ProbeReport {
        duration_secs: Some(6_600.0),
        bitrate_kbps: Some(5_000),
        width: Some(1920),
        height: Some(1080),
        video_codec: Some("h264".to_string()),
        hdr: false,
        stereo_hint: None,
    }
}

#[derive(Default)]
pub struct FakeProbe {
    scripts: StdMutex<HashMap<PathBuf, ProbeScript>>,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, path: impl Into<PathBuf>, script: ProbeScript) {
        self.scripts
            .lock()
            .expect("probe scripts lock")
            .insert(path.into(), script);
    }

    fn script_for(&self, path: &Path) -> ProbeScript {
        self.scripts
            .lock()
            .expect("probe scripts lock")
            .get(path)
            .cloned()
            .unwrap_or(ProbeScript::Healthy1080p)
    }
}

#[async_trait]
impl ProbeAdapter for FakeProbe {
    async fn probe(&self, path: &Path) -> std::result::Result<ProbeReport, ProbeError> {
        match self.script_for(path) {
            ProbeScript::Healthy1080p | ProbeScript::DecodeTimeoutAtStart => {
                Ok(healthy_1080p_report())
            }
            ProbeScript::Report(report) => Ok(report),
            ProbeScript::Corrupt(reason) => Err(ProbeError::Failed(reason)),
            ProbeScript::Unavailable(reason) => Err(ProbeError::Unavailable(reason)),
        }
    }

    async fn decode_sample(
        &self,
        path: &Path,
        start_secs: f64,
        _length_secs: u32,
        _timeout: Duration,
    ) -> std::result::Result<DecodeCheck, ProbeError> {
        match self.script_for(path) {
            ProbeScript::DecodeTimeoutAtStart if start_secs == 0.0 => Ok(DecodeCheck::Timeout),
            _ => Ok(DecodeCheck::Ok),
        }
    }

    async fn decode_full(
        &self,
        _path: &Path,
        _timeout: Duration,
    ) -> std::result::Result<DecodeCheck, ProbeError> {
        Ok(DecodeCheck::Ok)
    }
}

/// Records every destructive call; can be told to fail each step.
pub struct FakeManager {
    instance: InstanceName,
    tv: bool,
    records: StdMutex<Vec<MediaRecord>>,
    pub deleted: StdMutex<Vec<i64>>,
    pub blocklisted: StdMutex<Vec<(RecordId, String)>>,
    pub searched: StdMutex<Vec<RecordId>>,
    pub fail_delete: AtomicBool,
    pub fail_blocklist: AtomicBool,
    pub fail_search: AtomicBool,
}

impl FakeManager {
    pub fn new(instance: &str, tv: bool, records: Vec<MediaRecord>) -> Arc<Self> {
        Arc::new(FakeManager {
            instance: InstanceName::from(instance),
            tv,
            records: StdMutex::new(records),
            deleted: StdMutex::new(Vec::new()),
            blocklisted: StdMutex::new(Vec::new()),
            searched: StdMutex::new(Vec::new()),
            fail_delete: AtomicBool::new(false),
            fail_blocklist: AtomicBool::new(false),
            fail_search: AtomicBool::new(false),
        })
    }

    pub fn deleted_ids(&self) -> Vec<i64> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    pub fn searched_ids(&self) -> Vec<RecordId> {
        self.searched.lock().expect("searched lock").clone()
    }

    pub fn blocklist_messages(&self) -> Vec<String> {
        self.blocklisted
            .lock()
            .expect("blocklist lock")
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl LibraryManager for FakeManager {
    fn instance(&self) -> &InstanceName {
        &self.instance
    }

    fn is_tv(&self) -> bool {
        self.tv
    }

    async fn list_records(&self) -> Result<Vec<MediaRecord>> {
        Ok(self.records.lock().expect("records lock").clone())
    }

    async fn delete_file(&self, file_id: i64) -> Result<()> {
        if self.fail_delete.load(Ordering::Relaxed) {
            return Err(CoreError::Manager("delete refused".to_string()));
        }
        self.deleted.lock().expect("deleted lock").push(file_id);
        Ok(())
    }

    async fn blocklist_release(&self, record: RecordId, message: &str) -> Result<()> {
        if self.fail_blocklist.load(Ordering::Relaxed) {
            return Err(CoreError::Manager("blocklist refused".to_string()));
        }
        self.blocklisted
            .lock()
            .expect("blocklist lock")
            .push((record, message.to_string()));
        Ok(())
    }

    async fn trigger_search(&self, record: RecordId) -> Result<()> {
        if self.fail_search.load(Ordering::Relaxed) {
            return Err(CoreError::Manager("search refused".to_string()));
        }
        self.searched.lock().expect("searched lock").push(record);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: StdMutex<Vec<JanitorEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<JanitorEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: JanitorEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

pub fn movie_record(id: i64, title: &str, path: &str) -> MediaRecord {
    MediaRecord {
        record: RecordId(id),
        title: title.to_string(),
        kind: MediaKind::Movie,
        path: Some(PathBuf::from(path)),
        file_id: Some(id * 100),
        size_bytes: Some(4_000_000_000),
        quality: Some("Bluray-1080p".to_string()),
        runtime_minutes: Some(110),
    }
}

/// Fully wired pipeline over fakes, with the executor channel exposed so
/// tests drive execution explicitly.
pub struct Harness {
    pub inventory: Arc<Inventory>,
    pub store: Arc<StateStore>,
    pub gate: Arc<ReplacementGate>,
    pub pipeline: Arc<ValidationPipeline>,
    pub executor: Arc<ActionExecutor>,
    pub manager: Arc<FakeManager>,
    pub probe: Arc<FakeProbe>,
    pub notifier: Arc<RecordingNotifier>,
    pub executor_rx: mpsc::UnboundedReceiver<ReplacementAction>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(actions: ActionsConfig, records: Vec<MediaRecord>) -> Self {
        Self::with_probe(actions, records, Arc::new(FakeProbe::new()))
    }

    pub fn with_probe(
        actions: ActionsConfig,
        records: Vec<MediaRecord>,
        probe: Arc<FakeProbe>,
    ) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(StateStore::open(dir.path().join("state.json")));
        store.update(|s| s.generation = 1);

        let inventory = Arc::new(Inventory::new());
        let manager = FakeManager::new("radarr-main", false, records.clone());
        inventory.merge_records(
            &InstanceName::from("radarr-main"),
            records,
            1,
            &Default::default(),
        );

        let gate = Arc::new(ReplacementGate::new(
            actions.max_replacements_per_day,
            store.clone(),
        ));
        let notifier = RecordingNotifier::new();
        let (executor_tx, executor_rx) = mpsc::unbounded_channel();

        let pipeline = Arc::new(ValidationPipeline::new(
            Classifier::new(ValidationConfig::default()),
            probe.clone(),
            inventory.clone(),
            gate.clone(),
            executor_tx,
            notifier.clone(),
            store.clone(),
            actions.clone(),
        ));

        let managers: Vec<Arc<dyn LibraryManager>> = vec![manager.clone()];
        let executor = Arc::new(ActionExecutor::new(
            &managers,
            inventory.clone(),
            store.clone(),
            notifier.clone(),
            actions.blocklist_bad_releases,
            actions.dry_run,
        ));

        Harness {
            inventory,
            store,
            gate,
            pipeline,
            executor,
            manager,
            probe,
            notifier,
            executor_rx,
            _dir: dir,
        }
    }

    pub fn item(&self, id: i64) -> vigil_model::MediaItem {
        self.inventory
            .get(&ItemKey::new("radarr-main", id))
            .expect("item tracked")
    }

    /// Pull every approved action currently on the executor channel.
    pub fn drain_approved(&mut self) -> Vec<ReplacementAction> {
        let mut actions = Vec::new();
        while let Ok(action) = self.executor_rx.try_recv() {
            actions.push(action);
        }
        actions
    }
}
