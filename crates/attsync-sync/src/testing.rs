//! In-memory test doubles for the remote store and renderer

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use attsync_core::domain::{AssetKey, HistoryEntry, Notes, RemoteAttachmentRecord, RemoteId};
use attsync_core::ports::{Categories, IDocumentRenderer, IRemoteStore, RemoteError, Section};

use crate::fingerprint::fingerprint_bytes;
use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Upload,
    Delete,
    Download,
    Publish,
}

#[derive(Debug, Clone)]
struct StoredFile {
    id: RemoteId,
    data: Vec<u8>,
    version: u64,
}

#[derive(Default)]
struct FakeState {
    files: BTreeMap<AssetKey, StoredFile>,
    next_id: u64,
    scripted: HashMap<(Op, String), VecDeque<RemoteError>>,
    always: HashMap<(Op, String), RemoteError>,
    calls: HashMap<Op, usize>,
    in_flight: HashMap<Op, usize>,
    max_in_flight: HashMap<Op, usize>,
    published: Vec<(String, String)>,
    /// Events in call order, e.g. `delete:3` or `upload:a.png`
    log: Vec<String>,
}

/// In-memory [`IRemoteStore`] with scripted failures
///
/// Failure targets are the key for uploads, the id for deletes and
/// downloads, and the empty string for list and publish.
pub struct FakeRemote {
    state: Mutex<FakeState>,
    delay: Duration,
    report_fingerprints: bool,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                ..Default::default()
            }),
            delay: Duration::ZERO,
            report_fingerprints: true,
        }
    }

    /// Every call sleeps for `delay` while counted as in flight
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Listing omits fingerprints, forcing download-and-hash
    pub fn without_fingerprints(mut self) -> Self {
        self.report_fingerprints = false;
        self
    }

    /// Store `data` under `key` as if uploaded earlier
    pub fn seed(&self, key: &str, data: &[u8]) -> RemoteId {
        let mut state = lock(&self.state);
        let id = next_id(&mut state);
        state.files.insert(
            AssetKey::new(key.to_string()).unwrap(),
            StoredFile {
                id: id.clone(),
                data: data.to_vec(),
                version: 1,
            },
        );
        id
    }

    /// Fail the next `times` calls of `op` on `target` with `error`
    pub fn fail_times(&self, op: Op, target: &str, times: usize, error: RemoteError) {
        let mut state = lock(&self.state);
        let queue = state.scripted.entry((op, target.to_string())).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Fail every call of `op` on `target` with `error`
    pub fn fail_always(&self, op: Op, target: &str, error: RemoteError) {
        lock(&self.state)
            .always
            .insert((op, target.to_string()), error);
    }

    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.scripted.clear();
        state.always.clear();
    }

    pub fn calls(&self, op: Op) -> usize {
        lock(&self.state).calls.get(&op).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self, op: Op) -> usize {
        lock(&self.state).max_in_flight.get(&op).copied().unwrap_or(0)
    }

    /// Current content by key
    pub fn contents(&self) -> BTreeMap<String, Vec<u8>> {
        lock(&self.state)
            .files
            .iter()
            .map(|(k, f)| (k.to_string(), f.data.clone()))
            .collect()
    }

    pub fn id_of(&self, key: &str) -> Option<RemoteId> {
        let key = AssetKey::new(key.to_string()).ok()?;
        lock(&self.state).files.get(&key).map(|f| f.id.clone())
    }

    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.state).published.clone()
    }

    pub fn log(&self) -> Vec<String> {
        lock(&self.state).log.clone()
    }

    /// Count the call, hold it in flight for the configured delay, then
    /// return any scripted failure
    async fn begin(&self, op: Op, target: &str) -> Result<(), RemoteError> {
        {
            let mut state = lock(&self.state);
            *state.calls.entry(op).or_default() += 1;
            let running = {
                let n = state.in_flight.entry(op).or_default();
                *n += 1;
                *n
            };
            let max = state.max_in_flight.entry(op).or_default();
            *max = (*max).max(running);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut state = lock(&self.state);
        if let Some(n) = state.in_flight.get_mut(&op) {
            *n -= 1;
        }
        let slot = (op, target.to_string());
        if let Some(error) = state.always.get(&slot) {
            return Err(error.clone());
        }
        if let Some(error) = state.scripted.get_mut(&slot).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(())
    }

    fn record(&self, key: &AssetKey, file: &StoredFile) -> RemoteAttachmentRecord {
        RemoteAttachmentRecord {
            id: file.id.clone(),
            key: key.clone(),
            fingerprint: self
                .report_fingerprints
                .then(|| fingerprint_bytes(&file.data)),
            version: Some(file.version),
        }
    }
}

fn next_id(state: &mut FakeState) -> RemoteId {
    let id = RemoteId::new(state.next_id.to_string()).unwrap();
    state.next_id += 1;
    id
}

#[async_trait]
impl IRemoteStore for FakeRemote {
    async fn list(&self) -> Result<Vec<RemoteAttachmentRecord>, RemoteError> {
        self.begin(Op::List, "").await?;
        let state = lock(&self.state);
        Ok(state
            .files
            .iter()
            .map(|(key, file)| self.record(key, file))
            .collect())
    }

    async fn upload(
        &self,
        key: &AssetKey,
        data: Vec<u8>,
    ) -> Result<RemoteAttachmentRecord, RemoteError> {
        self.begin(Op::Upload, key.as_str()).await?;
        let mut state = lock(&self.state);
        state.log.push(format!("upload:{key}"));
        let existing = state.files.get(key).map(|f| (f.id.clone(), f.version));
        let (id, version) = match existing {
            Some((id, version)) => (id, version + 1),
            None => (next_id(&mut state), 1),
        };
        let file = StoredFile { id, data, version };
        let record = self.record(key, &file);
        state.files.insert(key.clone(), file);
        Ok(record)
    }

    async fn delete(&self, id: &RemoteId) -> Result<(), RemoteError> {
        self.begin(Op::Delete, id.as_str()).await?;
        let mut state = lock(&self.state);
        state.log.push(format!("delete:{id}"));
        let key = state
            .files
            .iter()
            .find(|(_, f)| &f.id == id)
            .map(|(k, _)| k.clone());
        match key {
            Some(key) => {
                state.files.remove(&key);
                Ok(())
            }
            None => Err(RemoteError::NotFound(format!("attachment {id}"))),
        }
    }

    async fn download(&self, id: &RemoteId) -> Result<Vec<u8>, RemoteError> {
        self.begin(Op::Download, id.as_str()).await?;
        let state = lock(&self.state);
        state
            .files
            .values()
            .find(|f| &f.id == id)
            .map(|f| f.data.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("attachment {id}")))
    }

    async fn publish_document(&self, title: &str, body: &str) -> Result<(), RemoteError> {
        self.begin(Op::Publish, "").await?;
        lock(&self.state)
            .published
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

/// Renderer that puts every key in one section and remembers its inputs
#[derive(Default)]
pub struct RecordingRenderer {
    classified: Mutex<Vec<Vec<AssetKey>>>,
    history_lens: Mutex<Vec<usize>>,
    notes: Mutex<Vec<Notes>>,
}

impl RecordingRenderer {
    pub fn classified(&self) -> Vec<Vec<AssetKey>> {
        lock(&self.classified).clone()
    }

    pub fn render_count(&self) -> usize {
        lock(&self.history_lens).len()
    }

    pub fn history_lens(&self) -> Vec<usize> {
        lock(&self.history_lens).clone()
    }

    /// Notes passed to each render call
    pub fn notes(&self) -> Vec<Notes> {
        lock(&self.notes).clone()
    }
}

impl IDocumentRenderer for RecordingRenderer {
    fn title(&self) -> String {
        "Test Gallery".to_string()
    }

    fn classify(&self, keys: &[AssetKey]) -> Categories {
        lock(&self.classified).push(keys.to_vec());
        let mut categories = Categories::new();
        categories.push(Section {
            id: "all".into(),
            title: "All".into(),
            keys: keys.to_vec(),
        });
        categories
    }

    fn render(&self, categories: &Categories, history: &[HistoryEntry], notes: &Notes) -> String {
        lock(&self.history_lens).push(history.len());
        lock(&self.notes).push(notes.clone());
        format!("{} assets, {} history", categories.total(), history.len())
    }
}
