// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous media download pipeline.
//!
//! The webhook path only writes a `received` record and calls
//! [`MediaQueue::enqueue`]. A fixed pool of workers then drives each record
//! through `downloading -> processing -> completed | failed`. Every step is
//! a compare-and-set in storage, so a record is only ever worked by one
//! worker and never leaves a terminal state through this module.
//!
//! Records that miss the queue (full queue, crash, restart) stay in
//! `received` and are picked up by [`recover_pending`], which runs at
//! startup and periodically. Records a previous run left in `downloading`
//! or `processing` are failed by [`fail_interrupted`] before the workers
//! start, so an operator can replay them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use relaydesk_config::model::MediaConfig;
use relaydesk_core::types::{MediaCompletion, MediaRecord, MediaStatus, extension_for_mime};
use relaydesk_core::{RelaydeskError, StorageAdapter};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sending half of the media job queue.
///
/// Cheap to clone; handed to the webhook pipeline and the operator service.
/// Tracks which ids are waiting in the channel so an id is never queued
/// twice. Whoever drains the receiving half calls
/// [`dequeued`](Self::dequeued) for each id it takes.
#[derive(Clone)]
pub struct MediaQueue {
    tx: mpsc::Sender<String>,
    waiting: Arc<std::sync::Mutex<HashSet<String>>>,
}

impl MediaQueue {
    /// Creates a bounded queue and its receiving half.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            waiting: Arc::new(std::sync::Mutex::new(HashSet::new())),
        };
        (queue, rx)
    }

    // The set only deduplicates; a panic while holding it leaves it usable.
    fn waiting(&self) -> MutexGuard<'_, HashSet<String>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a media record for download without waiting.
    ///
    /// Returns false when the queue is full or closed; the record then
    /// stays in `received` until the next recovery sweep. An id already
    /// waiting in the queue is not sent again.
    pub fn enqueue(&self, media_id: &str) -> bool {
        if !self.waiting().insert(media_id.to_string()) {
            debug!(media_id, "media already queued");
            return true;
        }
        let reason = match self.tx.try_send(media_id.to_string()) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Full(_)) => "media queue full; left for recovery sweep",
            Err(mpsc::error::TrySendError::Closed(_)) => {
                "media queue closed; left for recovery sweep"
            }
        };
        self.waiting().remove(media_id);
        warn!(media_id, "{reason}");
        false
    }

    /// Whether `media_id` is waiting in the queue.
    pub fn is_queued(&self, media_id: &str) -> bool {
        self.waiting().contains(media_id)
    }

    /// Records that `media_id` was taken off the receiving half.
    pub fn dequeued(&self, media_id: &str) {
        self.waiting().remove(media_id);
    }
}

/// How a single job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(MediaCompletion),
    Failed(String),
    /// The record was missing or not in the state this step expected.
    Skipped,
}

/// Downloads and stores one media record at a time.
#[derive(Clone)]
pub struct MediaProcessor {
    storage: Arc<dyn StorageAdapter>,
    client: reqwest::Client,
    storage_dir: PathBuf,
    max_download_bytes: u64,
}

impl MediaProcessor {
    pub fn new(storage: Arc<dyn StorageAdapter>, config: &MediaConfig) -> Result<Self, RelaydeskError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| RelaydeskError::Provider {
                message: format!("failed to build media HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            storage,
            client,
            storage_dir: PathBuf::from(&config.storage_dir),
            max_download_bytes: config.max_download_bytes,
        })
    }

    /// Runs one record from `received` to a terminal state.
    pub async fn process(&self, media_id: &str) -> Result<JobOutcome, RelaydeskError> {
        let Some(record) = self.storage.get_media(media_id).await? else {
            warn!(media_id, "media job for unknown record");
            return Ok(JobOutcome::Skipped);
        };
        if !self
            .storage
            .transition_media(media_id, MediaStatus::Received, MediaStatus::Downloading, None)
            .await?
        {
            debug!(media_id, status = %record.status, "media record not claimable");
            return Ok(JobOutcome::Skipped);
        }

        let started = Instant::now();
        let bytes = match self.download(&record.source_url).await {
            Ok(bytes) => bytes,
            Err(reason) => {
                return self
                    .fail(media_id, MediaStatus::Downloading, reason)
                    .await;
            }
        };
        relaydesk_prometheus::record_media_download(started.elapsed().as_secs_f64());

        if !self
            .storage
            .transition_media(media_id, MediaStatus::Downloading, MediaStatus::Processing, None)
            .await?
        {
            debug!(media_id, "media record changed during download");
            return Ok(JobOutcome::Skipped);
        }

        let completion = match self.store(&record, &bytes).await {
            Ok(completion) => completion,
            Err(reason) => {
                return self.fail(media_id, MediaStatus::Processing, reason).await;
            }
        };

        if !self.storage.complete_media(media_id, &completion).await? {
            debug!(media_id, "media record changed during processing");
            return Ok(JobOutcome::Skipped);
        }
        info!(
            media_id,
            path = %completion.file_path,
            mime = %completion.mime_type,
            size = completion.size_bytes,
            "media stored"
        );
        relaydesk_prometheus::record_media_job("completed");
        Ok(JobOutcome::Completed(completion))
    }

    /// Fails a record whose job was cut short by a storage error, from
    /// whichever in-flight state it reached.
    pub async fn abandon(&self, media_id: &str, reason: &str) {
        let reason = format!("{INTERRUPTED}: {reason}");
        for from in [MediaStatus::Downloading, MediaStatus::Processing] {
            match self
                .storage
                .transition_media(media_id, from, MediaStatus::Failed, Some(&reason))
                .await
            {
                Ok(true) => {
                    relaydesk_prometheus::record_media_job("failed");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(media_id, error = %e, "could not fail abandoned media job");
                    return;
                }
            }
        }
    }

    async fn fail(
        &self,
        media_id: &str,
        from: MediaStatus,
        reason: String,
    ) -> Result<JobOutcome, RelaydeskError> {
        warn!(media_id, from = %from, reason = %reason, "media job failed");
        if self
            .storage
            .transition_media(media_id, from, MediaStatus::Failed, Some(&reason))
            .await?
        {
            relaydesk_prometheus::record_media_job("failed");
            Ok(JobOutcome::Failed(reason))
        } else {
            Ok(JobOutcome::Skipped)
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("download failed: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("download returned {status}"));
        }
        if let Some(len) = response.content_length()
            && len > self.max_download_bytes
        {
            return Err(format!(
                "download of {len} bytes exceeds limit of {}",
                self.max_download_bytes
            ));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("download interrupted: {e}"))?
        {
            if (bytes.len() + chunk.len()) as u64 > self.max_download_bytes {
                return Err(format!(
                    "download exceeds limit of {} bytes",
                    self.max_download_bytes
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        if bytes.is_empty() {
            return Err("download returned an empty body".to_string());
        }
        Ok(bytes)
    }

    async fn store(&self, record: &MediaRecord, bytes: &[u8]) -> Result<MediaCompletion, String> {
        let mime_type = resolve_mime(bytes, record.mime_type.as_deref());
        let ext = extension_for_mime(&mime_type).unwrap_or("bin");
        let duration_secs = record.duration_secs.or_else(|| {
            if mime_type == "audio/ogg" {
                ogg_duration_secs(bytes)
            } else {
                None
            }
        });

        let path = media_path(&self.storage_dir, &record.company_id, &record.id, ext);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;

        Ok(MediaCompletion {
            file_path: path.to_string_lossy().into_owned(),
            mime_type,
            size_bytes: bytes.len() as i64,
            duration_secs,
        })
    }
}

/// `{storage_dir}/{company_id}/{media_id}.{ext}`.
pub fn media_path(storage_dir: &Path, company_id: &str, media_id: &str, ext: &str) -> PathBuf {
    storage_dir.join(company_id).join(format!("{media_id}.{ext}"))
}

/// Sniffed type when recognizable, else the declared one, else octet-stream.
///
/// Office documents are ZIP containers; a declared OOXML type is kept over a
/// sniffed `application/zip`.
pub fn resolve_mime(bytes: &[u8], declared: Option<&str>) -> String {
    let declared = declared
        .map(|d| d.split(';').next().unwrap_or(d).trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty());
    match (sniff_mime(bytes), declared) {
        (Some("application/zip"), Some(d)) if d.starts_with("application/vnd.openxmlformats") => d,
        (Some(sniffed), _) => sniffed.to_string(),
        (None, Some(d)) => d,
        (None, None) => "application/octet-stream".to_string(),
    }
}

/// Identifies common WhatsApp media formats by their magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let starts = |magic: &[u8]| bytes.starts_with(magic);
    if starts(b"OggS") {
        Some("audio/ogg")
    } else if starts(b"ID3") || (bytes.len() > 1 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        Some("audio/mpeg")
    } else if starts(b"#!AMR") {
        Some("audio/amr")
    } else if starts(b"RIFF") && bytes.len() >= 12 && &bytes[8..12] == b"WAVE" {
        Some("audio/wav")
    } else if starts(b"RIFF") && bytes.len() >= 12 && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if starts(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if starts(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if starts(b"GIF8") {
        Some("image/gif")
    } else if starts(b"%PDF") {
        Some("application/pdf")
    } else if starts(b"PK\x03\x04") {
        Some("application/zip")
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        match &bytes[8..12] {
            b"M4A " | b"M4B " => Some("audio/mp4"),
            b"qt  " => Some("video/quicktime"),
            brand if brand.starts_with(b"3gp") => Some("video/3gpp"),
            _ => Some("video/mp4"),
        }
    } else {
        None
    }
}

/// Playback length of an Ogg Opus or Ogg Vorbis stream, rounded to seconds.
///
/// Reads the granule position of the last page and the sample rate (and
/// Opus pre-skip) from the stream header.
pub fn ogg_duration_secs(bytes: &[u8]) -> Option<u32> {
    let last_page = bytes
        .windows(4)
        .rposition(|w| w == b"OggS")
        .filter(|&idx| idx + 14 <= bytes.len())?;
    let granule = u64::from_le_bytes(bytes[last_page + 6..last_page + 14].try_into().ok()?);
    if granule == u64::MAX {
        return None;
    }

    let (rate, pre_skip) = if let Some(pos) = find(bytes, b"OpusHead") {
        let raw = bytes.get(pos + 10..pos + 12)?;
        (48_000u64, u64::from(u16::from_le_bytes([raw[0], raw[1]])))
    } else if let Some(pos) = find(bytes, b"\x01vorbis") {
        let raw = bytes.get(pos + 12..pos + 16)?;
        (u64::from(u32::from_le_bytes(raw.try_into().ok()?)), 0)
    } else {
        return None;
    };
    if rate == 0 {
        return None;
    }

    let samples = granule.saturating_sub(pre_skip);
    u32::try_from(samples.checked_add(rate / 2)? / rate).ok()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Re-enqueues records left in `received`. Returns how many were queued.
pub async fn recover_pending(
    storage: &dyn StorageAdapter,
    queue: &MediaQueue,
    limit: usize,
) -> Result<usize, RelaydeskError> {
    let pending = storage
        .list_media(Some(MediaStatus::Received), limit as i64)
        .await?;
    let mut queued = 0;
    for record in &pending {
        if queue.is_queued(&record.id) {
            continue;
        }
        if !queue.enqueue(&record.id) {
            break;
        }
        queued += 1;
    }
    if queued > 0 {
        info!(queued, "re-enqueued pending media");
    }
    Ok(queued)
}

/// Error recorded on records failed by [`fail_interrupted`].
pub const INTERRUPTED: &str = "interrupted before completion";

/// Fails every record left in `downloading` or `processing`.
///
/// Only call this while no worker is running; any record in those states is
/// then left over from a previous run. Returns how many were failed.
pub async fn fail_interrupted(storage: &dyn StorageAdapter) -> Result<usize, RelaydeskError> {
    const BATCH: i64 = 500;
    let mut failed = 0;
    for status in [MediaStatus::Downloading, MediaStatus::Processing] {
        loop {
            let batch = storage.list_media(Some(status), BATCH).await?;
            let mut moved = 0;
            for record in &batch {
                if storage
                    .transition_media(&record.id, status, MediaStatus::Failed, Some(INTERRUPTED))
                    .await?
                {
                    relaydesk_prometheus::record_media_job("failed");
                    moved += 1;
                }
            }
            failed += moved;
            if moved == 0 || (batch.len() as i64) < BATCH {
                break;
            }
        }
    }
    if failed > 0 {
        warn!(failed, "failed media records interrupted by a previous run");
    }
    Ok(failed)
}

/// Running worker pool and sweep task.
pub struct MediaWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl MediaWorkers {
    /// Starts `config.workers` workers on `rx` plus the recovery sweep.
    ///
    /// Call [`fail_interrupted`] first. Workers stop taking jobs once
    /// `cancel` fires; a job in progress runs to its terminal state first.
    pub fn start(
        processor: MediaProcessor,
        queue: MediaQueue,
        rx: mpsc::Receiver<String>,
        config: &MediaConfig,
        cancel: CancellationToken,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(config.workers + 1);

        for worker in 0..config.workers.max(1) {
            let processor = processor.clone();
            let queue = queue.clone();
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                debug!(worker, "media worker started");
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            job = rx.recv() => job,
                        }
                    };
                    let Some(media_id) = job else { break };
                    queue.dequeued(&media_id);
                    if let Err(e) = processor.process(&media_id).await {
                        error!(worker, media_id = %media_id, error = %e, "media job aborted by storage error");
                        processor.abandon(&media_id, &e.to_string()).await;
                    }
                }
                debug!(worker, "media worker stopped");
            }));
        }

        let storage = Arc::clone(&processor.storage);
        let capacity = config.queue_capacity;
        let interval = config.sweep_interval_secs;
        handles.push(tokio::spawn(async move {
            if let Err(e) = recover_pending(storage.as_ref(), &queue, capacity).await {
                error!(error = %e, "startup media recovery failed");
            }
            if interval == 0 {
                return;
            }
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = recover_pending(storage.as_ref(), &queue, capacity).await {
                            error!(error = %e, "media recovery sweep failed");
                        }
                    }
                }
            }
        }));

        info!(workers = config.workers.max(1), "media workers started");
        Self { handles }
    }

    /// Waits for every worker to finish after cancellation.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "media worker panicked");
            }
        }
    }
}

/// Operator actions on media records.
#[derive(Clone)]
pub struct MediaService {
    storage: Arc<dyn StorageAdapter>,
    queue: MediaQueue,
}

impl MediaService {
    pub fn new(storage: Arc<dyn StorageAdapter>, queue: MediaQueue) -> Self {
        Self { storage, queue }
    }

    /// Resets a `failed` record to `received`, optionally with a fresh URL,
    /// and queues it again.
    pub async fn replay(
        &self,
        media_id: &str,
        source_url: Option<&str>,
    ) -> Result<MediaRecord, RelaydeskError> {
        let record = self.storage.replay_media(media_id, source_url).await?;
        info!(media_id, replay_count = record.replay_count, "media replay requested");
        self.queue.enqueue(media_id);
        Ok(record)
    }

    /// Fails a record that is not yet terminal.
    pub async fn mark_failed(
        &self,
        media_id: &str,
        reason: &str,
    ) -> Result<MediaRecord, RelaydeskError> {
        let record = self.storage.mark_media_failed(media_id, reason).await?;
        info!(media_id, reason, "media marked failed by operator");
        relaydesk_prometheus::record_media_job("failed");
        Ok(record)
    }
}
