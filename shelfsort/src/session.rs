//! Per-connection session: upload bookkeeping, prediction resolution and export.
//!
//! Flow:
//! 1. `init_upload` opens a cycle with the expected file count and root directory
//! 2. `file_upload` stores each file and groups it under a product name
//! 3. `init_predictions` classifies every product and resolves it through the
//!    selected mode, either approving it directly or queueing it for a human
//! 4. `prediction_approval` answers the single outstanding approval request
//! 5. Once every product has a class the assignments are exported and the
//!    session returns to idle, ready for another cycle on the same connection
//!
//! A session is owned by exactly one worker task; messages are handled one at
//! a time in arrival order, so no field needs locking.

use std::sync::Arc;

use futures::StreamExt;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{ClassScores, aggregate};
use crate::approval::{ApprovalError, ApprovalQueue};
use crate::export::{ApprovedAssignment, ExportEncoder};
use crate::oracle::{Oracle, OracleError};
use crate::policy::{Decision, ResolutionMode, resolve};
use crate::protocol::{FileUpload, InboundMessage, InitUpload, OutboundMessage, PredictionApproval};
use crate::storage::Storage;

/// Unique identifier for a client session, assigned when the connection opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection's writer is gone; the session cannot make progress.
    #[error("client connection closed")]
    OutboxClosed,
}

/// Sending half of a session's outbound notification channel.
#[derive(Debug, Clone)]
pub struct Outbox(mpsc::Sender<OutboundMessage>);

impl Outbox {
    pub fn new(tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self(tx)
    }

    pub async fn send(&self, message: OutboundMessage) -> Result<(), SessionError> {
        self.0
            .send(message)
            .await
            .map_err(|_| SessionError::OutboxClosed)
    }
}

/// Shared, stateless collaborators used by every session.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn Storage>,
    pub oracle: Arc<dyn Oracle>,
    pub exporter: Arc<dyn ExportEncoder>,
    /// Files of one product classified concurrently (1 = sequential).
    pub prediction_concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Uploading,
    Predicting,
    /// Predicting with one approval request outstanding.
    AwaitingApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Uploading,
    Predicting,
}

/// Product a file belongs to.
///
/// Files directly inside `root_dir` are their own product, named after the file
/// without its extension. Files in a subdirectory are grouped under the name of
/// their immediate parent directory.
pub fn product_name(file_name: &str, root_dir: &str) -> String {
    let (dir, base) = file_name.rsplit_once('/').unwrap_or(("", file_name));
    let dir = normalize_dir(dir);

    if dir == normalize_dir(root_dir) {
        return file_stem(base).to_string();
    }

    match dir.rsplit('/').next() {
        Some(parent) if !parent.is_empty() && parent != "." => parent.to_string(),
        _ => file_stem(base).to_string(),
    }
}

fn normalize_dir(dir: &str) -> &str {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        return if dir.starts_with('/') { "/" } else { "." };
    }
    match trimmed.strip_prefix("./") {
        Some(rest) if !rest.is_empty() => rest,
        _ => trimmed,
    }
}

fn file_stem(base: &str) -> &str {
    match base.rfind('.') {
        Some(i) if i > 0 => &base[..i],
        _ => base,
    }
}

pub struct Session {
    id: SessionId,
    collaborators: Collaborators,
    outbox: Outbox,
    phase: Phase,
    mode: ResolutionMode,
    root_dir: Option<String>,
    upload_id: Option<u64>,
    expected_files: u64,
    uploaded_files: u64,
    cancelled: bool,
    files_by_product: IndexMap<String, Vec<String>>,
    approved: Vec<ApprovedAssignment>,
    approvals: ApprovalQueue,
}

impl Session {
    pub fn new(id: SessionId, collaborators: Collaborators, outbox: Outbox) -> Self {
        Self {
            id,
            collaborators,
            outbox,
            phase: Phase::Idle,
            mode: ResolutionMode::default(),
            root_dir: None,
            upload_id: None,
            expected_files: 0,
            uploaded_files: 0,
            cancelled: false,
            files_by_product: IndexMap::new(),
            approved: Vec::new(),
            approvals: ApprovalQueue::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Uploading => SessionState::Uploading,
            Phase::Predicting if self.approvals.awaiting_approval() => {
                SessionState::AwaitingApproval
            }
            Phase::Predicting => SessionState::Predicting,
        }
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    pub fn root_dir(&self) -> Option<&str> {
        self.root_dir.as_deref()
    }

    pub fn expected_files(&self) -> u64 {
        self.expected_files
    }

    pub fn uploaded_files(&self) -> u64 {
        self.uploaded_files
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn files_by_product(&self) -> &IndexMap<String, Vec<String>> {
        &self.files_by_product
    }

    pub fn approved(&self) -> &[ApprovedAssignment] {
        &self.approved
    }

    pub fn awaiting_approval(&self) -> bool {
        self.approvals.awaiting_approval()
    }

    pub fn pending_approvals(&self) -> usize {
        self.approvals.pending_len()
    }

    /// Consume messages until the channel closes, the connection is cancelled,
    /// or the client can no longer be reached.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<InboundMessage>, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            if let Err(e) = self.handle(message).await {
                tracing::warn!(session = %self.id, error = %e, "Stopping session worker");
                break;
            }
        }
        tracing::debug!(session = %self.id, "Session worker finished");
    }

    /// Apply one inbound message.
    ///
    /// Messages that do not fit the current state are dropped without telling
    /// the client. Only a lost connection is an error.
    pub async fn handle(&mut self, message: InboundMessage) -> Result<(), SessionError> {
        tracing::debug!(session = %self.id, kind = message.kind(), state = ?self.state(), "Handling message");

        match message {
            InboundMessage::InitUpload(init) => {
                self.init_upload(init);
                Ok(())
            }
            InboundMessage::CancelUpload => {
                self.cancel_upload();
                Ok(())
            }
            InboundMessage::FileUpload(upload) => self.file_upload(upload).await,
            InboundMessage::SelectMode(select) => self.select_mode(select.mode).await,
            InboundMessage::InitPredictions => self.init_predictions().await,
            InboundMessage::PredictionApproval(approval) => {
                self.prediction_approval(approval).await
            }
        }
    }

    fn init_upload(&mut self, init: InitUpload) {
        self.reset_cycle();
        self.expected_files = init.number_of_files;
        self.root_dir = Some(init.root_dir);
        self.upload_id = init.upload_id;
        self.cancelled = false;
        self.phase = Phase::Uploading;

        tracing::info!(
            session = %self.id,
            expected_files = self.expected_files,
            root_dir = ?self.root_dir,
            upload_id = ?self.upload_id,
            "Upload started"
        );
    }

    fn cancel_upload(&mut self) {
        if self.phase != Phase::Uploading {
            tracing::debug!(session = %self.id, state = ?self.state(), "Ignoring cancel outside upload");
            return;
        }

        self.root_dir = None;
        self.upload_id = None;
        self.files_by_product.clear();
        self.uploaded_files = 0;
        self.expected_files = 0;
        self.cancelled = true;
        self.phase = Phase::Idle;

        tracing::info!(session = %self.id, "Upload cancelled");
    }

    async fn file_upload(&mut self, upload: FileUpload) -> Result<(), SessionError> {
        if self.cancelled {
            tracing::debug!(session = %self.id, file = %upload.file_name, "Upload cancelled, ignoring file");
            return Ok(());
        }
        let Some(root_dir) = self.root_dir.as_deref().filter(|_| self.phase == Phase::Uploading)
        else {
            tracing::warn!(session = %self.id, file = %upload.file_name, state = ?self.state(), "Ignoring file outside upload");
            return Ok(());
        };
        if self.uploaded_files >= self.expected_files {
            tracing::warn!(
                session = %self.id,
                file = %upload.file_name,
                expected_files = self.expected_files,
                "Ignoring file beyond announced count"
            );
            return Ok(());
        }

        let product = product_name(&upload.file_name, root_dir);

        if let Err(e) = self
            .collaborators
            .storage
            .save(&upload.file_name, &upload.file_data)
            .await
        {
            tracing::error!(session = %self.id, file = %upload.file_name, error = %e, "Failed to store upload");
            return Ok(());
        }

        tracing::debug!(session = %self.id, file = %upload.file_name, product = %product, "File uploaded");
        self.files_by_product
            .entry(product)
            .or_default()
            .push(upload.file_name);
        self.uploaded_files += 1;

        self.send_upload_progress().await
    }

    async fn select_mode(&mut self, mode: ResolutionMode) -> Result<(), SessionError> {
        self.mode = mode;
        tracing::info!(session = %self.id, mode = %mode, "Mode selected");
        self.outbox.send(OutboundMessage::ModeSelected { mode }).await
    }

    async fn init_predictions(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Uploading {
            tracing::debug!(session = %self.id, state = ?self.state(), "Ignoring prediction start outside upload");
            return Ok(());
        }
        if self.files_by_product.is_empty() {
            tracing::debug!(session = %self.id, "No uploaded files, nothing to predict");
            return Ok(());
        }
        if self.uploaded_files != self.expected_files {
            tracing::warn!(
                session = %self.id,
                uploaded_files = self.uploaded_files,
                expected_files = self.expected_files,
                "Starting predictions before all announced files arrived"
            );
        }

        self.phase = Phase::Predicting;
        tracing::info!(
            session = %self.id,
            products = self.files_by_product.len(),
            mode = %self.mode,
            "Predictions started"
        );

        let products: Vec<(String, Vec<String>)> = self
            .files_by_product
            .iter()
            .map(|(product, files)| (product.clone(), files.clone()))
            .collect();

        for (product, files) in products {
            let scores = self.classify_files(&product, &files).await;
            let ranked = aggregate(product, files, &scores);

            match resolve(&ranked, self.mode) {
                Decision::AutoApprove(class) => {
                    tracing::info!(session = %self.id, product = %ranked.product_name, class = %class, "Auto-approved");
                    self.approved
                        .push(ApprovedAssignment::new(ranked.product_name, class));
                    self.send_prediction_progress().await?;
                }
                Decision::Queue => {
                    tracing::debug!(session = %self.id, product = %ranked.product_name, "Queued for approval");
                    self.approvals.enqueue(ranked);
                    self.dispatch_approval().await?;
                }
            }
        }

        self.send_prediction_progress().await?;
        self.complete_if_resolved().await
    }

    /// Classify the files of one product, keeping upload order in the result.
    ///
    /// Failed files are logged and left out.
    async fn classify_files(&self, product: &str, files: &[String]) -> Vec<ClassScores> {
        let oracle = Arc::clone(&self.collaborators.oracle);

        let results: Vec<(String, Result<ClassScores, OracleError>)> =
            futures::stream::iter(files.to_vec())
                .map(move |file| {
                    let oracle = Arc::clone(&oracle);
                    async move {
                        let result = oracle.classify(&file).await;
                        (file, result)
                    }
                })
                .buffered(self.collaborators.prediction_concurrency.max(1))
                .collect()
                .await;

        results
            .into_iter()
            .filter_map(|(file, result)| match result {
                Ok(scores) => Some(scores),
                Err(e) => {
                    tracing::error!(session = %self.id, product = %product, file = %file, error = %e, "Prediction failed, dropping file");
                    None
                }
            })
            .collect()
    }

    async fn prediction_approval(
        &mut self,
        approval: PredictionApproval,
    ) -> Result<(), SessionError> {
        match self.approvals.complete(&approval.product_name) {
            Ok(_) => {}
            Err(ApprovalError::NothingInFlight) => {
                tracing::debug!(session = %self.id, product = %approval.product_name, "Ignoring approval without outstanding request");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "Ignoring approval");
                return Ok(());
            }
        }

        tracing::info!(session = %self.id, product = %approval.product_name, class = %approval.class, "Approved");
        self.approved
            .push(ApprovedAssignment::new(approval.product_name, approval.class));

        self.send_prediction_progress().await?;
        self.dispatch_approval().await?;
        self.complete_if_resolved().await
    }

    async fn dispatch_approval(&mut self) -> Result<(), SessionError> {
        let Some(next) = self.approvals.try_dispatch() else {
            return Ok(());
        };
        let file_to_approve = next.clone();
        tracing::debug!(session = %self.id, product = %file_to_approve.product_name, "Requesting approval");
        self.outbox
            .send(OutboundMessage::PredictionApprovalRequest { file_to_approve })
            .await
    }

    async fn send_upload_progress(&self) -> Result<(), SessionError> {
        if self.expected_files == 0 {
            return Ok(());
        }
        let progress = self.uploaded_files as f64 / self.expected_files as f64 * 100.0;
        self.outbox
            .send(OutboundMessage::UploadProgress {
                progress,
                upload_id: self.upload_id,
            })
            .await
    }

    async fn send_prediction_progress(&self) -> Result<(), SessionError> {
        if self.files_by_product.is_empty() {
            return Ok(());
        }
        self.outbox
            .send(OutboundMessage::PredictionProgress {
                files_to_predict: self.files_by_product.len(),
                approved_files: self.approved.len(),
            })
            .await
    }

    async fn complete_if_resolved(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Predicting
            || self.files_by_product.is_empty()
            || self.approved.len() != self.files_by_product.len()
        {
            return Ok(());
        }

        let result = self.collaborators.exporter.encode(&self.approved);
        let products = self.approved.len();
        self.reset_cycle();
        self.phase = Phase::Idle;

        match result {
            Ok(csv_data) => {
                tracing::info!(session = %self.id, products, "Export ready");
                self.outbox.send(OutboundMessage::CsvFile { csv_data }).await
            }
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "Export failed, discarding cycle");
                Ok(())
            }
        }
    }

    fn reset_cycle(&mut self) {
        self.root_dir = None;
        self.upload_id = None;
        self.expected_files = 0;
        self.uploaded_files = 0;
        self.files_by_product.clear();
        self.approved.clear();
        self.approvals.clear();
    }
}
