//! Upload and edit pipelines.
//!
//! Both stores fail independently, so writes follow a fixed order:
//!
//! - upload: stage every blob, then insert the chart row
//! - edit: stage new blobs, commit metadata, then delete blobs nothing
//!   references any more (plus replays when the playable chart changed)
//!
//! A failure at any step leaves at worst orphaned blobs, never a row that
//! points at a missing one.

use std::sync::Arc;

use cas::{content_type, BlobBatch, BlobStore, ContentHash, PendingBlob};
use chartconf::{LimitsConfig, VaultConfig};
use chartfmt::{convert, detect_supported, ConvertOptions, DetectLimits};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::changes::ChangeSet;
use crate::diff::diff;
use crate::error::IngestError;
use crate::ids::{ChartId, OwnerId};
use crate::jacket::{CommandRenderer, JacketRenderer, PassthroughRenderer, RenderedJacket};
use crate::locks::ChartLocks;
use crate::metadata::{ChartRecord, EditCommit, MetadataStore};
use crate::request::{EditIntents, EditRequest, SlotIntent, Upload, UploadRequest};
use crate::slots::{AssetSet, AssetSlot, FileKind};
use crate::sniff;
use crate::validate::{check_metadata, check_patch, check_size};
use crate::worker::WorkerPool;

/// What an edit did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub revision: i64,
    pub assets: AssetSet,
    /// Distinct blobs written.
    pub uploaded: usize,
    /// Unreferenced blobs removed.
    pub deleted: usize,
    /// Deletes that failed and left an orphan behind.
    pub orphaned: usize,
    pub replays_deleted: usize,
}

pub struct Ingest {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    renderer: Arc<dyn JacketRenderer>,
    workers: WorkerPool,
    limits: LimitsConfig,
    detect_limits: DetectLimits,
    convert_options: ConvertOptions,
    locks: ChartLocks,
}

impl Ingest {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        config: &VaultConfig,
    ) -> Self {
        let renderer: Arc<dyn JacketRenderer> = match config
            .ingest
            .renderer
            .as_deref()
            .and_then(CommandRenderer::from_command_line)
        {
            Some(command) => Arc::new(command),
            None => Arc::new(PassthroughRenderer),
        };
        let convert_options = if config.ingest.debug {
            ConvertOptions::debug()
        } else {
            ConvertOptions::default()
        };

        Self {
            blobs,
            metadata,
            renderer,
            workers: WorkerPool::new(config.workers.max_blocking),
            limits: config.limits.clone(),
            detect_limits: DetectLimits::for_script_limit(config.limits.files.chart),
            convert_options,
            locks: ChartLocks::new(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn JacketRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Detect and convert a script into the canonical container.
    async fn convert_script(&self, upload: &Upload) -> Result<PendingBlob, IngestError> {
        let bytes = upload.bytes.clone();
        let limits = self.detect_limits;
        let options = self.convert_options;

        let container = self
            .workers
            .run("convert", move || {
                let format = detect_supported(&bytes, &limits)?;
                debug!(%format, size = bytes.len(), "script detected");
                convert(format, &bytes, &options)
            })
            .await??;

        Ok(PendingBlob::new(container, content_type::APPLICATION_GZIP))
    }

    async fn render_jacket(&self, upload: &Upload) -> Result<RenderedJacket, IngestError> {
        let bytes = upload.bytes.clone();
        let renderer = self.renderer.clone();
        self.workers
            .run("jacket", move || renderer.render(&bytes))
            .await?
            .map_err(|e| IngestError::Render(format!("{:#}", e)))
    }

    /// Create a chart. Returns its new id.
    #[instrument(skip_all, fields(owner.id = %owner, chart.id = tracing::field::Empty))]
    pub async fn upload(&self, owner: &OwnerId, request: UploadRequest) -> Result<ChartId, IngestError> {
        check_metadata(&request.metadata, &self.limits)?;
        for (kind, file) in request.files() {
            check_size(kind, file, &self.limits.files)?;
        }
        for (kind, file) in request.files() {
            sniff::check_kind(kind, &file.bytes)?;
        }

        let chart_id = ChartId::generate();
        tracing::Span::current().record("chart.id", tracing::field::display(&chart_id));

        let (script, jacket) = tokio::try_join!(
            self.convert_script(&request.script),
            self.render_jacket(&request.jacket),
        )?;
        let [(_, jacket), (_, variant1), (_, variant2)] = jacket.blobs();
        let audio = PendingBlob::new(request.audio.bytes.clone(), content_type::AUDIO_MPEG);
        let preview = request
            .preview
            .as_ref()
            .map(|u| PendingBlob::new(u.bytes.clone(), content_type::AUDIO_MPEG));
        let background = request
            .background
            .as_ref()
            .map(|u| PendingBlob::new(u.bytes.clone(), content_type::IMAGE_PNG));

        let assets = AssetSet::new(
            script.hash.clone(),
            audio.hash.clone(),
            jacket.hash.clone(),
            variant1.hash.clone(),
            variant2.hash.clone(),
        )
        .with_preview(preview.as_ref().map(|b| b.hash.clone()))
        .with_background(background.as_ref().map(|b| b.hash.clone()));

        let mut uploads = vec![script, audio, jacket, variant1, variant2];
        uploads.extend(preview);
        uploads.extend(background);

        let batch = BlobBatch::new(self.blobs.as_ref(), owner.as_str(), chart_id.as_str());
        let report = batch.create_all(&uploads).await?;

        let record = ChartRecord::new(
            chart_id.clone(),
            owner.clone(),
            request.metadata.normalized(),
            assets,
        );
        self.metadata
            .create_chart(&record)
            .await
            .map_err(IngestError::MetadataCommit)?;

        info!(blobs = report.written.len(), "chart uploaded");
        Ok(chart_id)
    }

    /// Turn resolved intents into slot changes, converting and rendering as
    /// needed.
    async fn stage_changes(&self, intents: &EditIntents) -> Result<ChangeSet, IngestError> {
        let (script, jacket) = tokio::try_join!(
            async {
                match &intents.script {
                    SlotIntent::Replace(upload) => self.convert_script(upload).await.map(Some),
                    _ => Ok(None),
                }
            },
            async {
                match &intents.jacket {
                    SlotIntent::Replace(upload) => self.render_jacket(upload).await.map(Some),
                    _ => Ok(None),
                }
            },
        )?;

        let mut changes = ChangeSet::new();
        if let Some(blob) = script {
            changes.replace(AssetSlot::Script, blob)?;
        }
        if let Some(rendered) = jacket {
            changes.replace_jacket(&rendered);
        }
        for kind in [FileKind::Audio, FileKind::Preview, FileKind::Background] {
            let slot = kind.slot();
            match intents.get(kind) {
                SlotIntent::Replace(upload) => {
                    changes.replace(slot, PendingBlob::new(upload.bytes.clone(), slot.content_type()))?;
                }
                SlotIntent::Remove => {
                    changes.remove(slot)?;
                }
                SlotIntent::Keep => {}
            }
        }
        Ok(changes)
    }

    /// Apply an edit to a chart the caller owns.
    #[instrument(skip_all, fields(owner.id = %owner, chart.id = %chart_id))]
    pub async fn edit(
        &self,
        owner: &OwnerId,
        chart_id: &ChartId,
        request: EditRequest,
    ) -> Result<EditOutcome, IngestError> {
        let (patch, intents) = request.into_changes()?;
        check_patch(&patch, &self.limits)?;
        for (kind, file) in intents.uploads() {
            check_size(kind, file, &self.limits.files)?;
        }
        for (kind, file) in intents.uploads() {
            sniff::check_kind(kind, &file.bytes)?;
        }

        let _guard = self.locks.lock(chart_id).await;

        let current = self
            .metadata
            .get_chart(chart_id)
            .await
            .map_err(IngestError::MetadataRead)?
            .ok_or(IngestError::NotFound)?;
        if &current.owner != owner {
            return Err(IngestError::Forbidden);
        }

        let changes = self.stage_changes(&intents).await?;
        let diff = diff(&current.assets, &changes);
        let chart_changed =
            diff.updates_slot(AssetSlot::Script) || diff.updates_slot(AssetSlot::Audio);
        debug!(
            uploads = diff.pending_uploads.len(),
            deletes = diff.actual_deletes.len(),
            updates = diff.updates.len(),
            chart_changed,
            "asset diff computed"
        );

        let batch = BlobBatch::new(self.blobs.as_ref(), current.owner.as_str(), chart_id.as_str());
        let written = batch.create_all(&diff.pending_uploads).await?;

        let commit = EditCommit {
            chart: chart_id.clone(),
            expected_revision: current.revision,
            patch,
            updates: diff.updates.clone(),
            reset_leaderboards: chart_changed,
        };
        let revision = if commit.patch.is_empty() && commit.updates.is_empty() {
            current.revision
        } else {
            self.metadata
                .commit_edit(&commit)
                .await
                .map_err(IngestError::MetadataCommit)?
        };

        let deleted = batch.delete_all(diff.actual_deletes.iter().cloned()).await;
        let mut orphaned = deleted.failed.len();
        let mut replays_deleted = 0;
        if chart_changed {
            let replays = batch.delete_replays().await;
            replays_deleted = replays.deleted.len();
            orphaned += replays.failed.len();
        }
        if orphaned > 0 {
            warn!(orphaned, "edit committed with undeleted objects");
        }

        let outcome = EditOutcome {
            revision,
            assets: current.assets.apply(&diff.updates),
            uploaded: written.written.len(),
            deleted: deleted.deleted.len(),
            orphaned,
            replays_deleted,
        };
        info!(
            revision,
            uploaded = outcome.uploaded,
            deleted = outcome.deleted,
            replays_deleted,
            "chart edited"
        );
        Ok(outcome)
    }

    /// Look up a chart's stored record.
    pub async fn show(&self, chart_id: &ChartId) -> Result<ChartRecord, IngestError> {
        self.metadata
            .get_chart(chart_id)
            .await
            .map_err(IngestError::MetadataRead)?
            .ok_or(IngestError::NotFound)
    }

    /// Hash a script the way an upload would store it, without storing it.
    pub async fn canonicalize(&self, script: &Upload) -> Result<(ContentHash, bytes::Bytes), IngestError> {
        check_size(FileKind::Script, script, &self.limits.files)?;
        let blob = self.convert_script(script).await?;
        Ok((blob.hash, blob.data))
    }
}
