//! Package retrieval orchestrator.
//!
//! Drives one package link through the pipeline:
//!
//! ```text
//! parse link ─► fetch manifest ─► for each file:
//!                                   for each window of ≤25 parts:
//!                                     fetch URLs ─► download + decrypt (pool)
//!                                   assemble
//! ```
//!
//! Batches are consumed as soon as they are fetched so their URLs cannot
//! expire while waiting behind other windows. A failing file never stops the
//! files after it; only link and manifest failures abort the package.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::assemble::FileAssembler;
use super::decrypt::{DecryptOptions, Passphrase, PartDecryptor};
use super::download::{DownloadOutcome, PartDownloader};
use super::error::{RetrievalError, RetrievalResult};
use super::report::{
    FileOutcome, FileReport, PackageReport, PartOutcome, PartTally, ProgressCallback,
    RetrievalEvent,
};
use super::staging::{PartState, StagingArea, DEFAULT_STAGING_DIR};
use crate::api::{ApiClient, FileEntry, SegmentBatch, SegmentUrl, SegmentWindows};
use crate::link::PackageLink;

/// Default number of parts processed concurrently.
pub const DEFAULT_PARALLEL_DOWNLOADS: usize = 4;

/// Settings for a retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Re-download and re-decrypt parts that are already staged.
    pub force: bool,
    /// Parts of one batch processed at once (minimum 1).
    pub parallel_downloads: usize,
    pub decrypt: DecryptOptions,
    pub staging_dir: PathBuf,
    /// Where assembled files are written.
    pub output_dir: PathBuf,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            force: false,
            parallel_downloads: DEFAULT_PARALLEL_DOWNLOADS,
            decrypt: DecryptOptions::default(),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            output_dir: PathBuf::from("."),
        }
    }
}

impl RetrievalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set the worker count. Zero is treated as one.
    pub fn with_parallel_downloads(mut self, parallel: usize) -> Self {
        self.parallel_downloads = parallel.max(1);
        self
    }

    pub fn with_decrypt_timeout(mut self, timeout: Duration) -> Self {
        self.decrypt.timeout = timeout;
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Per-file values shared by the workers of a batch.
struct FileContext<'a> {
    file: &'a FileEntry,
    passphrase: &'a Passphrase,
}

/// Retrieves packages end to end.
pub struct PackageRetriever {
    client: ApiClient,
    downloader: PartDownloader,
    decryptor: Arc<dyn PartDecryptor>,
    assembler: FileAssembler,
    staging: StagingArea,
    options: RetrievalOptions,
    on_event: Option<ProgressCallback>,
}

impl PackageRetriever {
    /// Create a retriever.
    ///
    /// Part downloads go through the same transport as `client`.
    pub fn new(
        client: ApiClient,
        decryptor: Arc<dyn PartDecryptor>,
        options: RetrievalOptions,
    ) -> Self {
        let staging = StagingArea::new(&options.staging_dir);
        let downloader =
            PartDownloader::new(Arc::clone(client.transport()), staging.clone(), options.force);
        let assembler = FileAssembler::new(staging.clone(), &options.output_dir);

        Self {
            client,
            downloader,
            decryptor,
            assembler,
            staging,
            options,
            on_event: None,
        }
    }

    /// Receive progress events while retrieving.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    /// Retrieve every file of the package behind `link`.
    ///
    /// # Errors
    ///
    /// Only link, metadata and manifest failures are returned as `Err`.
    /// Per-file failures are recorded in the returned report.
    pub fn retrieve(&self, link: &str) -> RetrievalResult<PackageReport> {
        let link = PackageLink::parse(link)?;
        info!(package = %link, "Retrieving package");

        let manifest = self.client.fetch_manifest(&link)?;
        debug!(package = %link, files = manifest.files.len(), "Fetched package information");
        self.emit(RetrievalEvent::PackageStarted {
            link: &link,
            files: manifest.files.len(),
        });

        let passphrase = Passphrase::new(&manifest.server_secret, link.key_code());
        let pool = self.build_pool();

        let files: Vec<FileReport> = manifest
            .files
            .iter()
            .map(|file| {
                let ctx = FileContext {
                    file,
                    passphrase: &passphrase,
                };
                self.retrieve_file(pool.as_ref(), &link, &ctx)
            })
            .collect();

        let report = PackageReport {
            package: link.to_string(),
            files,
        };
        info!(
            package = %report.package,
            files = report.files.len(),
            failed = report.failed_count(),
            "Package retrieval finished"
        );
        Ok(report)
    }

    /// Retrieve several packages one after another.
    ///
    /// A failing link does not stop the ones after it.
    pub fn retrieve_all<I, S>(&self, links: I) -> Vec<RetrievalResult<PackageReport>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        links
            .into_iter()
            .map(|link| {
                let result = self.retrieve(link.as_ref());
                if let Err(ref e) = result {
                    warn!(error = %e, "Package retrieval failed");
                }
                result
            })
            .collect()
    }

    fn build_pool(&self) -> Option<ThreadPool> {
        if self.options.parallel_downloads <= 1 {
            return None;
        }
        match ThreadPoolBuilder::new()
            .num_threads(self.options.parallel_downloads)
            .thread_name(|i| format!("ssfetch-part-{}", i))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "Failed to start worker pool, processing parts sequentially");
                None
            }
        }
    }

    fn retrieve_file(
        &self,
        pool: Option<&ThreadPool>,
        link: &PackageLink,
        ctx: &FileContext<'_>,
    ) -> FileReport {
        let file = ctx.file;
        info!(file_id = %file.file_id, file_name = %file.file_name, parts = file.parts, "Retrieving file");
        self.emit(RetrievalEvent::FileStarted { file });

        let mut tally = PartTally::default();
        let result = self
            .process_parts(pool, link, ctx, &mut tally)
            .and_then(|()| {
                if tally.has_failures() {
                    // Stale artifacts from an earlier run must not stand in
                    // for parts that failed now.
                    Err(RetrievalError::MissingParts {
                        file_id: file.file_id.clone(),
                        parts: file.parts,
                        missing: tally.failed_parts(),
                    })
                } else {
                    self.assembler.assemble(file)
                }
            });

        let outcome = match result {
            Ok(path) => {
                self.emit(RetrievalEvent::FileAssembled { file, path: &path });
                FileOutcome::Assembled(path)
            }
            Err(e) => {
                warn!(file_id = %file.file_id, error = %e, "File retrieval failed");
                self.emit(RetrievalEvent::FileFailed { file, error: &e });
                FileOutcome::Failed(e)
            }
        };

        FileReport::new(file, tally, outcome)
    }

    /// Page through the file's windows, consuming each batch immediately.
    ///
    /// Returns `Err` only for a segment failure, which ends the file.
    fn process_parts(
        &self,
        pool: Option<&ThreadPool>,
        link: &PackageLink,
        ctx: &FileContext<'_>,
        tally: &mut PartTally,
    ) -> RetrievalResult<()> {
        let file_id = ctx.file.file_id.as_str();

        for (start, end) in SegmentWindows::new(ctx.file.parts) {
            let batch = self.client.fetch_segment(link, file_id, start, end)?;

            for (part, result) in self.run_batch(pool, ctx, &batch) {
                match result {
                    Ok(outcome) => {
                        self.emit(RetrievalEvent::PartCompleted {
                            file_id,
                            part: outcome,
                        });
                        tally.record_success(&outcome);
                    }
                    Err(e) => {
                        warn!(file_id, part, error = %e, "Part failed");
                        self.emit(RetrievalEvent::PartFailed {
                            file_id,
                            part,
                            error: &e,
                        });
                        tally.record_failure(part, e);
                    }
                }
            }
        }

        Ok(())
    }

    fn run_batch(
        &self,
        pool: Option<&ThreadPool>,
        ctx: &FileContext<'_>,
        batch: &SegmentBatch,
    ) -> Vec<(u32, RetrievalResult<PartOutcome>)> {
        let work = |segment: &SegmentUrl| (segment.part, self.process_part(ctx, batch, segment));

        match pool {
            Some(pool) => pool.install(|| batch.urls.par_iter().map(work).collect()),
            None => batch.urls.iter().map(work).collect(),
        }
    }

    /// Bring one part to a decrypted artifact.
    fn process_part(
        &self,
        ctx: &FileContext<'_>,
        batch: &SegmentBatch,
        segment: &SegmentUrl,
    ) -> RetrievalResult<PartOutcome> {
        let file_id = ctx.file.file_id.as_str();
        let part = segment.part;
        let state = self.staging.state(file_id, part);

        if !self.options.force && state == PartState::Decrypted {
            debug!(file_id, part, "Part already decrypted");
            return Ok(PartOutcome {
                part,
                downloaded: None,
                decrypted: false,
            });
        }

        let needs_network = self.options.force || state == PartState::Absent;
        if needs_network && batch.is_expired() {
            return Err(RetrievalError::SegmentExpired {
                file_id: file_id.to_string(),
                part,
            });
        }

        let downloaded = match self.downloader.download(file_id, segment)? {
            DownloadOutcome::Downloaded { bytes, .. } => Some(bytes),
            DownloadOutcome::Skipped { .. } => None,
        };

        self.decrypt_part(ctx, part)?;

        Ok(PartOutcome {
            part,
            downloaded,
            decrypted: true,
        })
    }

    /// Decrypt into a scratch file and rename it onto the artifact, so a
    /// `.decrypted` file is always complete.
    fn decrypt_part(&self, ctx: &FileContext<'_>, part: u32) -> RetrievalResult<()> {
        let file_id = ctx.file.file_id.as_str();
        let input = self.staging.encrypted_path(file_id, part);
        let partial = self.staging.partial_decrypted_path(file_id, part);
        let output = self.staging.decrypted_path(file_id, part);

        debug!(file_id, part, "Decrypting part");
        if let Err(failure) =
            self.decryptor
                .decrypt(&input, &partial, ctx.passphrase, &self.options.decrypt)
        {
            let _ = fs::remove_file(&partial);
            return Err(failure.into_retrieval_error(file_id, part));
        }

        fs::rename(&partial, &output).map_err(|e| RetrievalError::io(&output, e))
    }

    fn emit(&self, event: RetrievalEvent<'_>) {
        if let Some(ref callback) = self.on_event {
            callback(&event);
        }
    }
}
