use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::{ArchiveError, ArchivedTable, RetentionEnforcer, RunReport, Stage, TableFailure};
use crate::{
    config::{ArchiverConfig, FailurePolicy, PipelineConfig, SelectionConfig},
    db::{MySqlCatalog, TableCatalog},
    export::{ExportArtifact, Exporter},
    storage::{ArchiveStore, StoredObject, create_archive_store},
};

/// Runs the export, upload, verify and drop sequence over stale tables.
pub struct Archiver {
    catalog: Arc<dyn TableCatalog>,
    exporter: Exporter,
    store: Arc<dyn ArchiveStore>,
    enforcer: RetentionEnforcer,
    selection: SelectionConfig,
    options: PipelineConfig,
}

impl Archiver {
    pub fn new(
        catalog: Arc<dyn TableCatalog>,
        exporter: Exporter,
        store: Arc<dyn ArchiveStore>,
        selection: SelectionConfig,
        options: PipelineConfig,
    ) -> Self {
        let enforcer = RetentionEnforcer::new(catalog.clone(), store.clone());
        Self {
            catalog,
            exporter,
            store,
            enforcer,
            selection,
            options,
        }
    }

    /// Wire up the MySQL catalog, the dump exporter and the configured store.
    pub async fn from_config(config: &ArchiverConfig) -> Result<Self, ArchiveError> {
        let catalog = Arc::new(MySqlCatalog::new(config.database.clone()));
        let exporter = Exporter::new(config.export.clone(), config.database.clone());
        let store = create_archive_store(&config.storage).await?;

        Ok(Self::new(
            catalog,
            exporter,
            store,
            config.selection.clone(),
            config.pipeline.clone(),
        ))
    }

    /// Stale tables matching the selection, in the order they'll be processed.
    pub async fn candidates(&self) -> Result<Vec<String>, ArchiveError> {
        Ok(self.catalog.find_stale_tables(&self.selection).await?)
    }

    /// Drop a single table after confirming its archive exists remotely.
    pub async fn drop_archived(
        &self,
        table: &str,
        force: bool,
    ) -> Result<Option<StoredObject>, ArchiveError> {
        self.enforcer.drop_archived(table, force).await
    }

    /// Process every candidate table.
    ///
    /// Bucket and selection errors are returned as `Err`; per-table failures
    /// are recorded in the report.
    #[instrument(skip(self), fields(
        database = %self.catalog.database_name(),
        bucket = %self.store.bucket(),
        backend = self.store.backend_name(),
    ))]
    pub async fn run(&self) -> Result<RunReport, ArchiveError> {
        let dry_run_msg = if self.options.dry_run {
            " (DRY RUN)"
        } else {
            ""
        };

        self.store.check_bucket().await?;

        let candidates = self.candidates().await?;
        info!(
            count = candidates.len(),
            pattern = %self.selection.pattern,
            retention_days = self.selection.retention_days,
            "Selected stale tables{}",
            dry_run_msg
        );

        let mut report = RunReport {
            candidates: candidates.clone(),
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        if self.options.dry_run {
            for table in &candidates {
                info!(
                    table,
                    key = %self.store.object_key(table),
                    "DRY RUN: Would archive and drop table"
                );
            }
            return Ok(report);
        }

        for table in candidates {
            if table.is_empty() {
                warn!("Skipping candidate with an empty table name");
                report.skipped.push(table);
                continue;
            }

            match self.archive_table(&table).await {
                Ok(object) => report.archived.push(ArchivedTable { table, object }),
                Err((stage, err)) => {
                    error!(table, stage = %stage, error = %err, "Failed to archive table");
                    report.failures.push(TableFailure {
                        table,
                        stage,
                        error: err.to_string(),
                    });

                    if self.options.failure_policy == FailurePolicy::Halt {
                        warn!("Halting run after failure");
                        report.halted = true;
                        break;
                    }
                }
            }
        }

        info!(
            archived = report.archived.len(),
            failed = report.failures.len(),
            skipped = report.skipped.len(),
            bytes = report.bytes_uploaded(),
            halted = report.halted,
            "Archival run complete"
        );
        Ok(report)
    }

    /// Export, upload, verify and drop one table.
    async fn archive_table(&self, table: &str) -> Result<StoredObject, (Stage, ArchiveError)> {
        info!(table, "Archiving table");

        let artifact = self
            .exporter
            .export(table)
            .await
            .map_err(|e| (Stage::Export, ArchiveError::from(e)))?;

        let key = self.store.object_key(table);
        let object = match self.store.upload(&key, artifact.path()).await {
            Ok(object) => object,
            Err(e) => {
                keep_artifact(artifact);
                return Err((Stage::Upload, ArchiveError::from(e)));
            }
        };
        info!(table, key, bucket = %object.bucket, size = object.size, "Archive uploaded");

        let object = if self.options.verify_upload {
            match self.enforcer.verify(&key, Some(artifact.size())).await {
                Ok(object) => object,
                Err(e) => {
                    keep_artifact(artifact);
                    return Err((Stage::Verify, e));
                }
            }
        } else {
            object
        };

        if self.options.cleanup_local {
            if let Err(e) = artifact.remove() {
                warn!(table, error = %e, "Failed to remove local archive");
            }
        } else {
            keep_artifact(artifact);
        }

        self.enforcer
            .drop_table(table)
            .await
            .map_err(|e| (Stage::Drop, e))?;
        info!(table, key, "Table archived and dropped");

        Ok(object)
    }
}

fn keep_artifact(artifact: ExportArtifact) {
    let table = artifact.table().to_string();
    match artifact.keep() {
        Ok(path) => debug!(table, path = %path.display(), "Keeping local archive"),
        Err(e) => warn!(table, error = %e, "Failed to keep local archive"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        db::testing::{EventLog, InMemoryCatalog},
        export::testing::fake_exporter,
        storage::testing::RecordingStore,
    };

    struct Harness {
        _dir: TempDir,
        events: EventLog,
        catalog: Arc<InMemoryCatalog>,
        store: Arc<RecordingStore>,
        archiver: Archiver,
        work_dir: std::path::PathBuf,
        bucket_dir: std::path::PathBuf,
    }

    impl Harness {
        fn new(
            catalog: impl FnOnce(EventLog) -> InMemoryCatalog,
            store: impl FnOnce(&Path, EventLog) -> RecordingStore,
            options: PipelineConfig,
        ) -> Self {
            let dir = TempDir::new().unwrap();
            let events = EventLog::default();
            let bucket_dir = dir.path().join("bucket");
            let catalog = Arc::new(catalog(events.clone()));
            let store = Arc::new(store(&bucket_dir, events.clone()));
            let archiver = Archiver::new(
                catalog.clone(),
                fake_exporter(dir.path(), "s3cret"),
                store.clone(),
                SelectionConfig::default(),
                options,
            );

            Self {
                work_dir: dir.path().join("work"),
                _dir: dir,
                events,
                catalog,
                store,
                archiver,
                bucket_dir,
            }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn work_files(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(&self.work_dir)
                .map(|entries| {
                    entries
                        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            names
        }
    }

    fn default_store(dir: &Path, events: EventLog) -> RecordingStore {
        RecordingStore::new(dir, events)
    }

    fn three_tables(events: EventLog) -> InMemoryCatalog {
        InMemoryCatalog::new(events)
            .with_table("tmp_4475_a", 40)
            .with_table("tmp_4475_broken", 35)
            .with_table("tmp_4475_c", 30)
    }

    #[tokio::test]
    async fn test_archives_stale_tables_in_order() {
        let h = Harness::new(
            |events| {
                InMemoryCatalog::new(events)
                    .with_table("tmp_4475_a", 40)
                    .with_table("tmp_4475_fresh", 3)
                    .with_table("keep_me", 400)
                    .with_table("tmp_4475_b", 29)
            },
            default_store,
            PipelineConfig::default(),
        );

        let report = h.archiver.run().await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.archived_tables(), vec!["tmp_4475_a", "tmp_4475_b"]);
        assert_eq!(
            h.events(),
            vec![
                "upload:tmp_4475_a",
                "drop:tmp_4475_a",
                "upload:tmp_4475_b",
                "drop:tmp_4475_b",
            ]
        );
        assert_eq!(h.catalog.table_names(), vec!["tmp_4475_fresh", "keep_me"]);

        for archived in &report.archived {
            let stat = h.store.stat(&archived.table).await.unwrap().unwrap();
            assert_eq!(stat.size, archived.object.size);
        }
        assert!(h.bucket_dir.join("tmp_4475_a").exists());

        // Dump files and archives are cleaned up
        assert!(h.work_files().is_empty(), "leftover files: {:?}", h.work_files());
    }

    #[tokio::test]
    async fn test_halt_policy_stops_at_failed_dump() {
        let h = Harness::new(three_tables, default_store, PipelineConfig::default());

        let report = h.archiver.run().await.unwrap();

        assert!(report.halted);
        assert_eq!(report.archived_tables(), vec!["tmp_4475_a"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].table, "tmp_4475_broken");
        assert_eq!(report.failures[0].stage, Stage::Export);
        assert!(report.failures[0].error.contains("exit status: 2"));

        // The failed table is untouched and nothing after it ran
        assert!(h.catalog.has_table("tmp_4475_broken"));
        assert!(h.catalog.has_table("tmp_4475_c"));
        assert!(!h.work_dir.join("tmp_4475_broken.sql").exists());
        assert!(!h.bucket_dir.join("tmp_4475_c").exists());
        assert_eq!(h.events(), vec!["upload:tmp_4475_a", "drop:tmp_4475_a"]);
    }

    #[tokio::test]
    async fn test_skip_policy_continues_after_failed_dump() {
        let h = Harness::new(
            three_tables,
            default_store,
            PipelineConfig {
                failure_policy: FailurePolicy::Skip,
                ..Default::default()
            },
        );

        let report = h.archiver.run().await.unwrap();

        assert!(!report.halted);
        assert!(!report.is_success());
        assert_eq!(report.archived_tables(), vec!["tmp_4475_a", "tmp_4475_c"]);
        assert_eq!(report.failures[0].table, "tmp_4475_broken");
        assert_eq!(h.catalog.table_names(), vec!["tmp_4475_broken"]);
    }

    #[tokio::test]
    async fn test_empty_candidate_is_skipped() {
        let h = Harness::new(
            |events| {
                InMemoryCatalog::new(events)
                    .with_table("tmp_4475_a", 40)
                    .with_candidates(&["", "tmp_4475_a"])
            },
            default_store,
            PipelineConfig::default(),
        );

        let report = h.archiver.run().await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.skipped, vec![String::new()]);
        assert_eq!(report.archived_tables(), vec!["tmp_4475_a"]);
        assert_eq!(h.events(), vec!["upload:tmp_4475_a", "drop:tmp_4475_a"]);
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_table_and_local_archive() {
        let h = Harness::new(
            |events| InMemoryCatalog::new(events).with_table("tmp_4475_a", 40),
            |dir, events| RecordingStore::new(dir, events).failing_upload("tmp_4475_a"),
            PipelineConfig::default(),
        );

        let report = h.archiver.run().await.unwrap();

        assert_eq!(report.failures[0].stage, Stage::Upload);
        assert!(h.catalog.has_table("tmp_4475_a"));
        assert_eq!(h.events(), vec!["upload-failed:tmp_4475_a"]);
        assert!(h.work_dir.join("tmp_4475_a.zip").exists());
        assert!(!h.work_dir.join("tmp_4475_a.sql").exists());
    }

    #[tokio::test]
    async fn test_verification_failure_prevents_drop() {
        let h = Harness::new(
            |events| InMemoryCatalog::new(events).with_table("tmp_4475_a", 40),
            |dir, events| RecordingStore::new(dir, events).hiding("tmp_4475_a"),
            PipelineConfig::default(),
        );

        let report = h.archiver.run().await.unwrap();

        assert_eq!(report.failures[0].stage, Stage::Verify);
        assert!(h.catalog.has_table("tmp_4475_a"));
        assert_eq!(h.events(), vec!["upload:tmp_4475_a"]);
    }

    #[tokio::test]
    async fn test_verification_disabled_drops_after_upload() {
        let h = Harness::new(
            |events| InMemoryCatalog::new(events).with_table("tmp_4475_a", 40),
            |dir, events| RecordingStore::new(dir, events).hiding("tmp_4475_a"),
            PipelineConfig {
                verify_upload: false,
                ..Default::default()
            },
        );

        let report = h.archiver.run().await.unwrap();

        assert!(report.is_success());
        assert!(!h.catalog.has_table("tmp_4475_a"));
    }

    #[tokio::test]
    async fn test_drop_failure_leaves_table_and_archive() {
        let h = Harness::new(
            |events| {
                InMemoryCatalog::new(events)
                    .with_table("tmp_4475_a", 40)
                    .failing_drop("tmp_4475_a")
            },
            default_store,
            PipelineConfig::default(),
        );

        let report = h.archiver.run().await.unwrap();

        assert_eq!(report.failures[0].stage, Stage::Drop);
        assert!(h.catalog.has_table("tmp_4475_a"));
        assert!(h.bucket_dir.join("tmp_4475_a").exists());
        assert_eq!(
            h.events(),
            vec!["upload:tmp_4475_a", "drop-failed:tmp_4475_a"]
        );

        // The drop can be retried on its own once the cause is fixed
        assert!(matches!(
            h.archiver.drop_archived("tmp_4475_a", false).await,
            Err(ArchiveError::Db(_))
        ));
    }

    #[tokio::test]
    async fn test_local_archive_kept_without_cleanup() {
        let h = Harness::new(
            |events| InMemoryCatalog::new(events).with_table("tmp_4475_a", 40),
            default_store,
            PipelineConfig {
                cleanup_local: false,
                ..Default::default()
            },
        );

        let report = h.archiver.run().await.unwrap();

        assert!(report.is_success());
        assert!(h.work_dir.join("tmp_4475_a.zip").exists());
        assert!(!h.work_dir.join("tmp_4475_a.sql").exists());
    }

    #[tokio::test]
    async fn test_local_files_removed_with_cleanup() {
        let h = Harness::new(
            |events| InMemoryCatalog::new(events).with_table("tmp_4475_a", 40),
            default_store,
            PipelineConfig::default(),
        );

        h.archiver.run().await.unwrap();

        assert!(h.work_files().is_empty(), "leftover files: {:?}", h.work_files());
    }

    #[tokio::test]
    async fn test_dry_run_has_no_side_effects() {
        let h = Harness::new(
            three_tables,
            default_store,
            PipelineConfig {
                dry_run: true,
                ..Default::default()
            },
        );

        let report = h.archiver.run().await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.candidates.len(), 3);
        assert!(report.archived.is_empty());
        assert!(h.events().is_empty());
        assert_eq!(h.catalog.table_names().len(), 3);
        assert!(h.work_files().is_empty());
    }

    #[tokio::test]
    async fn test_selection_failure_is_fatal() {
        let h = Harness::new(
            |events| InMemoryCatalog::new(events).failing_selection(),
            default_store,
            PipelineConfig::default(),
        );

        assert!(matches!(h.archiver.run().await, Err(ArchiveError::Db(_))));
    }

    #[tokio::test]
    async fn test_missing_bucket_is_fatal() {
        let h = Harness::new(
            |events| InMemoryCatalog::new(events).with_table("tmp_4475_a", 40),
            |dir, events| RecordingStore::new(dir, events).missing_bucket(),
            PipelineConfig::default(),
        );

        assert!(matches!(
            h.archiver.run().await,
            Err(ArchiveError::Storage(_))
        ));
        assert!(h.catalog.has_table("tmp_4475_a"));
    }

    #[tokio::test]
    async fn test_rerun_overwrites_remote_archive() {
        let h = Harness::new(
            |events| {
                InMemoryCatalog::new(events)
                    .with_table("tmp_4475_a", 40)
                    .with_candidates(&["tmp_4475_a"])
            },
            default_store,
            PipelineConfig::default(),
        );

        h.archiver.run().await.unwrap();
        let report = h.archiver.run().await.unwrap();

        assert!(report.is_success());
        assert_eq!(
            h.events(),
            vec![
                "upload:tmp_4475_a",
                "drop:tmp_4475_a",
                "upload:tmp_4475_a",
                "drop:tmp_4475_a",
            ]
        );
    }
}
