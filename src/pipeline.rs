use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{InputSpec, PipelineConfig};
use crate::dedup::Deduplicator;
use crate::derived::price_per_m2;
use crate::errors::{AppError, AppResult};
use crate::geo::{GeoResolver, ReferenceTable, Resolution, ResolutionMethod};
use crate::journal::RunJournal;
use crate::listing::{CanonicalRecord, SourceRegistry};
use crate::output::{read_merged, read_raw_batch, write_merged};
use crate::store::{open_store, write_records, WriteSummary};

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub path: PathBuf,
    pub source: String,
    pub listings: usize,
    pub kept: usize,
    pub duplicates: usize,
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub records: Vec<CanonicalRecord>,
    pub batches: Vec<BatchReport>,
    /// One [`AppError::Batch`] per rejected input file.
    pub failures: Vec<AppError>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EnrichStats {
    pub text_resolved: usize,
    pub geo_resolved: usize,
    pub unresolved: usize,
    pub priced: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub write: WriteSummary,
    pub enrich: EnrichStats,
}

/// Merges input batches in order. A batch that cannot be read or that holds
/// a listing without URL is rejected whole; earlier batches are unaffected.
pub fn merge_inputs(
    inputs: &[InputSpec],
    registry: &SourceRegistry,
    journal: &RunJournal,
) -> MergeOutcome {
    let mut dedup = Deduplicator::new();
    let mut outcome = MergeOutcome::default();

    for input in inputs {
        info!(path = %input.path.display(), source = %input.source, "loading batch");
        let normalized = read_raw_batch(&input.path).and_then(|listings| {
            let records = registry.normalize_batch(&input.source, &listings)?;
            Ok((listings.len(), records))
        });

        match normalized {
            Ok((listings, records)) => {
                let merge = dedup.merge_batch(records);
                let report = BatchReport {
                    path: input.path.clone(),
                    source: input.source.clone(),
                    listings,
                    kept: merge.kept.len(),
                    duplicates: merge.duplicates,
                };
                journal.note("batch_loaded", &report);
                outcome.records.extend(merge.kept);
                outcome.batches.push(report);
            }
            Err(err) => {
                let err = AppError::in_batch(&input.path, err);
                warn!(error = %err, source = %input.source, "rejected batch");
                journal.note(
                    "batch_rejected",
                    &json!({
                        "path": input.path.display().to_string(),
                        "source": input.source,
                        "error": err.to_string(),
                    }),
                );
                outcome.failures.push(err);
            }
        }
    }

    info!(
        records = outcome.records.len(),
        rejected = outcome.failures.len(),
        "merge completed"
    );
    journal.note(
        "merge_completed",
        &json!({
            "records": outcome.records.len(),
            "batches": outcome.batches.len(),
            "rejected": outcome.failures.len(),
        }),
    );
    outcome
}

/// Fills in the derived fields. Any arrondissement already on the record is
/// recomputed, never trusted.
pub fn enrich_record(
    record: &mut CanonicalRecord,
    resolver: &GeoResolver<'_>,
) -> Option<Resolution> {
    let resolution = resolver.resolve(record.address.as_deref(), record.coordinates());
    record.arrondissement = resolution.map(|r| r.arrondissement.code());
    record.price_per_m2 = price_per_m2(record.price_eur, record.size_m2);
    debug!(
        id = %record.id,
        arrondissement = ?record.arrondissement,
        method = ?resolution.map(|r| r.method),
        "enriched record"
    );
    resolution
}

pub fn enrich_records(
    records: &mut [CanonicalRecord],
    resolver: &GeoResolver<'_>,
) -> EnrichStats {
    let mut stats = EnrichStats::default();
    for record in records.iter_mut() {
        match enrich_record(record, resolver).map(|r| r.method) {
            Some(ResolutionMethod::Coordinates) => stats.geo_resolved += 1,
            Some(_) => stats.text_resolved += 1,
            None => stats.unresolved += 1,
        }
        if record.price_per_m2.is_some() {
            stats.priced += 1;
        }
    }
    stats
}

pub fn load_records(
    connection: &mut Connection,
    mut records: Vec<CanonicalRecord>,
    table: &ReferenceTable,
    journal: &RunJournal,
) -> AppResult<LoadSummary> {
    let resolver = GeoResolver::new(table);
    let enrich = enrich_records(&mut records, &resolver);
    let write = write_records(connection, &records)?;

    for failure in &write.failures {
        journal.note("record_skipped", failure);
    }
    info!(
        inserted = write.inserted,
        skipped = write.skipped,
        geo_resolved = enrich.geo_resolved,
        unresolved = enrich.unresolved,
        "load completed"
    );
    journal.note(
        "load_completed",
        &json!({
            "inserted": write.inserted,
            "skipped": write.skipped,
            "text_resolved": enrich.text_resolved,
            "geo_resolved": enrich.geo_resolved,
            "unresolved": enrich.unresolved,
        }),
    );
    Ok(LoadSummary { write, enrich })
}

/// Everything a run needs, built once at start-up.
pub struct Pipeline {
    config: PipelineConfig,
    registry: SourceRegistry,
    table: ReferenceTable,
    journal: RunJournal,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> AppResult<Self> {
        let table = match &config.reference_table_path {
            Some(path) => ReferenceTable::load(path)?,
            None => ReferenceTable::paris(),
        };
        let journal = RunJournal::open(&config)?;
        Ok(Self {
            config,
            registry: SourceRegistry::with_defaults(),
            table,
            journal,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    /// Merges the configured inputs and writes the merged file. When every
    /// input batch was rejected the previous merged file is left in place.
    pub fn merge(&self) -> AppResult<MergeOutcome> {
        let outcome = merge_inputs(&self.config.inputs, &self.registry, &self.journal);
        if outcome.batches.is_empty() && !outcome.failures.is_empty() {
            warn!(
                path = %self.config.merged_path.display(),
                rejected = outcome.failures.len(),
                "every batch was rejected; merged file not written"
            );
            return Ok(outcome);
        }
        write_merged(&self.config.merged_path, &outcome.records)?;
        info!(path = %self.config.merged_path.display(), "merged file written");
        Ok(outcome)
    }

    /// Loads a merged file into the store.
    pub fn load(&self, merged_path: &Path) -> AppResult<LoadSummary> {
        let records = read_merged(merged_path)?;
        self.store(records)
    }

    /// Merge, write the merged file, then load the merged records.
    pub fn run(&self) -> AppResult<(MergeOutcome, LoadSummary)> {
        let outcome = self.merge()?;
        let summary = self.store(outcome.records.clone())?;
        Ok((outcome, summary))
    }

    fn store(&self, records: Vec<CanonicalRecord>) -> AppResult<LoadSummary> {
        let mut ctx = open_store(&self.config.database_path)?;
        let summary = load_records(&mut ctx.connection, records, &self.table, &self.journal)?;
        self.journal.flush()?;
        Ok(summary)
    }
}
