use anyhow::{bail, Context, Result};
use reqwest::Url;
use tracing::{debug, error, info, warn};

use crate::extract::detail::parse_detail;
use crate::extract::directory::parse_directory;
use crate::fetch::PageSource;
use crate::generate::{
    is_placeholder, poem_prompt, poem_task, summary_prompt, summary_task, ContentGenerator, Generation,
    TextBackend,
};
use crate::model::{Group, Record, Snapshot, Stub};
use crate::progress::Progress;
use crate::settings::Settings;
use crate::store::{RecordKey, RecordStore, SnapshotKind, StoreError};

/// One unit of work: a member of a group, with its position.
#[derive(Debug)]
pub struct WorkItem<'a, T> {
    pub group: &'a str,
    pub group_len: usize,
    pub index: usize,
    pub entry: &'a T,
}

/// Flatten groups into work items in page order. Call again to restart.
pub fn work_items<T>(groups: &[Group<T>]) -> impl Iterator<Item = WorkItem<'_, T>> + Clone {
    groups.iter().flat_map(|g| {
        g.members.iter().enumerate().map(move |(index, entry)| WorkItem {
            group: &g.name,
            group_len: g.members.len(),
            index,
            entry,
        })
    })
}

/// A generated field counts as done only if it holds real text, not the
/// placeholder left behind by `task`.
pub fn is_complete(field: Option<&str>, task: &str) -> bool {
    field.is_some_and(|t| !t.trim().is_empty() && !is_placeholder(t, task))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub groups: usize,
    pub reused: usize,
    pub fetched: usize,
    pub skipped: usize,
}

impl SyncReport {
    pub fn print(&self) {
        println!(
            "Synced {} groups: {} cached, {} fetched, {} skipped.",
            self.groups, self.reused, self.fetched, self.skipped
        );
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub reused: usize,
    pub generated: usize,
    pub placeholders: usize,
}

impl EnrichReport {
    pub fn print(&self) {
        println!(
            "Enriched {} records ({} already complete, {} fields left as placeholders).",
            self.generated, self.reused, self.placeholders
        );
    }
}

enum Synced {
    Reused(Record),
    Fetched(Record),
    Skipped,
}

/// Directory sync (phase A) and content enrichment (phase B) over one store.
pub struct Pipeline<S, B> {
    source: S,
    store: RecordStore,
    generator: ContentGenerator<B>,
    source_url: String,
}

impl<S: PageSource, B: TextBackend> Pipeline<S, B> {
    pub fn new(source: S, store: RecordStore, generator: ContentGenerator<B>, settings: &Settings) -> Self {
        Self {
            source,
            store,
            generator,
            source_url: settings.source_url.clone(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Phase A then phase B.
    pub async fn run(&self, progress: &mut dyn Progress) -> Result<(SyncReport, EnrichReport)> {
        let synced = self.sync_directory(progress).await?;
        let enriched = self.enrich(progress).await?;
        Ok((synced, enriched))
    }

    // ── Phase A ──

    pub async fn sync_directory(&self, progress: &mut dyn Progress) -> Result<SyncReport> {
        info!("Fetching directory: {}", self.source_url);
        let html = match self.source.fetch(&self.source_url).await {
            Ok(html) => html,
            Err(e) => {
                error!("Failed to fetch the directory page: {}", e);
                return Err(e).context("Directory fetch failed");
            }
        };

        let base = Url::parse(&self.source_url).context("Invalid source_url")?;
        let listing = match parse_directory(&html, &base) {
            Ok(listing) => listing,
            Err(e) => {
                error!("Directory page not understood: {}", e);
                return Err(e).context("Directory extraction failed");
            }
        };

        let total: usize = listing.iter().map(|g| g.members.len()).sum();
        info!("Directory lists {} people in {} groups", total, listing.len());

        let mut snapshot = Snapshot::default();
        for g in &listing {
            snapshot.push_group(&g.name);
        }
        let mut report = SyncReport {
            groups: listing.len(),
            ..Default::default()
        };

        progress.begin("sync", listing.len(), total);
        let result = async {
            for item in work_items(&listing) {
                if item.index == 0 {
                    progress.group(item.group, item.group_len);
                }
                match self.sync_one(item.group, item.entry).await? {
                    Synced::Reused(record) => {
                        report.reused += 1;
                        snapshot.push(item.group, record);
                    }
                    Synced::Fetched(record) => {
                        report.fetched += 1;
                        snapshot.push(item.group, record);
                    }
                    Synced::Skipped => report.skipped += 1,
                }
                progress.item_done(&item.entry.name);
            }
            Ok::<_, anyhow::Error>(())
        }
        .await;
        progress.finish();
        result?;

        self.store.save_snapshot(SnapshotKind::Directory, &snapshot)?;
        info!(
            "Directory sync done: {} cached, {} fetched, {} skipped",
            report.reused, report.fetched, report.skipped
        );
        Ok(report)
    }

    async fn sync_one(&self, group: &str, stub: &Stub) -> Result<Synced> {
        let key = self.store.key_for(group, &stub.name);
        if let Some(record) = self.load_cached(&key)? {
            debug!(key = %key, "Using cached record");
            return Ok(Synced::Reused(record));
        }

        let html = match self.source.fetch(&stub.detail_ref).await {
            Ok(html) => html,
            Err(e) => {
                warn!(name = %stub.name, "Skipping, detail page unavailable: {}", e);
                return Ok(Synced::Skipped);
            }
        };
        let detail = match parse_detail(&html) {
            Ok(detail) => detail,
            Err(e) => {
                warn!(name = %stub.name, url = %stub.detail_ref, "Skipping: {}", e);
                return Ok(Synced::Skipped);
            }
        };

        let record = Record::assemble(group, stub, detail);
        self.store.save(&record, &key)?;
        Ok(Synced::Fetched(record))
    }

    /// Stored record for `key`, or `None` when absent or unreadable.
    fn load_cached(&self, key: &RecordKey) -> Result<Option<Record>> {
        if !self.store.exists(key) {
            return Ok(None);
        }
        match self.store.load(key) {
            Ok(record) => Ok(Some(record)),
            Err(e @ StoreError::CorruptData { .. }) => {
                warn!(key = %key, "Ignoring unreadable record: {}", e);
                Ok(None)
            }
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ── Phase B ──

    pub async fn enrich(&self, progress: &mut dyn Progress) -> Result<EnrichReport> {
        let snapshot = match self.store.load_snapshot(SnapshotKind::Directory) {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound(path)) => {
                bail!("No directory snapshot at {}; run `sync` first", path.display())
            }
            Err(e) => return Err(e).context("Failed to load the directory snapshot"),
        };

        let mut enriched = Snapshot::default();
        for g in &snapshot.groups {
            enriched.push_group(&g.name);
        }
        let mut report = EnrichReport::default();

        progress.begin("enrich", snapshot.groups.len(), snapshot.len());
        let result = async {
            for item in work_items(&snapshot.groups) {
                if item.index == 0 {
                    progress.group(item.group, item.group_len);
                }
                let record = self.enrich_one(item.group, item.entry, &mut report).await?;
                progress.item_done(&record.name);
                enriched.push(item.group, record);
            }
            Ok::<_, anyhow::Error>(())
        }
        .await;
        progress.finish();
        result?;

        self.store.save_snapshot(SnapshotKind::Enriched, &enriched)?;
        info!(
            "Enrichment done: {} generated, {} reused, {} placeholders",
            report.generated, report.reused, report.placeholders
        );
        Ok(report)
    }

    async fn enrich_one(&self, group: &str, listed: &Record, report: &mut EnrichReport) -> Result<Record> {
        let key = self.store.key_for(group, &listed.name);
        // The per-person file wins over the snapshot copy.
        let mut record = self.load_cached(&key)?.unwrap_or_else(|| listed.clone());

        let poem_job = poem_task(&record.name);
        let summary_job = summary_task(&record.name);
        let poem_done = is_complete(record.generated_poem.as_deref(), &poem_job);
        let summary_done = is_complete(record.generated_summary.as_deref(), &summary_job);
        if poem_done && summary_done {
            debug!(key = %key, "Content already generated");
            report.reused += 1;
            return Ok(record);
        }

        if !poem_done {
            let prompt = poem_prompt(&record.name, &record.description);
            record.generated_poem = Some(self.generate_field(&poem_job, &prompt, report).await);
        }
        if !summary_done {
            let prompt = summary_prompt(&record.name, &record.description);
            record.generated_summary = Some(self.generate_field(&summary_job, &prompt, report).await);
        }

        self.store.save(&record, &key)?;
        report.generated += 1;
        Ok(record)
    }

    async fn generate_field(&self, task: &str, prompt: &str, report: &mut EnrichReport) -> String {
        let out = self.generator.generate(task, prompt).await;
        if let Generation::Exhausted { attempts, .. } = &out {
            warn!(task, attempts = *attempts, "Storing placeholder");
            report.placeholders += 1;
        }
        out.into_text()
    }
}

// ── Stats ──

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub records: usize,
    pub complete: usize,
    pub with_placeholders: usize,
    pub unreadable: usize,
    pub directory_snapshot: bool,
    pub enriched_snapshot: bool,
}

impl StoreStats {
    pub fn print(&self) {
        println!("Records:           {}", self.records);
        println!("Enriched:          {}", self.complete);
        println!("With placeholders: {}", self.with_placeholders);
        println!("Unreadable:        {}", self.unreadable);
        println!("Directory snapshot: {}", yes_no(self.directory_snapshot));
        println!("Enriched snapshot:  {}", yes_no(self.enriched_snapshot));
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Summarize what is on disk without touching the network.
pub fn store_stats(store: &RecordStore) -> Result<StoreStats> {
    let mut stats = StoreStats {
        directory_snapshot: store.snapshot_exists(SnapshotKind::Directory),
        enriched_snapshot: store.snapshot_exists(SnapshotKind::Enriched),
        ..Default::default()
    };

    for key in store.list_keys()? {
        stats.records += 1;
        let record = match store.load(&key) {
            Ok(r) => r,
            Err(StoreError::CorruptData { .. }) => {
                stats.unreadable += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let fields = [
            (record.generated_poem.as_deref(), poem_task(&record.name)),
            (record.generated_summary.as_deref(), summary_task(&record.name)),
        ];
        if fields.iter().all(|(f, task)| is_complete(*f, task)) {
            stats.complete += 1;
        }
        if fields
            .iter()
            .any(|(f, task)| f.is_some_and(|t| is_placeholder(t, task)))
        {
            stats.with_placeholders += 1;
        }
    }
    Ok(stats)
}

// ── Tests ──
