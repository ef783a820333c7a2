//! Keyed, per-writer document store.
//!
//! ```text
//! key ──┬── writer A ── assembled dict
//!       └── writer B ── assembled dict
//! ```
//!
//! One `RwLock` guards the whole map. Reads take it shared; writes and the
//! collector sweep take it exclusively for their full duration. Assembly runs
//! inside the write lock, so a slow assembler side effect (the `reachable`
//! probe) stalls every other reader and writer until it returns. Callers
//! that register a probe should bound it with `UpdateOptions::deadline`.

use crate::error::{Result, SmartRecordError};
use crate::gc::{self, SweepStats};
use crate::grammar::{AssemblyContext, Grammar, MetadataOptions};
use crate::node::{Dict, Node};
use crate::selector;
use crate::smart::peer::PeerId;
use crate::update::update;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Interval between collector sweeps
    pub gc_period: Duration,
    /// Expiration applied to writes that specify none
    pub default_ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            gc_period: Duration::from_secs(60),
            default_ttl: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub metadata: MetadataOptions,
    pub deadline: Option<Instant>,
}

impl UpdateOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            metadata: MetadataOptions::expires_in(ttl),
            deadline: None,
        }
    }
}

type Writers = BTreeMap<PeerId, Node>;

pub struct Store {
    grammar: Grammar,
    config: StoreConfig,
    records: RwLock<HashMap<String, Writers>>,
}

impl Store {
    pub fn new(grammar: Grammar) -> Self {
        Self::with_config(grammar, StoreConfig::default())
    }

    pub fn with_config(grammar: Grammar, config: StoreConfig) -> Self {
        Self {
            grammar,
            config,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn update(&self, writer: &PeerId, key: &str, doc: Node) -> Result<()> {
        self.update_with(writer, key, doc, UpdateOptions::default())
    }

    /// Assembles `doc` and folds it into the (key, writer) slot.
    ///
    /// All-or-nothing: on error the stored document is unchanged.
    pub fn update_with(
        &self,
        writer: &PeerId,
        key: &str,
        doc: Node,
        options: UpdateOptions,
    ) -> Result<()> {
        let mut metadata = options.metadata;
        if metadata.expires_in.is_none() {
            metadata.expires_in = self.config.default_ttl;
        }
        let ctx = AssemblyContext::new(&metadata)
            .with_writer(writer.clone())
            .with_deadline(options.deadline);

        let mut records = self.records.write();
        let assembled = self.grammar.assemble_in(&doc, &ctx)?;
        if assembled.as_dict().is_none() {
            return Err(SmartRecordError::NotADict(assembled.kind().to_string()));
        }

        let merged = match records.get(key).and_then(|w| w.get(writer)) {
            Some(existing) => update(existing.clone(), assembled)?,
            None => assembled,
        };
        records
            .entry(key.to_string())
            .or_default()
            .insert(writer.clone(), merged);
        log::debug!("stored update from {} under {:?}", writer, key);
        Ok(())
    }

    /// Plain documents for `key`, one per writer with a non-empty entry.
    pub fn get(&self, key: &str) -> BTreeMap<PeerId, Dict> {
        let records = self.records.read();
        let Some(writers) = records.get(key) else {
            return BTreeMap::new();
        };
        writers
            .iter()
            .filter_map(|(writer, doc)| {
                let dict = doc.as_dict()?;
                (!dict.is_empty()).then(|| (writer.clone(), dict.disassemble()))
            })
            .collect()
    }

    /// Like [`Store::get`], with every document projected through `selector`.
    pub fn query(&self, key: &str, selector: &Dict) -> BTreeMap<PeerId, Dict> {
        self.get(key)
            .into_iter()
            .map(|(writer, doc)| (writer, selector::project(&doc, selector)))
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.records.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn collect_garbage(&self) -> SweepStats {
        self.collect_garbage_at(Utc::now())
    }

    /// Drops every expired sub-tree. Keys whose writers are all gone stay as
    /// empty entries.
    pub fn collect_garbage_at(&self, now: DateTime<Utc>) -> SweepStats {
        let mut stats = SweepStats::default();
        let mut records = self.records.write();
        for writers in records.values_mut() {
            let docs = std::mem::take(writers);
            for (writer, doc) in docs {
                stats.documents_scanned += 1;
                match gc::prune(doc, now, &mut stats) {
                    Some(kept) => {
                        writers.insert(writer, kept);
                    }
                    None => stats.documents_removed += 1,
                }
            }
        }
        stats
    }

    /// Runs the collector every `gc_period` until `shutdown` is cancelled.
    ///
    /// Each sweep holds the write lock, so it runs on the blocking pool
    /// rather than on a runtime worker.
    pub fn spawn_collector(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = self.config.gc_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let sweeper = Arc::clone(&store);
                        match tokio::task::spawn_blocking(move || sweeper.collect_garbage()).await {
                            Ok(stats) if stats.documents_removed > 0 || stats.nodes_removed > 0 => {
                                log::info!(
                                    "collector removed {} documents and {} nodes",
                                    stats.documents_removed,
                                    stats.nodes_removed
                                );
                            }
                            Ok(_) => log::debug!("collector sweep found nothing to remove"),
                            Err(e) => log::error!("collector sweep failed: {}", e),
                        }
                    }
                }
            }
            log::debug!("collector stopped");
        })
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Grammar::standard())
    }
}
