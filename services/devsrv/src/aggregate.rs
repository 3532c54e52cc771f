//! Debounced per-barcode result aggregation.
//!
//! Instruments that deliver one test per connection (Response 911 most of
//! all) would otherwise produce a storm of single-result messages for the
//! same specimen. Fragments are merged per barcode, last write wins per test
//! code, and the merged message is flushed once the barcode has been quiet
//! for the debounce window.
//!
//! One mutex guards the map and every item's timer rearm. Each rearm bumps
//! the item's generation; a fired timer whose generation is stale lost the
//! race to a newer fragment and returns without flushing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use labwire_model::{ObservationResult, OruR01, Specimen};

use crate::analyzer::Analyzer;

struct PendingItem {
    results: HashMap<String, ObservationResult>,
    specimen_type: String,
    timer: Option<tokio::task::JoinHandle<()>>,
    generation: u64,
}

struct Inner {
    pending: Mutex<HashMap<String, PendingItem>>,
    debounce: Duration,
    analyzer: Arc<dyn Analyzer>,
}

/// Merges fragmented ORU_R01 messages per barcode and forwards the merged
/// result downstream after a quiet window.
#[derive(Clone)]
pub struct ResultAggregator {
    inner: Arc<Inner>,
}

impl ResultAggregator {
    pub fn new(analyzer: Arc<dyn Analyzer>, debounce: Duration) -> Self {
        ResultAggregator {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
                debounce,
                analyzer,
            }),
        }
    }

    /// Add one fragment. Messages without a barcode cannot be correlated and
    /// are forwarded immediately instead of merged.
    pub async fn add(&self, message: OruR01) {
        let Some(specimen) = message.first_specimen() else {
            warn!("aggregator received message without specimen, dropping");
            return;
        };

        if specimen.barcode.is_empty() {
            warn!("aggregator received specimen without barcode, forwarding as-is");
            if let Err(e) = self.inner.analyzer.process_oru_r01(message).await {
                error!(error = %e, "failed to forward unaggregated result");
            }
            return;
        }

        let barcode = specimen.barcode.clone();
        let specimen_type = specimen.specimen_type.clone();
        let results: Vec<ObservationResult> = specimen
            .observation_results
            .iter()
            .filter(|r| !r.test_code.is_empty())
            .cloned()
            .collect();

        let mut pending = self.inner.pending.lock();
        let item = pending.entry(barcode.clone()).or_insert_with(|| PendingItem {
            results: HashMap::new(),
            specimen_type: specimen_type.clone(),
            timer: None,
            generation: 0,
        });
        if !specimen_type.is_empty() {
            item.specimen_type = specimen_type;
        }
        for result in results {
            item.results.insert(result.test_code.clone(), result);
        }

        // rearm under the same lock, invalidating any in-flight timer
        item.generation += 1;
        let generation = item.generation;
        if let Some(timer) = item.timer.take() {
            timer.abort();
        }
        let inner = self.inner.clone();
        item.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            flush(inner, barcode, generation).await;
        }));
    }

    /// Number of barcodes currently waiting for their quiet window.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

async fn flush(inner: Arc<Inner>, barcode: String, generation: u64) {
    let item = {
        let mut pending = inner.pending.lock();
        match pending.get(&barcode) {
            Some(item) if item.generation == generation => pending.remove(&barcode),
            // a newer fragment rearmed the timer after this one fired
            _ => None,
        }
    };
    let Some(item) = item else {
        return;
    };

    if item.results.is_empty() {
        warn!(%barcode, "aggregated specimen has no results, skipping flush");
        return;
    }

    let mut results: Vec<ObservationResult> = item.results.into_values().collect();
    results.sort_by(|a, b| a.test_code.cmp(&b.test_code));
    let count = results.len();

    let merged = OruR01::from_specimen(Specimen {
        barcode: barcode.clone(),
        specimen_type: item.specimen_type,
        received_at: Some(chrono::Utc::now()),
        observation_results: results,
        ..Specimen::default()
    });

    debug!(%barcode, results = count, "flushing aggregated specimen");
    if let Err(e) = inner.analyzer.process_oru_r01(merged).await {
        error!(%barcode, error = %e, "failed to process aggregated result");
    }
}
