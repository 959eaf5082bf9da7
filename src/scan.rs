//! Sequential block-range traversal feeding the correlator

use crate::detect::{Correlator, Observation};
use crate::provider::{BlockSource, FetchError};
use crate::signature::{extract_r_values, ExtractOutcome};
use std::time::Duration;

/// Running totals for one scan. Owned by the caller alongside the
/// correlator, so whatever was counted survives a mid-scan failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub blocks: u64,
    pub transactions: u64,
    pub signatures: u64,
    pub partial_scripts: u64,
}

/// Walks an inclusive height range one block, one transaction, one input at
/// a time, pausing between blocks to stay polite to the data source.
pub struct Scanner<S: BlockSource> {
    source: S,
    pause: Duration,
}

impl<S: BlockSource> Scanner<S> {
    pub fn new(source: S, pause: Duration) -> Self {
        Scanner { source, pause }
    }

    /// Scans heights `start..=end`, recording every extracted r-value into
    /// `correlator`. A fetch that exhausts its retries aborts the scan;
    /// everything recorded up to that point remains valid in the
    /// caller-owned accumulators.
    pub fn scan(
        &self,
        start: u64,
        end: u64,
        correlator: &mut Correlator,
        stats: &mut ScanStats,
    ) -> Result<(), FetchError> {
        for height in start..=end {
            eprintln!("block {height}");
            let block_hash = self.source.block_hash(height)?;
            let txids = self.source.block_txids(&block_hash)?;

            for txid in txids {
                let tx = self.source.transaction(&txid)?;
                stats.transactions += 1;

                for input in &tx.vin {
                    if input.scriptsig.is_empty() {
                        continue;
                    }
                    let extraction = extract_r_values(&input.scriptsig);
                    if extraction.outcome == ExtractOutcome::Partial {
                        stats.partial_scripts += 1;
                    }
                    for r in extraction.r_values {
                        stats.signatures += 1;
                        correlator.record(Observation {
                            r,
                            txid: tx.txid.clone(),
                            prev_txid: input.txid.clone(),
                        });
                    }
                }
            }

            stats.blocks += 1;
            if height < end && !self.pause.is_zero() {
                std::thread::sleep(self.pause);
            }
        }
        Ok(())
    }
}
