//! End-to-end scan tests over an in-memory block source

use ruse::detect::Correlator;
use ruse::provider::{BlockSource, FetchError, Transaction, TxInput};
use ruse::scan::{ScanStats, Scanner};
use std::time::Duration;

struct FakeSource {
    base_height: u64,
    blocks: Vec<Vec<Transaction>>,
}

impl FakeSource {
    fn new(base_height: u64, blocks: Vec<Vec<Transaction>>) -> Self {
        FakeSource {
            base_height,
            blocks,
        }
    }

    fn block_index(&self, block_hash: &str) -> Option<usize> {
        block_hash.strip_prefix("hash").and_then(|i| i.parse().ok())
    }
}

impl BlockSource for FakeSource {
    fn block_hash(&self, height: u64) -> Result<String, FetchError> {
        let index = height
            .checked_sub(self.base_height)
            .filter(|i| (*i as usize) < self.blocks.len())
            .ok_or_else(|| FetchError::NotFound(format!("block-height/{height}")))?;
        Ok(format!("hash{index}"))
    }

    fn block_txids(&self, block_hash: &str) -> Result<Vec<String>, FetchError> {
        let index = self
            .block_index(block_hash)
            .ok_or_else(|| FetchError::NotFound(format!("block/{block_hash}")))?;
        Ok(self.blocks[index].iter().map(|tx| tx.txid.clone()).collect())
    }

    fn transaction(&self, txid: &str) -> Result<Transaction, FetchError> {
        self.blocks
            .iter()
            .flatten()
            .find(|tx| tx.txid == txid)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("tx/{txid}")))
    }
}

fn tx(txid: &str, inputs: &[(&str, &str)]) -> Transaction {
    Transaction {
        txid: txid.to_string(),
        vin: inputs
            .iter()
            .map(|(prev, scriptsig)| TxInput {
                txid: prev.to_string(),
                scriptsig: scriptsig.to_string(),
            })
            .collect(),
    }
}

// SEQUENCE { INTEGER r, INTEGER s } with a 1-byte s.
fn der_script(r: &[u8]) -> String {
    let mut script = vec![0x30, (2 + r.len() + 3) as u8, 0x02, r.len() as u8];
    script.extend_from_slice(r);
    script.extend_from_slice(&[0x02, 0x01, 0x01]);
    hex::encode(script)
}

#[test]
fn test_collision_across_two_blocks() {
    // Block 100 carries r = 00ab12, block 101 carries r = ab12; both
    // normalize to the same value.
    let source = FakeSource::new(
        100,
        vec![
            vec![tx("tx1", &[("prev1", &der_script(&[0x00, 0xab, 0x12]))])],
            vec![tx("tx2", &[("prev2", &der_script(&[0xab, 0x12]))])],
        ],
    );
    let scanner = Scanner::new(source, Duration::ZERO);
    let mut correlator = Correlator::new();
    let mut stats = ScanStats::default();

    scanner
        .scan(100, 101, &mut correlator, &mut stats)
        .unwrap();

    let collisions = correlator.collisions();
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].r, "ab12");
    assert_eq!(collisions[0].repeats.len(), 1);
    assert_eq!(collisions[0].repeats[0].txid, "tx2");
    assert_eq!(collisions[0].repeats[0].prev_txid, "prev2");
    assert_eq!(correlator.first_seen("ab12"), Some("tx1"));

    assert_eq!(stats.blocks, 2);
    assert_eq!(stats.transactions, 2);
    assert_eq!(stats.signatures, 2);
}

#[test]
fn test_range_without_reuse_reports_nothing() {
    let source = FakeSource::new(
        50,
        vec![vec![
            tx("tx1", &[("prev1", &der_script(&[0xab]))]),
            tx("tx2", &[("prev2", &der_script(&[0xcd]))]),
        ]],
    );
    let scanner = Scanner::new(source, Duration::ZERO);
    let mut correlator = Correlator::new();
    let mut stats = ScanStats::default();

    scanner.scan(50, 50, &mut correlator, &mut stats).unwrap();

    assert!(!correlator.has_collisions());
    assert_eq!(correlator.distinct_r_values(), 2);
    assert_eq!(stats.signatures, 2);
}

#[test]
fn test_empty_scriptsigs_are_skipped() {
    let source = FakeSource::new(
        10,
        vec![vec![tx(
            "tx1",
            &[("prev1", ""), ("prev2", &der_script(&[0xab]))],
        )]],
    );
    let scanner = Scanner::new(source, Duration::ZERO);
    let mut correlator = Correlator::new();
    let mut stats = ScanStats::default();

    scanner.scan(10, 10, &mut correlator, &mut stats).unwrap();

    assert_eq!(stats.signatures, 1);
    assert_eq!(correlator.distinct_r_values(), 1);
}

#[test]
fn test_multisig_input_yields_every_signature() {
    let script = format!("{}{}", der_script(&[0xab]), der_script(&[0xab]));
    let source = FakeSource::new(10, vec![vec![tx("tx1", &[("prev1", &script)])]]);
    let scanner = Scanner::new(source, Duration::ZERO);
    let mut correlator = Correlator::new();
    let mut stats = ScanStats::default();

    scanner.scan(10, 10, &mut correlator, &mut stats).unwrap();

    // The same r twice within one transaction still counts as reuse.
    assert_eq!(stats.signatures, 2);
    let collisions = correlator.collisions();
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].repeats[0].txid, "tx1");
}

#[test]
fn test_malformed_script_is_counted_and_survived() {
    let source = FakeSource::new(
        10,
        vec![vec![
            tx("tx1", &[("prev1", "30070202ab")]),
            tx("tx2", &[("prev2", &der_script(&[0xcd]))]),
        ]],
    );
    let scanner = Scanner::new(source, Duration::ZERO);
    let mut correlator = Correlator::new();
    let mut stats = ScanStats::default();

    scanner.scan(10, 10, &mut correlator, &mut stats).unwrap();

    assert_eq!(stats.partial_scripts, 1);
    assert_eq!(stats.signatures, 1);
    assert_eq!(correlator.first_seen("cd"), Some("tx2"));
}

#[test]
fn test_fetch_failure_preserves_recorded_state() {
    // Only height 20 exists; the scan dies resolving 21 but keeps what it
    // recorded from 20.
    let source = FakeSource::new(20, vec![vec![tx("tx1", &[("prev1", &der_script(&[0xab]))])]]);
    let scanner = Scanner::new(source, Duration::ZERO);
    let mut correlator = Correlator::new();
    let mut stats = ScanStats::default();

    let result = scanner.scan(20, 21, &mut correlator, &mut stats);

    assert!(matches!(result, Err(FetchError::NotFound(_))));
    assert_eq!(stats.blocks, 1);
    assert_eq!(correlator.first_seen("ab"), Some("tx1"));
}
