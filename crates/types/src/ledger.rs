use std::time::SystemTime;

use alloy_primitives::B256;

/// A transaction accepted by the sender node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxRecord {
    pub hash: B256,
    pub sent_at: SystemTime,
}

/// Append-only list of the transactions submitted during one test case.
#[derive(Clone, Debug, Default)]
pub struct TxLedger {
    records: Vec<TxRecord>,
}

impl TxLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, hash: B256, sent_at: SystemTime) {
        self.records.push(TxRecord { hash, sent_at });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TxRecord> {
        self.records.iter()
    }

    pub fn hashes(&self) -> impl Iterator<Item = B256> + '_ {
        self.records.iter().map(|r| r.hash)
    }
}

impl<'a> IntoIterator for &'a TxLedger {
    type Item = &'a TxRecord;
    type IntoIter = std::slice::Iter<'a, TxRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
