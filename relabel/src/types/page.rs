use crate::types::{Record, RecordId};

/// An ordered batch of records materialized from a scan.
///
/// Page numbers start at 0 and follow scan order. They are only used to identify a page in
/// logs and run reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u64,
    pub records: Vec<Record>,
}

impl Page {
    pub fn new(number: u64, records: Vec<Record>) -> Self {
        Self { number, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_ids(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.records.iter().map(|record| record.id)
    }
}
