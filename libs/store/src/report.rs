//! Classification of a bulk insert.

use types::ids::EventId;

/// A document that failed for a reason other than a duplicate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertFailure {
    /// Position in the submitted slice.
    pub index: usize,
    pub id: EventId,
    pub reason: String,
}

/// Per-document results of one `insert_many` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub attempted: usize,
    pub inserted: usize,
    /// Skipped because a document with the same id already exists.
    pub duplicates: usize,
    pub failures: Vec<InsertFailure>,
}

/// How the caller should treat an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Every document was newly stored.
    AllInserted,
    /// Some documents were already stored; nothing else went wrong.
    DuplicatesSkipped,
    /// At least one document failed for another reason.
    Failed,
}

impl InsertReport {
    pub fn new(attempted: usize) -> Self {
        Self {
            attempted,
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> InsertOutcome {
        if !self.failures.is_empty() {
            InsertOutcome::Failed
        } else if self.duplicates > 0 {
            InsertOutcome::DuplicatesSkipped
        } else {
            InsertOutcome::AllInserted
        }
    }

    /// Duplicate-only outcomes count as success: the documents are stored.
    pub fn is_success(&self) -> bool {
        self.outcome() != InsertOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        let mut report = InsertReport::new(3);
        report.inserted = 3;
        assert_eq!(report.outcome(), InsertOutcome::AllInserted);

        report.inserted = 2;
        report.duplicates = 1;
        assert_eq!(report.outcome(), InsertOutcome::DuplicatesSkipped);
        assert!(report.is_success());

        report.failures.push(InsertFailure {
            index: 0,
            id: EventId::new("1"),
            reason: "disk I/O error".into(),
        });
        assert_eq!(report.outcome(), InsertOutcome::Failed);
        assert!(!report.is_success());
    }
}
