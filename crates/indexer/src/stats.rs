use serde::{Deserialize, Serialize};

/// Outcome of one projector pass over the outbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Jobs picked up
    pub attempted: usize,

    /// Jobs applied to the search index and removed from the outbox
    pub projected: usize,

    /// Jobs that failed and stay in the outbox
    pub failed: usize,

    /// Time taken in milliseconds
    pub time_ms: u64,

    /// Errors encountered
    pub errors: Vec<String>,
}

impl DrainReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success(&mut self) {
        self.attempted += 1;
        self.projected += 1;
    }

    pub fn add_failure(&mut self, error: String) {
        self.attempted += 1;
        self.failed += 1;
        self.errors.push(error);
    }

    pub fn merge(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.projected += other.projected;
        self.failed += other.failed;
        self.time_ms += other.time_ms;
        self.errors.extend(other.errors);
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_accumulates_counts() {
        let mut total = DrainReport::new();
        total.add_success();

        let mut batch = DrainReport::new();
        batch.add_failure("engine down".to_string());
        batch.time_ms = 7;
        total.merge(batch);

        assert_eq!(total.attempted, 2);
        assert_eq!(total.projected, 1);
        assert_eq!(total.failed, 1);
        assert_eq!(total.time_ms, 7);
        assert!(!total.is_clean());
    }
}
