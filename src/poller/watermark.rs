use chrono::DateTime;
use chrono::Utc;

/// Timestamp boundary below which readings are assumed delivered.
///
/// Non-decreasing: [`Watermark::advance_to`] ignores any instant not strictly
/// later than the current value, so a wall clock stepping backwards can never
/// move it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    value: DateTime<Utc>,
}

impl Watermark {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { value: start }
    }

    pub fn value(&self) -> DateTime<Utc> {
        self.value
    }

    /// Returns `true` when the watermark moved.
    pub fn advance_to(
        &mut self,
        candidate: DateTime<Utc>,
    ) -> bool {
        if candidate > self.value {
            self.value = candidate;
            true
        } else {
            false
        }
    }
}
