/// Monotonic counter used for folder ids and layer z-indices.
///
/// A `Sequence` is an explicit value owned by the caller and passed by `&mut`
/// into the resolver and tree builder. Two builds that share a sequence never
/// hand out the same value twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    next: u64,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// The value the next call will hand out.
    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn next_value(&mut self) -> u64 {
        let value = self.next;
        self.next += 1;
        value
    }

    /// Returns `prefix` followed by the next value, e.g. `folder-12`.
    pub fn next(&mut self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_value())
    }

    /// Rewinds the counter. Only test harnesses may do this.
    #[cfg(any(test, feature = "test-util"))]
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::Sequence;

    #[test]
    fn values_are_strictly_increasing() {
        let mut seq = Sequence::new();
        let a = seq.next_value();
        let b = seq.next_value();
        let c = seq.next_value();
        assert!(a < b && b < c);
        assert_eq!(seq.peek(), 3);
    }

    #[test]
    fn prefixed_ids_carry_the_counter() {
        let mut seq = Sequence::starting_at(7);
        assert_eq!(seq.next("folder-"), "folder-7");
        assert_eq!(seq.next("folder-"), "folder-8");
        assert_eq!(seq.next(""), "9");
    }

    #[test]
    fn reset_rewinds_to_zero() {
        let mut seq = Sequence::new();
        seq.next_value();
        seq.next_value();
        seq.reset();
        assert_eq!(seq.next_value(), 0);
    }
}
