//! Capacity tiers and the load-factor policy that moves between them.

/// Bucket-array lengths a table may take, smallest first.
pub const TIERS: [usize; 20] = [
    31, 61, 113, 223, 443, 883, 1759, 3517, 7027, 14051, 28099, 56197, 112363, 224717, 449419,
    898823, 1797641, 3595271, 7190537, 14381041,
];

/// Capacity used when the caller does not ask for one.
pub const DEFAULT_MIN_CAPACITY: usize = TIERS[0];

/// Index of the first tier able to hold `min_capacity` buckets; requests past
/// the last tier clamp to it.
pub(crate) fn tier_index_for(min_capacity: usize) -> usize {
    TIERS
        .iter()
        .position(|&t| t >= min_capacity)
        .unwrap_or(TIERS.len() - 1)
}

/// Item counts that trigger a resize: shrink below `lower`, grow above `upper`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub lower: usize,
    pub upper: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct SizingPolicy {
    size_index: usize,
    min_size_index: usize,
    thresholds: Thresholds,
}

impl SizingPolicy {
    pub(crate) fn new(min_capacity: usize) -> Self {
        let index = tier_index_for(min_capacity);
        let mut policy = Self {
            size_index: index,
            min_size_index: index,
            thresholds: Thresholds { lower: 0, upper: 0 },
        };
        policy.adopt(index);
        policy
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        TIERS[self.size_index]
    }

    #[inline]
    pub(crate) fn min_capacity(&self) -> usize {
        TIERS[self.min_size_index]
    }

    #[inline]
    pub(crate) fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Tier index a table holding `items` should move to, or `None` when the
    /// current tier is fine. Never returns the current tier.
    pub(crate) fn target(&self, items: usize) -> Option<usize> {
        if items > self.thresholds.upper {
            let next = self.size_index + 1;
            (next < TIERS.len()).then_some(next)
        } else if items < self.thresholds.lower {
            // lower is 0 at the minimum tier, so size_index > min_size_index here.
            let mut i = self.size_index;
            loop {
                i -= 1;
                if !(i > self.min_size_index && items < TIERS[i] / 4) {
                    break;
                }
            }
            Some(i)
        } else {
            None
        }
    }

    /// Record that the bucket array now has tier `index`'s length.
    pub(crate) fn adopt(&mut self, index: usize) {
        debug_assert!(index >= self.min_size_index && index < TIERS.len());
        let capacity = TIERS[index];
        self.size_index = index;
        self.thresholds = Thresholds {
            lower: if index == self.min_size_index {
                0
            } else {
                capacity / 4
            },
            upper: capacity * 9 / 10,
        };
    }
}
