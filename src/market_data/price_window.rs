use std::collections::VecDeque;

use tracing::warn;

// ---------------------------------------------------------------------------
// PriceWindow -- bounded FIFO of closing prices
// ---------------------------------------------------------------------------

/// Fixed-capacity ring of closing prices, oldest first.
///
/// Appends go to the tail; once the ring holds more than `capacity` entries
/// the oldest one is evicted from the head. The window is owned by a single
/// writer (the ingestor), so it carries no interior locking.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    closes: VecDeque<f64>,
    capacity: usize,
}

impl PriceWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            closes: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Push `price` to the tail, evicting from the head to stay within
    /// capacity.
    pub fn append(&mut self, price: f64) {
        self.closes.push_back(price);
        while self.closes.len() > self.capacity {
            self.closes.pop_front();
        }
    }

    /// Replace the contents wholesale with `prices` (oldest first).
    ///
    /// Inputs longer than the capacity are truncated to their last `capacity`
    /// entries.
    pub fn seed(&mut self, prices: &[f64]) {
        let start = prices.len().saturating_sub(self.capacity);
        if start > 0 {
            warn!(
                supplied = prices.len(),
                capacity = self.capacity,
                "seed longer than window capacity, keeping the most recent closes"
            );
        }
        self.closes.clear();
        self.closes.extend(prices[start..].iter().copied());
    }

    /// Copy of the current contents, oldest first.
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<f64> {
        self.closes.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    pub fn is_full(&self) -> bool {
        self.closes.len() >= self.capacity
    }

    /// Most recent close, if any.
    pub fn last(&self) -> Option<f64> {
        self.closes.back().copied()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
