// =============================================================================
// Relative Strength Index (RSI): Wilder's Smoothing
// =============================================================================
//
// Step 1: Compute price changes (deltas) from consecutive closes.
// Step 2: Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3: Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4: RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Two entry points share the same recurrence:
//   * `calculate_rsi`: batch recompute over a slice of closes, the reference
//     the streaming path is checked against.
//   * `RsiEngine`    : streaming state, one close at a time, seeded from
//     history by `from_closes`.
// Both produce bit-identical averages for the same input sequence.
// =============================================================================

/// Default look-back used when no period is configured.
pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Compute the full RSI series for the given `closes` and `period`.
///
/// Reference recompute for checking the streaming engine; production code
/// seeds through [`RsiEngine::from_closes`].
///
/// The returned vector has one RSI value for each close starting at index
/// `period` (the first `period` deltas are consumed to seed the averages).
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period + 1` => empty vec (need at least `period` deltas)
/// - If average loss is zero (no down moves), RSI saturates to 100.0.
#[cfg(test)]
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    smoothed_averages(closes, period)
        .into_iter()
        .map(|(avg_gain, avg_loss)| rsi_from_averages(avg_gain, avg_loss))
        .collect()
}

/// Most recent RSI value over `closes`, or `None` when there is not enough
/// data.
#[cfg(test)]
pub fn current_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// Per-step `(avg_gain, avg_loss)` pairs for a batch of closes.
fn smoothed_averages(closes: &[f64], period: usize) -> Vec<(f64, f64)> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    // --- Compute price deltas ------------------------------------------------
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // --- Seed averages with SMA of first `period` deltas ---------------------
    let (sum_gain, sum_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            let (gain, loss) = split_delta(d);
            (g + gain, l + loss)
        });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push((avg_gain, avg_loss));

    // --- Wilder's smoothing for subsequent values ----------------------------
    for &delta in &deltas[period..] {
        let (gain, loss) = split_delta(delta);
        avg_gain = wilder_step(avg_gain, gain, period_f);
        avg_loss = wilder_step(avg_loss, loss, period_f);
        result.push((avg_gain, avg_loss));
    }

    result
}

// =============================================================================
// Streaming engine
// =============================================================================

/// Incremental Wilder RSI.
///
/// The engine remembers the previous close and the smoothed averages, so each
/// new close costs O(1). Until `period` deltas have been observed the deltas
/// are summed into the seed; the first reading is emitted on the
/// `period + 1`-th close.
///
/// A period change requires a new engine.
#[derive(Debug, Clone)]
pub struct RsiEngine {
    period: usize,
    prev_close: Option<f64>,
    deltas_seen: usize,
    avg_gain: f64,
    avg_loss: f64,
    latest: Option<f64>,
}

impl RsiEngine {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            deltas_seen: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            latest: None,
        }
    }

    /// Build an engine from historical closes (oldest first).
    ///
    /// With at least `period + 1` closes this is a batch recompute and the
    /// engine is immediately ready; shorter histories are replayed through
    /// [`RsiEngine::update`] so the warm-up continues with live closes.
    pub fn from_closes(period: usize, closes: &[f64]) -> Self {
        let mut engine = Self::new(period);

        let Some(&(avg_gain, avg_loss)) = smoothed_averages(closes, period).last() else {
            for &close in closes {
                engine.update(close);
            }
            return engine;
        };

        engine.prev_close = closes.last().copied();
        engine.deltas_seen = closes.len() - 1;
        engine.avg_gain = avg_gain;
        engine.avg_loss = avg_loss;
        engine.latest = Some(rsi_from_averages(avg_gain, avg_loss));
        engine
    }

    /// Feed one confirmed close. Returns the new RSI, or `None` while fewer
    /// than `period + 1` closes have been observed.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }

        let prev = self.prev_close.replace(close)?;
        let (gain, loss) = split_delta(close - prev);
        let period_f = self.period as f64;

        self.deltas_seen = self.deltas_seen.saturating_add(1);

        if self.deltas_seen <= self.period {
            // Warm-up: accumulate raw sums, divide once the seed is complete.
            self.avg_gain += gain;
            self.avg_loss += loss;
            if self.deltas_seen < self.period {
                return None;
            }
            self.avg_gain /= period_f;
            self.avg_loss /= period_f;
        } else {
            self.avg_gain = wilder_step(self.avg_gain, gain, period_f);
            self.avg_loss = wilder_step(self.avg_loss, loss, period_f);
        }

        let rsi = rsi_from_averages(self.avg_gain, self.avg_loss);
        self.latest = Some(rsi);
        Some(rsi)
    }

    /// Last computed RSI, `None` until the seed window is complete.
    pub fn latest(&self) -> Option<f64> {
        self.latest
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.latest.is_some()
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Smoothed average gain. Only meaningful once [`is_ready`](Self::is_ready).
    #[cfg(test)]
    pub fn avg_gain(&self) -> f64 {
        self.avg_gain
    }

    /// Smoothed average loss. Only meaningful once [`is_ready`](Self::is_ready).
    #[cfg(test)]
    pub fn avg_loss(&self) -> f64 {
        self.avg_loss
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Split a delta into its (gain, loss) magnitudes; both are >= 0.
fn split_delta(delta: f64) -> (f64, f64) {
    if delta > 0.0 {
        (delta, 0.0)
    } else {
        (0.0, delta.abs())
    }
}

fn wilder_step(prev_avg: f64, value: f64, period_f: f64) -> f64 {
    (prev_avg * (period_f - 1.0) + value) / period_f
}

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// Zero average loss saturates to 100.0 instead of dividing by zero, which
/// also covers a perfectly flat market.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
