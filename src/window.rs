//! Bounded sample windows and the median used by both synchronizers.

/// Median of a sample set. Even-length sets average the two middle values.
///
/// Returns `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    median_in_place(&mut values.to_vec())
}

/// Same as [`median`], but sorts `values` in place instead of copying.
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Bounded, insertion-ordered window of error samples.
///
/// The window never grows past its capacity: it is filled, consumed by an
/// estimator, then cleared. Insertion index is the time axis for slope fits.
#[derive(Debug, Clone)]
pub struct ErrorWindow {
    samples: Vec<i64>,
    /// Sort buffer for `median`, sized once at construction
    scratch: Vec<f64>,
    capacity: usize,
}

impl ErrorWindow {
    pub fn new(capacity: usize) -> Self {
        ErrorWindow {
            samples: Vec::with_capacity(capacity),
            scratch: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample. Returns `true` once the window is full.
    ///
    /// A push into an already full window drops the oldest sample so the
    /// size bound holds even if the owner forgets to clear.
    pub fn push(&mut self, error: i64) -> bool {
        if self.samples.len() >= self.capacity {
            self.samples.remove(0);
        }
        self.samples.push(error);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.samples
    }

    /// Median of the held samples. Reuses the window's own sort buffer.
    pub fn median(&mut self) -> Option<f64> {
        self.scratch.clear();
        self.scratch.extend(self.samples.iter().map(|&e| e as f64));
        median_in_place(&mut self.scratch)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
