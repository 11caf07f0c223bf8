use std::collections::VecDeque;

/// One chart point: an opaque timestamp label paired with its value.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub label: String,
    pub value: f64,
}

impl Sample {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }

    /// The label read as a millisecond Unix timestamp, if it is one.
    pub fn timestamp_ms(&self) -> Option<i64> {
        self.label.trim().parse::<i64>().ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub total: f64,
}

/// Ordered window of samples backed by VecDeque.
/// Insertion order is chronological order. When a capacity is set, appending
/// to a full buffer drops the oldest sample first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuffer {
    buf: VecDeque<Sample>,
    capacity: Option<usize>,
}

impl SampleBuffer {
    /// A buffer whose eviction is left entirely to the caller.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(4096)),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            buf: samples.into_iter().collect(),
            capacity: None,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Change the capacity, trimming the head if the buffer is now over it.
    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity.map(|c| c.max(1));
        self.enforce_capacity();
    }

    pub fn append(&mut self, label: impl Into<String>, value: f64) {
        self.push(Sample::new(label, value));
    }

    pub fn push(&mut self, sample: Sample) {
        if let Some(cap) = self.capacity {
            if self.buf.len() >= cap {
                self.buf.pop_front();
            }
        }
        self.buf.push_back(sample);
    }

    /// Remove the sample at the head. `None` on an empty buffer.
    pub fn evict_oldest(&mut self) -> Option<Sample> {
        self.buf.pop_front()
    }

    /// Drop head samples while `stale` holds. Returns how many were removed.
    pub fn evict_while(&mut self, mut stale: impl FnMut(&Sample) -> bool) -> usize {
        let mut removed = 0;
        while self.buf.front().is_some_and(&mut stale) {
            self.buf.pop_front();
            removed += 1;
        }
        removed
    }

    /// Overwrite the newest value in place (a day still being counted).
    pub fn set_last_value(&mut self, value: f64) -> bool {
        match self.buf.back_mut() {
            Some(s) => {
                s.value = value;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Swap the whole content, keeping the capacity policy.
    pub fn replace(&mut self, samples: impl IntoIterator<Item = Sample>) {
        self.buf.clear();
        for s in samples {
            self.push(s);
        }
    }

    /// Read-only view of the ordered samples.
    pub fn snapshot(&self) -> &VecDeque<Sample> {
        &self.buf
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.buf.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Sample> {
        self.buf.get(idx)
    }

    pub fn last(&self) -> Option<&Sample> {
        self.buf.back()
    }

    pub fn labels(&self) -> Vec<String> {
        self.buf.iter().map(|s| s.label.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.buf.iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Mean, extremes and sum of the values; `None` when empty.
    pub fn stats(&self) -> Option<Stats> {
        if self.buf.is_empty() {
            return None;
        }
        let mut stats = Stats {
            mean: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            total: 0.0,
        };
        for s in &self.buf {
            stats.min = stats.min.min(s.value);
            stats.max = stats.max.max(s.value);
            stats.total += s.value;
        }
        stats.mean = stats.total / self.buf.len() as f64;
        Some(stats)
    }

    fn enforce_capacity(&mut self) {
        if let Some(cap) = self.capacity {
            while self.buf.len() > cap {
                self.buf.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_evict_counts() {
        let mut buf = SampleBuffer::unbounded();
        let mut appended = 0;
        let mut evicted = 0;
        for i in 0..25 {
            buf.append(format!("{i}"), i as f64);
            appended += 1;
            if i % 3 == 0 && buf.evict_oldest().is_some() {
                evicted += 1;
            }
            assert_eq!(buf.snapshot().len(), appended - evicted);
        }
    }

    #[test]
    fn test_evict_on_empty() {
        let mut buf = SampleBuffer::unbounded();
        assert!(buf.evict_oldest().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bounded_drops_head() {
        let mut buf = SampleBuffer::bounded(3);
        for (i, v) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            buf.append(i.to_string(), *v);
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.values(), vec![2.0, 3.0, 4.0]);
        assert_eq!(buf.labels(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_shrinking_capacity_trims_head() {
        let mut buf = SampleBuffer::from_samples((0..10).map(|i| Sample::new(i.to_string(), i as f64)));
        buf.set_capacity(Some(4));
        assert_eq!(buf.values(), vec![6.0, 7.0, 8.0, 9.0]);
        buf.set_capacity(None);
        buf.append("10", 10.0);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_evict_while_stops_at_first_fresh() {
        let mut buf = SampleBuffer::from_samples(
            [100, 200, 300, 150].iter().map(|t| Sample::new(t.to_string(), 1.0)),
        );
        let removed = buf.evict_while(|s| s.timestamp_ms().unwrap_or(0) < 250);
        assert_eq!(removed, 2);
        assert_eq!(buf.labels(), vec!["300", "150"]);
    }

    #[test]
    fn test_replace_respects_capacity() {
        let mut buf = SampleBuffer::bounded(2);
        buf.replace(vec![Sample::new("a", 1.0), Sample::new("b", 2.0), Sample::new("c", 3.0)]);
        assert_eq!(buf.labels(), vec!["b", "c"]);
    }

    #[test]
    fn test_stats() {
        assert!(SampleBuffer::unbounded().stats().is_none());
        let buf = SampleBuffer::from_samples([Sample::new("a", 100.0), Sample::new("b", 150.0), Sample::new("c", 120.0)]);
        let stats = buf.stats().unwrap();
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 150.0);
        assert_eq!(stats.total, 370.0);
        assert!((stats.mean - 123.333).abs() < 0.001);
    }

    #[test]
    fn test_timestamp_label() {
        assert_eq!(Sample::new("1700000000000", 0.0).timestamp_ms(), Some(1_700_000_000_000));
        assert_eq!(Sample::new("09:00", 0.0).timestamp_ms(), None);
    }
}
