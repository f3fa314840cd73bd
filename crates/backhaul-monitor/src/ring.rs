/// Fixed-capacity circular buffer. Once full, each push overwrites the
/// oldest entry. Capacity never changes after construction.
#[derive(Debug, Clone)]
pub struct SampleRing<T> {
    slots: Vec<T>,
    /// Index of the next write.
    head: usize,
    count: usize,
    total_pushed: u64,
}

impl<T: Copy + Default> SampleRing<T> {
    /// Returns `None` for a zero capacity.
    pub fn with_capacity(capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        Some(Self {
            slots: vec![T::default(); capacity],
            head: 0,
            count: 0,
            total_pushed: 0,
        })
    }

    pub fn push(&mut self, value: T) {
        let cap = self.slots.len();
        self.slots[self.head] = value;
        self.head = (self.head + 1) % cap;
        if self.count < cap {
            self.count += 1;
        }
        self.total_pushed += 1;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Samples ever pushed, including evicted ones.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let cap = self.slots.len();
        let start = (self.head + cap - self.count) % cap;
        (0..self.count).map(move |i| self.slots[(start + i) % cap])
    }

    pub fn newest(&self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let cap = self.slots.len();
        Some(self.slots[(self.head + cap - 1) % cap])
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}
