use std::collections::VecDeque;

/// Packs weighted items into bins that approximate a target weight, keeping
/// at most `lookback` bins open at a time.
///
/// Each item goes to the first open bin it fits into. When it fits nowhere, a
/// new bin opens; if that exceeds the lookback window, the oldest bin is
/// emitted. Bins are emitted lazily, in the order they were opened, and an
/// item heavier than the target occupies a bin of its own.
pub(crate) struct PackingIterator<T, I, W>
where
    I: Iterator<Item = T>,
    W: Fn(&T) -> i64,
{
    items: I,
    target_weight: i64,
    lookback: usize,
    weigher: W,
    bins: VecDeque<Bin<T>>,
}

impl<T, I, W> PackingIterator<T, I, W>
where
    I: Iterator<Item = T>,
    W: Fn(&T) -> i64,
{
    pub(crate) fn new(items: I, target_weight: i64, lookback: usize, weigher: W) -> Self {
        Self {
            items,
            target_weight,
            lookback: lookback.max(1),
            weigher,
            bins: VecDeque::new(),
        }
    }

    pub(crate) fn source_mut(&mut self) -> &mut I {
        &mut self.items
    }
}

impl<T, I, W> Iterator for PackingIterator<T, I, W>
where
    I: Iterator<Item = T>,
    W: Fn(&T) -> i64,
{
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.items.by_ref() {
            let weight = (self.weigher)(&item).max(0);
            let target = self.target_weight;
            match self.bins.iter_mut().find(|bin| bin.fits(weight, target)) {
                Some(bin) => bin.add(item, weight),
                None => {
                    let mut bin = Bin::new();
                    bin.add(item, weight);
                    self.bins.push_back(bin);
                    if self.bins.len() > self.lookback {
                        return self.bins.pop_front().map(|bin| bin.items);
                    }
                }
            }
        }
        self.bins.pop_front().map(|bin| bin.items)
    }
}

struct Bin<T> {
    weight: i64,
    items: Vec<T>,
}

impl<T> Bin<T> {
    fn new() -> Self {
        Self {
            weight: 0,
            items: Vec::new(),
        }
    }

    fn fits(&self, weight: i64, target: i64) -> bool {
        self.weight + weight <= target
    }

    fn add(&mut self, item: T, weight: i64) {
        self.weight += weight;
        self.items.push(item);
    }
}
