use crate::model::Price;

/// Running sum with extremes, fed one value at a time.
#[derive(Debug, Clone, Copy)]
pub struct Accumulator {
    sum: Price,
    length: usize,
    max: Price,
    min: Price,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            sum: Price::default(),
            length: 0,
            max: Price::NEG_INFINITY,
            min: Price::INFINITY,
        }
    }
}

impl Accumulator {
    pub fn feed(&mut self, value: Price) {
        self.sum += value;
        self.length += 1;
        self.max = self.max.max(value);
        self.min = self.min.min(value);
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn avg(&self) -> Option<Price> {
        (self.length > 0).then(|| self.sum / self.length as Price)
    }

    pub fn max(&self) -> Option<Price> {
        (self.length > 0).then_some(self.max)
    }

    pub fn min(&self) -> Option<Price> {
        (self.length > 0).then_some(self.min)
    }
}

impl FromIterator<Price> for Accumulator {
    fn from_iter<T: IntoIterator<Item = Price>>(iter: T) -> Self {
        let mut acc = Self::default();
        for value in iter {
            acc.feed(value);
        }
        acc
    }
}
