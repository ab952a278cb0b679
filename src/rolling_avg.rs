use crate::circular_queue::CircularQueue;
use num_traits::{Float, FromPrimitive};

/// Arithmetic mean over the last `window` samples.
#[derive(Debug, Clone)]
pub struct RollingAvg<F> {
    history: CircularQueue<F>,
}

impl<F: Float + FromPrimitive> RollingAvg<F> {
    pub fn new(window: usize) -> Self {
        Self {
            history: CircularQueue::with_capacity(window),
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Records `value` and returns the updated mean.
    pub fn push(&mut self, value: F) -> F {
        self.history.push(value);
        self.mean().unwrap_or(value)
    }

    pub fn mean(&self) -> Option<F> {
        let n = F::from_usize(self.history.len()).filter(|n| !n.is_zero())?;
        let sum = self.history.iter().fold(F::zero(), |acc, v| acc + *v);

        Some(sum / n)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
