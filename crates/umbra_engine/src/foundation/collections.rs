//! Specialized collection types

pub use slotmap::{SlotMap, SecondaryMap};

/// Names one half of a [`DoubleBuffered`] pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSide {
    /// The half being consumed (read by the GPU / drained by the submitter)
    Front,
    /// The half being produced (written by scene traversal)
    Back,
}

/// Types that can be reset when they become the new back buffer
pub trait Recycle {
    /// Reset for reuse as the back buffer
    fn recycle(&mut self);
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// A front/back pair with a single swap chokepoint.
///
/// Writers only ever get the back half mutably through [`DoubleBuffered::back_mut`];
/// [`DoubleBuffered::swap`] exchanges the halves and recycles the new back half.
#[derive(Debug, Clone, Default)]
pub struct DoubleBuffered<T> {
    slots: [T; 2],
    back: usize,
}

impl<T> DoubleBuffered<T> {
    /// Create a pair from explicit front and back values
    pub fn new(front: T, back: T) -> Self {
        Self { slots: [back, front], back: 0 }
    }

    fn index(&self, side: BufferSide) -> usize {
        match side {
            BufferSide::Back => self.back,
            BufferSide::Front => 1 - self.back,
        }
    }

    /// Borrow one side
    pub fn get(&self, side: BufferSide) -> &T {
        &self.slots[self.index(side)]
    }

    /// Mutably borrow one side
    pub fn get_mut(&mut self, side: BufferSide) -> &mut T {
        let index = self.index(side);
        &mut self.slots[index]
    }

    /// Borrow the front half
    pub fn front(&self) -> &T {
        self.get(BufferSide::Front)
    }

    /// Mutably borrow the front half
    pub fn front_mut(&mut self) -> &mut T {
        self.get_mut(BufferSide::Front)
    }

    /// Borrow the back half
    pub fn back(&self) -> &T {
        self.get(BufferSide::Back)
    }

    /// Mutably borrow the back half
    pub fn back_mut(&mut self) -> &mut T {
        self.get_mut(BufferSide::Back)
    }

    /// Iterate over both halves (order unspecified)
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }
}

impl<T: Recycle> DoubleBuffered<T> {
    /// Exchange front and back, then recycle the new back half
    pub fn swap(&mut self) {
        self.back = 1 - self.back;
        let back = self.back;
        self.slots[back].recycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_exchanges_and_clears_back() {
        let mut pair: DoubleBuffered<Vec<u32>> = DoubleBuffered::default();
        pair.back_mut().push(7);
        assert!(pair.front().is_empty());

        pair.swap();

        assert_eq!(pair.front(), &vec![7]);
        assert!(pair.back().is_empty());
    }

    #[test]
    fn test_swap_recycles_previous_front() {
        let mut pair = DoubleBuffered::new(vec![1, 2], vec![3]);
        pair.swap();

        // old back becomes front, old front becomes back and is cleared
        assert_eq!(pair.front(), &vec![3]);
        assert!(pair.back().is_empty());
    }
}
