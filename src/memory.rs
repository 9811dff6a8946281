use std::ops::Range;

use ndarray::{ArrayViewD, ArrayViewMutD, IxDyn};

use crate::{LayerErr, Result};

/// A named region of the arena's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    name: &'static str,
    range: Range<usize>,
    shape: Vec<usize>,
}

/// A fixed-capacity arena of `f32` values.
///
/// The buffer is allocated once, zeroed, and carved into named regions on request. Regions are
/// append-only: they are never freed or moved, so a region keeps its address for the whole
/// lifetime of the arena.
#[derive(Debug, Clone)]
pub struct Memory {
    buf: Vec<f32>,
    used: usize,
    slots: Vec<Slot>,
}

impl Memory {
    /// Creates a new `Memory`.
    ///
    /// # Arguments
    /// * `capacity` - The total amount of values the arena can hold.
    ///
    /// # Returns
    /// A new zeroed `Memory` instance.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0.0; capacity],
            used: 0,
            slots: Vec::new(),
        }
    }

    /// Returns the total amount of values the arena can hold.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the amount of values already handed out.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Returns the amount of named regions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|slot| slot.name == name)
    }

    /// Returns the region names in allocation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots.iter().map(|slot| slot.name)
    }

    /// Carves a new region out of the arena.
    ///
    /// # Arguments
    /// * `name` - The key the region will be looked up by.
    /// * `shape` - The shape of the view over the region.
    ///
    /// # Returns
    /// A mutable view of the new region or an error if the name is taken or the arena doesn't
    /// have room for it.
    pub fn allocate(
        &mut self,
        name: &'static str,
        shape: &[usize],
    ) -> Result<ArrayViewMutD<'_, f32>> {
        if self.contains(name) {
            return Err(LayerErr::AlreadyAllocated { name });
        }

        let size: usize = shape.iter().product();
        let available = self.capacity() - self.used;
        if size > available {
            return Err(LayerErr::Capacity {
                name,
                requested: size,
                available,
            });
        }

        let range = self.used..self.used + size;
        self.used = range.end;
        self.slots.push(Slot {
            name,
            range: range.clone(),
            shape: shape.to_vec(),
        });

        let view = ArrayViewMutD::from_shape(IxDyn(shape), &mut self.buf[range])?;
        Ok(view)
    }

    /// Returns the shape a region was allocated with.
    pub fn shape(&self, name: &'static str) -> Result<&[usize]> {
        Ok(&self.slot(name)?.shape)
    }

    /// Gives a view of the region.
    pub fn get(&self, name: &'static str) -> Result<ArrayViewD<'_, f32>> {
        let slot = self.slot(name)?;
        let view = ArrayViewD::from_shape(IxDyn(&slot.shape), &self.buf[slot.range.clone()])?;
        Ok(view)
    }

    /// Gives a mutable view of the region.
    pub fn get_mut(&mut self, name: &'static str) -> Result<ArrayViewMutD<'_, f32>> {
        let Slot { range, shape, .. } = self.slot(name)?.clone();
        let view = ArrayViewMutD::from_shape(IxDyn(&shape), &mut self.buf[range])?;
        Ok(view)
    }

    /// Gives the raw values of the region in row-major order.
    pub fn slice(&self, name: &'static str) -> Result<&[f32]> {
        let range = self.slot(name)?.range.clone();
        Ok(&self.buf[range])
    }

    /// Gives the raw mutable values of the region in row-major order.
    pub fn slice_mut(&mut self, name: &'static str) -> Result<&mut [f32]> {
        let range = self.slot(name)?.range.clone();
        Ok(&mut self.buf[range])
    }

    /// Zeroes out every value handed out so far.
    pub fn zero(&mut self) {
        self.buf[..self.used].fill(0.0);
    }

    fn slot(&self, name: &'static str) -> Result<&Slot> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .ok_or(LayerErr::NotFound { name })
    }
}
