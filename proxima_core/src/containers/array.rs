use super::ContainerError;

/// A bounds-checked array whose length is fixed at construction.
///
/// Out-of-range access is reported as [`ContainerError::BoundsViolation`];
/// there is no truncation or wraparound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedArray<T: Copy + Default> {
    data: Vec<T>,
}

impl<T: Copy + Default> FixedArray<T> {
    /// Creates an array of `size` default-initialized slots.
    pub fn new(size: usize) -> Result<Self, ContainerError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| ContainerError::AllocationFailure { requested: size })?;
        data.resize(size, T::default());
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<T, ContainerError> {
        self.data
            .get(index)
            .copied()
            .ok_or(ContainerError::BoundsViolation {
                index,
                size: self.data.len(),
            })
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<(), ContainerError> {
        let size = self.data.len();
        match self.data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ContainerError::BoundsViolation { index, size }),
        }
    }

    /// Overwrites the first `src.len()` slots with `src`.
    ///
    /// Fails without writing anything if `src` is longer than the array.
    pub fn copy_from(&mut self, src: &[T]) -> Result<(), ContainerError> {
        if src.len() > self.data.len() {
            return Err(ContainerError::BoundsViolation {
                index: src.len(),
                size: self.data.len(),
            });
        }
        self.data[..src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}
