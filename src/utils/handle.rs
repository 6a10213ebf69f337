use std::hash::Hash;
use std::marker::PhantomData;

/// Generational index into a [`Pool`].
#[derive(Debug)]
pub struct Handle<T> {
    pub slot: u16,
    pub generation: u16,
    phantom: PhantomData<T>,
}

impl<T> Handle<T> {
    pub fn new(slot: u16, generation: u16) -> Self {
        Self {
            slot,
            generation,
            phantom: PhantomData,
        }
    }

    /// Packs the handle into a non-zero `u64` so zero can stay the null value.
    pub fn to_raw(self) -> u64 {
        ((self.generation as u64) << 16 | self.slot as u64) + 1
    }

    pub fn from_raw(raw: u64) -> Option<Self> {
        let packed = raw.checked_sub(1)?;
        if packed > u32::MAX as u64 {
            return None;
        }
        Some(Self::new((packed & 0xFFFF) as u16, (packed >> 16) as u16))
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

pub struct Pool<T> {
    items: Vec<Option<T>>,
    empty: Vec<usize>,
    generation: Vec<u16>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        const INITIAL_SIZE: usize = 64;
        Self::new(INITIAL_SIZE)
    }
}

impl<T> Pool<T> {
    pub fn new(initial_size: usize) -> Self {
        let mut p = Pool {
            items: Vec::with_capacity(initial_size),
            empty: (0..initial_size).rev().collect(),
            generation: vec![0; initial_size],
        };
        p.items.resize_with(initial_size, || None);
        p
    }

    /// Inserts `item`, growing the pool when every slot is taken. Returns `None` once the
    /// 16-bit slot space is exhausted.
    pub fn insert(&mut self, item: T) -> Option<Handle<T>> {
        let slot = match self.empty.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.items.len();
                if slot > u16::MAX as usize {
                    return None;
                }
                self.items.push(None);
                self.generation.push(0);
                slot
            }
        };

        self.items[slot] = Some(item);
        Some(Handle::new(slot as u16, self.generation[slot]))
    }

    /// Frees the slot and bumps its generation so stale handles stop resolving.
    pub fn release(&mut self, item: Handle<T>) -> Option<T> {
        let slot = item.slot as usize;
        if self.generation.get(slot) != Some(&item.generation) {
            return None;
        }
        let value = self.items[slot].take()?;
        self.generation[slot] = self.generation[slot].wrapping_add(1);
        self.empty.push(slot);
        Some(value)
    }

    pub fn get_ref(&self, item: Handle<T>) -> Option<&T> {
        let slot = item.slot as usize;
        if self.generation.get(slot)? != &item.generation {
            return None;
        }
        self.items[slot].as_ref()
    }

    pub fn get_mut_ref(&mut self, item: Handle<T>) -> Option<&mut T> {
        let slot = item.slot as usize;
        if self.generation.get(slot)? != &item.generation {
            return None;
        }
        self.items[slot].as_mut()
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|item| item.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn for_each_occupied<F>(&self, mut func: F)
    where
        F: FnMut(&T),
    {
        for item in self.items.iter().flatten() {
            func(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_release_bumps_generation() {
        let mut pool = Pool::new(2);
        let a = pool.insert(1u32).unwrap();
        assert_eq!(pool.get_ref(a), Some(&1));

        assert_eq!(pool.release(a), Some(1));
        assert!(pool.get_ref(a).is_none());

        let b = pool.insert(2u32).unwrap();
        assert_eq!(a.slot, b.slot);
        assert_ne!(a.generation, b.generation);
        assert_eq!(pool.get_ref(b), Some(&2));
    }

    #[test]
    fn grows_past_initial_size() {
        let mut pool = Pool::new(1);
        let handles: Vec<_> = (0..8u32).map(|i| pool.insert(i).unwrap()).collect();
        assert_eq!(pool.len(), 8);
        assert_eq!(pool.get_ref(handles[7]), Some(&7));
    }

    #[test]
    fn raw_round_trip_is_never_zero() {
        let handle = Handle::<u32>::new(0, 0);
        assert_ne!(handle.to_raw(), 0);
        assert_eq!(Handle::<u32>::from_raw(handle.to_raw()), Some(handle));
        assert!(Handle::<u32>::from_raw(0).is_none());
    }
}
