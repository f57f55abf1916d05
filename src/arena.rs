// SPDX-License-Identifier: Apache-2.0

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Typed handle into an [`Arena<T>`].
pub struct Id<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: u32, generation: u32) -> Self {
        Id {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Dense slot number of this id. Two live ids never share a slot.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense storage with typed ids. Removed slots go on a free list and are
/// reused with a bumped generation, so a stale id misses instead of aliasing
/// the new entry.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Id<T> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            Id::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("arena exceeded u32::MAX entries");
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            Id::new(index, 0)
        }
    }

    pub fn remove(&mut self, id: Id<T>) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        value
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated; an upper bound on `Id::index() + 1`.
    pub fn capacity_hint(&self) -> usize {
        self.slots.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = Id<T>> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Id::new(index as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id<T>, &mut T)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (Id::new(index as u32, generation), value))
        })
    }
}

impl<T> Index<Id<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        self.get(id)
            .unwrap_or_else(|| panic!("Stale or unknown arena id {id:?}"))
    }
}

impl<T> IndexMut<Id<T>> for Arena<T> {
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("Stale or unknown arena id {id:?}"))
    }
}

/// Attribute storage keyed by the ids of some arena: a vector indexed by
/// `Id::index()` that also remembers the generation it was written for.
#[derive(Clone, Debug)]
pub struct SecondaryMap<T, V> {
    values: Vec<Option<(u32, V)>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, V> Default for SecondaryMap<T, V> {
    fn default() -> Self {
        SecondaryMap {
            values: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T, V> SecondaryMap<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: Id<T>, value: V) -> Option<V> {
        if id.index() >= self.values.len() {
            self.values.resize_with(id.index() + 1, || None);
        }
        self.values[id.index()]
            .replace((id.generation, value))
            .filter(|(generation, _)| *generation == id.generation)
            .map(|(_, value)| value)
    }

    pub fn get(&self, id: Id<T>) -> Option<&V> {
        match self.values.get(id.index()) {
            Some(Some((generation, value))) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut V> {
        match self.values.get_mut(id.index()) {
            Some(Some((generation, value))) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_or_insert_with(&mut self, id: Id<T>, default: impl FnOnce() -> V) -> &mut V {
        if self.get(id).is_none() {
            self.insert(id, default());
        }
        self.get_mut(id).expect("value was just inserted")
    }

    pub fn remove(&mut self, id: Id<T>) -> Option<V> {
        let slot = self.values.get_mut(id.index())?;
        match slot {
            Some((generation, _)) if *generation == id.generation => {
                slot.take().map(|(_, value)| value)
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &V)> + '_ {
        self.values.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .as_ref()
                .map(|(generation, value)| (Id::new(index as u32, *generation), value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_ids_are_rejected() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        let b = arena.insert("b");
        // slot is reused, generation is not
        assert_eq!(a.index(), b.index());
        assert!(arena.get(a).is_none());
        assert_eq!(arena[b], "b");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn secondary_map_tracks_generation() {
        let mut arena = Arena::new();
        let mut weights: SecondaryMap<&str, f64> = SecondaryMap::new();
        let a = arena.insert("a");
        weights.insert(a, 2.0);
        arena.remove(a);
        let b = arena.insert("b");
        assert!(weights.get(b).is_none());
        assert_eq!(weights.get(a), Some(&2.0));
        *weights.get_or_insert_with(b, || 1.0) += 1.0;
        assert_eq!(weights.get(b), Some(&2.0));
    }
}
