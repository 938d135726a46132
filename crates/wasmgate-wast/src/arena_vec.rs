//! A growable, arena-backed vector of `Copy` values.
//!
//! Used by the lowering pass for the in-scope label stack: pushed on entry
//! to every `block`/`loop`/`if` arm and popped on exit, one per function
//! body, then discarded via [`wasmgate_arena::Arena::revert`] once the
//! function is fully lowered. A plain heap `Vec` would do the same job;
//! this exists so that transient per-function lowering state actually goes
//! through the arena the parser is handed, rather than bypassing it.

use core::mem::{align_of, size_of};
use core::ptr::NonNull;

use wasmgate_arena::Arena;

pub struct ArenaVec<'a, T: Copy> {
    arena: &'a Arena,
    ptr: NonNull<T>,
    len: usize,
    cap: usize,
}

impl<'a, T: Copy> ArenaVec<'a, T> {
    pub fn new(arena: &'a Arena) -> Self {
        let cap = 8;
        let ptr = arena.allocate(cap * size_of::<T>(), align_of::<T>()).cast::<T>();
        Self { arena, ptr, len: 0, cap }
    }

    pub fn push(&mut self, value: T) {
        if self.len == self.cap {
            let new_cap = self.cap * 2;
            let new_ptr = self.arena.reallocate(
                self.ptr.cast::<u8>(),
                self.cap * size_of::<T>(),
                new_cap * size_of::<T>(),
                align_of::<T>(),
            );
            self.ptr = new_ptr.cast::<T>();
            self.cap = new_cap;
        }
        // SAFETY: `self.len < self.cap` after the grow above, and `ptr` was
        // allocated to hold `cap` contiguous `T`s.
        unsafe { self.ptr.as_ptr().add(self.len).write(value) };
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        // SAFETY: index `self.len` was written by a previous `push` and not
        // since read destructively (this is the only popping method).
        Some(unsafe { self.ptr.as_ptr().add(self.len).read() })
    }

    pub fn last(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        // SAFETY: index `self.len - 1` holds a previously written value.
        Some(unsafe { &*self.ptr.as_ptr().add(self.len - 1) })
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        // SAFETY: `index < self.len`, within the written prefix.
        Some(unsafe { &*self.ptr.as_ptr().add(index) })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_and_grow_past_initial_capacity() {
        let arena = Arena::new();
        let mut v: ArenaVec<u32> = ArenaVec::new(&arena);
        for i in 0..20u32 {
            v.push(i);
        }
        assert_eq!(v.len(), 20);
        assert_eq!(v.get(0), Some(&0));
        assert_eq!(v.get(19), Some(&19));
        for i in (0..20u32).rev() {
            assert_eq!(v.pop(), Some(i));
        }
        assert_eq!(v.pop(), None);
    }

    #[test]
    fn reverts_with_its_owning_mark() {
        let arena = Arena::new();
        let before = arena.allocated_bytes();
        let mark = arena.mark();
        {
            let mut v: ArenaVec<u64> = ArenaVec::new(&arena);
            v.push(1);
            v.push(2);
        }
        assert!(arena.allocated_bytes() > before);
        arena.revert(mark);
        assert_eq!(arena.allocated_bytes(), before);
    }
}
