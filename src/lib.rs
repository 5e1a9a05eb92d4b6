//! Circular doubly linked list with stable, in-place merge sorting.
//! The list layout is inspired by the [linux implementation in `C`
//! ](https://github.com/torvalds/linux/blob/master/include/linux/list.h): a
//! sentinel head node points to itself when the list is empty, and every
//! element is reachable from it in both directions.
//!
//! Sorting relinks the existing nodes in place and never allocates; the
//! [`sort`] module provides three run-stack balancing policies behind one
//! interface, all of them stable and bounded by O(n log n) comparisons.
//!
//! # Basic usage
//! ```
//! use cll_sort::list;
//! let mut my_list = list![3, 1, 4, 1, 5];
//!
//! assert_eq!(my_list.remove(), Some(3));
//! my_list.sort();
//!
//! assert_eq!(my_list.into_iter().collect::<Vec<i32>>(), &[1, 1, 4, 5])
//! ```
mod head;
pub mod sort;

pub use crate::head::ListHead;
pub use crate::sort::{sort_raw, MergePolicy};

use {
    crate::head::{Iter, IterMut, Node},
    either::Either,
    std::marker::PhantomData,
};

#[macro_export]
macro_rules! list {
    [$($elem:expr),* $(,)?] => {{
        #[allow(unused_mut)]
        let mut l = $crate::CircularList::default();
        $(
            l.add($elem);
        )*
        l
    }}
}

/// An owning circular doubly linked list built around a sentinel head node.
pub struct CircularList<T> {
    /// Sentinel; `(*head).next == head` exactly when the list is empty.
    head: *mut ListHead,
    length: usize,
    _marker: PhantomData<Box<Node<T>>>,
}
impl<T> CircularList<T> {
    pub fn len(&self) -> usize {
        self.length
    }
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
    /// Sentinel of the underlying ring, for the sort engine and tests.
    pub(crate) fn sentinel(&self) -> *mut ListHead {
        self.head
    }
    /// Appends `val` at the back of the list.
    pub fn add(&mut self, val: T) {
        let new = Box::leak(Node::new(val));
        unsafe {
            // SAFETY: `self.head` is the live sentinel of a valid circular
            // list and `new` is freshly allocated, linked nowhere yet.
            ListHead::add_tail(&mut new.links, self.head);
        }
        self.length += 1;
    }
    /// Removes and returns the first element.
    pub fn remove(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let node = unsafe {
            // SAFETY: the list is not empty, so `head.next` is a payload node
            // owned by this list; after `del_entry` nothing points at it
            // anymore and the original `Box::leak` can be undone.
            let first = (*self.head).next;
            ListHead::del_entry(first);
            Box::from_raw(Node::<T>::container_of(first))
        };
        self.length -= 1;
        Some(node.value)
    }
    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let node = unsafe {
            // SAFETY: same as `remove`, with `head.prev` as the payload node.
            let last = (*self.head).prev;
            ListHead::del_entry(last);
            Box::from_raw(Node::<T>::container_of(last))
        };
        self.length -= 1;
        Some(node.value)
    }
    pub fn iter_forever(&self) -> impl Iterator<Item = &T> {
        if self.is_empty() {
            Either::Left(std::iter::empty())
        } else {
            Either::Right(Iter::new(self.head))
        }
    }
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.iter_forever().take(self.len())
    }
    pub fn iter_mut_forever(&mut self) -> impl Iterator<Item = &mut T> {
        if self.is_empty() {
            Either::Left(std::iter::empty())
        } else {
            Either::Right(IterMut::new(self.head))
        }
    }
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        let len = self.len();
        self.iter_mut_forever().take(len)
    }
}
impl<T> Default for CircularList<T> {
    fn default() -> Self {
        Self {
            head: Box::leak(ListHead::new()),
            length: 0,
            _marker: PhantomData,
        }
    }
}
impl<T: Clone> Clone for CircularList<T> {
    fn clone(&self) -> Self {
        let mut clone: Self = Default::default();
        for x in self.iter() {
            clone.add(x.clone());
        }
        clone
    }
}
impl<T> FromIterator<T> for CircularList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut new: Self = Default::default();
        for x in iter {
            new.add(x);
        }
        new
    }
}
impl<T> Drop for CircularList<T> {
    fn drop(&mut self) {
        while self.remove().is_some() {}
        unsafe {
            // SAFETY: all payload nodes are gone; reclaim the sentinel
            // allocated by `ListHead::new` in `Default`.
            drop(Box::from_raw(self.head));
        }
    }
}
impl<T: std::fmt::Debug> std::fmt::Debug for CircularList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct IntoIter<T>(CircularList<T>);
impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.remove()
    }
}
impl<T> DoubleEndedIterator for IntoIter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.pop()
    }
}
impl<T> IntoIterator for CircularList<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::<T>(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        let l = CircularList::default();
        assert_eq!(l.iter().copied().collect::<Vec<i32>>(), &[]);
    }

    #[test]
    fn add() {
        let l = list![42, 43, 44, 45, 46];
        assert_eq!(l.into_iter().collect::<Vec<i32>>(), &[42, 43, 44, 45, 46])
    }

    #[test]
    fn remove() {
        let mut l = list![42, 43, 44, 45, 46];
        assert_eq!(Some(42), l.remove());
        assert_eq!(Some(43), l.remove());
        assert_eq!(Some(44), l.remove());
        assert_eq!(Some(45), l.remove());
        assert_eq!(Some(46), l.remove());
        assert_eq!(None, l.remove());
    }

    #[test]
    fn mutating() {
        let mut l = list![42, 43, 44, 45, 46];
        for x in l.iter_mut() {
            *x += 1;
        }
        assert_eq!(
            l.iter().copied().collect::<Vec<i32>>(),
            &[43, 44, 45, 46, 47]
        );
    }

    #[test]
    fn into_iter_double_ended_iterator() {
        let numbers = list![1, 2, 3, 4, 5, 6];

        let mut iter = numbers.into_iter();

        assert_eq!(Some(1), iter.next());
        assert_eq!(Some(6), iter.next_back());
        assert_eq!(Some(5), iter.next_back());
        assert_eq!(Some(2), iter.next());
        assert_eq!(Some(3), iter.next());
        assert_eq!(Some(4), iter.next());
        assert_eq!(None, iter.next());
        assert_eq!(None, iter.next_back());
    }

    #[test]
    fn iter_forever() {
        let numbers = list![1, 2, 3, 4, 5, 6];
        let double_sum = numbers
            .iter_forever()
            .take(2 * numbers.len())
            .copied()
            .sum();
        assert_eq!(42, double_sum);
    }

    #[test]
    fn from_iterator() {
        let mut numbers: CircularList<_> = vec![4, 5, 6, 7].into_iter().collect();
        assert_eq!(Some(7), numbers.pop());
        assert_eq!(Some(6), numbers.pop());
        assert_eq!(Some(5), numbers.pop());
        assert_eq!(Some(4), numbers.pop());
        assert_eq!(None, numbers.pop());
    }

    #[test]
    fn into_iter_rev() {
        let numbers = list![1, 2, 3];
        let mut iter = numbers.into_iter().rev();
        assert_eq!(Some(3), iter.next());
        assert_eq!(Some(2), iter.next());
        assert_eq!(Some(1), iter.next());
        assert_eq!(None, iter.next());
    }

    #[test]
    fn clone_is_deep() {
        let a = list![1, 2, 3];
        let b = a.clone();
        drop(a);
        assert_eq!(b.into_iter().collect::<Vec<i32>>(), &[1, 2, 3]);
    }
}
