use core::{marker::PhantomData, ptr};

/// Link block of an intrusive circular doubly linked list.
///
/// A `ListHead` is either the sentinel of a list or embedded at the start of
/// a node that carries a payload, exactly like the linux kernel's
/// `struct list_head`. A freshly created sentinel is its own previous and
/// next element.
/// # Layout
/// ```text
/// ┌───┐
/// │   │
/// │ ┌─▼──┐
/// └─┤head├─┐
///   └──▲─┘ │
///      │   │
///      └───┘
/// ```
pub struct ListHead {
    pub(crate) next: *mut ListHead,
    pub(crate) prev: *mut ListHead,
}

// The present implementation aims to preserve the following invariant (3):
// * The `next` and `prev` pointers of every linked element are always valid
// * Following the `next` field recursively must always end up to the original `Self`
// * Following the `prev` field recursively must give the exact reverse path as the `next` one
//
// The sort engine in `crate::sort` suspends invariant (3) for the duration of
// one call: it privately switches to null-terminated singly linked chains and
// restores the invariant before returning.
impl ListHead {
    /// Creates a sentinel that is its own previous and next element, i.e. an
    /// empty circular list. The sentinel is boxed so that its address stays
    /// stable while the self-referencing links exist.
    pub fn new() -> Box<Self> {
        let mut new = Box::new(Self::unlinked());

        // Preserving invariant (3)
        new.next = &mut *new;
        new.prev = &mut *new;

        new
    }

    /// Creates a detached link block, suitable for embedding in a node type.
    /// Link it with [`ListHead::add_tail`] before using it as a list element.
    pub const fn unlinked() -> Self {
        Self {
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
        }
    }

    /// Gets a pointer to the next element.
    pub fn next(&self) -> *mut Self {
        self.next
    }

    /// Gets a pointer to the previous element.
    pub fn prev(&self) -> *mut Self {
        self.prev
    }

    /// Inserts `new` between `prev` and `next`.
    ///
    /// # Sketch
    /// ```text
    /// ┌────┬──►┌────┬──►┌────┐
    /// │prev│   │new │   │next│
    /// └────┘◄──┴────┘◄──┴────┘
    /// ```
    ///
    /// # Safety
    /// * `next`, `new` and `prev` must be valid pointers
    /// * `next` should be the next of `prev` and `prev` should be the previous of `next`
    /// * `new` must be disconnected from its old place before calling this
    /// function otherwise it would break invariant (3).
    unsafe fn __add(new: *mut Self, prev: *mut Self, next: *mut Self) {
        (*next).prev = new;
        (*new).next = next;
        (*new).prev = prev;
        (*prev).next = new;
    }

    /// Disconnects element(s) by connecting the previous and next elements
    /// together.
    ///
    /// # Sketch
    /// ```text
    /// ┌────┬──►┌────┐
    /// │prev│   │next│
    /// └────┘◄──┴────┘
    /// ```
    ///
    /// # Safety
    /// * `next` and `prev` must be valid pointers.
    /// * the element(s) between `next` and `prev` must be dropped or connected
    /// somewhere else after calling this function in order to preserve
    /// invariant (3).
    unsafe fn __del(prev: *mut Self, next: *mut Self) {
        (*next).prev = prev;
        (*prev).next = next;
    }

    /// Inserts `new` at the tail of the list whose sentinel is `head`.
    ///
    /// # Safety
    /// * `head` must be part of a valid circular list
    /// * `new` must be a valid pointer, disconnected from any list
    pub unsafe fn add_tail(new: *mut Self, head: *mut Self) {
        Self::__add(new, (*head).prev, head);
    }

    /// Disconnects `entry` from its list. The entry's own links are left
    /// stale and must not be followed until it is relinked.
    ///
    /// # Safety
    /// `entry` must be a payload element of a valid circular list.
    pub unsafe fn del_entry(entry: *mut Self) {
        // `(*entry).prev` and `(*entry).next` are valid according to invariant (3).
        Self::__del((*entry).prev, (*entry).next);
    }
}

/// A list node: the link block followed by the caller's value.
///
/// `links` must stay the first field: [`Node::container_of`] relies on the
/// node and its embedded `ListHead` sharing an address, which `#[repr(C)]`
/// guarantees.
#[repr(C)]
pub(crate) struct Node<T> {
    pub(crate) links: ListHead,
    pub(crate) value: T,
}

impl<T> Node<T> {
    pub(crate) fn new(value: T) -> Box<Self> {
        Box::new(Self {
            links: ListHead::unlinked(),
            value,
        })
    }

    /// Recovers the node from a pointer to its embedded link block.
    ///
    /// # Safety
    /// `links` must point at the `links` field of a live `Node<T>`; in
    /// particular it must not be the sentinel of a list.
    pub(crate) unsafe fn container_of(links: *mut ListHead) -> *mut Node<T> {
        links.cast()
    }
}

/// Circular list iterator. Cycles forever, skipping the sentinel on every
/// wrap-around; the list must not be empty.
pub struct Iter<'life, T> {
    head: *const ListHead,
    next: *const ListHead,
    _marker: PhantomData<&'life T>,
}
impl<'life, T> Iterator for Iter<'life, T> {
    type Item = &'life T;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the lifetime `'life` of `self` is bound to the lifetime of
        // the list, and the list is circular and non empty, so every pointer
        // walked here is a valid payload node once the sentinel is skipped.
        unsafe {
            if self.next == self.head {
                self.next = (*self.head).next;
            }
            let node = &*Node::<T>::container_of(self.next as *mut _);
            self.next = node.links.next;
            Some(&node.value)
        }
    }
}
impl<'life, T> Iter<'life, T> {
    /// The caller has to make sure `head` is the sentinel of a valid,
    /// non-empty circular list of `Node<T>` that outlives the iterator.
    pub(crate) fn new(head: *const ListHead) -> Self {
        Self {
            head,
            // SAFETY: `head` is a valid sentinel.
            next: unsafe { (*head).next },
            _marker: PhantomData,
        }
    }
}

/// Circular list iterator with mutability.
pub struct IterMut<'life, T> {
    head: *mut ListHead,
    next: *mut ListHead,
    _marker: PhantomData<&'life mut T>,
}
impl<'life, T> Iterator for IterMut<'life, T> {
    type Item = &'life mut T;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: same reasoning as `Iter`, and the exclusive borrow of the
        // list guarantees exclusive access to the values.
        unsafe {
            if self.next == self.head {
                self.next = (*self.head).next;
            }
            let node = &mut *Node::<T>::container_of(self.next);
            self.next = node.links.next;
            Some(&mut node.value)
        }
    }
}
impl<'life, T> IterMut<'life, T> {
    /// The caller has to make sure `head` is the sentinel of a valid,
    /// non-empty circular list of `Node<T>` that is exclusively borrowed for
    /// `'life`.
    pub(crate) fn new(head: *mut ListHead) -> Self {
        Self {
            head,
            // SAFETY: `head` is a valid sentinel.
            next: unsafe { (*head).next },
            _marker: PhantomData,
        }
    }
}
