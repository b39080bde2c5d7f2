use crate::collections::skip_list::rand_height;
use std::alloc::Layout;
use std::marker::PhantomData;
use std::ptr::{addr_of, addr_of_mut};

#[repr(C)]
pub struct Node<K, V> {
    pub key: K,
    pub value: V,
    /// Number of forward links, in `1..=max_height`.
    height: usize,
    /// The actual length is `height`; the node is allocated with its links
    /// inline.
    links: [*mut Self; 0],
}

impl<K, V> Node<K, V> {
    fn layout(height: usize) -> Layout {
        let links_size = height * std::mem::size_of::<*mut Self>();
        Layout::from_size_align(
            std::mem::size_of::<Self>() + links_size,
            std::mem::align_of::<Self>(),
        )
        .unwrap()
    }

    fn alloc(key: K, value: V, height: usize) -> *mut Node<K, V> {
        debug_assert!(height >= 1);
        let layout = Self::layout(height);
        unsafe {
            let node = std::alloc::alloc(layout) as *mut Self;
            if node.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            std::ptr::write(addr_of_mut!((*node).key), key);
            std::ptr::write(addr_of_mut!((*node).value), value);
            std::ptr::write(addr_of_mut!((*node).height), height);
            std::ptr::write_bytes(addr_of_mut!((*node).links).cast::<*mut Self>(), 0, height);
            node
        }
    }

    #[inline]
    pub fn link(&self, level: usize) -> *mut Self {
        debug_assert!(level < self.height);
        unsafe { *addr_of!(self.links).cast::<*mut Self>().add(level) }
    }

    #[inline]
    fn set_link(&mut self, level: usize, node: *mut Self) {
        debug_assert!(level < self.height);
        unsafe {
            *addr_of_mut!(self.links).cast::<*mut Self>().add(level) = node;
        }
    }
}

unsafe fn drop_node<K, V>(node: *mut Node<K, V>) {
    let layout = Node::<K, V>::layout((*node).height);
    std::ptr::drop_in_place(addr_of_mut!((*node).key));
    std::ptr::drop_in_place(addr_of_mut!((*node).value));
    std::alloc::dealloc(node as *mut u8, layout);
}

/// Ordered map based on a skip list. Duplicate keys are kept: a key equal to
/// an existing one is inserted in front of it.
///
/// # NOTICE:
///
/// SkipMap is not thread-safe.
pub struct SkipMap<K: Ord + Default, V: Default> {
    head: *mut Node<K, V>,
    max_height: usize,
    /// Highest height among inserted nodes, at least 1.
    cur_height: usize,
    len: usize,
}

impl<K: Ord + Default, V: Default> SkipMap<K, V> {
    pub fn new(max_height: usize) -> SkipMap<K, V> {
        assert!(max_height >= 1);
        SkipMap {
            head: Node::alloc(K::default(), V::default(), max_height),
            max_height,
            cur_height: 1,
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Return the first node whose key is greater or equal than `key`, or
    /// null if no such node exists. If `prev_nodes` is `Some`, it must hold
    /// `max_height` slots initialized to the head node and is assigned the
    /// last node strictly before `key` on every traversed level.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lsmlite::collections::skip_list::skipmap::SkipMap;
    /// let mut skip_map = SkipMap::new(4);
    /// assert!(skip_map.find_first_ge(&1, None).is_null());
    /// skip_map.insert(3, 3);
    /// assert!(skip_map.find_first_ge(&5, None).is_null());
    /// assert!(!skip_map.find_first_ge(&2, None).is_null());
    /// ```
    pub fn find_first_ge(
        &self,
        key: &K,
        mut prev_nodes: Option<&mut [*mut Node<K, V>]>,
    ) -> *mut Node<K, V> {
        let mut level = self.cur_height;
        let mut node = self.head;
        loop {
            unsafe {
                let next = (*node).link(level - 1);
                if !next.is_null() && (*next).key < *key {
                    node = next;
                } else {
                    if let Some(ref mut p) = prev_nodes {
                        debug_assert_eq!(p.len(), self.max_height);
                        p[level - 1] = node;
                    }
                    if level == 1 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let mut prev_nodes = vec![self.head; self.max_height];
        self.find_first_ge(&key, Some(prev_nodes.as_mut_slice()));

        let height = rand_height(self.max_height);
        if height > self.cur_height {
            self.cur_height = height;
        }

        let new_node = Node::alloc(key, value, height);
        unsafe {
            for level in 0..height {
                (*new_node).set_link(level, (*prev_nodes[level]).link(level));
                (*prev_nodes[level]).set_link(level, new_node);
            }
        }
        self.len += 1;
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            node: unsafe { (*self.head).link(0) },
            _map: PhantomData,
        }
    }
}

impl<K: Ord + Default, V: Default> Drop for SkipMap<K, V> {
    fn drop(&mut self) {
        let mut node = self.head;
        unsafe {
            while !node.is_null() {
                let next = (*node).link(0);
                drop_node(node);
                node = next;
            }
        }
    }
}

/// Iteration over the contents of a SkipMap in key order.
pub struct Iter<'a, K: Ord + Default, V: Default> {
    node: *const Node<K, V>,
    _map: PhantomData<&'a SkipMap<K, V>>,
}

impl<'a, K: Ord + Default, V: Default> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            None
        } else {
            unsafe {
                let item = (&(*self.node).key, &(*self.node).value);
                self.node = (*self.node).link(0);
                Some(item)
            }
        }
    }
}

/// Owning iterator that moves entries out in key order. The nodes themselves
/// are released when the iterator is dropped.
pub struct IntoIter<K: Ord + Default, V: Default> {
    _inner: SkipMap<K, V>,
    node: *mut Node<K, V>,
}

impl<K: Ord + Default, V: Default> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.node.is_null() {
            None
        } else {
            unsafe {
                let key = std::mem::take(&mut (*self.node).key);
                let value = std::mem::take(&mut (*self.node).value);
                self.node = (*self.node).link(0);
                Some((key, value))
            }
        }
    }
}

impl<K: Ord + Default, V: Default> IntoIterator for SkipMap<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let node = unsafe { (*self.head).link(0) };
        IntoIter { _inner: self, node }
    }
}
