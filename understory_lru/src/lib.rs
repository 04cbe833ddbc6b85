// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory LRU: a bounded map with deterministic least-recently-used eviction.
//!
//! [`LruCache`] is a fixed-capacity map. Entries live densely in a `Vec` and a
//! doubly linked recency list is threaded through them by index, so touching,
//! inserting and evicting are all O(1) and allocation free once the cache has
//! reached its capacity.
//!
//! Eviction is deterministic: when an insert would exceed the capacity, the
//! entry that was least recently inserted or accessed is removed and returned
//! to the caller. Nothing is evicted behind the caller's back.
//!
//! ## Recency
//!
//! The following operations mark an entry as most recently used:
//!
//! - [`LruCache::insert`] (new or replaced entry)
//! - [`LruCache::get`] and [`LruCache::get_mut`]
//! - [`LruCache::get_or_insert_with`]
//!
//! [`LruCache::peek`], [`LruCache::contains_key`] and iteration do not change
//! the order.
//!
//! ## Example
//!
//! ```rust
//! use understory_lru::LruCache;
//!
//! let mut cache = LruCache::new(2);
//! cache.insert(1_u32, "one");
//! cache.insert(2_u32, "two");
//!
//! // Touch 1, so 2 becomes the eviction candidate.
//! assert_eq!(cache.get(&1), Some(&"one"));
//!
//! let evicted = cache.insert(3, "three");
//! assert_eq!(evicted, Some((2, "two")));
//! assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec![3, 1]);
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod cache;

pub use cache::{Iter, LruCache};
