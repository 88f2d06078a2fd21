//! Hash collections used throughout the crate.
//!
//! Keys are small (pids, window ids), so the non-cryptographic FxHash is a
//! better fit than the default SipHash.

pub type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;
pub type HashSet<T> = rustc_hash::FxHashSet<T>;
