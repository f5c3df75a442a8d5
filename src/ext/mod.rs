//! Small extensions to the standard collections.

pub mod ordered_hash_map;
pub mod vec;

pub use ordered_hash_map::OrderedHashMap;
pub use vec::RemoveWhere;
