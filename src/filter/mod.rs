//! Membership filters consulted before SSTable point reads. Filters operate
//! on user keys, never on internal keys.

pub mod bloom_filter;

pub use bloom_filter::BloomFilter;
