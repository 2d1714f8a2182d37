//! Bloom filter over object identities
//!
//! Sized once at run start. Membership answers are one-sided: `contains`
//! may report an identity that was never added, but never misses one that was.

use crate::hash::Sha1Hash;

/// Default filter size in bits (1 Mi)
pub const DEFAULT_BITS: usize = 1024 * 1024;

/// Default number of probe positions per identity
pub const DEFAULT_HASHES: u32 = 32;

/// Fixed-capacity Bloom filter keyed by SHA-1 identities
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    hashes: u32,
}

impl BloomFilter {
    /// Create a filter with `num_bits` bits and `hashes` probes per key
    pub fn new(num_bits: usize, hashes: u32) -> Self {
        let num_bits = num_bits.max(64) as u64;
        let words = num_bits.div_ceil(64) as usize;
        Self {
            bits: vec![0u64; words],
            num_bits,
            hashes: hashes.max(1),
        }
    }

    /// Record an identity as seen
    pub fn add(&mut self, id: &Sha1Hash) {
        for bit in self.probes(id) {
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// Check whether an identity may have been seen
    pub fn contains(&self, id: &Sha1Hash) -> bool {
        self.probes(id)
            .all(|bit| self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }

    /// Check and record in one step; returns whether it was (maybe) present
    pub fn check_and_add(&mut self, id: &Sha1Hash) -> bool {
        let present = self.contains(id);
        if !present {
            self.add(id);
        }
        present
    }

    /// Filter size in bits
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Fraction of bits set; a rough saturation gauge for logging
    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self.bits.iter().map(|w| u64::from(w.count_ones())).sum();
        set as f64 / self.num_bits as f64
    }

    /// Double hashing over the identity bytes: `h1 + i * h2`
    ///
    /// SHA-1 output is already uniform, so its words serve as the base hashes.
    fn probes(&self, id: &Sha1Hash) -> impl Iterator<Item = u64> {
        let bytes = id.as_bytes();
        let h1 = u64::from_le_bytes(bytes[0..8].try_into().unwrap_or([0; 8]));
        let h2 = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or([0; 8])) | 1;
        let num_bits = self.num_bits;
        (0..u64::from(self.hashes)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BITS, DEFAULT_HASHES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::git::hash_blob;

    #[test]
    fn test_added_identities_are_always_found() {
        let mut filter = BloomFilter::new(4096, 4);
        let ids: Vec<_> = (0..500).map(|i| hash_blob(format!("file {}", i).as_bytes())).collect();

        for id in &ids {
            filter.add(id);
        }
        for id in &ids {
            assert!(filter.contains(id), "false negative for {}", id);
        }
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::default();
        assert!(!filter.contains(&hash_blob(b"anything")));
        assert_eq!(filter.fill_ratio(), 0.0);
    }

    #[test]
    fn test_check_and_add() {
        let mut filter = BloomFilter::default();
        let id = hash_blob(b"content");

        assert!(!filter.check_and_add(&id));
        assert!(filter.check_and_add(&id));
        assert!(filter.fill_ratio() > 0.0);
    }

    #[test]
    fn test_tiny_filter_saturates_to_false_positives() {
        // 64 bits with 32 probes saturates quickly; positives are harmless
        let mut filter = BloomFilter::new(1, 32);
        for i in 0..64 {
            filter.add(&hash_blob(format!("{}", i).as_bytes()));
        }
        assert_eq!(filter.num_bits(), 64);
        assert!(filter.contains(&hash_blob(b"never added")));
    }
}
