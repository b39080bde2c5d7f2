use crate::error::LsmError;
use crate::Result;

/// Bloom filter over user keys. Each of the `k` hash functions is a
/// polynomial evaluation of the key bytes in a distinct small prime base, so
/// the serialized form only needs to carry the primes themselves.
///
/// `may_contain` can return false positives but never a false negative for a
/// key that was added.
pub struct BloomFilter {
    bit_count: u64,
    bits: Vec<u8>,
    primes: Vec<u8>,
}

impl BloomFilter {
    pub fn new(bit_count: u64, hash_count: usize) -> BloomFilter {
        assert!(bit_count > 0);
        let mut primes = Vec::with_capacity(hash_count);
        let mut p: u64 = 5;
        while primes.len() < hash_count {
            if is_prime(p) {
                primes.push(p as u8);
            }
            p += 1;
        }
        BloomFilter {
            bit_count,
            bits: vec![0; (bit_count as usize + 7) / 8],
            primes,
        }
    }

    pub fn add(&mut self, key: &[u8]) {
        for i in 0..self.primes.len() {
            let bit = self.key_bit(key, self.primes[i]);
            self.bits[(bit / 8) as usize] |= 1 << (bit % 8);
        }
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.primes.iter().all(|&p| {
            let bit = self.key_bit(key, p);
            self.bits[(bit / 8) as usize] & (1 << (bit % 8)) != 0
        })
    }

    fn key_bit(&self, key: &[u8], prime: u8) -> u64 {
        let mut bit: u64 = 0;
        let mut pw: u64 = 1;
        for &byte in key {
            bit = bit.wrapping_add(pw.wrapping_mul(byte as u64));
            pw = pw.wrapping_mul(prime as u64);
        }
        bit % self.bit_count
    }

    /// `[ u64 bit_count ][ ceil(bit_count / 8) bytes ][ one byte per prime ]`
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(8 + self.bits.len() + self.primes.len());
        buffer.extend_from_slice(&self.bit_count.to_le_bytes());
        buffer.extend_from_slice(&self.bits);
        buffer.extend_from_slice(&self.primes);
        buffer
    }

    pub fn deserialize(data: &[u8]) -> Result<BloomFilter> {
        if data.len() < 8 {
            return Err(LsmError::Custom("bloom filter image too short".into()));
        }
        let bit_count = u64::from_le_bytes(data[..8].try_into().unwrap());
        let byte_count = (bit_count as usize + 7) / 8;
        if bit_count == 0 || data.len() < 8 + byte_count {
            return Err(LsmError::Custom(format!(
                "bloom filter image of {} bytes cannot hold {} bits",
                data.len(),
                bit_count
            )));
        }
        Ok(BloomFilter {
            bit_count,
            bits: data[8..8 + byte_count].to_vec(),
            primes: data[8 + byte_count..].to_vec(),
        })
    }
}

fn is_prime(n: u64) -> bool {
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_contains_added_keys() {
        let mut filter = BloomFilter::new(1024, 6);
        for i in 0..10 {
            filter.add(format!("kkkey{}", i).as_bytes());
        }
        for i in 0..10 {
            assert!(filter.may_contain(format!("kkkey{}", i).as_bytes()));
        }
        assert!(!filter.may_contain(b"fweaefewaf9"));
    }

    #[test]
    fn test_false_positive_rate() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut filter = BloomFilter::new(160_000, 6);

        let keys: Vec<u64> = (0..20000).map(|_| rng.gen()).collect();
        for key in &keys[..10000] {
            filter.add(&key.to_le_bytes());
        }
        for key in &keys[..10000] {
            assert!(filter.may_contain(&key.to_le_bytes()));
        }

        let mut false_pos_count = 0;
        for key in &keys[10000..] {
            if filter.may_contain(&key.to_le_bytes()) {
                false_pos_count += 1;
            }
        }
        assert!(
            false_pos_count < 200,
            "false positive rate: {}/10000",
            false_pos_count
        );
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut filter = BloomFilter::new(512, 4);
        for i in 0..100 {
            filter.add(format!("key{}", i).as_bytes());
        }

        let image = filter.serialize();
        assert_eq!(image.len(), 8 + 64 + 4);
        // Primes are generated deterministically from 5 upward.
        assert_eq!(&image[8 + 64..], &[5, 7, 11, 13]);

        let restored = BloomFilter::deserialize(&image).unwrap();
        for i in 0..100 {
            assert!(restored.may_contain(format!("key{}", i).as_bytes()));
        }
        assert!(!restored.may_contain(b"never added"));
    }

    #[test]
    fn test_deserialize_rejects_malformed_images() {
        assert!(BloomFilter::deserialize(&[]).is_err());
        assert!(BloomFilter::deserialize(&[1, 2, 3]).is_err());

        // Header promises more bits than the buffer holds.
        let mut image = 1024u64.to_le_bytes().to_vec();
        image.extend_from_slice(&[0; 16]);
        assert!(BloomFilter::deserialize(&image).is_err());

        let zero_bits = 0u64.to_le_bytes().to_vec();
        assert!(BloomFilter::deserialize(&zero_bits).is_err());
    }

    #[test]
    fn test_empty_key_is_supported() {
        let mut filter = BloomFilter::new(64, 3);
        filter.add(b"");
        assert!(filter.may_contain(b""));
    }
}
