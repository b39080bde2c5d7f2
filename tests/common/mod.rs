use rand::rngs::StdRng;
use rand::Rng;

/// Random byte string with length in `min_len..=max_len`.
pub fn random_key(rng: &mut StdRng, min_len: usize, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(min_len..=max_len);
    (0..len).map(|_| rng.gen()).collect()
}

/// Ideal byte cost of writing one key-value pair once: the internal key
/// (sequence number, type tag, length prefix, key bytes) plus the
/// length-prefixed value.
pub fn logical_write_size(key: &[u8], value: &[u8]) -> u64 {
    (8 + 1 + 4 + key.len() + 4 + value.len()) as u64
}
