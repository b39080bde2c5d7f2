use rand::Rng;
use std::collections::HashMap;

pub(crate) fn create_random_map(size: usize) -> HashMap<i32, i32> {
    let mut rng = rand::thread_rng();
    let mut map = HashMap::with_capacity(size);
    for _ in 0..size {
        map.insert(rng.gen(), rng.gen());
    }
    map
}
