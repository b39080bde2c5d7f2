pub mod skipmap;

use rand::Rng;

/// Sample a node height in `1..=max_height` by flipping a fair coin until the
/// first failure.
fn rand_height(max_height: usize) -> usize {
    let mut rng = rand::thread_rng();
    let mut height = 1;
    while height < max_height && rng.gen_range(0..2) == 0 {
        height += 1;
    }
    height
}
