//! Gradient noise over a seeded permutation table.
//!
//! Classic 2D fade/lerp/grad noise: a 256-entry permutation shuffled by a
//! seeded RNG, doubled to avoid wraparound indexing. Output is roughly in
//! [-1, 1]. The same seed always produces the same field.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Seeded 2D gradient noise field.
#[derive(Debug, Clone)]
pub struct Noise {
    perm: [u8; 512],
}

impl Noise {
    /// Builds the permutation table from a seed.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut p: [u8; 256] = [0; 256];
        for (i, v) in p.iter_mut().enumerate() {
            *v = i as u8;
        }
        p.shuffle(&mut rng);

        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = p[i & 255];
        }
        Self { perm }
    }

    fn fade(t: f32) -> f32 {
        t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
    }

    fn lerp(t: f32, a: f32, b: f32) -> f32 {
        a + t * (b - a)
    }

    fn grad(hash: u8, x: f32, y: f32) -> f32 {
        let h = hash & 15;
        let u = if h < 8 { x } else { y };
        let v = if h < 4 {
            y
        } else if h == 12 || h == 14 {
            x
        } else {
            0.0
        };
        (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
    }

    /// Samples the field at a point.
    pub fn get(&self, x: f32, y: f32) -> f32 {
        let xi = (x.floor() as i32 & 255) as usize;
        let yi = (y.floor() as i32 & 255) as usize;
        let x = x - x.floor();
        let y = y - y.floor();
        let u = Self::fade(x);
        let v = Self::fade(y);

        let a = self.perm[xi] as usize + yi;
        let aa = self.perm[a];
        let ab = self.perm[a + 1];
        let b = self.perm[xi + 1] as usize + yi;
        let ba = self.perm[b];
        let bb = self.perm[b + 1];

        Self::lerp(
            v,
            Self::lerp(
                u,
                Self::grad(self.perm[aa as usize], x, y),
                Self::grad(self.perm[ba as usize], x - 1.0, y),
            ),
            Self::lerp(
                u,
                Self::grad(self.perm[ab as usize], x, y - 1.0),
                Self::grad(self.perm[bb as usize], x - 1.0, y - 1.0),
            ),
        )
    }

    /// Two-octave sample used for biome classification.
    pub fn get_2_octaves(&self, x: f32, y: f32) -> f32 {
        self.get(x, y) + self.get(x * 2.0, y * 2.0) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_field() {
        let a = Noise::new(42);
        let b = Noise::new(42);
        for i in 0..50 {
            let (x, y) = (i as f32 * 0.37, i as f32 * 0.61);
            assert_eq!(a.get(x, y), b.get(x, y));
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = Noise::new(1);
        let b = Noise::new(2);
        let mut any_diff = false;
        for i in 0..50 {
            let (x, y) = (i as f32 * 0.37, i as f32 * 0.61);
            if a.get(x, y) != b.get(x, y) {
                any_diff = true;
                break;
            }
        }
        assert!(any_diff);
    }

    #[test]
    fn output_is_bounded() {
        let n = Noise::new(7);
        for i in 0..500 {
            let v = n.get(i as f32 * 0.13, i as f32 * 0.29);
            assert!((-1.5..=1.5).contains(&v), "noise out of range: {v}");
        }
    }
}
