//! Least-significant-digit radix sort over ping-pong key/value buffers.

use gsplat_common::{RADIX_BITS, RADIX_BUCKETS, Side};

const DIGIT_MASK: u32 = RADIX_BUCKETS - 1;

/// Bit shifts of the digit passes a key mask needs, lowest digit first.
///
/// Digits with no bit set in `key_mask` are skipped, so a mask of `0`
/// sorts nothing and leaves the result on side A.
pub fn radix_passes(key_mask: u32) -> Vec<u32> {
    (0..u32::BITS / RADIX_BITS)
        .map(|pass| pass * RADIX_BITS)
        .filter(|&shift| (key_mask >> shift) & DIGIT_MASK != 0)
        .collect()
}

/// Two key buffers and two value buffers of equal capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortBuffers {
    keys: [Vec<u32>; 2],
    values: [Vec<u32>; 2],
}

impl SortBuffers {
    pub fn new(capacity: usize) -> Self {
        Self {
            keys: [vec![0; capacity], vec![0; capacity]],
            values: [vec![0; capacity], vec![0; capacity]],
        }
    }

    pub fn capacity(&self) -> usize {
        self.keys[0].len()
    }

    pub fn keys(&self, side: Side) -> &[u32] {
        &self.keys[side.index()]
    }

    pub fn values(&self, side: Side) -> &[u32] {
        &self.values[side.index()]
    }

    /// Mutable keys and values of one side, for seeding a sort.
    pub fn side_mut(&mut self, side: Side) -> (&mut [u32], &mut [u32]) {
        (&mut self.keys[side.index()], &mut self.values[side.index()])
    }

    /// Sort the leading `n` pairs on side A by `key & key_mask`.
    ///
    /// Each pass is a stable counting sort into the other side, so equal
    /// masked keys keep their relative order. Returns the side holding the
    /// result. Entries past `n` are left untouched.
    ///
    /// # Panics
    /// If `n` exceeds the capacity of the buffers.
    pub fn sort(&mut self, key_mask: u32, n: usize) -> Side {
        assert!(
            n <= self.capacity(),
            "sort of {n} entries exceeds buffer capacity {}",
            self.capacity()
        );
        let passes = radix_passes(key_mask);
        let mut side = Side::A;
        for &shift in &passes {
            self.scatter_pass(side, shift, key_mask, n);
            side = side.other();
        }
        debug_assert_eq!(side, Side::after_passes(passes.len() as u32));
        side
    }

    fn scatter_pass(&mut self, from: Side, shift: u32, key_mask: u32, n: usize) {
        let [keys_a, keys_b] = &mut self.keys;
        let [values_a, values_b] = &mut self.values;
        let (src_keys, dst_keys, src_values, dst_values) = match from {
            Side::A => (&*keys_a, keys_b, &*values_a, values_b),
            Side::B => (&*keys_b, keys_a, &*values_b, values_a),
        };
        let digit = |key: u32| (((key & key_mask) >> shift) & DIGIT_MASK) as usize;

        let mut offsets = [0usize; RADIX_BUCKETS as usize];
        for &key in &src_keys[..n] {
            offsets[digit(key)] += 1;
        }
        let mut running = 0;
        for slot in offsets.iter_mut() {
            let count = *slot;
            *slot = running;
            running += count;
        }

        for (&key, &value) in src_keys[..n].iter().zip(&src_values[..n]) {
            let d = digit(key);
            dst_keys[offsets[d]] = key;
            dst_values[offsets[d]] = value;
            offsets[d] += 1;
        }
    }
}
