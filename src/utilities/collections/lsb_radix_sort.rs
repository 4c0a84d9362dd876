/// Least significant byte first radix sort over non-negative `i32` keys with a parallel value array.
///
/// The sort is stable. Only as many byte passes run as the key upper bound needs.
pub struct LsbRadixSort;

const BUCKET_COUNT: usize = 256;

fn reorder_for_byte<T: Copy>(
    source_keys: &[i32],
    target_keys: &mut [i32],
    source_values: &[T],
    target_values: &mut [T],
    bucket_start_indices: &mut [i32],
    shift: u32,
) {
    for (i, &key) in source_keys.iter().enumerate() {
        let bucket = &mut bucket_start_indices[((key >> shift) & 0xFF) as usize];
        target_keys[*bucket as usize] = key;
        target_values[*bucket as usize] = source_values[i];
        *bucket += 1;
    }
}

/// Turns bucket counts into exclusive prefix sums.
fn calculate_partial_sums(bucket_counts: &mut [i32]) {
    let mut sum = 0;
    for bucket in bucket_counts.iter_mut() {
        let count = *bucket;
        *bucket = sum;
        sum += count;
    }
}

impl LsbRadixSort {
    /// Number of byte passes needed to sort keys in `[0, keys_upper_bound]`.
    #[inline(always)]
    pub fn pass_count_for_upper_bound(keys_upper_bound: i32) -> usize {
        debug_assert!(keys_upper_bound >= 0, "Radix sorted keys must be non-negative.");
        if keys_upper_bound <= 0xFF {
            1
        } else if keys_upper_bound <= 0xFFFF {
            2
        } else if keys_upper_bound <= 0xFF_FFFF {
            3
        } else {
            4
        }
    }

    /// Sorts `keys` and reorders `values` alongside them. The sorted data ends up in `keys` and `values`;
    /// the scratch slices are clobbered.
    pub fn sort<T: Copy>(
        keys: &mut [i32],
        values: &mut [T],
        keys_scratch: &mut [i32],
        values_scratch: &mut [T],
        keys_upper_bound: i32,
    ) {
        let key_count = keys.len();
        debug_assert!(
            values.len() == key_count
                && keys_scratch.len() >= key_count
                && values_scratch.len() >= key_count,
            "Keys, values and scratch must all cover the sorted region."
        );
        if key_count <= 1 {
            return;
        }
        let pass_count = Self::pass_count_for_upper_bound(keys_upper_bound);
        let mut bucket_counts = vec![0i32; BUCKET_COUNT * pass_count];
        for &key in keys.iter() {
            for pass in 0..pass_count {
                bucket_counts[pass * BUCKET_COUNT + ((key >> (pass * 8)) & 0xFF) as usize] += 1;
            }
        }
        for pass in 0..pass_count {
            calculate_partial_sums(&mut bucket_counts[pass * BUCKET_COUNT..(pass + 1) * BUCKET_COUNT]);
        }

        let mut source_keys: &mut [i32] = keys;
        let mut source_values: &mut [T] = values;
        let mut target_keys: &mut [i32] = &mut keys_scratch[..key_count];
        let mut target_values: &mut [T] = &mut values_scratch[..key_count];
        for pass in 0..pass_count {
            reorder_for_byte(
                source_keys,
                target_keys,
                source_values,
                target_values,
                &mut bucket_counts[pass * BUCKET_COUNT..(pass + 1) * BUCKET_COUNT],
                (pass * 8) as u32,
            );
            std::mem::swap(&mut source_keys, &mut target_keys);
            std::mem::swap(&mut source_values, &mut target_values);
        }
        if pass_count % 2 == 1 {
            // Odd pass counts leave the result in scratch.
            target_keys.copy_from_slice(source_keys);
            target_values.copy_from_slice(source_values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn check_sort(upper_bound: i32, count: usize, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut keys: Vec<i32> = (0..count).map(|_| rng.gen_range(0..=upper_bound)).collect();
        let original = keys.clone();
        let mut values: Vec<i32> = (0..count as i32).collect();
        let mut keys_scratch = vec![0; count];
        let mut values_scratch = vec![0; count];
        LsbRadixSort::sort(&mut keys, &mut values, &mut keys_scratch, &mut values_scratch, upper_bound);
        for i in 1..count {
            assert!(keys[i - 1] <= keys[i]);
            if keys[i - 1] == keys[i] {
                assert!(values[i - 1] < values[i], "Sort must be stable.");
            }
        }
        for i in 0..count {
            assert_eq!(original[values[i] as usize], keys[i]);
        }
    }

    #[test]
    fn sorts_every_pass_count() {
        check_sort(200, 500, 1);
        check_sort(60_000, 500, 2);
        check_sort(1 << 20, 500, 3);
        check_sort(i32::MAX, 500, 4);
    }

    #[test]
    fn pass_counts() {
        assert_eq!(LsbRadixSort::pass_count_for_upper_bound(0), 1);
        assert_eq!(LsbRadixSort::pass_count_for_upper_bound(256), 2);
        assert_eq!(LsbRadixSort::pass_count_for_upper_bound(1 << 16), 3);
        assert_eq!(LsbRadixSort::pass_count_for_upper_bound(1 << 24), 4);
    }
}
