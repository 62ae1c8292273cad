//! Chronologically ordered push keys.
//!
//! A key is 20 characters: 8 encoding the millisecond timestamp followed by 12
//! random characters, all from an alphabet whose byte order matches its
//! numeric order. Keys made in the same millisecond (or with the clock moving
//! backwards) increment the random part, so keys from one generator always
//! sort in creation order.

use crate::model::now_millis;
use std::sync::Mutex;
use uuid::Uuid;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Length of a generated key.
pub const PUSH_KEY_LEN: usize = 20;

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Uuid v4 bytes that carry no version or variant bits.
const RANDOM_BYTE_INDICES: [usize; RANDOM_CHARS] = [0, 1, 2, 3, 4, 5, 7, 9, 10, 11, 12, 13];

#[derive(Debug, Default)]
struct KeyState {
    last_millis: u64,
    last_random: [u8; RANDOM_CHARS],
}

#[derive(Debug, Default)]
pub struct PushKeyGenerator {
    state: Mutex<KeyState>,
}

impl PushKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&self) -> String {
        self.next_key_at(now_millis().max(0) as u64)
    }

    /// Key for an explicit timestamp.
    pub fn next_key_at(&self, millis: u64) -> String {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let millis = if millis <= state.last_millis && state.last_millis != 0 {
            increment(&mut state.last_random);
            state.last_millis
        } else {
            let bytes = Uuid::new_v4().into_bytes();
            for (slot, idx) in state.last_random.iter_mut().zip(RANDOM_BYTE_INDICES) {
                *slot = bytes[idx] % 64;
            }
            state.last_millis = millis;
            millis
        };

        let mut key = [0u8; PUSH_KEY_LEN];
        let mut remaining = millis;
        for slot in key[..TIME_CHARS].iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        for (slot, digit) in key[TIME_CHARS..].iter_mut().zip(state.last_random) {
            *slot = PUSH_CHARS[digit as usize];
        }
        key.iter().map(|&b| b as char).collect()
    }
}

fn increment(digits: &mut [u8; RANDOM_CHARS]) {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shape() {
        let keys = PushKeyGenerator::new();
        let key = keys.next_key();
        assert_eq!(key.len(), PUSH_KEY_LEN);
        assert!(key.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn test_keys_sort_by_time() {
        let keys = PushKeyGenerator::new();
        let early = keys.next_key_at(1_000);
        let late = keys.next_key_at(2_000);
        assert!(early < late);
    }

    #[test]
    fn test_same_millisecond_keys_increase() {
        let keys = PushKeyGenerator::new();
        let mut previous = keys.next_key_at(5_000);
        for _ in 0..200 {
            let next = keys.next_key_at(5_000);
            assert!(next > previous, "{next} should sort after {previous}");
            assert_eq!(next[..8], previous[..8]);
            previous = next;
        }
    }

    #[test]
    fn test_clock_going_backwards_stays_ordered() {
        let keys = PushKeyGenerator::new();
        let first = keys.next_key_at(9_000);
        let second = keys.next_key_at(8_000);
        assert!(second > first);
    }

    #[test]
    fn test_increment_carries() {
        let mut digits = [0u8; RANDOM_CHARS];
        digits[RANDOM_CHARS - 1] = 63;
        increment(&mut digits);
        assert_eq!(digits[RANDOM_CHARS - 1], 0);
        assert_eq!(digits[RANDOM_CHARS - 2], 1);
    }
}
