//! Chronologically ordered unique child ids.
//!
//! An id is 20 characters: 8 encode the creation time in milliseconds, 12 are
//! random. Ids created within the same millisecond reuse the previous random
//! part incremented by one, so they stay strictly increasing.

use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::clock::Clock;
use crate::constants::PUSH_CHARS;

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

#[derive(Debug)]
struct GeneratorState {
    last_millis: Option<u64>,
    last_random: [u8; RANDOM_CHARS],
}

/// Generates push ids from a clock and a random source.
#[derive(Debug)]
pub struct PushIdGenerator {
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl PushIdGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(GeneratorState {
                last_millis: None,
                last_random: [0; RANDOM_CHARS],
            }),
        }
    }

    /// Produces the next id; ids sort in creation order.
    pub fn next_id(&self) -> String {
        let now = self.clock.now_millis();
        let mut state = self.state.lock().unwrap();

        if state.last_millis == Some(now) {
            // Same millisecond: increment the random part, carrying leftwards.
            for digit in state.last_random.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::thread_rng();
            for digit in state.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
            state.last_millis = Some(now);
        }

        let mut id = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
        let mut time_chars = [0u8; TIME_CHARS];
        let mut remaining = now;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        id.extend(time_chars.iter().map(|&c| c as char));
        id.extend(
            state
                .last_random
                .iter()
                .map(|&digit| PUSH_CHARS[digit as usize] as char),
        );
        id
    }
}
