//! Pacing abstraction so tests never wait on real delays.

use std::time::Duration;

/// Something that can pause the current pipeline between paced operations.
pub trait Pacer: Send + Sync {
    fn pause(&self, delay: Duration);
}

/// Production pacer backed by a real thread sleep. The pipeline runs on a
/// blocking task, so sleeping the thread is the intended behavior.
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records requested pauses without sleeping.
    #[derive(Default)]
    pub struct RecordingPacer {
        pub pauses: Mutex<Vec<Duration>>,
    }

    impl Pacer for RecordingPacer {
        fn pause(&self, delay: Duration) {
            if let Ok(mut pauses) = self.pauses.lock() {
                pauses.push(delay);
            }
        }
    }

    impl RecordingPacer {
        pub fn count(&self) -> usize {
            self.pauses.lock().map(|p| p.len()).unwrap_or(0)
        }
    }
}
