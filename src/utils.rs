/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

pub mod timing {

    use std::time::Instant;

    /// Wall-clock stopwatch for coarse stage timing in binaries.
    pub struct Stopwatch {
        previous: Instant,
    }

    impl Stopwatch {
        #[allow(clippy::new_without_default)]
        pub fn new() -> Self {
            Stopwatch { previous: Instant::now() }
        }

        /// Milliseconds since construction or the last `lap`.
        pub fn lap(&mut self) -> u128 {
            let elapsed = self.previous.elapsed().as_millis();
            self.previous = Instant::now();
            elapsed
        }
    }
}
