/// Synchronization source generation, injectable so tests can force
/// collisions deterministically.
pub trait SsrcGenerator: Send + Sync {
    fn generate(&self) -> u32;

    fn generate_avoiding(&self, taken: &[u32]) -> u32 {
        loop {
            let candidate = self.generate();
            if !taken.contains(&candidate) {
                return candidate;
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RandomSsrcGenerator;

impl SsrcGenerator for RandomSsrcGenerator {
    fn generate(&self) -> u32 {
        utils::random::random_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingGenerator(std::sync::atomic::AtomicU32);

    impl SsrcGenerator for CountingGenerator {
        fn generate(&self) -> u32 {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[test]
    fn generate_avoiding_skips_taken_values() {
        let generator = CountingGenerator(std::sync::atomic::AtomicU32::new(0));
        let ssrc = generator.generate_avoiding(&[0, 1, 2]);
        assert_eq!(ssrc, 3);
    }
}
