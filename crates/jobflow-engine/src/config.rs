//! Scheduler configuration: how many ready jobs the manager is
//! willing to run at once. The dependency contract — never run a job
//! before its inputs are done — is identical in both modes; this only
//! controls how much independent, already-ready work overlaps.

use std::num::NonZeroUsize;

#[derive(Debug, Clone)]
pub enum Parallelism {
    /// One job runs at a time; the reference model the test suite
    /// verifies against.
    Sequential,
    /// Up to `n` independent ready jobs run concurrently on a scoped
    /// worker pool.
    Bounded(NonZeroUsize),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub parallelism: Parallelism,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            parallelism: Parallelism::Sequential,
        }
    }
}

impl Config {
    pub fn sequential() -> Self {
        Config::default()
    }

    pub fn bounded(n: NonZeroUsize) -> Self {
        Config {
            parallelism: Parallelism::Bounded(n),
        }
    }
}
