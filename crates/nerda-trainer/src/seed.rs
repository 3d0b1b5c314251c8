//! Reproducibility seeding.
//!
//! Nothing here touches process-wide random state. A [`Seeder`] derives an
//! independent generator per purpose, and every randomized component
//! (head initialization, shuffling, dropout) takes its stream explicitly, so
//! two runs in the same process cannot disturb each other.

use candle_core::Device;
use nerda_core::Result;
use oorandom::{Rand32, Rand64};

/// Purposes that get their own random stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    /// Initialization of parameters not loaded from a checkpoint.
    Init,
    /// Training example order.
    Shuffle,
    /// Dropout masks.
    Dropout,
}

impl RngStream {
    fn key(self) -> u64 {
        match self {
            RngStream::Init => 0x494e_4954,
            RngStream::Shuffle => 0x5348_5546,
            RngStream::Dropout => 0x4452_4f50,
        }
    }
}

/// Hands out deterministic random streams derived from one seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seeder {
    seed: u64,
}

impl Seeder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from the system clock, for runs that do not ask for
    /// reproducibility.
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::new(splitmix64(nanos ^ u64::from(std::process::id())))
    }

    /// Seeder for an optional configured seed.
    pub fn from_config(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::new)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn stream_seed(&self, stream: RngStream) -> u64 {
        splitmix64(self.seed ^ splitmix64(stream.key()))
    }

    /// 32-bit generator for `stream`. Same seeder, same stream, same state.
    pub fn rand32(&self, stream: RngStream) -> Rand32 {
        Rand32::new(self.stream_seed(stream))
    }

    /// 64-bit generator for `stream`.
    pub fn rand64(&self, stream: RngStream) -> Rand64 {
        let lo = self.stream_seed(stream);
        let hi = splitmix64(lo);
        Rand64::new((u128::from(hi) << 64) | u128::from(lo))
    }

    /// Seed the generator of an accelerator device.
    ///
    /// The CPU backend has no seedable generator and is left alone; CPU runs
    /// get their determinism from the explicit streams.
    pub fn seed_device(&self, device: &Device) -> Result<()> {
        if !device.is_cpu() {
            device.set_seed(self.seed)?;
            tracing::debug!(seed = self.seed, ?device, "seeded device generator");
        }
        Ok(())
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Fisher-Yates shuffle driven by an explicit generator.
pub fn shuffle<T>(items: &mut [T], rng: &mut Rand64) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
