//! Admission control: rate governor and concurrency pool.

pub mod admission;
pub mod rate_governor;
