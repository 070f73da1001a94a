//! Hashing plus helpers shared by unit tests.

pub mod hash;

#[cfg(test)]
pub mod testutil;
