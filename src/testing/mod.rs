//! Testing utilities
//!
//! Synthetic frames, JPEG payloads and an in-process media backend so the
//! session can be exercised without a camera or network.

pub mod synthetic_data;

pub use synthetic_data::{
    encode_test_jpeg, noise_frame, synthetic_frame, BackendLog, MemorySink, SyntheticBackend, SyntheticSource,
};
