//! Anti-forgery metadata generation.
//!
//! The provider expects each form submission to carry an opaque
//! browser-computed metadata blob. Generation is delegated behind a trait so
//! callers can plug in a faithful reimplementation of the provider's
//! fingerprint script; the default produces a random value of a plausible
//! shape.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Produces the one-shot metadata value attached to every form submission.
pub trait AntiForgeryMetadataGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default generator emitting a random alphanumeric blob.
#[derive(Debug, Clone)]
pub struct RandomMetadataGenerator {
    length: usize,
}

impl RandomMetadataGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }
}

impl Default for RandomMetadataGenerator {
    fn default() -> Self {
        Self::new(128)
    }
}

impl AntiForgeryMetadataGenerator for RandomMetadataGenerator {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }
}
