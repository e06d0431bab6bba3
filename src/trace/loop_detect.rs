//! Sliding-window repeated-signature detection over recorded calls.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;
use sha2::{Digest, Sha256};

/// A qualifying repetition spotted by [`LoopDetector::observe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopWarning {
    pub signature: String,
    pub count: usize,
    pub window: usize,
}

/// Per-run detector over the last `window` call signatures.
///
/// A signature that reaches `repetitions` occurrences inside the window
/// yields one warning, and warns again only after every occurrence of it has
/// scrolled out of the window.
#[derive(Debug)]
pub struct LoopDetector {
    window: usize,
    repetitions: usize,
    buf: VecDeque<String>,
    warned: HashSet<String>,
}

impl LoopDetector {
    pub fn new(window: usize, repetitions: usize) -> Self {
        Self {
            window,
            repetitions,
            buf: VecDeque::with_capacity(window),
            warned: HashSet::new(),
        }
    }

    /// Record one call signature; returns a warning when it qualifies.
    pub fn observe(&mut self, signature: String) -> Option<LoopWarning> {
        self.buf.push_back(signature.clone());
        if self.buf.len() > self.window {
            if let Some(evicted) = self.buf.pop_front() {
                if !self.buf.contains(&evicted) {
                    self.warned.remove(&evicted);
                }
            }
        }

        let count = self.buf.iter().filter(|s| **s == signature).count();
        if count >= self.repetitions && self.warned.insert(signature.clone()) {
            return Some(LoopWarning {
                signature,
                count,
                window: self.window,
            });
        }
        None
    }
}

/// Fingerprint of a call: kind, name, and normalized arguments.
///
/// `serde_json` maps are key-sorted, so equal argument sets hash equally
/// regardless of construction order.
pub fn call_signature(kind: &str, name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b"\n");
    hasher.update(name.as_bytes());
    hasher.update(b"\n");
    hasher.update(args.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
