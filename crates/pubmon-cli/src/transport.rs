//! Simulated publish transport.
//!
//! Stands in for a network client: sleeps for a jittered latency and then
//! succeeds or fails according to the configured rates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pubmon_core::{PublishRequest, PublishResponse, Receipt, TransportError};
use rand::Rng;

/// Status used for simulated precheck rejections.
pub const PRECHECK_STATUS: &str = "BUSY";

/// Status used for simulated receipt failures.
pub const RECEIPT_STATUS: &str = "INVALID_SIGNATURE";

/// How the simulated transport behaves.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportProfile {
    /// Mean submit latency; each call draws from 50% - 150% of it.
    pub latency: Duration,
    pub precheck_error_rate: f64,
    pub receipt_error_rate: f64,
    pub timeout_rate: f64,
    /// Fraction of successful publishes that wait for a receipt.
    pub receipt_ratio: f64,
}

impl Default for TransportProfile {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            precheck_error_rate: 0.0,
            receipt_error_rate: 0.0,
            timeout_rate: 0.0,
            receipt_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Draw {
    Success { receipt: bool },
    Precheck,
    Receipt,
    Timeout,
}

/// Transport that fabricates responses.
pub struct SimulatedTransport {
    profile: TransportProfile,
    sequence: AtomicU64,
}

impl SimulatedTransport {
    pub fn new(profile: TransportProfile) -> Self {
        Self {
            profile,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish one request.
    pub async fn publish(&self, _request: PublishRequest) -> Result<PublishResponse, TransportError> {
        let (draw, latency) = {
            let mut rng = rand::thread_rng();
            (self.draw(rng.gen()), self.jitter(rng.gen()))
        };
        let transaction_id = self.next_transaction_id();

        tokio::time::sleep(latency).await;

        match draw {
            Draw::Success { receipt } => {
                let response = PublishResponse::new(SystemTime::now(), transaction_id);
                if receipt {
                    // Consensus takes a few more round trips.
                    tokio::time::sleep(latency * 2).await;
                    Ok(response.with_receipt(Receipt::new("SUCCESS")))
                } else {
                    Ok(response)
                }
            }
            Draw::Precheck => Err(TransportError::precheck(
                PRECHECK_STATUS,
                transaction_id,
                "node is busy, try again",
            )),
            Draw::Receipt => {
                tokio::time::sleep(latency * 2).await;
                Err(TransportError::receipt(RECEIPT_STATUS, transaction_id))
            }
            Draw::Timeout => Err(TransportError::Timeout(latency)),
        }
    }

    /// Map a uniform sample in [0, 1) to an outcome.
    fn draw(&self, sample: f64) -> Draw {
        let p = &self.profile;
        let mut threshold = p.precheck_error_rate;
        if sample < threshold {
            return Draw::Precheck;
        }
        threshold += p.receipt_error_rate;
        if sample < threshold {
            return Draw::Receipt;
        }
        threshold += p.timeout_rate;
        if sample < threshold {
            return Draw::Timeout;
        }
        // Reuse the remaining range for the receipt decision.
        let remaining = (1.0 - threshold).max(f64::EPSILON);
        Draw::Success {
            receipt: (sample - threshold) / remaining < p.receipt_ratio,
        }
    }

    fn jitter(&self, sample: f64) -> Duration {
        self.profile.latency.mul_f64(0.5 + sample)
    }

    fn next_transaction_id(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        format!("0.0.{}@{}.{:09}", 1000 + sequence, now.as_secs(), now.subsec_nanos())
    }
}
