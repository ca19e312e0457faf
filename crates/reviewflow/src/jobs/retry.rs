use rand::Rng;

/// Backoff shape for per-item retries. The attempt budget itself comes from
/// each job's config (`max_retries`); this only controls the delays between
/// attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_pct: 0.20,
        }
    }
}

impl RetryPolicy {
    /// No delays and no jitter; used by tests.
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_pct: 0.0,
        }
    }
}

/// Delay before the attempt following `attempt_no` (1-based): base doubling
/// per attempt, capped, with symmetric jitter.
pub fn next_delay_ms(attempt_no: u32, policy: &RetryPolicy, rng: &mut impl Rng) -> u64 {
    let exp = attempt_no.max(1) - 1;
    let pow2 = 1_u64.checked_shl(exp).unwrap_or(u64::MAX);
    let delay = policy
        .base_delay_ms
        .saturating_mul(pow2)
        .min(policy.max_delay_ms);

    if policy.jitter_pct <= 0.0 || delay == 0 {
        return delay;
    }

    let jitter_range = (delay as f64) * policy.jitter_pct;
    let jitter = rng.gen_range(-jitter_range..=jitter_range);
    let jittered = (delay as f64 + jitter).round();
    (jittered.max(0.0) as u64).min(policy.max_delay_ms)
}
