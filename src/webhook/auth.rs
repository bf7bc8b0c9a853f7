//! HMAC verification, header checks, and per-source rate limiting (C2 §4.2).

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{Duration, Instant};

type HmacSha256 = Hmac<Sha256>;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    Exceeded { retry_after_secs: u64 },
}

struct SourceWindow {
    hits: Vec<Instant>,
    last_seen: Instant,
}

/// A sliding-window counter per source key, matching the teacher's
/// `RateLimitLayer` shape but generalized from `IpAddr` to an opaque string
/// key (the webhook's source key is "first forwarded IP, else peer addr").
pub struct WebhookRateLimiter {
    max_requests: u32,
    window: Duration,
    sources: Mutex<HashMap<String, SourceWindow>>,
}

impl WebhookRateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Checks and, on allow, records a hit. Does not count rejected-before-rate-limit
    /// requests (e.g. HMAC mismatches are counted separately by the caller's policy;
    /// per §8 invariant, an HMAC-mismatched request must NOT count against the source).
    pub fn check(&self, source_key: &str) -> RateLimitResult {
        let now = Instant::now();
        let mut sources = self.sources.lock();
        let entry = sources.entry(source_key.to_string()).or_insert_with(|| SourceWindow {
            hits: Vec::new(),
            last_seen: now,
        });
        entry.last_seen = now;
        entry.hits.retain(|t| now.duration_since(*t) < self.window);

        if entry.hits.len() as u32 >= self.max_requests {
            let oldest = entry.hits.first().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return RateLimitResult::Exceeded {
                retry_after_secs: retry_after.as_secs().max(1),
            };
        }

        entry.hits.push(now);
        RateLimitResult::Allowed
    }

    /// Evict sources that have been idle for more than 10x the window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let idle_ceiling = self.window * 10;
        self.sources
            .lock()
            .retain(|_, entry| now.duration_since(entry.last_seen) < idle_ceiling);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Accept,
    RejectBadContentType,
    RejectEmptyBody,
    RejectBodyTooLarge,
    RejectMissingSignature,
    RejectBadSignature,
}

/// The webhook authenticator (C2): owns only the HMAC secret. The rate
/// limiter is a separate long-lived object since its state must survive
/// across authenticator calls and is shared with cleanup housekeeping.
pub struct WebhookAuthenticator {
    secret: Option<String>,
}

impl WebhookAuthenticator {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Checks 1 (content-type), 3 (HMAC), and 4 (body non-empty/size) of §4.2.
    /// Check 2 (rate limit) is performed by the caller against `WebhookRateLimiter`
    /// before the body is even read, per the checks-in-order contract.
    pub fn verify(&self, content_type: Option<&str>, body: &[u8], signature_header: Option<&str>) -> AuthOutcome {
        match content_type {
            Some(ct) if ct.starts_with("application/json") => {}
            _ => return AuthOutcome::RejectBadContentType,
        }

        if let Some(secret) = &self.secret {
            let Some(sig_hex) = signature_header else {
                return AuthOutcome::RejectMissingSignature;
            };
            let Ok(provided) = hex::decode(sig_hex) else {
                return AuthOutcome::RejectBadSignature;
            };
            let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
                return AuthOutcome::RejectBadSignature;
            };
            mac.update(body);
            // `verify_slice` is itself constant-time w.r.t. the comparison.
            if mac.verify_slice(&provided).is_err() {
                return AuthOutcome::RejectBadSignature;
            }
        }

        if body.is_empty() {
            return AuthOutcome::RejectEmptyBody;
        }
        if body.len() > MAX_BODY_BYTES {
            return AuthOutcome::RejectBodyTooLarge;
        }

        AuthOutcome::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let auth = WebhookAuthenticator::new(Some("topsecret".into()));
        let body = br#"{"symbol":"ES"}"#;
        let sig = sign("topsecret", body);
        assert_eq!(
            auth.verify(Some("application/json"), body, Some(&sig)),
            AuthOutcome::Accept
        );
    }

    #[test]
    fn rejects_bad_signature() {
        let auth = WebhookAuthenticator::new(Some("topsecret".into()));
        let body = br#"{"symbol":"ES"}"#;
        assert_eq!(
            auth.verify(Some("application/json"), body, Some("deadbeef")),
            AuthOutcome::RejectBadSignature
        );
    }

    #[test]
    fn rejects_missing_signature_when_secret_configured() {
        let auth = WebhookAuthenticator::new(Some("topsecret".into()));
        let body = br#"{"symbol":"ES"}"#;
        assert_eq!(
            auth.verify(Some("application/json"), body, None),
            AuthOutcome::RejectMissingSignature
        );
    }

    #[test]
    fn rate_limiter_evicts_after_window() {
        let limiter = WebhookRateLimiter::new(2, Duration::from_millis(50));
        assert_eq!(limiter.check("1.2.3.4"), RateLimitResult::Allowed);
        assert_eq!(limiter.check("1.2.3.4"), RateLimitResult::Allowed);
        assert!(matches!(limiter.check("1.2.3.4"), RateLimitResult::Exceeded { .. }));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(limiter.check("1.2.3.4"), RateLimitResult::Allowed);
    }

    #[test]
    fn rate_limiter_tracks_sources_independently() {
        let limiter = WebhookRateLimiter::new(1, Duration::from_secs(60));
        assert_eq!(limiter.check("a"), RateLimitResult::Allowed);
        assert_eq!(limiter.check("b"), RateLimitResult::Allowed);
    }
}
