//! Sliding-window request throttling, shared by every route.
//!
//! State lives in memory and is per process: it is cleared on restart and
//! not shared between instances.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};

/// How many calls between sweeps of idle keys.
const SWEEP_INTERVAL: u64 = 1000;

/// Key used when a request carries no client address at all.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Bounds how many requests each client may make within a trailing window.
pub struct RequestThrottle {
    window: Duration,
    max_requests: usize,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
    calls: AtomicU64,
}

impl RequestThrottle {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            hits: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Record a request from `key` now, returning whether it is allowed.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Record a request from `key` at the given instant, returning whether it is allowed.
    /// Denied requests are not recorded.
    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let cutoff = now.checked_sub(self.window);
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);

        let count = self.calls.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % SWEEP_INTERVAL == 0 {
            sweep(&mut hits, cutoff);
        }

        let timestamps = hits.entry(key.to_string()).or_default();
        expire(timestamps, cutoff);
        if timestamps.len() >= self.max_requests {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Number of clients currently tracked.
    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Drop timestamps at or before the cutoff. Timestamps are kept in arrival order.
fn expire(timestamps: &mut VecDeque<Instant>, cutoff: Option<Instant>) {
    let Some(cutoff) = cutoff else {
        return;
    };
    while timestamps.front().map_or(false, |&t| t <= cutoff) {
        timestamps.pop_front();
    }
}

/// Forget every key with no requests inside the window.
fn sweep(hits: &mut HashMap<String, VecDeque<Instant>>, cutoff: Option<Instant>) {
    hits.retain(|_, timestamps| {
        expire(timestamps, cutoff);
        !timestamps.is_empty()
    });
    debug!("Throttle sweep done, {} clients tracked", hits.len());
}

/// Identify the client: first forwarded address, then the peer address.
pub fn client_key(req: &Request<'_>) -> String {
    req.headers()
        .get_one("X-Forwarded-For")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| req.client_ip().map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// The outcome of throttling the current request, cached so a request is only counted once.
struct Verdict(bool);

/// A request guard that admits the request only if its client is within the throttle limit.
pub struct RateLimit;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RateLimit {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let throttle = match req.guard::<&State<RequestThrottle>>().await {
            Outcome::Success(throttle) => throttle,
            _ => return Outcome::Failure((Status::InternalServerError, ())),
        };
        let key = client_key(req);
        let verdict = req.local_cache(|| Verdict(throttle.allow(&key)));
        if verdict.0 {
            Outcome::Success(RateLimit)
        } else {
            warn!("Throttled client {key}");
            Outcome::Failure((Status::TooManyRequests, ()))
        }
    }
}
