//! Index-partitioned endpoint list.
//!
//! ```text
//!  endpoints: [ a | b | c | d | e ]
//!              └─ selectable ─┘└ evicted ┘
//!                 0..available_len
//! ```
//!
//! Eviction swaps the endpoint with the last selectable slot and shrinks the prefix, so it is
//! O(1) and never reallocates. Evicted endpoints stay in the tail with their failure counts.

use std::sync::Arc;

/// One upstream node URL and its failure count.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Arc<str>,
    failures: u32,
}

impl Endpoint {
    #[must_use]
    pub fn url(&self) -> &Arc<str> {
        &self.url
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// What happened to an endpoint after a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Count incremented, still at or under the threshold.
    Counted { failures: u32 },
    /// Over the threshold and moved out of the selectable prefix.
    Evicted { failures: u32, available_len: usize },
    /// Over the threshold but kept because the prefix is at its floor.
    Retained { failures: u32 },
    /// Over the threshold and already outside the selectable prefix.
    AlreadyEvicted { failures: u32 },
    /// URL is not part of this network.
    Unknown,
}

/// Endpoint list plus the active-length cursor for one network.
#[derive(Debug, Clone, Default)]
pub struct EndpointArena {
    endpoints: Vec<Endpoint>,
    available_len: usize,
}

impl EndpointArena {
    #[must_use]
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let endpoints: Vec<Endpoint> =
            urls.into_iter().map(|url| Endpoint { url: url.into(), failures: 0 }).collect();
        let available_len = endpoints.len();
        Self { endpoints, available_len }
    }

    pub fn push(&mut self, url: impl Into<Arc<str>>) {
        self.endpoints.push(Endpoint { url: url.into(), failures: 0 });
        // Keep the partition: a fresh endpoint joins the selectable prefix.
        let last = self.endpoints.len() - 1;
        self.endpoints.swap(self.available_len, last);
        self.available_len += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    #[must_use]
    pub fn available_len(&self) -> usize {
        self.available_len
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// The selectable prefix `[0, available_len)`.
    #[must_use]
    pub fn selectable(&self) -> &[Endpoint] {
        &self.endpoints[..self.available_len]
    }

    /// URL at `index` within the selectable prefix.
    #[must_use]
    pub fn selectable_url(&self, index: usize) -> Option<&Arc<str>> {
        self.selectable().get(index).map(Endpoint::url)
    }

    #[must_use]
    pub fn failures(&self, url: &str) -> Option<u32> {
        self.endpoints.iter().find(|e| &*e.url == url).map(Endpoint::failures)
    }

    /// Counts a failure against `url` and evicts it once the count exceeds `threshold`.
    ///
    /// The prefix never shrinks below `min_available`.
    pub fn record_failure(
        &mut self,
        url: &str,
        threshold: u32,
        min_available: usize,
    ) -> FailureOutcome {
        let Some(position) = self.endpoints.iter().position(|e| &*e.url == url) else {
            return FailureOutcome::Unknown;
        };

        let endpoint = &mut self.endpoints[position];
        endpoint.failures = endpoint.failures.saturating_add(1);
        let failures = endpoint.failures;

        if failures <= threshold {
            return FailureOutcome::Counted { failures };
        }
        if position >= self.available_len {
            return FailureOutcome::AlreadyEvicted { failures };
        }
        if self.available_len <= min_available {
            return FailureOutcome::Retained { failures };
        }

        let last = self.available_len - 1;
        self.endpoints.swap(position, last);
        self.available_len = last;

        FailureOutcome::Evicted { failures, available_len: self.available_len }
    }

    /// Returns every endpoint to the selectable prefix with a clean count.
    pub fn reinstate_all(&mut self) {
        for endpoint in &mut self.endpoints {
            endpoint.failures = 0;
        }
        self.available_len = self.endpoints.len();
    }
}
