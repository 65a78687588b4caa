//! Outbound identity pool and rotation policy.
//!
//! An identity is the (proxy endpoint, user-agent) pair stamped onto every
//! outgoing request. Proxies rotate in cyclic order over an explicit index;
//! user agents are drawn uniformly at random from the configured list, and a
//! draw may repeat the previous agent. The pool also owns the per-identity
//! usage counters the dispatcher consults before stamping.

use rand::seq::SliceRandom;
use rand::thread_rng;
use thiserror::Error;

/// Errors raised while constructing an [`IdentityPool`].
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("proxy list contains no entries")]
    EmptyProxyList,
    #[error("user-agent list contains no entries")]
    EmptyAgentList,
}

/// The (proxy, user-agent) pair assigned to an outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub proxy: String,
    pub user_agent: String,
}

/// Usage ceilings that trigger a rotation before the next request.
#[derive(Debug, Clone, Copy)]
pub struct RotationThresholds {
    pub max_requests_per_agent: u64,
    pub max_requests_per_proxy: u64,
}

impl Default for RotationThresholds {
    fn default() -> Self {
        Self {
            max_requests_per_agent: 500,
            max_requests_per_proxy: 4000,
        }
    }
}

impl RotationThresholds {
    /// True once `count` requests have been sent with the current agent.
    pub fn should_rotate_agent(&self, count: u64) -> bool {
        count >= self.max_requests_per_agent
    }

    /// True once `count` requests have been sent with the current proxy.
    pub fn should_rotate_proxy(&self, count: u64) -> bool {
        count >= self.max_requests_per_proxy
    }
}

/// Pool of egress identities plus the usage counters for the active pair.
///
/// The pool itself is not synchronized; the dispatcher wraps it in a single
/// mutex and performs the whole check-rotate-stamp-count sequence inside one
/// critical section.
#[derive(Debug)]
pub struct IdentityPool {
    proxies: Vec<String>,
    agents: Vec<String>,
    proxy_index: usize,
    current_agent: String,
    proxy_request_count: u64,
    agent_request_count: u64,
}

impl IdentityPool {
    /// Build a pool from the configured endpoint and agent lists.
    ///
    /// Fails fast when either list is empty: running without proxies or
    /// without user agents is a configuration error, not a retryable one.
    pub fn new(proxies: Vec<String>, agents: Vec<String>) -> Result<Self, IdentityError> {
        if proxies.is_empty() {
            return Err(IdentityError::EmptyProxyList);
        }
        if agents.is_empty() {
            return Err(IdentityError::EmptyAgentList);
        }

        let current_agent = agents
            .choose(&mut thread_rng())
            .cloned()
            .expect("agent list checked non-empty");

        Ok(Self {
            proxies,
            agents,
            proxy_index: 0,
            current_agent,
            proxy_request_count: 0,
            agent_request_count: 0,
        })
    }

    /// Active (proxy, user-agent) pair. Does not mutate any cursor.
    pub fn current(&self) -> Identity {
        Identity {
            proxy: self.proxies[self.proxy_index].clone(),
            user_agent: self.current_agent.clone(),
        }
    }

    /// Step the proxy cursor to the next entry, wrapping after the last.
    pub fn advance_proxy(&mut self) -> &str {
        self.proxy_index = (self.proxy_index + 1) % self.proxies.len();
        &self.proxies[self.proxy_index]
    }

    /// Draw a new agent uniformly at random. Previous agents stay eligible.
    pub fn advance_agent(&mut self) -> &str {
        self.current_agent = self
            .agents
            .choose(&mut thread_rng())
            .cloned()
            .expect("agent list checked non-empty");
        &self.current_agent
    }

    pub fn proxy_request_count(&self) -> u64 {
        self.proxy_request_count
    }

    pub fn agent_request_count(&self) -> u64 {
        self.agent_request_count
    }

    /// Count one request against both the active proxy and agent.
    pub fn record_use(&mut self) {
        self.proxy_request_count += 1;
        self.agent_request_count += 1;
    }

    pub fn reset_proxy_count(&mut self) {
        self.proxy_request_count = 0;
    }

    pub fn reset_agent_count(&mut self) {
        self.agent_request_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(proxies: &[&str], agents: &[&str]) -> IdentityPool {
        IdentityPool::new(
            proxies.iter().map(|p| p.to_string()).collect(),
            agents.iter().map(|a| a.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_lists() {
        assert!(matches!(
            IdentityPool::new(Vec::new(), vec!["ua".into()]),
            Err(IdentityError::EmptyProxyList)
        ));
        assert!(matches!(
            IdentityPool::new(vec!["http://p1:8080".into()], Vec::new()),
            Err(IdentityError::EmptyAgentList)
        ));
    }

    #[test]
    fn proxy_cursor_wraps_cyclically() {
        let mut pool = pool(&["p1", "p2", "p3"], &["ua"]);
        assert_eq!(pool.current().proxy, "p1");
        assert_eq!(pool.advance_proxy(), "p2");
        assert_eq!(pool.advance_proxy(), "p3");
        assert_eq!(pool.advance_proxy(), "p1");
    }

    #[test]
    fn agent_draws_stay_within_list() {
        let mut pool = pool(&["p1"], &["ua1", "ua2", "ua3"]);
        for _ in 0..50 {
            let agent = pool.advance_agent().to_string();
            assert!(["ua1", "ua2", "ua3"].contains(&agent.as_str()));
        }
    }

    #[test]
    fn counters_track_and_reset() {
        let mut pool = pool(&["p1"], &["ua"]);
        pool.record_use();
        pool.record_use();
        assert_eq!(pool.proxy_request_count(), 2);
        assert_eq!(pool.agent_request_count(), 2);
        pool.reset_agent_count();
        assert_eq!(pool.agent_request_count(), 0);
        assert_eq!(pool.proxy_request_count(), 2);
    }

    #[test]
    fn thresholds_use_inclusive_comparison() {
        let thresholds = RotationThresholds {
            max_requests_per_agent: 2,
            max_requests_per_proxy: 4,
        };
        assert!(!thresholds.should_rotate_agent(1));
        assert!(thresholds.should_rotate_agent(2));
        assert!(thresholds.should_rotate_agent(3));
        assert!(!thresholds.should_rotate_proxy(3));
        assert!(thresholds.should_rotate_proxy(4));
    }

    #[test]
    fn default_thresholds_match_operating_values() {
        let thresholds = RotationThresholds::default();
        assert_eq!(thresholds.max_requests_per_agent, 500);
        assert_eq!(thresholds.max_requests_per_proxy, 4000);
    }
}
