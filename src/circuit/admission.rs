//! Per-domain admission control
//!
//! A candidate circuit is admitted for a domain only if its current public
//! address has no ledger entry for that domain inside the cooldown window and
//! no other request currently holds the same (address, domain) pair.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::pool::CircuitPool;
use crate::error::{Result, ScrapeError};
use crate::models::Circuit;
use crate::repository::LedgerStore;

type PairKey = (String, String);

/// (address, domain) pairs admitted but not yet released
#[derive(Debug, Default)]
struct InFlightPairs {
    pairs: Mutex<HashSet<PairKey>>,
}

/// Holds an (address, domain) pair until dropped
#[derive(Debug)]
pub struct InFlightGuard {
    owner: Arc<InFlightPairs>,
    key: PairKey,
}

impl InFlightPairs {
    fn try_claim(self: &Arc<Self>, address: &str, domain: &str) -> Option<InFlightGuard> {
        let key = (address.to_string(), domain.to_string());
        if !self.pairs.lock().insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            owner: Arc::clone(self),
            key,
        })
    }

    fn len(&self) -> usize {
        self.pairs.lock().len()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner.pairs.lock().remove(&self.key);
    }
}

/// A circuit cleared to fetch from a domain
///
/// The (address, domain) pair stays reserved until this value is dropped, so
/// keep it alive until the fetch has been recorded.
#[derive(Debug)]
pub struct Admission {
    pub circuit: Arc<Circuit>,
    /// Address snapshot taken at admission; the ledger key for this fetch
    pub address: String,
    /// Candidates tried, including the admitted one
    pub attempts: u32,
    _guard: InFlightGuard,
}

pub struct AdmissionController {
    pool: Arc<CircuitPool>,
    ledger: Arc<dyn LedgerStore>,
    cooldown: Duration,
    max_attempts: u32,
    in_flight: Arc<InFlightPairs>,
}

impl AdmissionController {
    pub fn new(
        pool: Arc<CircuitPool>,
        ledger: Arc<dyn LedgerStore>,
        cooldown: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            pool,
            ledger,
            cooldown,
            max_attempts,
            in_flight: Arc::new(InFlightPairs::default()),
        }
    }

    /// Candidates tried per request: never more than the pool holds
    pub fn attempt_limit(&self) -> u32 {
        let pool_len = u32::try_from(self.pool.len()).unwrap_or(u32::MAX);
        self.max_attempts.max(1).min(pool_len)
    }

    /// Number of admissions not yet released
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn admit(&self, domain: &str) -> Result<Admission> {
        self.admit_at(domain, Utc::now().timestamp()).await
    }

    /// Admit against an explicit clock reading (seconds since epoch)
    ///
    /// The cursor advances once per candidate, so a request that skips
    /// cooled-down circuits consumes several rotation turns. Candidates are
    /// distinct within one call: when overlapping requests hand this call a
    /// circuit it already tried, the next untried circuit in pool order is
    /// used instead.
    #[instrument(skip(self))]
    pub async fn admit_at(&self, domain: &str, now: i64) -> Result<Admission> {
        if self.pool.is_empty() {
            return Err(ScrapeError::NoIdentitiesAvailable);
        }

        // Uses with now - t < cooldown are blocking.
        let cooldown = i64::try_from(self.cooldown.as_secs()).unwrap_or(i64::MAX);
        let window_start = now.saturating_sub(cooldown).saturating_add(1);
        let limit = self.attempt_limit();
        let mut tried = HashSet::new();

        for attempt in 1..=limit {
            let drawn = self.pool.select_next()?;
            let circuit = if tried.contains(&drawn.port()) {
                match self.pool.next_untried_after(drawn.port(), &tried) {
                    Some(circuit) => circuit,
                    None => break,
                }
            } else {
                drawn
            };
            tried.insert(circuit.port());
            let address = self.pool.current_address(&circuit);

            debug!(
                attempt,
                port = circuit.port(),
                "Testing socks {} public IP will be {}",
                circuit.port(),
                address
            );

            // Claim before reading the ledger so a concurrent holder's write
            // is visible once the claim succeeds.
            let Some(guard) = self.in_flight.try_claim(&address, domain) else {
                debug!(
                    port = circuit.port(),
                    "Address {} already fetching from {}",
                    address,
                    domain
                );
                continue;
            };

            match self
                .ledger
                .last_use_within_window(&address, domain, window_start)
                .await
            {
                Ok(None) => {
                    info!(
                        attempt,
                        port = circuit.port(),
                        address = %address,
                        "Admitted circuit for {}",
                        domain
                    );
                    return Ok(Admission {
                        circuit,
                        address,
                        attempts: attempt,
                        _guard: guard,
                    });
                }
                Ok(Some(last_used)) => {
                    debug!(
                        port = circuit.port(),
                        last_used,
                        "Address {} used on {} within cooldown",
                        address,
                        domain
                    );
                }
                Err(e) => {
                    // Unknown ledger state counts as cooldown.
                    warn!(
                        port = circuit.port(),
                        "Ledger lookup failed, skipping circuit: {}",
                        e
                    );
                }
            }
        }

        warn!(attempts = limit, "All circuits in cooldown for {}", domain);
        Err(ScrapeError::AdmissionExhausted {
            domain: domain.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::repository::LedgerRepository;
    use async_trait::async_trait;

    const DAY: i64 = 24 * 60 * 60;
    const NOW: i64 = 1_700_000_000;

    async fn create_ledger() -> Arc<LedgerRepository> {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        Arc::new(LedgerRepository::new(db.pool().clone()))
    }

    fn create_pool(ports: &[u16]) -> Arc<CircuitPool> {
        let pool = CircuitPool::new("127.0.0.1", ports);
        for (i, circuit) in pool.circuits().iter().enumerate() {
            circuit.set_address(format!("198.51.100.{}", i + 1));
        }
        Arc::new(pool)
    }

    fn create_controller(
        pool: Arc<CircuitPool>,
        ledger: Arc<dyn LedgerStore>,
        max_attempts: u32,
    ) -> AdmissionController {
        AdmissionController::new(pool, ledger, Duration::from_secs(DAY as u64), max_attempts)
    }

    struct BrokenLedger;

    /// Takes one rotation turn during the first lookup, as an overlapping
    /// request would
    struct InterleavingLedger {
        inner: Arc<LedgerRepository>,
        pool: Arc<CircuitPool>,
        taken: Mutex<Option<u16>>,
    }

    #[async_trait]
    impl LedgerStore for InterleavingLedger {
        async fn record_use(&self, address: &str, domain: &str, at: i64) -> Result<()> {
            self.inner.record_use(address, domain, at).await
        }

        async fn last_use_within_window(
            &self,
            address: &str,
            domain: &str,
            window_start: i64,
        ) -> Result<Option<i64>> {
            {
                let mut taken = self.taken.lock();
                if taken.is_none() {
                    *taken = Some(self.pool.select_next()?.port());
                }
            }
            self.inner
                .last_use_within_window(address, domain, window_start)
                .await
        }

        async fn evict_older_than(&self, cutoff: i64) -> Result<u64> {
            self.inner.evict_older_than(cutoff).await
        }
    }

    #[async_trait]
    impl LedgerStore for BrokenLedger {
        async fn record_use(&self, _: &str, _: &str, _: i64) -> Result<()> {
            Err(ScrapeError::Internal("disk gone".to_string()))
        }

        async fn last_use_within_window(&self, _: &str, _: &str, _: i64) -> Result<Option<i64>> {
            Err(ScrapeError::Internal("disk gone".to_string()))
        }

        async fn evict_older_than(&self, _: i64) -> Result<u64> {
            Err(ScrapeError::Internal("disk gone".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fresh_domain_admits_first_circuit() {
        let pool = create_pool(&[9050, 9052, 9053]);
        let ledger = create_ledger().await;
        let controller = create_controller(pool.clone(), ledger, 5);

        pool.reset_cursor();
        let admission = controller.admit_at("new-site.org", NOW).await.unwrap();

        assert_eq!(admission.attempts, 1);
        assert_eq!(admission.circuit.port(), 9050);
        assert_eq!(admission.address, "198.51.100.1");
    }

    #[tokio::test]
    async fn test_exhausted_when_all_circuits_used() {
        let pool = create_pool(&[9050, 9052, 9053]);
        let ledger = create_ledger().await;
        for circuit in pool.circuits() {
            ledger
                .record_use(&circuit.address(), "example.com", NOW - 60)
                .await
                .unwrap();
        }
        let controller = create_controller(pool, ledger, 5);

        let err = controller.admit_at("example.com", NOW).await.unwrap_err();
        match err {
            ScrapeError::AdmissionExhausted { domain } => assert_eq!(domain, "example.com"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_skips_cooled_down_circuit() {
        let pool = create_pool(&[9050, 9052, 9053]);
        let ledger = create_ledger().await;
        ledger
            .record_use("198.51.100.1", "example.com", NOW - 3600)
            .await
            .unwrap();
        let controller = create_controller(pool, ledger, 5);

        let admission = controller.admit_at("example.com", NOW).await.unwrap();
        assert_eq!(admission.circuit.port(), 9052);
        assert_eq!(admission.attempts, 2);
    }

    #[tokio::test]
    async fn test_cooldown_expires_at_window_edge() {
        let pool = create_pool(&[9050]);
        let ledger = create_ledger().await;
        ledger
            .record_use("198.51.100.1", "example.com", NOW)
            .await
            .unwrap();
        let controller = create_controller(pool, ledger, 5);

        assert!(controller
            .admit_at("example.com", NOW + DAY - 1)
            .await
            .is_err());
        assert!(controller.admit_at("example.com", NOW + DAY).await.is_ok());
    }

    #[tokio::test]
    async fn test_cooldown_is_per_domain() {
        let pool = create_pool(&[9050]);
        let ledger = create_ledger().await;
        ledger
            .record_use("198.51.100.1", "example.com", NOW - 10)
            .await
            .unwrap();
        let controller = create_controller(pool, ledger, 5);

        assert!(controller.admit_at("other.org", NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_attempts_bounded_by_max_attempts() {
        let pool = create_pool(&[9050, 9052, 9053, 9054]);
        let ledger = create_ledger().await;
        for address in ["198.51.100.1", "198.51.100.2"] {
            ledger.record_use(address, "example.com", NOW).await.unwrap();
        }
        let controller = create_controller(pool.clone(), ledger, 2);

        assert!(matches!(
            controller.admit_at("example.com", NOW).await,
            Err(ScrapeError::AdmissionExhausted { .. })
        ));
        // Rotation advanced once per attempt.
        assert_eq!(pool.select_next().unwrap().port(), 9053);
    }

    #[tokio::test]
    async fn test_attempts_bounded_by_pool_size() {
        let pool = create_pool(&[9050, 9052]);
        let ledger = create_ledger().await;
        let controller = create_controller(pool, ledger, 5);

        assert_eq!(controller.attempt_limit(), 2);
    }

    #[tokio::test]
    async fn test_ledger_failure_fails_closed() {
        let pool = create_pool(&[9050, 9052, 9053]);
        let controller = create_controller(pool, Arc::new(BrokenLedger), 5);

        assert!(matches!(
            controller.admit_at("example.com", NOW).await,
            Err(ScrapeError::AdmissionExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_interleaved_selection_still_reaches_cool_circuit() {
        let pool = create_pool(&[9050, 9052]);
        let inner = create_ledger().await;
        inner
            .record_use("198.51.100.1", "example.com", NOW - 60)
            .await
            .unwrap();
        let ledger = Arc::new(InterleavingLedger {
            inner,
            pool: pool.clone(),
            taken: Mutex::new(None),
        });
        let controller = create_controller(pool.clone(), ledger.clone(), 5);

        pool.reset_cursor();
        let admission = controller.admit_at("example.com", NOW).await.unwrap();

        assert_eq!(*ledger.taken.lock(), Some(9052));
        assert_eq!(admission.circuit.port(), 9052);
        assert_eq!(admission.attempts, 2);
        // One turn per attempt plus the interleaved one.
        assert_eq!(pool.select_next().unwrap().port(), 9052);
    }

    #[tokio::test]
    async fn test_in_flight_pair_is_not_admitted_twice() {
        let pool = create_pool(&[9050]);
        let ledger = create_ledger().await;
        let controller = create_controller(pool, ledger, 5);

        let first = controller.admit_at("example.com", NOW).await.unwrap();
        assert_eq!(controller.in_flight(), 1);
        assert!(matches!(
            controller.admit_at("example.com", NOW).await,
            Err(ScrapeError::AdmissionExhausted { .. })
        ));
        // Other domains are not held.
        let other = controller.admit_at("other.org", NOW).await.unwrap();
        assert_eq!(controller.in_flight(), 2);

        drop(first);
        drop(other);
        assert_eq!(controller.in_flight(), 0);
        assert!(controller.admit_at("example.com", NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_pair_released_after_rejection() {
        let pool = create_pool(&[9050]);
        let ledger = create_ledger().await;
        ledger
            .record_use("198.51.100.1", "example.com", NOW - 10)
            .await
            .unwrap();
        let controller = create_controller(pool, ledger, 5);

        assert!(controller.admit_at("example.com", NOW).await.is_err());
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_get_distinct_circuits() {
        let pool = create_pool(&[9050, 9052, 9053, 9054]);
        let ledger = create_ledger().await;
        let controller = Arc::new(create_controller(pool, ledger, 4));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.admit_at("example.com", NOW).await })
            })
            .collect();

        let mut admissions = Vec::new();
        for task in tasks {
            admissions.push(task.await.unwrap().unwrap());
        }

        let ports: HashSet<u16> = admissions.iter().map(|a| a.circuit.port()).collect();
        assert_eq!(ports.len(), 4);
        assert!(matches!(
            controller.admit_at("example.com", NOW).await,
            Err(ScrapeError::AdmissionExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = Arc::new(CircuitPool::new("127.0.0.1", &[]));
        let ledger = create_ledger().await;
        let controller = create_controller(pool, ledger, 5);

        assert!(matches!(
            controller.admit_at("example.com", NOW).await,
            Err(ScrapeError::NoIdentitiesAvailable)
        ));
    }

    #[tokio::test]
    async fn test_address_change_makes_circuit_eligible() {
        let pool = create_pool(&[9050]);
        let ledger = create_ledger().await;
        ledger
            .record_use("198.51.100.1", "example.com", NOW - 10)
            .await
            .unwrap();
        let controller = create_controller(pool.clone(), ledger, 5);

        assert!(controller.admit_at("example.com", NOW).await.is_err());

        pool.circuits()[0].set_address("203.0.113.50");
        let admission = controller.admit_at("example.com", NOW).await.unwrap();
        assert_eq!(admission.address, "203.0.113.50");
    }
}
