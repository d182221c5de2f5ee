//! Integration cache with single-flight computation
//!
//! Results are keyed by a canonical fingerprint of the (polytope,
//! polynomial) pair with variables renamed to domain positions, so
//! structurally identical cells share one entry regardless of variable
//! identity. The first caller for a key owns the computation; concurrent
//! callers for the same key block on its completion instead of
//! recomputing. The cache can be persisted as a flat JSON-lines file,
//! stable across runs of the same solver version.

use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use num_bigint::BigInt;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};

use crate::error::WmiResult;
use crate::integrate::{IntegralValue, Integrator};
use crate::polynomial::Polynomial;
use crate::polytope::Polytope;

struct Slot {
    value: Mutex<Option<WmiResult<IntegralValue>>>,
    ready: Condvar,
}

impl Slot {
    fn empty() -> Self {
        Self {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn filled(value: WmiResult<IntegralValue>) -> Self {
        Self {
            value: Mutex::new(Some(value)),
            ready: Condvar::new(),
        }
    }

    fn put(&self, value: WmiResult<IntegralValue>) {
        *self.value.lock().unwrap() = Some(value);
        self.ready.notify_all();
    }

    fn wait(&self) -> WmiResult<IntegralValue> {
        let mut guard = self.value.lock().unwrap();
        while guard.is_none() {
            guard = self.ready.wait(guard).unwrap();
        }
        guard.clone().unwrap()
    }
}

/// Caching wrapper around any backend
pub struct CachedIntegrator {
    inner: Arc<dyn Integrator>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// One persisted cache line
#[derive(Serialize, Deserialize)]
struct CacheLine {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    exact: Option<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    approx: Option<f64>,
}

impl CachedIntegrator {
    pub fn new(inner: Arc<dyn Integrator>) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// (hits, misses) so far.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical fingerprint shared by cache keying and persistence.
    /// Prefixed with the format version so persisted files are never
    /// reused across an incompatible key change.
    pub fn fingerprint(polytope: &Polytope, polynomial: &Polynomial) -> String {
        format!(
            "{}|{}|{}",
            crate::CACHE_FORMAT_VERSION,
            polytope.canonical_key(),
            polynomial.canonical_key(&polytope.variable_index())
        )
    }

    /// Pre-load persisted entries; malformed lines are skipped.
    pub fn load(&self, path: &Path) -> io::Result<usize> {
        let file = fs::File::open(path)?;
        let mut loaded = 0;
        let mut slots = self.slots.lock().unwrap();
        for line in io::BufReader::new(file).lines() {
            let line = line?;
            let parsed: CacheLine = match serde_json::from_str(&line) {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("skipping malformed cache line: {e}");
                    continue;
                }
            };
            let value = match (&parsed.exact, parsed.approx) {
                (Some((numer, denom)), _) => {
                    match (BigInt::from_str(numer), BigInt::from_str(denom)) {
                        (Ok(n), Ok(d)) if !d.eq(&BigInt::from(0)) => {
                            IntegralValue::Exact(BigRational::new(n, d))
                        }
                        _ => continue,
                    }
                }
                (None, Some(x)) => IntegralValue::Approx(x),
                (None, None) => continue,
            };
            slots.insert(parsed.key, Arc::new(Slot::filled(Ok(value))));
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Write every completed entry as one JSON line.
    pub fn persist(&self, path: &Path) -> io::Result<usize> {
        let file = fs::File::create(path)?;
        let mut out = BufWriter::new(file);
        let slots = self.slots.lock().unwrap();
        let mut written = 0;
        for (key, slot) in slots.iter() {
            let value = match slot.value.lock().unwrap().clone() {
                Some(Ok(v)) => v,
                _ => continue,
            };
            let line = match value {
                IntegralValue::Exact(q) => CacheLine {
                    key: key.clone(),
                    exact: Some((q.numer().to_string(), q.denom().to_string())),
                    approx: None,
                },
                IntegralValue::Approx(x) => CacheLine {
                    key: key.clone(),
                    exact: None,
                    approx: Some(x),
                },
            };
            serde_json::to_writer(&mut out, &line)?;
            out.write_all(b"\n")?;
            written += 1;
        }
        out.flush()?;
        Ok(written)
    }
}

impl Integrator for CachedIntegrator {
    fn name(&self) -> &'static str {
        "cached"
    }

    fn integrate(
        &self,
        polytope: &Polytope,
        polynomial: &Polynomial,
    ) -> WmiResult<IntegralValue> {
        let key = Self::fingerprint(polytope, polynomial);
        let (slot, owner) = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get(&key) {
                Some(slot) => (slot.clone(), false),
                None => {
                    let slot = Arc::new(Slot::empty());
                    slots.insert(key, slot.clone());
                    (slot, true)
                }
            }
        };
        if owner {
            self.misses.fetch_add(1, Ordering::Relaxed);
            let result = self.inner.integrate(polytope, polynomial);
            slot.put(result.clone());
            result
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            slot.wait()
        }
    }
}
