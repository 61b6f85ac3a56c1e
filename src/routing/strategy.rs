use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;

use crate::error::{GateError, Result};
use crate::job::types::Method;
use crate::store::{keys, Store};

/// Selection discipline applied to a route's candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Persistent cursor per route in the store; stable under concurrent gate
    /// replicas.
    #[default]
    RoundRobin,
    /// Uniform over the candidates.
    Random,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::Random => "random",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "round_robin" => Ok(StrategyKind::RoundRobin),
            "random" => Ok(StrategyKind::Random),
            other => Err(GateError::BadRequest(format!(
                "unknown route strategy: {}",
                other
            ))),
        }
    }
}

/// Picks a worker version for a matched route.
///
/// Candidates arrive sorted lexicographically from the registry, which makes
/// ties deterministic and keeps the round-robin cursor meaningful across gate
/// replicas sharing the store.
#[derive(Clone)]
pub struct RouteStrategy {
    store: Arc<dyn Store>,
    kind: StrategyKind,
}

impl RouteStrategy {
    pub fn new(store: Arc<dyn Store>, kind: StrategyKind) -> Self {
        Self { store, kind }
    }

    /// Chooses one version, or `None` when the pool is empty. A pinned
    /// version restricts the pool before the strategy runs.
    pub async fn select(
        &self,
        method: Method,
        path: &str,
        candidates: &[String],
        pinned: Option<&str>,
    ) -> Result<Option<String>> {
        let pool: Vec<&String> = match pinned {
            Some(version) => candidates.iter().filter(|v| v.as_str() == version).collect(),
            None => candidates.iter().collect(),
        };

        if pool.is_empty() {
            return Ok(None);
        }
        if pool.len() == 1 {
            return Ok(Some(pool[0].clone()));
        }

        let index = match self.kind {
            StrategyKind::RoundRobin => {
                let cursor_key = keys::route_cursor(&keys::route_id(method.as_str(), path));
                let cursor = self.store.atomic_increment(&cursor_key, 1).await?;
                ((cursor - 1).rem_euclid(pool.len() as i64)) as usize
            }
            StrategyKind::Random => rand::thread_rng().gen_range(0..pool.len()),
        };

        Ok(Some(pool[index].clone()))
    }
}
