//! Fault injection on the routing path.
//!
//! Policies decide per package whether it reaches its destination. They wrap
//! the network rather than the services, so protocol handlers stay free of
//! failure logic and tests can switch faults on and off independently.

use std::{
    collections::HashSet,
    fmt::Debug,
    sync::{Arc, PoisonError, RwLock},
};

use rand::Rng;

/// Decides whether a package addressed to `route` is lost.
pub trait FaultPolicy: Debug + Send + Sync {
    fn should_drop(&self, route: &str) -> bool;
}

/// Reliable network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn should_drop(&self, _route: &str) -> bool {
        false
    }
}

/// Drops packages with a fixed probability.
///
/// When `services` is non-empty only routes ending in `/<service>` are affected,
/// e.g. `RandomFaults::new(0.1).services(&["acceptor"])`.
#[derive(Debug, Clone)]
pub struct RandomFaults {
    probability: f32,
    services: Vec<String>,
}

impl RandomFaults {
    pub fn new(probability: f32) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            services: Vec::new(),
        }
    }

    pub fn services(mut self, services: &[&str]) -> Self {
        self.services = services.iter().map(|s| format!("/{}", s)).collect();
        self
    }

    fn targets(&self, route: &str) -> bool {
        self.services.is_empty() || self.services.iter().any(|s| route.ends_with(s.as_str()))
    }
}

impl FaultPolicy for RandomFaults {
    fn should_drop(&self, route: &str) -> bool {
        if self.probability <= 0.0 || !self.targets(route) {
            return false;
        }
        let x: f32 = rand::thread_rng().gen_range(0.0..1.0);
        x < self.probability
    }
}

/// Makes every service of the listed node addresses unreachable.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    unreachable: HashSet<String>,
}

impl Partition {
    pub fn isolate<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unreachable: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

impl FaultPolicy for Partition {
    fn should_drop(&self, route: &str) -> bool {
        let address = route.split('/').next().unwrap_or(route);
        self.unreachable.contains(address)
    }
}

/// Shared, swappable fault policy.
#[derive(Debug, Clone)]
pub struct FaultHandle(Arc<RwLock<Arc<dyn FaultPolicy>>>);

impl Default for FaultHandle {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(Arc::new(NoFaults))))
    }
}

impl FaultHandle {
    pub fn set<P: FaultPolicy + 'static>(&self, policy: P) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(policy);
    }

    pub fn clear(&self) {
        self.set(NoFaults);
    }

    pub fn should_drop(&self, route: &str) -> bool {
        let policy = self.0.read().unwrap_or_else(PoisonError::into_inner).clone();
        policy.should_drop(route)
    }
}
