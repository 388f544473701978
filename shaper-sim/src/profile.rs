use std::time::Duration;

use rustc_hash::FxHashMap;

use shaper_core::{Capabilities, Scope};

/// What the simulated hardware supports.
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Capabilities per supported scope. Scopes missing here can't hold shapers.
    scopes: FxHashMap<Scope, Capabilities>,
    /// Time every set and delete call blocks for.
    pub(crate) latency: Option<Duration>,
}

impl Default for SimOptions {
    /// Every scope supported, with every capability.
    fn default() -> Self {
        Scope::ALL
            .into_iter()
            .filter(|scope| *scope != Scope::Unspecified)
            .fold(Self::empty(), |options, scope| options.scope(scope, Capabilities::all()))
    }
}

impl SimOptions {
    /// Options without any supported scope.
    pub fn empty() -> Self {
        Self { scopes: FxHashMap::default(), latency: None }
    }

    /// Supports `scope` with the given capabilities.
    pub fn scope(mut self, scope: Scope, caps: Capabilities) -> Self {
        self.scopes.insert(scope, caps);
        self
    }

    /// Drops support for `scope`.
    pub fn without_scope(mut self, scope: Scope) -> Self {
        self.scopes.remove(&scope);
        self
    }

    /// Makes every set and delete call block for `latency`.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn capabilities(&self, scope: Scope) -> Option<Capabilities> {
        self.scopes.get(&scope).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_supports_every_scope() {
        let options = SimOptions::default();
        assert!(options.capabilities(Scope::Unspecified).is_none());
        for scope in &Scope::ALL[1..] {
            assert_eq!(options.capabilities(*scope), Some(Capabilities::all()));
        }

        let options = options.without_scope(Scope::Port);
        assert!(options.capabilities(Scope::Port).is_none());
    }
}
