//! Resolver registry: the closed strategy set and its dispatch

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::bail;
use graft_core::{DeferredCache, Import, ImportKind, LinkError};
use serde::{Deserialize, Serialize};

use crate::addon::AddonResolver;
use crate::app::AppResolver;
use crate::context::{Frontier, ResolveContext};
use crate::deferred::{Bundler, DeferredResolver};
use crate::fallback::FallbackResolver;

/// Name a strategy is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ResolverKey {
    App,
    Addon,
    Bare,
    Default,
    /// Custom scheme, by tag (`npm` for `npm:` imports).
    Scheme(String),
}

impl ResolverKey {
    pub fn as_str(&self) -> &str {
        match self {
            ResolverKey::App => "app",
            ResolverKey::Addon => "addon",
            ResolverKey::Bare => "bare",
            ResolverKey::Default => "default",
            ResolverKey::Scheme(tag) => tag,
        }
    }
}

impl fmt::Display for ResolverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResolverKey {
    fn from(value: &str) -> Self {
        match value {
            "app" => ResolverKey::App,
            "addon" => ResolverKey::Addon,
            "bare" => ResolverKey::Bare,
            "default" => ResolverKey::Default,
            tag => ResolverKey::Scheme(tag.trim_end_matches(':').to_string()),
        }
    }
}

impl From<String> for ResolverKey {
    fn from(value: String) -> Self {
        ResolverKey::from(value.as_str())
    }
}

impl From<ResolverKey> for String {
    fn from(key: ResolverKey) -> Self {
        key.as_str().to_string()
    }
}

impl FromStr for ResolverKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ResolverKey::from(s))
    }
}

/// When a strategy does its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// During the traversal, one import at a time.
    Eager,
    /// Once, after every entry has been traversed.
    Deferred,
}

/// The closed set of strategies.
#[derive(Debug, Clone)]
pub enum Resolver {
    App(AppResolver),
    Addon(AddonResolver),
    Bare(DeferredResolver),
    Scheme(DeferredResolver),
    Default(FallbackResolver),
}

impl Resolver {
    /// `None` when the strategy can do neither.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Resolver::App(_) | Resolver::Addon(_) | Resolver::Default(_) => Some(Stage::Eager),
            Resolver::Bare(deferred) | Resolver::Scheme(deferred) => {
                deferred.has_bundler().then_some(Stage::Deferred)
            }
        }
    }

    pub async fn resolve(
        &self,
        import: &Import,
        cx: &mut ResolveContext<'_>,
    ) -> anyhow::Result<Frontier> {
        match self {
            Resolver::App(resolver) => resolver.resolve(import, cx).await,
            Resolver::Addon(resolver) => resolver.resolve(import, cx).await,
            Resolver::Default(resolver) => resolver.resolve(import, cx).await,
            Resolver::Bare(deferred) | Resolver::Scheme(deferred) => {
                bail!("`{}` resolves in a second pass only", deferred.tag())
            }
        }
    }

    pub async fn resolve_later(
        &self,
        key: &str,
        cx: &mut ResolveContext<'_>,
        cache: &DeferredCache,
    ) -> anyhow::Result<()> {
        match self {
            Resolver::Bare(deferred) | Resolver::Scheme(deferred) => {
                deferred.resolve_later(key, cx, cache).await
            }
            _ => bail!("`{key}` resolves during traversal only"),
        }
    }
}

/// Strategies for the configured import kinds, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    kinds: Vec<ResolverKey>,
    resolvers: HashMap<ResolverKey, Resolver>,
}

impl ResolverRegistry {
    pub fn new(kinds: Vec<ResolverKey>) -> Self {
        ResolverRegistry {
            kinds,
            resolvers: HashMap::new(),
        }
    }

    /// One built-in strategy per configured kind. Deferred kinds share
    /// `bundler`.
    pub fn standard(kinds: Vec<ResolverKey>, bundler: Arc<dyn Bundler>) -> Self {
        let mut registry = ResolverRegistry::new(kinds.clone());
        for key in kinds {
            let resolver = match &key {
                ResolverKey::App => Resolver::App(AppResolver),
                ResolverKey::Addon => Resolver::Addon(AddonResolver),
                ResolverKey::Default => Resolver::Default(FallbackResolver),
                ResolverKey::Bare => {
                    Resolver::Bare(DeferredResolver::new("bare").with_bundler(bundler.clone()))
                }
                ResolverKey::Scheme(tag) => Resolver::Scheme(
                    DeferredResolver::new(tag.clone()).with_bundler(bundler.clone()),
                ),
            };
            registry.register(key, resolver);
        }
        registry
    }

    /// Install `resolver` under `key`, returning whatever it replaced.
    pub fn register(&mut self, key: ResolverKey, resolver: Resolver) -> Option<Resolver> {
        self.resolvers.insert(key, resolver)
    }

    pub fn kinds(&self) -> &[ResolverKey] {
        &self.kinds
    }

    pub fn is_registered(&self, key: &ResolverKey) -> bool {
        self.kinds.contains(key) && self.resolvers.contains_key(key)
    }

    /// Every configured kind needs a strategy that can do something.
    pub fn validate(&self) -> graft_core::Result<()> {
        for key in &self.kinds {
            let resolver = self
                .resolvers
                .get(key)
                .ok_or_else(|| LinkError::NoResolverForKind(key.to_string()))?;
            if resolver.stage().is_none() {
                return Err(LinkError::MissingResolverMethod(key.to_string()));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &ResolverKey) -> graft_core::Result<&Resolver> {
        if !self.kinds.contains(key) {
            return Err(LinkError::NoResolverForKind(key.to_string()));
        }
        self.resolvers
            .get(key)
            .ok_or_else(|| LinkError::NoResolverForKind(key.to_string()))
    }

    /// Strategy key for a classified import. Imports that stay inside their
    /// own package go to the default strategy when one is configured.
    pub fn route(&self, import: &Import) -> ResolverKey {
        match import.kind() {
            ImportKind::App if import.is_local() && self.is_registered(&ResolverKey::Default) => {
                ResolverKey::Default
            }
            ImportKind::App => ResolverKey::App,
            ImportKind::Addon => ResolverKey::Addon,
            ImportKind::Bare => ResolverKey::Bare,
            ImportKind::Scheme(tag) => ResolverKey::Scheme(tag.clone()),
        }
    }

    /// Deferred strategies in configuration order.
    pub fn deferred(&self) -> impl Iterator<Item = (&ResolverKey, &Resolver)> {
        self.kinds.iter().filter_map(|key| {
            self.resolvers
                .get(key)
                .filter(|resolver| resolver.stage() == Some(Stage::Deferred))
                .map(|resolver| (key, resolver))
        })
    }
}
