use std::collections::HashMap;

use parking_lot::RwLock;

use mg_domain::{Error, Result};

use crate::identity::{ToolIdentity, ToolSource};

/// Thread-safe registry of tool identities and aliases.
///
/// Uniqueness is enforced on both `canonical_name` and `safe_name`; aliases
/// may not shadow either. Hot lookups take the read lock.
pub struct NamingRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    /// canonical_name -> identity.
    by_canonical: HashMap<String, ToolIdentity>,
    /// safe_name -> canonical_name.
    by_safe: HashMap<String, String>,
    /// alias -> canonical_name.
    aliases: HashMap<String, String>,
}

impl Default for NamingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NamingRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a tool identity. Fails if the canonical name or the safe
    /// name is already taken; the error names both sides.
    pub fn register(&self, identity: ToolIdentity) -> Result<()> {
        let mut inner = self.inner.write();

        if let Some(existing) = inner.by_canonical.get(&identity.canonical_name) {
            return Err(Error::Collision(format!(
                "canonical name '{}' already registered (safe names: existing '{}', new '{}')",
                identity.canonical_name, existing.safe_name, identity.safe_name
            )));
        }
        if let Some(owner) = inner.by_safe.get(&identity.safe_name) {
            return Err(Error::Collision(format!(
                "safe name '{}' of '{}' collides with '{}'",
                identity.safe_name, identity.canonical_name, owner
            )));
        }
        if let Some(target) = inner.aliases.get(&identity.canonical_name) {
            return Err(Error::Collision(format!(
                "canonical name '{}' is shadowed by an alias for '{}'",
                identity.canonical_name, target
            )));
        }

        tracing::debug!(
            canonical = %identity.canonical_name,
            safe = %identity.safe_name,
            "tool registered"
        );
        inner
            .by_safe
            .insert(identity.safe_name.clone(), identity.canonical_name.clone());
        inner
            .by_canonical
            .insert(identity.canonical_name.clone(), identity);
        Ok(())
    }

    /// Register an alternate name for an already-registered canonical name.
    pub fn register_alias(&self, alias: impl Into<String>, canonical: &str) -> Result<()> {
        let alias = alias.into();
        let mut inner = self.inner.write();

        if !inner.by_canonical.contains_key(canonical) {
            return Err(Error::ToolNotFound(canonical.to_owned()));
        }
        if inner.by_canonical.contains_key(&alias) {
            return Err(Error::Collision(format!(
                "alias '{alias}' would shadow a canonical name"
            )));
        }
        if inner.by_safe.contains_key(&alias) {
            return Err(Error::Collision(format!(
                "alias '{alias}' would shadow a safe name"
            )));
        }
        if let Some(existing) = inner.aliases.get(&alias) {
            return Err(Error::Collision(format!(
                "alias '{alias}' already points at '{existing}'"
            )));
        }

        inner.aliases.insert(alias, canonical.to_owned());
        Ok(())
    }

    /// Resolve any of canonical name, safe name, or alias to the identity.
    pub fn resolve(&self, any_name: &str) -> Option<ToolIdentity> {
        let inner = self.inner.read();
        if let Some(id) = inner.by_canonical.get(any_name) {
            return Some(id.clone());
        }
        if let Some(canonical) = inner.by_safe.get(any_name) {
            return inner.by_canonical.get(canonical).cloned();
        }
        if let Some(canonical) = inner.aliases.get(any_name) {
            return inner.by_canonical.get(canonical).cloned();
        }
        None
    }

    /// Resolve any name form to the canonical string.
    pub fn resolve_canonical(&self, any_name: &str) -> Option<String> {
        self.resolve(any_name).map(|id| id.canonical_name)
    }

    /// All identities matching a pattern.
    ///
    /// Grammar: `"*"` (everything), an exact canonical name, a source
    /// wildcard (`"core.*"`, `"mcp:*"`, `"edge:*"`), or a namespace wildcard
    /// (`"mcp:server.*"`, `"edge:id.*"`).
    pub fn matching(&self, pattern: &str) -> Vec<ToolIdentity> {
        let inner = self.inner.read();
        let mut out: Vec<ToolIdentity> = inner
            .by_canonical
            .values()
            .filter(|id| pattern_matches(pattern, id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        out
    }

    /// Remove an identity and any aliases pointing at it.
    pub fn unregister(&self, canonical: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(identity) = inner.by_canonical.remove(canonical) else {
            return false;
        };
        inner.by_safe.remove(&identity.safe_name);
        inner.aliases.retain(|_, target| target != canonical);
        true
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.inner.read().by_canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_canonical.is_empty()
    }
}

fn pattern_matches(pattern: &str, identity: &ToolIdentity) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        // Source wildcards: "core.*", "mcp:*", "edge:*".
        // Namespace wildcards: "mcp:srv.*", "edge:id.*".
        if prefix.is_empty() {
            return true;
        }
        return match (prefix, identity.source) {
            ("core.", ToolSource::Core) => true,
            ("mcp:", ToolSource::Mcp) => true,
            ("edge:", ToolSource::Edge) => true,
            _ => identity.canonical_name.starts_with(prefix),
        };
    }
    identity.canonical_name == pattern
}
