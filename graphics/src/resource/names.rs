//! Resource display names.

use parking_lot::Mutex;
use tether_core::{PooledMap, PooledString, StringPool};

use crate::resource::handle::ResourceIdent;

#[derive(Default)]
struct NameState {
    strings: StringPool,
    by_ident: PooledMap<ResourceIdent, PooledString>,
}

impl NameState {
    /// Drop the entry of `ident`, returning its string to the pool.
    fn forget(&mut self, ident: ResourceIdent) {
        if let Some(old) = self.by_ident.remove(&ident)
            && let Err(err) = self.strings.give_back(old)
        {
            log::warn!("Failed to return the name of {}: {}", ident, err);
        }
    }
}

/// Names keyed by resource identity, stored in a pooled string arena.
///
/// Resources without an entry report their kind's default name.
#[derive(Default)]
pub struct NameStore {
    state: Mutex<NameState>,
}

impl NameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name of `ident`. An empty name clears it.
    pub fn set(&self, ident: ResourceIdent, name: &str) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.forget(ident);
        if !name.is_empty() {
            let pooled = state.strings.rent_and_copy(name);
            state.by_ident.insert_or_replace(ident, pooled);
        }
    }

    /// Forget the name of `ident`.
    pub fn remove(&self, ident: ResourceIdent) {
        self.state.lock().forget(ident);
    }

    /// Run `f` with the name of `ident`, or `default` if it has none.
    ///
    /// The store is locked while `f` runs; `f` must not call back into it.
    pub fn with_name<R>(&self, ident: ResourceIdent, default: &str, f: impl FnOnce(&str) -> R) -> R {
        let state = self.state.lock();
        let name = state
            .by_ident
            .get(&ident)
            .and_then(|pooled| state.strings.get(*pooled).ok())
            .unwrap_or(default);
        f(name)
    }

    /// Number of resources with an explicit name.
    pub fn len(&self) -> usize {
        self.state.lock().by_ident.len()
    }

    /// Whether no resource has an explicit name.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for NameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameStore").field("named", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::handle::{ResourceHandle, markers};

    fn ident(raw: usize) -> ResourceIdent {
        ResourceHandle::<markers::Texture>::from_usize(raw).ident()
    }

    #[test]
    fn test_default_name() {
        let names = NameStore::new();
        assert_eq!(names.with_name(ident(1), "Unnamed", str::to_owned), "Unnamed");
    }

    #[test]
    fn test_set_replace_and_clear() {
        let names = NameStore::new();
        names.set(ident(1), "Albedo");
        assert_eq!(names.with_name(ident(1), "", str::to_owned), "Albedo");

        names.set(ident(1), "Normal");
        assert_eq!(names.with_name(ident(1), "", str::to_owned), "Normal");
        assert_eq!(names.len(), 1);

        names.set(ident(1), "");
        assert!(names.is_empty());
    }

    #[test]
    fn test_remove_only_affects_one_ident() {
        let names = NameStore::new();
        names.set(ident(1), "One");
        names.set(ident(2), "Two");
        names.remove(ident(1));
        assert_eq!(names.with_name(ident(1), "-", str::len), 1);
        assert_eq!(names.with_name(ident(2), "-", str::to_owned), "Two");
    }

    #[test]
    fn test_replaced_names_return_their_storage() {
        let names = NameStore::new();
        for name in ["One", "Two", "Three"] {
            names.set(ident(1), name);
        }
        assert_eq!(names.state.lock().strings.len(), 1);
        names.remove(ident(1));
        assert!(names.state.lock().strings.is_empty());
    }

    #[test]
    fn test_stale_token_is_dropped_without_panicking() {
        let _ = env_logger::builder().is_test(true).try_init();
        let names = NameStore::new();
        {
            let mut state = names.state.lock();
            let token = state.strings.rent_and_copy("Ghost");
            state.strings.give_back(token).unwrap();
            state.by_ident.insert_or_replace(ident(1), token);
        }

        names.set(ident(1), "Real");
        assert_eq!(names.with_name(ident(1), "", str::to_owned), "Real");
        names.remove(ident(1));
        assert!(names.is_empty());
        assert!(names.state.lock().strings.is_empty());
    }
}
