//! Variable Pools
//!
//! An ordered collection of uniquely-named real-valued variables. Pools back
//! every GMA, S-system and case: `X_d` (dependent), `X_d_a` (algebraic
//! dependent), `X_d_t` (dynamic dependent) and `X_i` (independent). Indices
//! are assigned in insertion order and are stable for the pool's lifetime.
//!
//! A pool carries an access mode that only ever tightens:
//! `ReadWriteAdd → ReadWrite → ReadOnly → Locked`. A pool shared between a
//! GMA and its child cases is sealed read-only first and handed out behind
//! an `Arc`, so no sharer can mutate it.

use std::sync::Arc;

use rustc_hash::FxHashMap;

/// Access rights of a [`VariablePool`]; modes only tighten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessMode {
    /// Variables may be added, values read and written.
    ReadWriteAdd,
    /// Values may be read and written; the name set is frozen.
    ReadWrite,
    /// Values may only be read.
    ReadOnly,
    /// No access at all.
    Locked,
}

/// Errors surfaced by pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A variable with this name already exists.
    #[error("variable {0:?} already exists in the pool")]
    Duplicate(String),
    /// No variable with this name exists.
    #[error("variable {0:?} not found in the pool")]
    NotFound(String),
    /// The pool's access mode forbids the operation.
    #[error("pool is {mode:?}; {operation} denied")]
    AccessDenied {
        /// Current access mode.
        mode: AccessMode,
        /// The operation that was refused.
        operation: &'static str,
    },
    /// Attempted to loosen the access mode.
    #[error("access mode can only tighten (is {current:?}, requested {requested:?})")]
    CannotLoosen {
        /// Current access mode.
        current: AccessMode,
        /// The looser mode that was requested.
        requested: AccessMode,
    },
}

/// An ordered, uniquely-named collection of real-valued variables.
#[derive(Debug, Clone, Default)]
pub struct VariablePool {
    names: Vec<String>,
    values: Vec<f64>,
    index: FxHashMap<String, usize>,
    mode: AccessMode,
}

impl Default for AccessMode {
    fn default() -> Self {
        AccessMode::ReadWriteAdd
    }
}

impl VariablePool {
    /// An empty pool in `ReadWriteAdd` mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from `(name, value)` pairs; names must be unique.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, PoolError> {
        let mut pool = Self::new();
        for (name, value) in pairs {
            pool.add_with_value(name, value)?;
        }
        Ok(pool)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The current access mode.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Tighten the access mode; loosening is rejected.
    pub fn set_mode(&mut self, mode: AccessMode) -> Result<(), PoolError> {
        if mode < self.mode {
            return Err(PoolError::CannotLoosen { current: self.mode, requested: mode });
        }
        self.mode = mode;
        Ok(())
    }

    /// Add a variable with value 0.
    pub fn add(&mut self, name: &str) -> Result<usize, PoolError> {
        self.add_with_value(name, 0.0)
    }

    /// Add a variable with an explicit value, returning its index.
    pub fn add_with_value(&mut self, name: &str, value: f64) -> Result<usize, PoolError> {
        if self.mode != AccessMode::ReadWriteAdd {
            return Err(PoolError::AccessDenied { mode: self.mode, operation: "add" });
        }
        if self.index.contains_key(name) {
            return Err(PoolError::Duplicate(name.to_string()));
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.values.push(value);
        self.index.insert(name.to_string(), idx);
        Ok(idx)
    }

    /// Whether a variable with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Index of a variable by name.
    pub fn index_of(&self, name: &str) -> Result<usize, PoolError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| PoolError::NotFound(name.to_string()))
    }

    /// Value of a variable by name.
    pub fn value_of(&self, name: &str) -> Result<f64, PoolError> {
        if self.mode == AccessMode::Locked {
            return Err(PoolError::AccessDenied { mode: self.mode, operation: "read" });
        }
        Ok(self.values[self.index_of(name)?])
    }

    /// Set the value of an existing variable.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), PoolError> {
        if self.mode > AccessMode::ReadWrite {
            return Err(PoolError::AccessDenied { mode: self.mode, operation: "write" });
        }
        let idx = self.index_of(name)?;
        self.values[idx] = value;
        Ok(())
    }

    /// Name at a given insertion index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Value at a given insertion index.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Iterate `(name, value)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// All names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    /// Seal the pool read-only and wrap it for sharing.
    pub fn into_shared(mut self) -> Arc<VariablePool> {
        // ReadOnly is tighter than any writable mode, so this cannot fail.
        self.mode = self.mode.max(AccessMode::ReadOnly);
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_index_order() {
        let mut pool = VariablePool::new();
        assert_eq!(pool.add("a").unwrap(), 0);
        assert_eq!(pool.add("c").unwrap(), 1);
        assert_eq!(pool.add("b").unwrap(), 2);
        assert_eq!(pool.index_of("b").unwrap(), 2);
        let names: Vec<_> = pool.names().collect();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut pool = VariablePool::new();
        pool.add("x").unwrap();
        assert!(matches!(pool.add("x"), Err(PoolError::Duplicate(_))));
    }

    #[test]
    fn read_only_pool_rejects_mutation() {
        let mut pool = VariablePool::from_pairs([("k", 2.0)]).unwrap();
        pool.set_mode(AccessMode::ReadOnly).unwrap();
        assert!(matches!(pool.add("y"), Err(PoolError::AccessDenied { .. })));
        assert!(matches!(
            pool.set_value("k", 3.0),
            Err(PoolError::AccessDenied { .. })
        ));
        assert_eq!(pool.value_of("k").unwrap(), 2.0);
    }

    #[test]
    fn mode_cannot_loosen() {
        let mut pool = VariablePool::new();
        pool.set_mode(AccessMode::ReadOnly).unwrap();
        assert!(matches!(
            pool.set_mode(AccessMode::ReadWriteAdd),
            Err(PoolError::CannotLoosen { .. })
        ));
    }

    #[test]
    fn locked_pool_rejects_reads() {
        let mut pool = VariablePool::from_pairs([("k", 2.0)]).unwrap();
        pool.set_mode(AccessMode::Locked).unwrap();
        assert!(matches!(
            pool.value_of("k"),
            Err(PoolError::AccessDenied { .. })
        ));
    }
}
