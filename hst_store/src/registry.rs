//! Registry of open history sets.
//!
//! At most one non-closed [`crate::set::HistorySet`] may exist per
//! (symbol, server directory) pair within one registry. The registry is
//! an explicitly shared handle (`Arc<SetRegistry>`), never a
//! process-wide static, so tests can run isolated registries side by
//! side.
//!
//! Each registered set holds an open token. `create`-mode construction
//! revokes the token of a conflicting set: the superseded set then
//! reports itself closed and discards its buffers instead of flushing
//! over files the new set has already recreated. This is a
//! process-local guard only; cross-process writers need external file
//! locking.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::error::{HistoryError, Result};

/// Identity of one open set: uppercase symbol + server directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SetKey {
    symbol: String,
    directory: PathBuf,
}

impl SetKey {
    pub(crate) fn new(symbol: &str, directory: &Path) -> SetKey {
        SetKey {
            symbol: symbol.to_ascii_uppercase(),
            directory: directory.to_path_buf(),
        }
    }
}

/// Shared open-flag of one registered set. `false` means the set is
/// closed or was revoked by a newer set for the same key.
pub(crate) type OpenToken = Arc<AtomicBool>;

/// Tracks which (symbol, directory) pairs currently have an open set.
#[derive(Debug, Default)]
pub struct SetRegistry {
    open: Mutex<HashMap<SetKey, OpenToken>>,
}

impl SetRegistry {
    /// A fresh, empty registry.
    pub fn new() -> Arc<SetRegistry> {
        Arc::new(SetRegistry::default())
    }

    /// Claim `key`, failing with [`HistoryError::ConflictingOpenSet`]
    /// if another set still holds it open.
    pub(crate) fn claim(&self, key: SetKey) -> Result<OpenToken> {
        let mut open = self.open.lock().expect("set registry poisoned");
        if let Some(token) = open.get(&key) {
            if token.load(Ordering::SeqCst) {
                return Err(HistoryError::ConflictingOpenSet {
                    symbol: key.symbol,
                    directory: key.directory,
                });
            }
        }
        let token: OpenToken = Arc::new(AtomicBool::new(true));
        open.insert(key, Arc::clone(&token));
        Ok(token)
    }

    /// Claim `key`, revoking a conflicting open set instead of failing.
    pub(crate) fn claim_revoking(&self, key: SetKey) -> OpenToken {
        let mut open = self.open.lock().expect("set registry poisoned");
        if let Some(old) = open.remove(&key) {
            old.store(false, Ordering::SeqCst);
        }
        let token: OpenToken = Arc::new(AtomicBool::new(true));
        open.insert(key, Arc::clone(&token));
        token
    }

    /// Release `key` if `token` still owns it.
    pub(crate) fn release(&self, key: &SetKey, token: &OpenToken) {
        let mut open = self.open.lock().expect("set registry poisoned");
        if let Some(current) = open.get(key) {
            if Arc::ptr_eq(current, token) {
                open.remove(key);
            }
        }
        token.store(false, Ordering::SeqCst);
    }

    /// Whether any set currently holds `symbol`/`directory` open.
    pub fn is_open(&self, symbol: &str, directory: &Path) -> bool {
        let key = SetKey::new(symbol, directory);
        let open = self.open.lock().expect("set registry poisoned");
        open.get(&key)
            .map(|t| t.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}
