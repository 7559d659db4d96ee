//! A full history set: the 9 standard timeframes of one symbol.
//!
//! ## What this does
//! - Fans incoming M1 bars out to every timeframe file, creating
//!   member files on demand.
//! - Enforces single ownership per (symbol, server directory) through
//!   an injected [`SetRegistry`].
//! - Validates that every member file agrees on price precision.
//!
//! ## Consistency
//! No transactional guarantee spans the member files: a crash between
//! flushing M1 and flushing M5 can leave timeframes inconsistent.
//! Synchronization is idempotent, so callers recover by replaying it.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, atomic::Ordering},
};

use hst_format::{Bar, HstFormat, Timeframe};
use tracing::{debug, warn};

use crate::config::StoreOptions;
use crate::error::{HistoryError, Result};
use crate::file::{HistoryFile, history_file_name};
use crate::registry::{OpenToken, SetKey, SetRegistry};

/// Up to 9 open history files for one symbol in one server directory.
#[derive(Debug)]
pub struct HistorySet {
    symbol: String,
    digits: u32,
    directory: PathBuf,
    format: HstFormat,
    files: BTreeMap<Timeframe, HistoryFile>,
    options: StoreOptions,
    registry: Arc<SetRegistry>,
    key: SetKey,
    token: OpenToken,
    closed: bool,
}

impl HistorySet {
    /// Creates a fresh set: truncates all 9 timeframe files. Any other
    /// open set for the same (symbol, directory) in `registry` is
    /// revoked first — it becomes closed and discards its buffers.
    pub fn create(
        registry: Arc<SetRegistry>,
        directory: &Path,
        symbol: &str,
        digits: u32,
        format: HstFormat,
        options: StoreOptions,
    ) -> Result<HistorySet> {
        let key = SetKey::new(symbol, directory);
        let token = registry.claim_revoking(key.clone());
        let mut set = HistorySet {
            symbol: symbol.to_ascii_uppercase(),
            digits,
            directory: directory.to_path_buf(),
            format,
            files: BTreeMap::new(),
            options,
            registry,
            key,
            token,
            closed: false,
        };
        for timeframe in Timeframe::ALL {
            let file = HistoryFile::create(
                &set.directory,
                &set.symbol,
                timeframe,
                set.digits,
                set.format,
                &set.options,
            )?;
            set.files.insert(timeframe, file);
        }
        Ok(set)
    }

    /// Opens a set seeded from one already-opened member file. The
    /// remaining timeframes open lazily on first access; files that do
    /// not exist yet are created on first write.
    ///
    /// Fails with [`HistoryError::ConflictingOpenSet`] when another
    /// non-closed set in `registry` claims the same pair.
    pub fn open(
        registry: Arc<SetRegistry>,
        seed: HistoryFile,
        options: StoreOptions,
    ) -> Result<HistorySet> {
        let directory = seed
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let key = SetKey::new(seed.symbol(), &directory);
        let token = registry.claim(key.clone())?;
        let mut files = BTreeMap::new();
        let symbol = seed.symbol().to_string();
        let digits = seed.digits();
        let format = seed.format();
        files.insert(seed.timeframe(), seed);
        Ok(HistorySet {
            symbol,
            digits,
            directory,
            format,
            files,
            options,
            registry,
            key,
            token,
            closed: false,
        })
    }

    // ---- accessors ----

    /// The instrument symbol (uppercase).
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Price precision shared by all member files.
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// The server directory holding the member files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether the set is closed (explicitly or revoked by a newer
    /// set for the same symbol/directory).
    pub fn is_closed(&self) -> bool {
        self.closed || !self.token.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(HistoryError::Closed)
        } else {
            Ok(())
        }
    }

    /// The member file for `timeframe`, opened from disk if it exists
    /// or created empty otherwise.
    pub fn get_or_create_file(&mut self, timeframe: Timeframe) -> Result<&mut HistoryFile> {
        self.ensure_open()?;
        if !self.files.contains_key(&timeframe) {
            let path = self
                .directory
                .join(history_file_name(&self.symbol, timeframe));
            let file = if path.is_file() {
                let file = HistoryFile::open(&path, &self.options)?;
                if file.digits() != self.digits {
                    return Err(HistoryError::DigitsMismatch {
                        path,
                        expected: self.digits,
                        actual: file.digits(),
                    });
                }
                file
            } else {
                debug!(path = %path.display(), "creating missing timeframe file");
                HistoryFile::create(
                    &self.directory,
                    &self.symbol,
                    timeframe,
                    self.digits,
                    self.format,
                    &self.options,
                )?
            };
            self.files.insert(timeframe, file);
        }
        Ok(self.files.get_mut(&timeframe).expect("file just inserted"))
    }

    // ---- writing ----

    /// Fans an M1 bar batch (sorted ascending) out to all 9 timeframe
    /// files, creating them on demand.
    pub fn append_bars(&mut self, bars: &[Bar]) -> Result<()> {
        self.ensure_open()?;
        if bars.is_empty() {
            return Ok(());
        }
        for timeframe in Timeframe::ALL {
            self.get_or_create_file(timeframe)?.append_bars(bars)?;
        }
        Ok(())
    }

    /// Reconciles the M1 file with freshly supplied bars. Derived
    /// timeframes are rebuilt from M1 rather than synchronized
    /// independently.
    pub fn synchronize(&mut self, bars: &[Bar]) -> Result<()> {
        self.ensure_open()?;
        self.get_or_create_file(Timeframe::M1)?.synchronize(bars)
    }

    /// Timestamp through which the set is known synchronized.
    ///
    /// Conservatively this is the minimum across all member files;
    /// the current implementation inspects M1 only, since derived
    /// timeframes are rebuilt from the M1 stream.
    pub fn last_sync_time(&mut self) -> Result<i64> {
        self.ensure_open()?;
        Ok(self.get_or_create_file(Timeframe::M1)?.full().last_sync_time)
    }

    // ---- closing ----

    /// Closes every open member file and releases the registry claim.
    /// Idempotent: returns whether this call actually performed work.
    pub fn close(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let revoked = !self.token.load(Ordering::SeqCst);
        for file in self.files.values_mut() {
            if revoked {
                // a newer set owns the files now; flushing over them
                // would corrupt the recreated series
                file.discard_and_close();
            } else {
                file.close()?;
            }
        }
        self.registry.release(&self.key, &self.token);
        self.closed = true;
        Ok(true)
    }
}

impl Drop for HistorySet {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                warn!(
                    symbol = %self.symbol,
                    directory = %self.directory.display(),
                    error = %err,
                    "failed to close history set on drop"
                );
            }
        }
    }
}
