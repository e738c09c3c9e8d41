// ============================================================================
// REPORT REGISTRY (per-namespace lifecycle)
// ============================================================================
// The report is published once per network namespace. When a namespace is
// created its connection table is attached here; when it is destroyed it is
// detached. Between the two the report can be read any number of times,
// including zero.
//
// === CONCURRENCY ===
// The registry map sits behind a parking_lot RwLock. A read clones the
// table's Arc under the read lock and releases the lock before walking, so
// long report reads never block attach/detach, and reads of different
// namespaces run fully in parallel (the walker itself keeps no shared state).

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::RESOURCE_NAME;
use crate::config::ReportConfig;
use crate::error::RegistryError;
use crate::sock::ConnectionTable;
use crate::walker::{WalkStats, write_report};

/// Network namespace identifier (the namespace's inode number on Linux)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceId(pub u64);

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net:[{}]", self.0)
    }
}

/// Shared table handle stored per namespace
pub type SharedTable = Arc<dyn ConnectionTable + Send + Sync>;

/// Registered report resources, keyed by namespace
pub struct ReportRegistry {
    config: ReportConfig,
    tables: RwLock<HashMap<NamespaceId, SharedTable>>,
}

impl fmt::Debug for ReportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportRegistry")
            .field("config", &self.config)
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

impl ReportRegistry {
    #[must_use]
    pub fn new(config: ReportConfig) -> Self {
        Self {
            config,
            tables: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Publish the report for a newly created namespace
    ///
    /// # Errors
    ///
    /// - `AlreadyAttached` if the namespace already has a report
    /// - `Exhausted` once `max_namespaces` reports are registered
    pub fn attach(&self, ns: NamespaceId, table: SharedTable) -> Result<(), RegistryError> {
        let mut tables = self.tables.write();

        if tables.contains_key(&ns) {
            warn!("{RESOURCE_NAME}: attach for {ns} ignored, already attached");
            return Err(RegistryError::AlreadyAttached(ns));
        }
        if tables.len() >= self.config.max_namespaces {
            warn!(
                "{RESOURCE_NAME}: cannot attach {ns}, {} namespaces registered",
                tables.len()
            );
            return Err(RegistryError::Exhausted {
                limit: self.config.max_namespaces,
            });
        }

        tables.insert(ns, table);
        info!("{RESOURCE_NAME}: attached {ns}");
        Ok(())
    }

    /// Withdraw the report of a namespace being destroyed
    ///
    /// Reads already in progress keep their table alive until they finish.
    ///
    /// # Errors
    ///
    /// `NotAttached` if nothing was registered for `ns`.
    pub fn detach(&self, ns: NamespaceId) -> Result<(), RegistryError> {
        match self.tables.write().remove(&ns) {
            Some(_) => {
                info!("{RESOURCE_NAME}: detached {ns}");
                Ok(())
            }
            None => {
                warn!("{RESOURCE_NAME}: detach for unknown {ns}");
                Err(RegistryError::NotAttached(ns))
            }
        }
    }

    #[must_use]
    pub fn is_attached(&self, ns: NamespaceId) -> bool {
        self.tables.read().contains_key(&ns)
    }

    /// Attached namespaces in ascending order
    #[must_use]
    pub fn namespaces(&self) -> Vec<NamespaceId> {
        let mut namespaces: Vec<NamespaceId> = self.tables.read().keys().copied().collect();
        namespaces.sort_unstable();
        namespaces
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    fn table(&self, ns: NamespaceId) -> Result<SharedTable, RegistryError> {
        self.tables
            .read()
            .get(&ns)
            .cloned()
            .ok_or(RegistryError::NotAttached(ns))
    }

    /// One report read for `ns`, streamed into `out`
    ///
    /// # Errors
    ///
    /// `NotAttached`, or `Report` if the walk hit a contract violation.
    pub fn read_into<W: Write + ?Sized>(
        &self,
        ns: NamespaceId,
        out: &mut W,
    ) -> Result<WalkStats, RegistryError> {
        let table = self.table(ns)?;
        let stats = write_report(table.as_ref(), &self.config, out)?;
        debug!("{RESOURCE_NAME}: read {ns}, {} rows", stats.rows);
        Ok(stats)
    }

    /// One report read for `ns` as a `String`
    ///
    /// # Errors
    ///
    /// Same as [`ReportRegistry::read_into`].
    pub fn read(&self, ns: NamespaceId) -> Result<String, RegistryError> {
        let mut out = String::new();
        self.read_into(ns, &mut out)?;
        Ok(out)
    }

    /// Drop every registration (process shutdown)
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        let count = tables.len();
        tables.clear();
        if count > 0 {
            info!("{RESOURCE_NAME}: detached all {count} namespaces");
        }
    }
}

impl Default for ReportRegistry {
    fn default() -> Self {
        Self::new(ReportConfig::default())
    }
}
