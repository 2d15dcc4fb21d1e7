use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chrono::NaiveDateTime;
use tracing::info;

use crate::limits::CaseLimits;
use crate::payload::Payload;
use crate::query::SubsystemLookup;
use crate::table::MergedTable;
use crate::{Error, SNAPSHOT_EXTENSION};

pub(crate) struct Shared {
    pub(crate) table: RefCell<MergedTable>,
    pub(crate) subsystem_cache: RefCell<HashMap<i64, SubsystemLookup>>,
}

/// Handle onto a merged health-check table.
///
/// The table itself is shared: [`HealthCheck::view`] (and every specialized view
/// built from a handle) points at the same table without copying it, so a write
/// made through [`HealthCheck::table_mut`] on any handle is visible through all
/// of them. Threshold lines set with [`HealthCheck::set_case_limits`] belong to
/// the handle they were set on.
pub struct HealthCheck {
    pub(crate) shared: Rc<Shared>,
    pub(crate) limits: BTreeMap<i64, CaseLimits>,
}

impl HealthCheck {
    /// Builds a table from a payload, stamping it with the current local time.
    pub fn from_payload(payload: Payload) -> Result<Self, Error> {
        Self::from_payload_at(payload, chrono::Local::now().naive_local())
    }

    pub fn from_payload_at(payload: Payload, created: NaiveDateTime) -> Result<Self, Error> {
        let (meta, samples) = payload.into_parts()?;
        let table = MergedTable::build(&meta, &samples, created)?;
        info!(
            cases = meta.len(),
            samples = samples.len(),
            rows = table.num_rows(),
            "merged health check"
        );
        Ok(Self::from(table))
    }

    /// A new handle onto the same table.
    pub fn view(&self) -> HealthCheck {
        HealthCheck {
            shared: self.shared.clone(),
            limits: BTreeMap::new(),
        }
    }

    /// True when both handles point at the same table.
    pub fn shares_table(&self, other: &HealthCheck) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn table(&self) -> Ref<'_, MergedTable> {
        self.shared.table.borrow()
    }

    /// Mutable access to the shared table. Clears memoized lookups.
    pub fn table_mut(&self) -> RefMut<'_, MergedTable> {
        let table = self.shared.table.borrow_mut();
        self.shared.subsystem_cache.borrow_mut().clear();
        table
    }

    pub fn len(&self) -> usize {
        self.table().num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    pub fn created(&self) -> Option<NaiveDateTime> {
        self.table().created()
    }

    /// Canonical snapshot name, `YYYY-MM-DD-HHMM.parquet`, derived from the load time.
    pub fn snapshot_file_name(&self) -> Result<String, Error> {
        let created = self.created().ok_or(Error::MissingTimestamp)?;
        Ok(snapshot_file_name(created))
    }
}

pub fn snapshot_file_name(created: NaiveDateTime) -> String {
    format!("{}.{SNAPSHOT_EXTENSION}", created.format("%Y-%m-%d-%H%M"))
}

impl From<MergedTable> for HealthCheck {
    fn from(table: MergedTable) -> Self {
        HealthCheck {
            shared: Rc::new(Shared {
                table: RefCell::new(table),
                subsystem_cache: RefCell::new(HashMap::new()),
            }),
            limits: BTreeMap::new(),
        }
    }
}

impl std::fmt::Debug for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCheck")
            .field("rows", &self.len())
            .field("created", &self.created())
            .field("limits", &self.limits)
            .finish()
    }
}
