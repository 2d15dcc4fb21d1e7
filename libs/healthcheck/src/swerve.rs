use std::ops::{Deref, DerefMut};

use crate::HealthCheck;
use crate::query::CaseSummary;

pub const DEFAULT_SWERVE_SUBSYSTEM: &str = "DriveSubsystem";

/// A [`HealthCheck`] scoped to the swerve drive subsystem.
///
/// Wraps a view of the source table rather than a copy; see [`HealthCheck`] for
/// the aliasing rules. Threshold lines set through this view stay on it.
#[derive(Debug)]
pub struct SwerveDriveHealthCheck {
    inner: HealthCheck,
    subsystem: String,
}

impl SwerveDriveHealthCheck {
    pub fn new(health_check: &HealthCheck, subsystem: impl Into<String>) -> Self {
        SwerveDriveHealthCheck {
            inner: health_check.view(),
            subsystem: subsystem.into(),
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    /// Measured controllers sampled under the drive subsystem, ascending.
    pub fn controllers(&self) -> Vec<i64> {
        let table = self.inner.table();
        let mut controllers: Vec<i64> = table
            .index()
            .keys()
            .filter(|&(controller, case)| {
                table
                    .index()
                    .get(controller, case)
                    .is_some_and(|rows| table.name_at(rows.start) == self.subsystem)
            })
            .map(|(controller, _)| controller)
            .collect();
        controllers.dedup();
        controllers
    }

    /// Cases run against the drive subsystem.
    pub fn cases(&self) -> Vec<CaseSummary> {
        self.inner
            .cases()
            .into_iter()
            .filter(|case| case.name == self.subsystem)
            .collect()
    }
}

impl Deref for SwerveDriveHealthCheck {
    type Target = HealthCheck;

    fn deref(&self) -> &HealthCheck {
        &self.inner
    }
}

impl DerefMut for SwerveDriveHealthCheck {
    fn deref_mut(&mut self) -> &mut HealthCheck {
        &mut self.inner
    }
}

impl HealthCheck {
    pub fn swerve_drive_health_check(&self) -> SwerveDriveHealthCheck {
        SwerveDriveHealthCheck::new(self, DEFAULT_SWERVE_SUBSYSTEM)
    }
}
