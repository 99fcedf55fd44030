//! Process-wide toolkit license/session lifecycle.
//!
//! Licensed toolkits need a session opened once before the first raster call
//! and closed once after the last. That lifecycle belongs to the process entry
//! point, not to the dispatcher, so it is modelled as a scoped guard.

use tracing::{debug, info};

use crate::Result;

/// Acquire/release hooks for a toolkit session.
pub trait ToolkitLicense: Send + Sync {
    fn acquire(&self) -> Result<()>;

    fn release(&self);
}

/// A toolkit that needs no session.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlicensedToolkit;

impl ToolkitLicense for UnlicensedToolkit {
    fn acquire(&self) -> Result<()> {
        debug!("Toolkit requires no license");
        Ok(())
    }

    fn release(&self) {}
}

/// Holds an acquired session and releases it exactly once on drop.
#[must_use = "the license is released as soon as the guard is dropped"]
pub struct LicenseGuard<'a> {
    license: &'a dyn ToolkitLicense,
}

impl<'a> LicenseGuard<'a> {
    pub fn acquire(license: &'a dyn ToolkitLicense) -> Result<Self> {
        license.acquire()?;
        info!("Toolkit session acquired");
        Ok(Self { license })
    }
}

impl Drop for LicenseGuard<'_> {
    fn drop(&mut self) {
        self.license.release();
        info!("Toolkit session released");
    }
}
