use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::config::{Direction, GpioName, SysfsLayout};
use crate::error::GpioError;
use crate::path::PinPaths;

const EXPORT_SETTLE_POLL: Duration = Duration::from_millis(10);
const EXPORT_SETTLE_ATTEMPTS: u32 = 50;

/// Outcome of exporting a pin, seeding the two inherited error flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub export_file_error: bool,
    pub direction_file_error: bool,
}

/// The capability that creates the per-pin sysfs nodes and sets direction.
pub trait Exporter: Send + Sync {
    fn export(&self, name: GpioName, direction: Direction) -> ExportReport;
}

/// For pins exported by someone else (udev rule, device tree, init script).
#[derive(Debug, Default, Clone, Copy)]
pub struct Preexported;

impl Exporter for Preexported {
    fn export(&self, _name: GpioName, _direction: Direction) -> ExportReport {
        ExportReport::default()
    }
}

#[derive(Debug, Clone)]
pub struct SysfsExporter {
    root: PathBuf,
}

impl SysfsExporter {
    pub fn new(layout: &SysfsLayout) -> Self {
        Self {
            root: layout.root.clone(),
        }
    }

    fn write_token(path: &Path, token: &str) -> Result<(), GpioError> {
        let mut f = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| GpioError::io(path, e))?;
        f.write_all(token.as_bytes())
            .map_err(|e| GpioError::io(path, e))
    }

    fn export_node(&self, name: GpioName, paths: &PinPaths) -> Result<(), GpioError> {
        if paths.dir.exists() {
            return Ok(());
        }

        Self::write_token(&self.root.join("export"), &name.0.to_string())?;

        // udev may still be fixing permissions on the fresh node
        for _ in 0..EXPORT_SETTLE_ATTEMPTS {
            if paths.value.exists() {
                return Ok(());
            }
            thread::sleep(EXPORT_SETTLE_POLL);
        }
        Err(GpioError::io(
            &paths.value,
            std::io::Error::new(std::io::ErrorKind::NotFound, "value node never appeared"),
        ))
    }
}

impl Exporter for SysfsExporter {
    fn export(&self, name: GpioName, direction: Direction) -> ExportReport {
        let paths = PinPaths::resolve(&self.root, name);
        let mut report = ExportReport::default();

        if let Err(e) = self.export_node(name, &paths) {
            warn!("export {name} failed: {e}");
            report.export_file_error = true;
        }

        match fs::read_to_string(&paths.direction) {
            Ok(current) if current.trim() == direction.as_str() => {}
            _ => {
                if let Err(e) = Self::write_token(&paths.direction, direction.as_str()) {
                    warn!("set direction of {name} failed: {e}");
                    report.direction_file_error = true;
                }
            }
        }

        debug!("exported {name} as {}: {report:?}", direction.as_str());
        report
    }
}
