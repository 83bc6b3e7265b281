use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::config::{Direction, EdgeDetect, GpioName, Level, PinConfig, SysfsLayout, WorkingMode};
use crate::edge::{EdgeCallback, EdgeSource, EventWorker, SysfsEdgeSource};
use crate::error::GpioError;
use crate::export::{Exporter, SysfsExporter};
use crate::path::PinPaths;
use crate::status::{ErrorFlags, ErrorState, Flag};

pub const GPIO_PIN_NOT_READY_STRING: &str = "Gpio pin isn't ready!";
pub const GPIO_PIN_NOT_READY_INT: i32 = -2;
pub const FILE_COULD_NOT_OPEN_STRING: &str = "File couldn't open!";
pub const FILE_COULD_NOT_OPEN_INT: i32 = -1;
/// Returned by numeric reads when the value file holds no integer.
pub const UNDEFINED_VALUE_INT: i32 = -1111;

/// One sysfs GPIO line with optional edge-triggered callback.
///
/// Accessors never fail loudly: outcomes are folded into sentinel return
/// values and into per-operation flags queried with [`GpioPin::fail`] and
/// [`GpioPin::fail_on`].
pub struct GpioPin {
    name: GpioName,
    direction: Direction,
    mode: AtomicU8,
    edge: EdgeDetect,
    paths: PinPaths,
    errors: ErrorState,
    io_lock: Mutex<()>,
    worker: Option<EventWorker>, // stopped before the rest is dropped
}

impl GpioPin {
    /// Exports `name` under the default sysfs root.
    pub fn new(name: GpioName, direction: Direction, mode: WorkingMode) -> Self {
        let layout = SysfsLayout::default();
        Self::open(&layout, &SysfsExporter::new(&layout), name, direction, mode)
    }

    pub fn open(
        layout: &SysfsLayout,
        exporter: &dyn Exporter,
        name: GpioName,
        direction: Direction,
        mode: WorkingMode,
    ) -> Self {
        let report = exporter.export(name, direction);
        let paths = PinPaths::resolve(&layout.root, name);
        debug!(
            "opened {name} ({}, {mode:?}) at {}",
            direction.as_str(),
            paths.dir.display()
        );

        Self {
            name,
            direction,
            mode: AtomicU8::new(mode_to_u8(mode)),
            edge: EdgeDetect::None,
            paths,
            errors: ErrorState::from_export(report),
            io_lock: Mutex::new(()),
            worker: None,
        }
    }

    /// Builds a pin and, when the config asks for an edge, arms the sysfs
    /// interrupt with `callback`.
    pub fn from_config(
        layout: &SysfsLayout,
        exporter: &dyn Exporter,
        cfg: &PinConfig,
        callback: Option<EdgeCallback>,
    ) -> Result<Self, GpioError> {
        let mut pin = Self::open(layout, exporter, cfg.name, cfg.direction, cfg.mode);
        if let Some(callback) = callback {
            pin.setup_interrupt(cfg.edge, callback)?;
        }
        Ok(pin)
    }

    pub fn name(&self) -> GpioName {
        self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn edge(&self) -> EdgeDetect {
        self.edge
    }

    pub fn paths(&self) -> &PinPaths {
        &self.paths
    }

    pub fn working_mode(&self) -> WorkingMode {
        mode_from_u8(self.mode.load(Ordering::Acquire))
    }

    pub fn set_working_mode(&self, mode: WorkingMode) {
        self.mode.store(mode_to_u8(mode), Ordering::Release);
    }

    fn is_exported(&self) -> bool {
        let exported = File::open(&self.paths.value).is_ok();
        self.errors.record(Flag::Export, !exported);
        exported
    }

    fn is_direction_set(&self) -> bool {
        let matches = read_token(&self.paths.direction)
            .map(|token| token == self.direction.as_str())
            .unwrap_or(false);
        self.errors.record(Flag::Direction, !matches);
        matches
    }

    /// Re-read on every call; the pin can be unexported right after.
    fn is_ready(&self) -> bool {
        self.is_exported() && self.is_direction_set()
    }

    fn secure(&self) -> bool {
        self.working_mode() == WorkingMode::Secure
    }

    /// Current level token, or one of the string sentinels.
    pub fn get_value(&self) -> String {
        if self.secure() && !self.is_ready() {
            return GPIO_PIN_NOT_READY_STRING.to_string();
        }

        let _io = self.io_lock.lock();
        match read_token(&self.paths.value) {
            Ok(token) => {
                self.errors.record(Flag::Read, false);
                token
            }
            Err(_) => {
                self.errors.record(Flag::Read, true);
                FILE_COULD_NOT_OPEN_STRING.to_string()
            }
        }
    }

    /// Current level as an integer, or one of the numeric sentinels.
    pub fn get_numeric_value(&self) -> i32 {
        if self.secure() && !self.is_ready() {
            return GPIO_PIN_NOT_READY_INT;
        }

        let _io = self.io_lock.lock();
        self.read_numeric()
    }

    fn read_numeric(&self) -> i32 {
        let token = match read_token(&self.paths.value) {
            Ok(token) => token,
            Err(_) => {
                self.errors.record(Flag::Read, true);
                return FILE_COULD_NOT_OPEN_INT;
            }
        };

        match token.parse::<i32>() {
            Ok(value) => {
                self.errors.record(Flag::Read, false);
                value
            }
            Err(e) => {
                warn!("{} holds non-numeric {token:?}: {e}", self.paths.value.display());
                self.errors.record(Flag::Read, true);
                UNDEFINED_VALUE_INT
            }
        }
    }

    /// Drives an output pin. Returns `false` on any failure; see the flags.
    pub fn set_value(&self, level: Level) -> bool {
        if self.direction != Direction::Output {
            self.errors.record(Flag::Write, true);
            self.errors.record(Flag::Forcing, true);
            return false;
        }
        self.errors.record(Flag::Forcing, false);

        if self.secure() && !self.is_ready() {
            self.errors.record(Flag::Write, true);
            return false;
        }

        let _io = self.io_lock.lock();
        self.write_level(level)
    }

    fn write_level(&self, level: Level) -> bool {
        let written = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.paths.value)
            .and_then(|mut f| f.write_all(level.as_str().as_bytes()));
        self.errors.record(Flag::Write, written.is_err());
        written.is_ok()
    }

    pub fn is_high(&self) -> bool {
        self.get_numeric_value() == 1
    }

    /// Inverts an output pin.
    ///
    /// Toggles through this pin object are serialized, but another process
    /// writing the line between the read and the write still races.
    pub fn toggle_value(&self) {
        if self.direction != Direction::Output {
            self.errors.record(Flag::Forcing, true);
            return;
        }
        self.errors.record(Flag::Forcing, false);

        let _io = self.io_lock.lock();
        if self.secure() && !self.is_ready() {
            self.errors.record(Flag::Write, true);
            return;
        }

        let next = if self.read_numeric() == 1 {
            Level::Low
        } else {
            Level::High
        };
        self.write_level(next);
    }

    /// Chaining form of [`GpioPin::get_value`].
    pub fn read_to(&self, out: &mut String) -> &Self {
        *out = self.get_value();
        self
    }

    /// Chaining form of [`GpioPin::get_numeric_value`].
    pub fn read_numeric_to(&self, out: &mut i32) -> &Self {
        *out = self.get_numeric_value();
        self
    }

    /// Chaining form of [`GpioPin::set_value`].
    pub fn write(&self, level: Level) -> &Self {
        self.set_value(level);
        self
    }

    /// Writes the edge policy token to the pin's `edge` file. No retry.
    fn set_edge(&self) -> Result<(), GpioError> {
        let mut f = OpenOptions::new()
            .write(true)
            .open(&self.paths.edge)
            .map_err(|e| GpioError::io(&self.paths.edge, e))?;
        let mut token = self.edge.as_str().as_bytes().to_vec();
        token.push(0);
        f.write_all(&token)
            .map_err(|e| GpioError::io(&self.paths.edge, e))?;
        debug!("{} edge set to {}", self.name, self.edge.as_str());
        Ok(())
    }

    /// Arms edge interrupts on the value file and runs `callback` on a
    /// dedicated thread for every transition.
    ///
    /// On error the pin stays usable for plain reads and writes but has no
    /// worker. Calling again replaces the previous configuration.
    pub fn setup_interrupt(
        &mut self,
        edge: EdgeDetect,
        callback: EdgeCallback,
    ) -> Result<(), GpioError> {
        self.stop_interrupt();
        self.configure_edge(edge);
        let source = SysfsEdgeSource::open(&self.paths.value)?;
        self.start_worker(source, callback)
    }

    /// Like [`GpioPin::setup_interrupt`] with a caller-provided readiness
    /// primitive in place of the sysfs value handle.
    pub fn setup_interrupt_with<S: EdgeSource>(
        &mut self,
        edge: EdgeDetect,
        source: S,
        callback: EdgeCallback,
    ) -> Result<(), GpioError> {
        self.stop_interrupt();
        self.configure_edge(edge);
        self.start_worker(source, callback)
    }

    fn configure_edge(&mut self, edge: EdgeDetect) {
        self.edge = edge;
        if let Err(e) = self.set_edge() {
            warn!("could not set edge of {}: {e}", self.name);
        }
    }

    fn start_worker<S: EdgeSource>(
        &mut self,
        source: S,
        callback: EdgeCallback,
    ) -> Result<(), GpioError> {
        let worker = EventWorker::spawn(self.name, source, callback)?;
        self.worker = Some(worker);
        info!("{} armed for {} edges", self.name, self.edge.as_str());
        Ok(())
    }

    /// Stops and joins the edge worker, if any.
    pub fn stop_interrupt(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker);
        }
    }

    pub fn is_interrupt_armed(&self) -> bool {
        self.worker.as_ref().is_some_and(EventWorker::is_running)
    }

    /// True if any pin-level flag (export, direction, read, write, forcing)
    /// is set.
    pub fn fail(&self) -> bool {
        self.errors.any()
    }

    pub fn fail_on(&self, flag: Flag) -> bool {
        self.errors.is_set(flag)
    }

    pub fn errors(&self) -> ErrorFlags {
        self.errors.snapshot()
    }
}

impl Drop for GpioPin {
    fn drop(&mut self) {
        self.stop_interrupt();
    }
}

/// First whitespace-separated token of a small sysfs file.
fn read_token(path: &std::path::Path) -> std::io::Result<String> {
    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    Ok(contents
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string())
}

fn mode_to_u8(mode: WorkingMode) -> u8 {
    match mode {
        WorkingMode::Secure => 0,
        WorkingMode::Fast => 1,
    }
}

fn mode_from_u8(raw: u8) -> WorkingMode {
    match raw {
        1 => WorkingMode::Fast,
        _ => WorkingMode::Secure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_through_atomic_encoding() {
        for mode in [WorkingMode::Secure, WorkingMode::Fast] {
            assert_eq!(mode_from_u8(mode_to_u8(mode)), mode);
        }
    }

    #[test]
    fn read_token_takes_first_word() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direction");
        std::fs::write(&path, "out\n").unwrap();
        assert_eq!(read_token(&path).unwrap(), "out");
    }
}
