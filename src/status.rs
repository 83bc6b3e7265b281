use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

use crate::export::ExportReport;

/// Individual failure flags of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Export layer could not create the pin node.
    ExportFile,
    /// Value file could not be opened during a readiness check.
    Export,
    /// Export layer could not write the direction file.
    DirectionFile,
    /// Direction file missing or disagreeing with the configured direction.
    Direction,
    Read,
    Write,
    /// Write attempted on an input pin.
    Forcing,
}

impl Flag {
    fn bit(self) -> u8 {
        match self {
            Flag::ExportFile => 1 << 0,
            Flag::Export => 1 << 1,
            Flag::DirectionFile => 1 << 2,
            Flag::Direction => 1 << 3,
            Flag::Read => 1 << 4,
            Flag::Write => 1 << 5,
            Flag::Forcing => 1 << 6,
        }
    }
}

const PIN_LEVEL_MASK: u8 = (1 << 1) | (1 << 3) | (1 << 4) | (1 << 5) | (1 << 6);

/// Point-in-time copy of every flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorFlags {
    pub export_file: bool,
    pub export: bool,
    pub direction_file: bool,
    pub direction: bool,
    pub read: bool,
    pub write: bool,
    pub forcing: bool,
}

impl ErrorFlags {
    /// True when any of the five pin-level flags is set.
    pub fn any(&self) -> bool {
        self.export || self.direction || self.read || self.write || self.forcing
    }
}

/// Lock-free flag record shared between caller threads.
#[derive(Debug, Default)]
pub(crate) struct ErrorState {
    bits: AtomicU8,
}

impl ErrorState {
    pub(crate) fn from_export(report: ExportReport) -> Self {
        let state = Self::default();
        state.record(Flag::ExportFile, report.export_file_error);
        state.record(Flag::DirectionFile, report.direction_file_error);
        state
    }

    /// Overwrite one flag with the outcome of the latest attempt.
    pub(crate) fn record(&self, flag: Flag, failed: bool) {
        if failed {
            self.bits.fetch_or(flag.bit(), Ordering::AcqRel);
        } else {
            self.bits.fetch_and(!flag.bit(), Ordering::AcqRel);
        }
    }

    pub(crate) fn is_set(&self, flag: Flag) -> bool {
        self.bits.load(Ordering::Acquire) & flag.bit() != 0
    }

    pub(crate) fn any(&self) -> bool {
        self.bits.load(Ordering::Acquire) & PIN_LEVEL_MASK != 0
    }

    pub(crate) fn snapshot(&self) -> ErrorFlags {
        let bits = self.bits.load(Ordering::Acquire);
        let has = |f: Flag| bits & f.bit() != 0;
        ErrorFlags {
            export_file: has(Flag::ExportFile),
            export: has(Flag::Export),
            direction_file: has(Flag::DirectionFile),
            direction: has(Flag::Direction),
            read: has(Flag::Read),
            write: has(Flag::Write),
            forcing: has(Flag::Forcing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sets_and_clears_only_its_flag() {
        let state = ErrorState::default();
        state.record(Flag::Read, true);
        state.record(Flag::Write, true);
        state.record(Flag::Read, false);

        assert!(!state.is_set(Flag::Read));
        assert!(state.is_set(Flag::Write));
        assert!(state.any());
    }

    #[test]
    fn inherited_flags_do_not_count_as_pin_failure() {
        let state = ErrorState::from_export(ExportReport {
            export_file_error: true,
            direction_file_error: true,
        });

        assert!(state.is_set(Flag::ExportFile));
        assert!(state.is_set(Flag::DirectionFile));
        assert!(!state.any());

        let snap = state.snapshot();
        assert!(snap.export_file && snap.direction_file);
        assert!(!snap.any());
    }
}
