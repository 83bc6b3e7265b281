use std::path::{Path, PathBuf};

use crate::config::GpioName;

/// The three per-pin control files under the sysfs root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinPaths {
    pub dir: PathBuf,
    pub value: PathBuf,
    pub direction: PathBuf,
    pub edge: PathBuf,
}

impl PinPaths {
    pub fn resolve(root: &Path, name: GpioName) -> Self {
        let dir = root.join(name.to_string());
        Self {
            value: dir.join("value"),
            direction: dir.join("direction"),
            edge: dir.join("edge"),
            dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_under_root() {
        let paths = PinPaths::resolve(Path::new("/sys/class/gpio"), GpioName(60));
        assert_eq!(paths.dir, PathBuf::from("/sys/class/gpio/gpio60"));
        assert_eq!(paths.value, PathBuf::from("/sys/class/gpio/gpio60/value"));
        assert_eq!(
            paths.direction,
            PathBuf::from("/sys/class/gpio/gpio60/direction")
        );
        assert_eq!(paths.edge, PathBuf::from("/sys/class/gpio/gpio60/edge"));
    }
}
