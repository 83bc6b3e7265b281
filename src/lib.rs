mod config;
mod edge;
mod error;
mod export;
mod gpio;
mod path;
mod status;

pub use config::{
    DEFAULT_SYSFS_ROOT, Direction, EdgeDetect, GpioConfig, GpioName, Level, PinConfig,
    SysfsLayout, WorkingMode,
};
pub use edge::{
    EdgeCallback, EdgeSource, EventWorker, MockEdgeSource, MockEdgeTrigger, SysfsEdgeSource,
    Wait, Waker,
};
pub use error::GpioError;
pub use export::{ExportReport, Exporter, Preexported, SysfsExporter};
pub use gpio::{
    FILE_COULD_NOT_OPEN_INT, FILE_COULD_NOT_OPEN_STRING, GPIO_PIN_NOT_READY_INT,
    GPIO_PIN_NOT_READY_STRING, GpioPin, UNDEFINED_VALUE_INT,
};
pub use path::PinPaths;
pub use status::{ErrorFlags, Flag};
