pub mod distro_suite;
pub mod gem_suite;
pub mod python_suite;
pub mod registry;

pub use distro_suite::{DistroFlavor, DistroSuite};
pub use gem_suite::GemSuite;
pub use python_suite::PythonSuite;
pub use registry::{SuiteContext, TargetDef, TargetKind, TargetRegistry};

use crate::core::error::UploadError;
use crate::exec::CommandError;

/// The upload client could not be started for `target`
pub(crate) fn launch_error(target: &str, error: CommandError) -> UploadError {
    UploadError::CommandLaunch {
        target: target.to_string(),
        program: error.program().to_string(),
        message: error.to_string(),
    }
}
