//! The fastdeploy build context: per-build verifier tracking, artifact
//! history, XML persistence, and the close-time history purge.

pub mod backup;
pub mod clock;
pub mod context;
pub mod error;
pub mod log;
pub mod purge;
pub mod report;
pub mod shared;
pub mod timing;
pub mod xml;

pub use clock::{Clock, SystemClock};
pub use context::{BuildContext, ContextOptions};
pub use error::EngineError;
pub use log::{DeployLog, NoopLog, StderrLog};
pub use report::{DeploymentReport, JsonLinesSink, NoopSink, ReportSink};
pub use shared::SharedBuildContext;
pub use timing::TaskType;
pub use xml::{PersistenceMode, BUILD_INFO_FILE_NAME, TMP_BUILD_INFO_FILE_NAME};
