pub use crate::angles::{Angles, Pose};
pub use crate::config::{Config, ConfigWarning};
pub use crate::engine::{
    reconstruct, IterationEngine, Overrides, Plugins, ProgressEvent, ReconState,
};
pub use crate::error::{CapabilityError, Error};
pub use crate::fom::{l2_norm, Metric, QualityMeasurement, QualityRecord, StandardMetrics};
pub use crate::geometry::{Geometry, ScanMode};
pub use crate::init::{DirectSolver, InitStrategy, MultigridSolver};
pub use crate::projector::{Projector, RaySum};
pub use crate::sart::{ArtDataMinimization, DataMinimization, MinimizerKind};
pub use crate::subsets::{order_subsets, AngleSchedule, OrderStrategy};
pub use crate::tv::{MinimizeTv, NoRegularisation, Regularisation, RegularizerKind};
