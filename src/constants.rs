//! Application-wide constants and default values
//!
//! Centralized location for all hard-coded values to improve maintainability

/// Evaluation sandbox limits
pub mod sandbox {
    /// Maximum script operations per evaluation
    pub const MAX_OPERATIONS: u64 = 5_000_000;

    /// Maximum function call nesting
    pub const MAX_CALL_LEVELS: usize = 32;

    /// Maximum expression nesting depth
    pub const MAX_EXPR_DEPTH: usize = 64;
}

/// Reference kernel resolution
pub mod kernel {
    /// Voxel cells along the longest axis when sampling boolean results
    pub const VOXEL_RESOLUTION: usize = 48;

    /// Segments around a cylinder or sphere
    pub const CIRCLE_SEGMENTS: usize = 32;

    /// Latitude rings on a sphere
    pub const SPHERE_RINGS: usize = 16;

    /// Tolerance for degenerate extents
    pub const EPSILON: f64 = 1e-9;
}

/// STEP library lookup
pub mod step {
    /// Tried in order when locating `<guid>.<ext>`
    pub const EXTENSIONS: [&str; 2] = ["step", "STEP"];

    /// Relative directories probed when no root is configured
    pub const CANDIDATE_ROOTS: [&str; 2] = ["steps", "data/steps"];

    /// Environment override for the library directory
    pub const ENV_VAR: &str = "SHAPEDELTA_STEP_DIR";

    /// Subdirectory of the platform data dir
    pub const DATA_SUBDIR: &str = "shapedelta/steps";
}

/// Program generation naming
pub mod program {
    /// Prefix for parameter identifiers
    pub const PARAMETER_PREFIX: &str = "p_";

    /// Prefix for shape variables
    pub const SHAPE_PREFIX: &str = "s_";

    /// Joins member names of a composite variable
    pub const NAME_SEPARATOR: &str = "_";

    /// Fillet radius is the finish factor divided by this
    pub const FILLET_DIVISOR: f64 = 10.0;
}
