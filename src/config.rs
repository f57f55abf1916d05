// SPDX-License-Identifier: Apache-2.0

/// How cells that belong to a fence region are legalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionStrategy {
    /// Row assignment and cluster compaction restricted to the region area.
    #[default]
    Abacus,
    /// Precedence graphs with edge exchange, a displacement solve, and a
    /// relocation repair pass.
    ConstraintGraph,
}

/// Options for the constraint graph legalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    /// Maximum number of edge exchanges between the horizontal and vertical
    /// graphs before giving up. Default: 100.
    pub max_iterations: usize,
    /// Maximum number of constraint sweeps of the displacement solver.
    /// Default: 2000.
    pub solver_sweeps: usize,
    /// Largest constraint violation the solver accepts as converged.
    /// Default: 1e-6.
    pub solver_tolerance: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            max_iterations: 100,
            solver_sweeps: 2000,
            solver_tolerance: 1e-6,
        }
    }
}

/// Options that affect a whole legalization run.
#[derive(Debug, Clone, PartialEq)]
pub struct LegalizerConfig {
    /// Number of nearest subrows tried first for each cell; doubled until a
    /// subrow is found. Default: 5.
    pub search_window: usize,
    /// Depth of the KD-tree used to split the chip into `2^depth` partitions
    /// that are legalized in parallel. 0 legalizes sequentially. Default: 0.
    pub partition_depth: usize,
    /// Strategy used for fence region members. Default: `Abacus`.
    pub region_strategy: RegionStrategy,
    /// Regions with more members than this are split into bins before the
    /// constraint graph solve. Default: 64.
    pub max_graph_cells: usize,
    /// Bin edge length, in row heights. Default: 8.
    pub bin_rows: i64,
    /// Candidate sites evaluated per cell by the relocation repair pass.
    /// Default: 16.
    pub relocation_candidates: usize,
    /// If true, run the full legality check at the end and record the result
    /// in the report. Default: true.
    pub check_result: bool,
    pub graph: GraphConfig,
}

impl Default for LegalizerConfig {
    fn default() -> Self {
        LegalizerConfig {
            search_window: 5,
            partition_depth: 0,
            region_strategy: RegionStrategy::Abacus,
            max_graph_cells: 64,
            bin_rows: 8,
            relocation_candidates: 16,
            check_result: true,
            graph: GraphConfig::default(),
        }
    }
}
