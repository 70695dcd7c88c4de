//! Affinity masks for heterogeneous (big.LITTLE style) core clusters.

use {
    crate::{affinity::AffinityMask, topology::CpuTopology},
    serde::{Deserialize, Serialize},
};

/// A group of cores to pin threads to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreCluster {
    /// Every discovered core.
    #[default]
    All,
    /// The slowest cores.
    Little,
    /// Every core that is not little.
    Big,
}

impl CoreCluster {
    /// Computes the mask for this cluster from `topology`.
    ///
    /// Cores are split by max frequency: the cores at the lowest frequency are
    /// little. If all cores report the same frequency, or any core's frequency
    /// is unknown, the lowest package id is little instead. If neither splits
    /// the cores, both clusters are all cores.
    pub fn mask(&self, topology: &CpuTopology) -> AffinityMask {
        let all = AffinityMask::from_cores(topology.cores.iter().map(|core| core.id));
        let little = match self {
            CoreCluster::All => return all,
            CoreCluster::Little | CoreCluster::Big => little_cores(topology),
        };

        if little.is_empty() || little == all {
            return all;
        }

        match self {
            CoreCluster::Little => little,
            _ => AffinityMask::from_bits(all.bits() & !little.bits()),
        }
    }
}

fn little_cores(topology: &CpuTopology) -> AffinityMask {
    // an unknown frequency reads as 0 and would pass for the slowest core
    if topology.cores.iter().all(|core| core.frequency != 0) {
        if let (Some(min), Some(max)) = (topology.min_frequency(), topology.max_frequency()) {
            if min != max {
                return AffinityMask::from_cores(
                    topology
                        .cores
                        .iter()
                        .filter(|core| core.frequency == min)
                        .map(|core| core.id),
                );
            }
        }
    }

    topology
        .packages()
        .into_iter()
        .next()
        .map(|(_, cores)| AffinityMask::from_cores(cores))
        .unwrap_or_default()
}
