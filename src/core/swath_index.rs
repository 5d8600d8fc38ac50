use crate::config::SwathSourceConfig;
use crate::io::raster::{RasterBackend, SwathRead};
use crate::io::swath::SwathSamples;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use std::path::PathBuf;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

type IndexedSample = GeomWithData<[f64; 2], f64>;

/// Value and coordinate distance of the nearest indexed sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub value: f64,
    pub distance: f64,
}

/// What happened to each file offered to [`SwathPointIndex::build`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwathBuildStats {
    pub files_used: usize,
    pub files_skipped: usize,
    /// Valid samples contributed per used file
    pub samples_per_file: Vec<(PathBuf, usize)>,
}

/// Nearest-neighbour index over one day's merged swath samples
pub enum SwathPointIndex {
    Empty,
    Populated(RTree<IndexedSample>),
}

impl SwathPointIndex {
    /// Merge the valid samples of every readable file into one index.
    ///
    /// Files without any candidate variable, or that fail to read, are skipped.
    pub fn build(
        files: &[PathBuf],
        source: &SwathSourceConfig,
        backend: &dyn RasterBackend,
    ) -> (Self, SwathBuildStats) {
        let mut stats = SwathBuildStats::default();
        let mut merged = SwathSamples::default();

        for path in files {
            let arrays = match backend.read_swath(path, source) {
                Ok(SwathRead::Arrays(arrays)) => arrays,
                Ok(SwathRead::VariableNotFound) => {
                    log::debug!("No candidate variable in {}, skipping", path.display());
                    stats.files_skipped += 1;
                    continue;
                }
                Err(e) => {
                    log::warn!("Could not read swath file {}: {}", path.display(), e);
                    stats.files_skipped += 1;
                    continue;
                }
            };

            let samples = SwathSamples::from_arrays(&arrays, source.normalize_longitude);
            log::debug!(
                "{}: {} valid of {} {} samples",
                path.display(),
                samples.len(),
                samples.total,
                arrays.variable
            );

            stats.files_used += 1;
            stats.samples_per_file.push((path.clone(), samples.len()));
            merged.latitudes.extend(samples.latitudes);
            merged.longitudes.extend(samples.longitudes);
            merged.values.extend(samples.values);
            merged.total += samples.total;
        }

        (Self::from_samples(&merged), stats)
    }

    pub fn from_samples(samples: &SwathSamples) -> Self {
        if samples.is_empty() {
            return SwathPointIndex::Empty;
        }

        let points: Vec<IndexedSample> = samples
            .latitudes
            .iter()
            .zip(&samples.longitudes)
            .zip(&samples.values)
            .map(|((&lat, &lon), &value)| GeomWithData::new([lat, lon], value))
            .collect();

        SwathPointIndex::Populated(RTree::bulk_load(points))
    }

    /// Number of indexed samples
    pub fn len(&self) -> usize {
        match self {
            SwathPointIndex::Empty => 0,
            SwathPointIndex::Populated(tree) => tree.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nearest sample to a single (lat, lon); no distance cutoff
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<Nearest> {
        let tree = match self {
            SwathPointIndex::Empty => return None,
            SwathPointIndex::Populated(tree) => tree,
        };
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }

        tree.nearest_neighbor(&[lat, lon]).map(|sample| {
            let [s_lat, s_lon] = *sample.geom();
            Nearest {
                value: sample.data,
                distance: (s_lat - lat).hypot(s_lon - lon),
            }
        })
    }

    /// Batched nearest query, one result per input point in input order
    pub fn query_nearest(&self, points: &[(f64, f64)]) -> Vec<Option<Nearest>> {
        if self.is_empty() {
            return vec![None; points.len()];
        }

        #[cfg(feature = "parallel")]
        let results = points.par_iter().map(|&(lat, lon)| self.nearest(lat, lon)).collect();

        #[cfg(not(feature = "parallel"))]
        let results = points.iter().map(|&(lat, lon)| self.nearest(lat, lon)).collect();

        results
    }
}
