use anyhow::{bail, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::circle_fit::CircleFitParams;
use crate::heights::HeightParams;
use crate::locator::LocatorParams;
use crate::normalization::GroundParams;
use crate::sections::section_heights;
use crate::tilt::OutlierWeights;
use crate::verticality_clustering::VerticalityClusteringParams;
use crate::voxel_grid::MAX_DIGITS;

/// Parameters that usually have to be adapted to every plot
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct BasicParameters {
    /// Upper normalized height of the stripe used to detect stems
    pub stripe_upper_limit: f64,
    /// Lower normalized height of the stripe used to detect stems
    pub stripe_lower_limit: f64,
    /// Number of passes of the verticality clustering
    pub iterations: usize,
}

impl Default for BasicParameters {
    fn default() -> Self {
        Self {
            stripe_upper_limit: 3.5,
            stripe_lower_limit: 0.7,
            iterations: 2,
        }
    }
}

/// Parameters describing the expected trees and the sections measured along their stems
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct AdvancedParameters {
    /// Largest stem diameter that is accepted
    pub maximum_diameter: f64,
    /// Diameter of the cylinder around every axis in which stem points are searched
    pub stem_search_diameter: f64,
    /// Normalized height of the first section
    pub minimum_height: f64,
    /// Sections start below this normalized height
    pub maximum_height: f64,
    /// Distance between two sections
    pub section_length: f64,
    /// Thickness of every section
    pub section_width: f64,
}

impl Default for AdvancedParameters {
    fn default() -> Self {
        Self {
            maximum_diameter: 1.0,
            stem_search_diameter: 2.0,
            minimum_height: 0.3,
            maximum_height: 25.0,
            section_length: 0.2,
            section_width: 0.05,
        }
    }
}

/// Parameters of the individual algorithms that rarely need to change
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ExpertParameters {
    pub stripe_resolution_xy: f64,
    pub stripe_resolution_z: f64,
    /// Stripe clusters with at most this many points are dropped
    pub stripe_min_cluster_points: usize,
    pub stripe_verticality_radius: f64,
    pub stripe_verticality_threshold: f64,
    /// Minimum vertical extent of a stem cluster, as a fraction of the stripe thickness
    pub height_range: f64,
    pub cloud_resolution_xy: f64,
    pub cloud_resolution_z: f64,
    /// Stripe clusters with fewer points than this get no axis
    pub axis_min_points: usize,
    /// Clusters of stem points with at most this many points are dropped before the sections are fitted
    pub stem_min_cluster_points: usize,
    pub stem_verticality_radius: f64,
    pub stem_verticality_threshold: f64,
    /// Points farther than this from every axis are not assigned to a tree
    pub max_axis_distance: f64,
    /// Points farther than this from their axis do not contribute to the tree height
    pub height_axis_distance: f64,
    pub height_resolution: f64,
    /// Trees tilted more than this (in degrees) get an untrusted height
    pub max_tilt_degrees: f64,
    /// Sections with at most this many points are not fitted
    pub section_min_points: usize,
    pub inner_circle_proportion: f64,
    pub minimum_diameter: f64,
    pub max_inner_points: usize,
    pub max_point_gap: f64,
    pub num_sectors: usize,
    pub min_occupied_sectors: usize,
    pub circle_width: f64,
    pub n_digits: u32,
    pub outlier_weights: OutlierWeights,
    pub locator: LocatorParams,
    pub ground_resolution: f64,
    pub ground_min_voxels: usize,
    /// Cell size of the terrain model used to normalize raw scans
    pub terrain_cell_size: f64,
    /// Voxels closer than this many resolutions are linked by the density clustering
    pub linking_factor: f64,
}

impl Default for ExpertParameters {
    fn default() -> Self {
        Self {
            stripe_resolution_xy: 0.02,
            stripe_resolution_z: 0.02,
            stripe_min_cluster_points: 1000,
            stripe_verticality_radius: 0.1,
            stripe_verticality_threshold: 0.7,
            height_range: 0.7,
            cloud_resolution_xy: 0.035,
            cloud_resolution_z: 0.035,
            axis_min_points: 20,
            stem_min_cluster_points: 1000,
            stem_verticality_radius: 0.1,
            stem_verticality_threshold: 0.7,
            max_axis_distance: 15.0,
            height_axis_distance: 1.5,
            height_resolution: 0.3,
            max_tilt_degrees: 25.0,
            section_min_points: 80,
            inner_circle_proportion: 0.5,
            minimum_diameter: 0.06,
            max_inner_points: 5,
            max_point_gap: 0.02,
            num_sectors: 16,
            min_occupied_sectors: 9,
            circle_width: 0.02,
            n_digits: 5,
            outlier_weights: OutlierWeights::default(),
            locator: LocatorParams::default(),
            ground_resolution: 0.15,
            ground_min_voxels: 2,
            terrain_cell_size: 0.7,
            linking_factor: 1.9,
        }
    }
}

/// All parameters of one run, see [pipeline::run](crate::pipeline::run)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct FinParameters {
    pub basic: BasicParameters,
    pub advanced: AdvancedParameters,
    pub expert: ExpertParameters,
}

impl FinParameters {
    /// Checks that the parameters make geometric sense. [pipeline::run](crate::pipeline::run) calls this first
    pub fn validate(&self) -> Result<()> {
        let (basic, advanced, expert) = (&self.basic, &self.advanced, &self.expert);
        let resolutions = [
            ("stripe_resolution_xy", expert.stripe_resolution_xy),
            ("stripe_resolution_z", expert.stripe_resolution_z),
            ("cloud_resolution_xy", expert.cloud_resolution_xy),
            ("cloud_resolution_z", expert.cloud_resolution_z),
            ("height_resolution", expert.height_resolution),
            ("ground_resolution", expert.ground_resolution),
            ("terrain_cell_size", expert.terrain_cell_size),
            ("section_length", advanced.section_length),
            ("section_width", advanced.section_width),
        ];
        for (name, value) in resolutions.iter() {
            if !(*value > 0.0) {
                bail!("{} must be positive, got {}", name, value);
            }
        }
        if basic.stripe_lower_limit >= basic.stripe_upper_limit {
            bail!(
                "The lower stripe limit ({}) must be below the upper stripe limit ({})",
                basic.stripe_lower_limit,
                basic.stripe_upper_limit
            );
        }
        if advanced.minimum_height >= advanced.maximum_height {
            bail!(
                "The minimum section height ({}) must be below the maximum section height ({})",
                advanced.minimum_height,
                advanced.maximum_height
            );
        }
        if expert.minimum_diameter > advanced.maximum_diameter {
            bail!(
                "The minimum diameter ({}) exceeds the maximum diameter ({})",
                expert.minimum_diameter,
                advanced.maximum_diameter
            );
        }
        if expert.num_sectors == 0 || expert.min_occupied_sectors > expert.num_sectors {
            bail!(
                "Invalid sector configuration: {} of {} sectors",
                expert.min_occupied_sectors,
                expert.num_sectors
            );
        }
        if expert.n_digits == 0 || expert.n_digits > MAX_DIGITS {
            bail!("n_digits must be within 1..={}, got {}", MAX_DIGITS, expert.n_digits);
        }
        Ok(())
    }

    pub fn stripe_clustering(&self) -> VerticalityClusteringParams {
        VerticalityClusteringParams {
            search_radius: self.expert.stripe_verticality_radius,
            verticality_threshold: self.expert.stripe_verticality_threshold,
            min_cluster_points: self.expert.stripe_min_cluster_points,
            iterations: self.basic.iterations,
            resolution_xy: self.expert.stripe_resolution_xy,
            resolution_z: self.expert.stripe_resolution_z,
            linking_distance: self.expert.linking_factor * self.expert.stripe_resolution_xy,
            n_digits: self.expert.n_digits,
        }
    }

    /// Stem points are clustered on the same grid as the stripe
    pub fn stem_clustering(&self) -> VerticalityClusteringParams {
        VerticalityClusteringParams {
            search_radius: self.expert.stem_verticality_radius,
            verticality_threshold: self.expert.stem_verticality_threshold,
            min_cluster_points: self.expert.stem_min_cluster_points,
            ..self.stripe_clustering()
        }
    }

    pub fn ground(&self) -> GroundParams {
        GroundParams {
            resolution: self.expert.ground_resolution,
            min_voxels: self.expert.ground_min_voxels,
            linking_distance: self.expert.linking_factor * self.expert.ground_resolution,
            cell_size: self.expert.terrain_cell_size,
            n_digits: self.expert.n_digits,
        }
    }

    /// Minimum vertical extent of a stem cluster in meters
    pub fn axis_height_range(&self) -> f64 {
        self.expert.height_range * (self.basic.stripe_upper_limit - self.basic.stripe_lower_limit)
    }

    pub fn heights(&self) -> HeightParams {
        HeightParams {
            max_axis_distance: self.expert.height_axis_distance,
            max_tilt_degrees: self.expert.max_tilt_degrees,
            resolution: self.expert.height_resolution,
            linking_distance: self.expert.linking_factor * self.expert.height_resolution,
            n_digits: self.expert.n_digits,
        }
    }

    pub fn circle_fit(&self) -> CircleFitParams {
        CircleFitParams {
            min_points: self.expert.section_min_points,
            inner_proportion: self.expert.inner_circle_proportion,
            max_inner_points: self.expert.max_inner_points,
            min_radius: self.expert.minimum_diameter / 2.0,
            max_radius: self.advanced.maximum_diameter / 2.0,
            num_sectors: self.expert.num_sectors,
            min_occupied_sectors: self.expert.min_occupied_sectors,
            circle_width: self.expert.circle_width,
            max_point_gap: self.expert.max_point_gap,
        }
    }

    /// Lower bounds of all sections
    pub fn sections(&self) -> Vec<f64> {
        section_heights(
            self.advanced.minimum_height,
            self.advanced.maximum_height,
            self.advanced.section_length,
        )
    }
}
