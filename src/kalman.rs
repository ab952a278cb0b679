//! Constant-velocity Kalman filter over `(cx, cy, a, h)` box state.
//!
//! The state vector is `[cx, cy, a, h, vcx, vcy, va, vh]`. Process and measurement noise
//! scale with the box height, so small (distant) objects are not predicted with more
//! confidence than their apparent motion warrants.

use crate::bbox::{BBox, Xyah};
use nalgebra as na;
use tracing::warn;

pub type StateMean = na::SVector<f32, 8>;
pub type StateCov = na::SMatrix<f32, 8, 8>;
pub type ProjectedMean = na::Vector4<f32>;
pub type ProjectedCov = na::Matrix4<f32>;

const NDIM: usize = 4;

// Noise terms are computed from the height, bounded here so the innovation stays invertible.
const MIN_HEIGHT: f32 = 1.0;

const STD_ASPECT_POSITION: f32 = 1e-2;
const STD_ASPECT_VELOCITY: f32 = 1e-5;
const STD_ASPECT_MEASUREMENT: f32 = 1e-1;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    std_weight_position: f32,
    std_weight_velocity: f32,
    update_mat: na::SMatrix<f32, 4, 8>,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(1.0 / 20.0, 1.0 / 160.0)
    }
}

impl KalmanFilter {
    pub fn new(std_weight_position: f32, std_weight_velocity: f32) -> Self {
        let mut update_mat = na::SMatrix::<f32, 4, 8>::zeros();
        for i in 0..NDIM {
            update_mat[(i, i)] = 1.0;
        }

        Self {
            std_weight_position,
            std_weight_velocity,
            update_mat,
        }
    }

    fn motion_mat(dt: f32) -> StateCov {
        let mut motion_mat = StateCov::identity();
        for i in 0..NDIM {
            motion_mat[(i, i + NDIM)] = dt;
        }

        motion_mat
    }

    #[inline]
    fn initial_velocity_std(&self, height: f32) -> [f32; 4] {
        let h = height.max(MIN_HEIGHT);
        let v = 10.0 * self.std_weight_velocity * h;

        [v, v, STD_ASPECT_VELOCITY, v]
    }

    /// Creates a zero-velocity track state from an unassociated measurement.
    pub fn initiate(&self, measurement: &BBox<Xyah>) -> (StateMean, StateCov) {
        let h = measurement.height().max(MIN_HEIGHT);
        let p = 2.0 * self.std_weight_position * h;
        let v = self.initial_velocity_std(h);

        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(&measurement.to_vector());

        let std = StateMean::from_column_slice(&[
            p,
            p,
            STD_ASPECT_POSITION,
            p,
            v[0],
            v[1],
            v[2],
            v[3],
        ]);

        (mean, StateCov::from_diagonal(&std.component_mul(&std)))
    }

    /// Advances the state by `dt` frames.
    pub fn predict(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
        dt: f32,
    ) -> (StateMean, StateCov) {
        let h = mean[3].max(MIN_HEIGHT);
        let p = self.std_weight_position * h;
        let v = self.std_weight_velocity * h;

        let std = StateMean::from_column_slice(&[
            p,
            p,
            STD_ASPECT_POSITION,
            p,
            v,
            v,
            STD_ASPECT_VELOCITY,
            v,
        ]);
        let motion_cov = StateCov::from_diagonal(&(std.component_mul(&std) * dt));
        let motion_mat = Self::motion_mat(dt);

        (
            motion_mat * mean,
            motion_mat * covariance * motion_mat.transpose() + motion_cov,
        )
    }

    /// Projects the state distribution into measurement space.
    pub fn project(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
    ) -> (ProjectedMean, ProjectedCov) {
        let p = self.std_weight_position * mean[3].max(MIN_HEIGHT);
        let std = ProjectedMean::new(p, p, STD_ASPECT_MEASUREMENT, p);
        let innovation_cov = ProjectedCov::from_diagonal(&std.component_mul(&std));

        (
            self.update_mat * mean,
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov,
        )
    }

    /// Kalman correction step.
    ///
    /// Never fails: when the innovation covariance cannot be inverted the predicted state
    /// is kept unchanged.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
        measurement: &BBox<Xyah>,
    ) -> (StateMean, StateCov) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let pht = covariance * self.update_mat.transpose();

        let kalman_gain = match projected_cov.cholesky() {
            Some(chol) => chol.solve(&pht.transpose()).transpose(),
            None => match projected_cov.try_inverse() {
                Some(inv) => pht * inv,
                None => {
                    warn!("innovation covariance is singular, skipping measurement update");
                    return (*mean, *covariance);
                }
            },
        };

        let innovation = measurement.to_vector() - projected_mean;

        (
            mean + kalman_gain * innovation,
            covariance - kalman_gain * projected_cov * kalman_gain.transpose(),
        )
    }

    /// Forgets the velocity estimate, restoring the initial velocity uncertainty.
    pub fn reset_velocity(
        &self,
        mean: &StateMean,
        covariance: &StateCov,
    ) -> (StateMean, StateCov) {
        let std = self.initial_velocity_std(mean[3]);

        let mut mean = *mean;
        let mut covariance = *covariance;

        for i in NDIM..2 * NDIM {
            mean[i] = 0.0;

            for j in 0..2 * NDIM {
                covariance[(i, j)] = 0.0;
                covariance[(j, i)] = 0.0;
            }

            covariance[(i, i)] = std[i - NDIM] * std[i - NDIM];
        }

        (mean, covariance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn initiate() {
        let kf = KalmanFilter::default();
        let (mean, covariance) = kf.initiate(&BBox::xyah(1.0, 2.0, 3.0, 4.0));

        assert_eq!(
            mean,
            StateMean::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0])
        );

        let expected = [0.16, 0.16, 1e-4, 0.16, 6.25e-2, 6.25e-2, 1e-10, 6.25e-2];
        for (i, v) in expected.iter().enumerate() {
            assert_relative_eq!(covariance[(i, i)], *v, epsilon = 1e-6);
        }
        assert_eq!(covariance[(0, 1)], 0.0);
    }

    #[test]
    fn predict_applies_constant_velocity() {
        let kf = KalmanFilter::default();
        let mean = StateMean::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let covariance = StateCov::identity();

        let (predicted, predicted_cov) = kf.predict(&mean, &covariance, 1.0);

        assert_eq!(
            predicted,
            StateMean::from_column_slice(&[6.0, 8.0, 10.0, 12.0, 5.0, 6.0, 7.0, 8.0])
        );
        assert!(predicted_cov[(0, 0)] > covariance[(0, 0)]);
        assert_relative_eq!(predicted_cov[(0, 4)], 1.0);
    }

    #[test]
    fn predict_scales_with_dt() {
        let kf = KalmanFilter::default();
        let mean = StateMean::from_column_slice(&[10.0, 10.0, 0.5, 40.0, 2.0, -1.0, 0.0, 0.0]);
        let covariance = StateCov::identity();

        let (predicted, _) = kf.predict(&mean, &covariance, 3.0);

        assert_relative_eq!(predicted[0], 16.0);
        assert_relative_eq!(predicted[1], 7.0);
        assert_relative_eq!(predicted[4], 2.0);
    }

    #[test]
    fn process_noise_grows_with_height() {
        let kf = KalmanFilter::default();
        let covariance = StateCov::zeros();
        let small = StateMean::from_column_slice(&[0.0, 0.0, 1.0, 10.0, 0.0, 0.0, 0.0, 0.0]);
        let large = StateMean::from_column_slice(&[0.0, 0.0, 1.0, 100.0, 0.0, 0.0, 0.0, 0.0]);

        let (_, small_cov) = kf.predict(&small, &covariance, 1.0);
        let (_, large_cov) = kf.predict(&large, &covariance, 1.0);

        assert!(large_cov[(0, 0)] > small_cov[(0, 0)]);
        assert!(small_cov[(4, 4)] < small_cov[(0, 0)]);
    }

    #[test]
    fn update_moves_towards_measurement() {
        let kf = KalmanFilter::default();
        let (mean, covariance) = kf.initiate(&BBox::xyah(100.0, 100.0, 1.0, 50.0));
        let (mean, covariance) = kf.predict(&mean, &covariance, 1.0);

        let (updated, updated_cov) =
            kf.update(&mean, &covariance, &BBox::xyah(110.0, 105.0, 1.0, 50.0));

        assert!(updated[0] > 100.0 && updated[0] < 110.0);
        assert!(updated[1] > 100.0 && updated[1] < 105.0);
        assert!(updated[4] > 0.0);
        assert!(updated_cov[(0, 0)] < covariance[(0, 0)]);
    }

    #[test]
    fn update_survives_zero_height() {
        let kf = KalmanFilter::default();
        let mean = StateMean::zeros();
        let covariance = StateCov::zeros();

        let (updated, updated_cov) = kf.update(&mean, &covariance, &BBox::xyah(1.0, 1.0, 1.0, 1.0));

        assert!(updated.iter().all(|v| v.is_finite()));
        assert!(updated_cov.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn reset_velocity_clears_motion() {
        let kf = KalmanFilter::default();
        let mean = StateMean::from_column_slice(&[10.0, 10.0, 0.5, 40.0, 9.0, -9.0, 0.1, 2.0]);
        let mut covariance = StateCov::identity() * 50.0;
        covariance[(0, 4)] = 20.0;
        covariance[(4, 0)] = 20.0;

        let (mean, covariance) = kf.reset_velocity(&mean, &covariance);

        assert_eq!(mean[0], 10.0);
        assert_eq!(mean[3], 40.0);
        assert!(mean.fixed_rows::<4>(4).iter().all(|v| *v == 0.0));
        assert_eq!(covariance[(0, 4)], 0.0);
        assert_eq!(covariance[(0, 0)], 50.0);
        assert_relative_eq!(covariance[(4, 4)], 6.25, epsilon = 1e-4);
    }
}
