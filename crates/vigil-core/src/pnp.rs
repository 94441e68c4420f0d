//! Perspective-n-point pose estimation for an undistorted pinhole camera.
//!
//! The solver mirrors the classic iterative approach: an algebraic initial
//! estimate (plane homography when the object points are coplanar, direct
//! linear transform otherwise) followed by Levenberg–Marquardt refinement of
//! the reprojection error. Face-mesh object points built from pixel positions
//! plus a small relative depth are almost always coplanar, so the homography
//! path is the common one.

use nalgebra::{
    DMatrix, DVector, Matrix3, Matrix3x4, Matrix4, Point2, Point3, Rotation3, SymmetricEigen,
    Vector3,
};
use thiserror::Error;

/// Smallest-to-middle scatter eigenvalue ratio below which points are treated as coplanar.
const PLANARITY_RATIO: f64 = 1e-3;
const MIN_POINTS_PLANAR: usize = 4;
const MIN_POINTS_GENERAL: usize = 6;
const MAX_ITERATIONS: usize = 20;
const MAX_DAMPING_ATTEMPTS: usize = 10;
const STEP_EPSILON: f64 = 1e-12;
const DEGENERATE_EPSILON: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("need at least {required} point correspondences, got {got}")]
    TooFewPoints { required: usize, got: usize },
    #[error("object and image point counts differ ({object} vs {image})")]
    CountMismatch { object: usize, image: usize },
    #[error("invalid camera intrinsics")]
    InvalidCamera,
    #[error("degenerate point configuration")]
    Degenerate,
    #[error("solver did not converge to a finite pose")]
    NotConverged,
}

/// Pinhole camera intrinsics with square pixels and no skew.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub focal_length: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Intrinsics for an uncalibrated webcam frame: focal length equal to the
    /// image width, principal point at `(height / 2, width / 2)`.
    pub fn approximate(width: u32, height: u32) -> Self {
        Self {
            focal_length: width as f64,
            cx: height as f64 / 2.0,
            cy: width as f64 / 2.0,
        }
    }

    fn normalize(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::new(
            (p.x - self.cx) / self.focal_length,
            (p.y - self.cy) / self.focal_length,
        )
    }
}

/// Rigid transform from object coordinates to camera coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    fn is_finite(&self) -> bool {
        self.rotation.matrix().iter().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }
}

/// Estimate the camera pose from 3-D object points and their pixel projections.
pub fn solve_pnp(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraIntrinsics,
) -> Result<Pose, PoseError> {
    if object.len() != image.len() {
        return Err(PoseError::CountMismatch {
            object: object.len(),
            image: image.len(),
        });
    }
    if object.len() < MIN_POINTS_PLANAR {
        return Err(PoseError::TooFewPoints {
            required: MIN_POINTS_PLANAR,
            got: object.len(),
        });
    }
    if !(camera.focal_length.is_finite() && camera.focal_length > 0.0)
        || !camera.cx.is_finite()
        || !camera.cy.is_finite()
    {
        return Err(PoseError::InvalidCamera);
    }

    let normalized: Vec<Point2<f64>> = image.iter().map(|p| camera.normalize(p)).collect();

    let initial = initial_pose(object, &normalized)?;
    let refined = refine(object, &normalized, initial);

    if !refined.is_finite() {
        return Err(PoseError::NotConverged);
    }
    Ok(refined)
}

/// Decompose a rotation matrix into Euler angles (degrees) via Givens RQ decomposition.
///
/// Returns `(x, y, z)` rotation angles such that the matrix equals
/// `Qz^T * Qy^T * Qx^T` for the three elementary Givens rotations.
pub fn rq_euler_degrees(m: &Matrix3<f64>) -> Vector3<f64> {
    let (s, c) = givens(m[(2, 1)], m[(2, 2)]);
    let qx = Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c);
    let r = m * qx;

    let (s, c) = givens(-r[(2, 0)], r[(2, 2)]);
    let qy = Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c);
    let r = r * qy;

    // Each step leaves the diagonal entry it pivots on non-negative, so R11
    // and R22 never go negative and no 180° correction of Qx, Qy or Qz applies.
    let (s, c) = givens(r[(1, 0)], r[(1, 1)]);
    let qz = Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0);

    Vector3::new(
        signed_angle(qx[(1, 1)], qx[(1, 2)]),
        signed_angle(qy[(0, 0)], qy[(2, 0)]),
        signed_angle(qz[(0, 0)], qz[(0, 1)]),
    )
}

fn givens(s: f64, c: f64) -> (f64, f64) {
    let z = 1.0 / (c * c + s * s + f64::EPSILON).sqrt();
    (s * z, c * z)
}

fn signed_angle(cos: f64, sin: f64) -> f64 {
    let angle = cos.clamp(-1.0, 1.0).acos().to_degrees();
    if sin >= 0.0 {
        angle
    } else {
        -angle
    }
}

fn initial_pose(object: &[Point3<f64>], normalized: &[Point2<f64>]) -> Result<Pose, PoseError> {
    let n = object.len() as f64;
    let centroid = object
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;

    let mut scatter = Matrix3::zeros();
    for p in object {
        let d = p.coords - centroid;
        scatter += d * d.transpose();
    }

    let svd = scatter.svd(false, true);
    let v_t = svd.v_t.ok_or(PoseError::Degenerate)?;
    let values = svd.singular_values;

    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    let (w0, w1, w2) = (values[order[0]], values[order[1]], values[order[2]]);

    if !(w0 > DEGENERATE_EPSILON) || w1 <= w0 * DEGENERATE_EPSILON {
        return Err(PoseError::Degenerate);
    }

    if w2 / w1 < PLANARITY_RATIO {
        let axes = Matrix3::from_rows(&[
            v_t.row(order[0]).into_owned(),
            v_t.row(order[1]).into_owned(),
            v_t.row(order[2]).into_owned(),
        ]);
        planar_pose(object, normalized, &centroid, axes)
    } else {
        if object.len() < MIN_POINTS_GENERAL {
            return Err(PoseError::TooFewPoints {
                required: MIN_POINTS_GENERAL,
                got: object.len(),
            });
        }
        dlt_pose(object, normalized)
    }
}

/// Initial pose for coplanar object points from the plane-to-image homography.
fn planar_pose(
    object: &[Point3<f64>],
    normalized: &[Point2<f64>],
    centroid: &Vector3<f64>,
    axes: Matrix3<f64>,
) -> Result<Pose, PoseError> {
    let mut plane_rotation = if axes[(0, 2)].powi(2) + axes[(1, 2)].powi(2) < 1e-10 {
        Matrix3::identity()
    } else {
        axes
    };
    if plane_rotation.determinant() < 0.0 {
        plane_rotation = -plane_rotation;
    }
    let plane_translation = -(plane_rotation * centroid);

    let plane_points: Vec<Point2<f64>> = object
        .iter()
        .map(|p| {
            let q = plane_rotation * p.coords + plane_translation;
            Point2::new(q.x, q.y)
        })
        .collect();

    let h = homography(&plane_points, normalized)?;
    let h1: Vector3<f64> = h.column(0).into_owned();
    let h2: Vector3<f64> = h.column(1).into_owned();
    let h3: Vector3<f64> = h.column(2).into_owned();

    let n1 = h1.norm();
    let n2 = h2.norm();
    if n1 < DEGENERATE_EPSILON || n2 < DEGENERATE_EPSILON {
        return Err(PoseError::Degenerate);
    }

    let r1 = h1 / n1;
    let r2 = h2 / n2;
    let r3 = r1.cross(&r2);
    let t = h3 / (n1 * n2).sqrt();

    let rotation = nearest_rotation(&Matrix3::from_columns(&[r1, r2, r3]))?;

    Ok(Pose {
        rotation: Rotation3::from_matrix_unchecked(rotation * plane_rotation),
        translation: rotation * plane_translation + t,
    })
}

/// Initial pose for general (non-coplanar) object points via the direct linear transform.
fn dlt_pose(object: &[Point3<f64>], normalized: &[Point2<f64>]) -> Result<Pose, PoseError> {
    let (object_transform, object_n) = normalize_object(object)?;
    let (_, image_inverse, image_n) = normalize_image(normalized)?;

    let mut a = DMatrix::<f64>::zeros(2 * object.len(), 12);
    for (i, (p, m)) in object_n.iter().zip(&image_n).enumerate() {
        let (x, y, z) = (p.x, p.y, p.z);
        let (u, v) = (m.x, m.y);
        set_row(
            &mut a,
            2 * i,
            [x, y, z, 1.0, 0.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u * z, -u],
        );
        set_row(
            &mut a,
            2 * i + 1,
            [0.0, 0.0, 0.0, 0.0, x, y, z, 1.0, -v * x, -v * y, -v * z, -v],
        );
    }

    let p = null_vector(&a)?;
    let projection = image_inverse * Matrix3x4::from_row_slice(p.as_slice()) * object_transform;

    let mut m: Matrix3<f64> = projection.fixed_view::<3, 3>(0, 0).into_owned();
    let mut t: Vector3<f64> = projection.column(3).into_owned();
    if m.determinant() < 0.0 {
        m = -m;
        t = -t;
    }

    let scale_sum = m.svd(false, false).singular_values.sum();
    if !(scale_sum.is_finite() && scale_sum > DEGENERATE_EPSILON) {
        return Err(PoseError::Degenerate);
    }
    let scale = 3.0 / scale_sum;

    let rotation = nearest_rotation(&m)?;
    Ok(Pose {
        rotation: Rotation3::from_matrix_unchecked(rotation),
        translation: t * scale,
    })
}

/// Homography mapping `src` onto `dst`, normalized so that `H[2][2] == 1`.
fn homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Result<Matrix3<f64>, PoseError> {
    let (src_transform, _, src_n) = normalize_image(src)?;
    let (_, dst_inverse, dst_n) = normalize_image(dst)?;

    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (i, (s, d)) in src_n.iter().zip(&dst_n).enumerate() {
        let (x, y) = (s.x, s.y);
        let (u, v) = (d.x, d.y);
        set_row(&mut a, 2 * i, [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u]);
        set_row(&mut a, 2 * i + 1, [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v]);
    }

    let h = null_vector(&a)?;
    let h = dst_inverse * Matrix3::from_row_slice(h.as_slice()) * src_transform;

    let scale = h[(2, 2)];
    if !scale.is_finite() || scale.abs() < DEGENERATE_EPSILON {
        return Err(PoseError::Degenerate);
    }
    Ok(h / scale)
}

/// Unit vector minimising `|A x|`: eigenvector of `AᵀA` with the smallest eigenvalue.
fn null_vector(a: &DMatrix<f64>) -> Result<DVector<f64>, PoseError> {
    let ata = a.transpose() * a;
    let eigen = SymmetricEigen::new(ata);
    let smallest = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.total_cmp(y))
        .map(|(i, _)| i)
        .ok_or(PoseError::Degenerate)?;
    let v = eigen.eigenvectors.column(smallest).into_owned();
    if v.iter().all(|x| x.is_finite()) {
        Ok(v)
    } else {
        Err(PoseError::Degenerate)
    }
}

/// Closest proper rotation to `m` in the Frobenius sense.
fn nearest_rotation(m: &Matrix3<f64>) -> Result<Matrix3<f64>, PoseError> {
    let svd = m.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(PoseError::Degenerate);
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        for i in 0..3 {
            u[(i, 2)] = -u[(i, 2)];
        }
        r = u * v_t;
    }
    Ok(r)
}

/// Hartley normalization: centroid to origin, mean distance √2.
///
/// Returns the transform, its inverse and the transformed points.
fn normalize_image(
    points: &[Point2<f64>],
) -> Result<(Matrix3<f64>, Matrix3<f64>, Vec<Point2<f64>>), PoseError> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if !(mean_dist.is_finite() && mean_dist > DEGENERATE_EPSILON) {
        return Err(PoseError::Degenerate);
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let transform = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let inverse = Matrix3::new(1.0 / s, 0.0, cx, 0.0, 1.0 / s, cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Ok((transform, inverse, normalized))
}

/// Object-space normalization: centroid to origin, mean distance √3.
fn normalize_object(points: &[Point3<f64>]) -> Result<(Matrix4<f64>, Vec<Point3<f64>>), PoseError> {
    let n = points.len() as f64;
    let c = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords)
        / n;
    let mean_dist = points.iter().map(|p| (p.coords - c).norm()).sum::<f64>() / n;
    if !(mean_dist.is_finite() && mean_dist > DEGENERATE_EPSILON) {
        return Err(PoseError::Degenerate);
    }

    let s = 3.0f64.sqrt() / mean_dist;
    #[rustfmt::skip]
    let transform = Matrix4::new(
        s, 0.0, 0.0, -s * c.x,
        0.0, s, 0.0, -s * c.y,
        0.0, 0.0, s, -s * c.z,
        0.0, 0.0, 0.0, 1.0,
    );
    let normalized = points
        .iter()
        .map(|p| Point3::from((p.coords - c) * s))
        .collect();
    Ok((transform, normalized))
}

fn set_row<const N: usize>(a: &mut DMatrix<f64>, row: usize, values: [f64; N]) {
    for (col, value) in values.into_iter().enumerate() {
        a[(row, col)] = value;
    }
}

/// Levenberg–Marquardt refinement of `(rvec, tvec)` against normalized image points.
fn refine(object: &[Point3<f64>], normalized: &[Point2<f64>], initial: Pose) -> Pose {
    let scaled_axis = initial.rotation.scaled_axis();
    let mut params = DVector::from_vec(vec![
        scaled_axis.x,
        scaled_axis.y,
        scaled_axis.z,
        initial.translation.x,
        initial.translation.y,
        initial.translation.z,
    ]);
    let mut cost = residuals(object, normalized, &params).norm_squared();
    if !cost.is_finite() {
        return initial;
    }
    let mut lambda = 1e-3;

    for _ in 0..MAX_ITERATIONS {
        let r = residuals(object, normalized, &params);
        let j = jacobian(object, normalized, &params);
        let jtj = j.transpose() * &j;
        let neg_jtr = -(j.transpose() * r);

        let mut improved = false;
        for _ in 0..MAX_DAMPING_ATTEMPTS {
            let mut damped = jtj.clone();
            for i in 0..6 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(step) = damped.cholesky().map(|c| c.solve(&neg_jtr)) else {
                lambda *= 10.0;
                continue;
            };

            let candidate = &params + &step;
            let candidate_cost = residuals(object, normalized, &candidate).norm_squared();
            if candidate_cost < cost {
                params = candidate;
                cost = candidate_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = step.norm() > STEP_EPSILON;
                break;
            }
            lambda *= 10.0;
        }

        if !improved {
            break;
        }
    }

    pose_from_params(&params)
}

fn pose_from_params(params: &DVector<f64>) -> Pose {
    Pose {
        rotation: Rotation3::from_scaled_axis(Vector3::new(params[0], params[1], params[2])),
        translation: Vector3::new(params[3], params[4], params[5]),
    }
}

fn residuals(
    object: &[Point3<f64>],
    normalized: &[Point2<f64>],
    params: &DVector<f64>,
) -> DVector<f64> {
    let pose = pose_from_params(params);
    let mut r = DVector::zeros(2 * object.len());
    for (i, (p, m)) in object.iter().zip(normalized).enumerate() {
        let c = pose.rotation * p.coords + pose.translation;
        r[2 * i] = c.x / c.z - m.x;
        r[2 * i + 1] = c.y / c.z - m.y;
    }
    r
}

/// Central-difference Jacobian of the residuals with respect to the six pose parameters.
fn jacobian(
    object: &[Point3<f64>],
    normalized: &[Point2<f64>],
    params: &DVector<f64>,
) -> DMatrix<f64> {
    let mut j = DMatrix::zeros(2 * object.len(), 6);
    for k in 0..6 {
        let h = 1e-7 * params[k].abs().max(1.0);
        let mut plus = params.clone();
        let mut minus = params.clone();
        plus[k] += h;
        minus[k] -= h;
        let column = (residuals(object, normalized, &plus) - residuals(object, normalized, &minus))
            / (2.0 * h);
        j.set_column(k, &column);
    }
    j
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAMERA: CameraIntrinsics = CameraIntrinsics {
        focal_length: 640.0,
        cx: 240.0,
        cy: 320.0,
    };

    fn project(points: &[Point3<f64>], rotation: &Rotation3<f64>, t: &Vector3<f64>) -> Vec<Point2<f64>> {
        points
            .iter()
            .map(|p| {
                let c = rotation * p.coords + t;
                Point2::new(
                    CAMERA.focal_length * c.x / c.z + CAMERA.cx,
                    CAMERA.focal_length * c.y / c.z + CAMERA.cy,
                )
            })
            .collect()
    }

    fn face_points_3d() -> Vec<Point3<f64>> {
        vec![
            Point3::new(-30.0, -30.0, 10.0),
            Point3::new(30.0, -28.0, 12.0),
            Point3::new(0.0, 0.0, 40.0),
            Point3::new(-25.0, 30.0, 5.0),
            Point3::new(25.0, 31.0, 0.0),
            Point3::new(2.0, 55.0, -10.0),
            Point3::new(-40.0, 5.0, -5.0),
            Point3::new(41.0, 8.0, 20.0),
        ]
    }

    fn face_points_planar() -> Vec<Point3<f64>> {
        vec![
            Point3::new(-32.0, -30.0, 0.0),
            Point3::new(32.0, -30.0, 0.0),
            Point3::new(0.0, 5.0, 0.0),
            Point3::new(-20.0, 30.0, 0.0),
            Point3::new(20.0, 30.0, 0.0),
            Point3::new(0.0, 60.0, 0.0),
        ]
    }

    #[test]
    fn test_recovers_general_pose() {
        let object = face_points_3d();
        let rotation = Rotation3::from_euler_angles(0.1, -0.25, 0.05);
        let t = Vector3::new(5.0, -3.0, 400.0);
        let image = project(&object, &rotation, &t);

        let pose = solve_pnp(&object, &image, &CAMERA).unwrap();
        assert!(pose.rotation.angle_to(&rotation) < 1e-6);
        assert!((pose.translation - t).norm() < 1e-3);
    }

    #[test]
    fn test_recovers_planar_pose() {
        let object = face_points_planar();
        let rotation = Rotation3::from_euler_angles(0.2, -0.3, 0.1);
        let t = Vector3::new(10.0, -5.0, 500.0);
        let image = project(&object, &rotation, &t);

        let pose = solve_pnp(&object, &image, &CAMERA).unwrap();
        assert!(pose.rotation.angle_to(&rotation) < 1e-6);
        assert!((pose.translation - t).norm() < 1e-3);
    }

    #[test]
    fn test_identity_when_object_matches_image() {
        // Object points equal to the pixel positions with zero depth are explained
        // by the camera looking straight at the image plane.
        let image: Vec<Point2<f64>> = vec![
            Point2::new(224.0, 192.0),
            Point2::new(409.0, 192.0),
            Point2::new(320.0, 264.0),
            Point2::new(268.0, 336.0),
            Point2::new(371.0, 336.0),
            Point2::new(320.0, 408.0),
        ];
        let object: Vec<Point3<f64>> = image.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect();

        let pose = solve_pnp(&object, &image, &CAMERA).unwrap();
        assert!(pose.rotation.angle() < 1e-7);
        assert!((pose.translation - Vector3::new(-240.0, -320.0, 640.0)).norm() < 1e-4);
    }

    #[test]
    fn test_rejects_too_few_points() {
        let object = vec![Point3::origin(); 3];
        let image = vec![Point2::origin(); 3];
        let err = solve_pnp(&object, &image, &CAMERA).unwrap_err();
        assert!(matches!(err, PoseError::TooFewPoints { required: 4, got: 3 }));
    }

    #[test]
    fn test_rejects_count_mismatch() {
        let object = vec![Point3::origin(); 6];
        let image = vec![Point2::origin(); 5];
        let err = solve_pnp(&object, &image, &CAMERA).unwrap_err();
        assert!(matches!(err, PoseError::CountMismatch { object: 6, image: 5 }));
    }

    #[test]
    fn test_coincident_points_are_degenerate() {
        let object = vec![Point3::new(1.0, 2.0, 3.0); 6];
        let image = vec![Point2::new(100.0, 100.0); 6];
        assert_eq!(
            solve_pnp(&object, &image, &CAMERA).unwrap_err(),
            PoseError::Degenerate
        );
    }

    #[test]
    fn test_collinear_points_are_degenerate() {
        let object: Vec<Point3<f64>> = (0..6)
            .map(|i| Point3::new(i as f64, 2.0 * i as f64, 0.0))
            .collect();
        let image: Vec<Point2<f64>> = (0..6)
            .map(|i| Point2::new(100.0 + i as f64, 100.0 + 2.0 * i as f64))
            .collect();
        assert_eq!(
            solve_pnp(&object, &image, &CAMERA).unwrap_err(),
            PoseError::Degenerate
        );
    }

    #[test]
    fn test_rejects_invalid_camera() {
        let object = face_points_planar();
        let image = vec![Point2::new(1.0, 1.0); object.len()];
        let camera = CameraIntrinsics {
            focal_length: 0.0,
            ..CAMERA
        };
        assert_eq!(
            solve_pnp(&object, &image, &camera).unwrap_err(),
            PoseError::InvalidCamera
        );
    }

    #[test]
    fn test_rq_euler_single_axis() {
        let angle = 12.0f64;
        let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), angle.to_radians());
        let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), angle.to_radians());
        let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), -angle.to_radians());

        let ex = rq_euler_degrees(rx.matrix());
        assert!((ex.x - angle).abs() < 1e-5);
        assert!(ex.y.abs() < 1e-5 && ex.z.abs() < 1e-5);

        let ey = rq_euler_degrees(ry.matrix());
        assert!((ey.y - angle).abs() < 1e-5);
        assert!(ey.x.abs() < 1e-5 && ey.z.abs() < 1e-5);

        let ez = rq_euler_degrees(rz.matrix());
        assert!((ez.z + angle).abs() < 1e-5);
        assert!(ez.x.abs() < 1e-5 && ez.y.abs() < 1e-5);
    }

    #[test]
    fn test_rq_euler_recovers_large_rotations() {
        for x in [-179.0f64, -150.0, -95.0, 0.0, 45.0, 120.0, 179.0] {
            for y in [-89.0f64, -60.0, 0.0, 35.0, 89.0] {
                for z in [-179.0f64, -135.0, 0.0, 90.0, 179.0] {
                    let m = Rotation3::from_euler_angles(x.to_radians(), y.to_radians(), z.to_radians());
                    let e = rq_euler_degrees(m.matrix());
                    assert!(
                        (e - Vector3::new(x, y, z)).amax() < 1e-3,
                        "({x}, {y}, {z}) decomposed to {e:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_rq_euler_identity_is_zero() {
        let e = rq_euler_degrees(&Matrix3::identity());
        assert!(e.norm() < 1e-5);
    }

    #[test]
    fn test_approximate_intrinsics() {
        let camera = CameraIntrinsics::approximate(640, 480);
        assert_eq!(camera.focal_length, 640.0);
        assert_eq!(camera.cx, 240.0);
        assert_eq!(camera.cy, 320.0);
    }
}
