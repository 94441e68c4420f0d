//! Geometric features from face-mesh landmarks.
//!
//! Produces head pose (pitch, yaw, roll) from a six-point perspective-n-point
//! fit and the eye / mouth aspect ratios used by the action verifier and the
//! liveness aggregator. Landmarks are normalized; every distance is measured
//! in pixels after scaling by the frame dimensions.

use nalgebra::{Point2, Point3};
use thiserror::Error;

use crate::pnp::{self, CameraIntrinsics, PoseError};
use crate::types::{FaceRatios, Landmark, LandmarkSet, PoseAngles};

/// Number of points in a face-mesh landmark set.
pub const MIN_LANDMARKS: usize = 468;

/// Eye corners, nose tip, mouth corners and chin.
const POSE_LANDMARKS: [usize; 6] = [33, 262, 1, 61, 291, 199];

/// Scale applied to the decomposed Euler angles. The object points are the
/// image points plus relative depth, so the fitted rotation is small.
const EULER_SCALE: f64 = 360.0;

struct EyeLandmarks {
    top: usize,
    bottom: usize,
    outer: usize,
    inner: usize,
}

const LEFT_EYE: EyeLandmarks = EyeLandmarks {
    top: 159,
    bottom: 145,
    outer: 33,
    inner: 133,
};

const RIGHT_EYE: EyeLandmarks = EyeLandmarks {
    top: 386,
    bottom: 374,
    outer: 263,
    inner: 362,
};

const MOUTH_TOP: usize = 13;
const MOUTH_BOTTOM: usize = 14;
const MOUTH_LEFT: usize = 61;
const MOUTH_RIGHT: usize = 291;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("invalid landmarks: expected at least {expected} points, got {got}")]
    InvalidLandmarks { expected: usize, got: usize },
    #[error("invalid landmarks: point {index} is not finite")]
    NonFiniteLandmark { index: usize },
    #[error("invalid landmarks: {feature} has zero width")]
    DegenerateFeature { feature: &'static str },
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("pose estimation failed: {0}")]
    PoseEstimationFailed(#[from] PoseError),
}

/// Landmarks of one face bound to the pixel dimensions of its frame.
#[derive(Debug, Clone, Copy)]
pub struct FaceGeometry<'a> {
    landmarks: &'a LandmarkSet,
    width: u32,
    height: u32,
}

impl<'a> FaceGeometry<'a> {
    pub fn new(landmarks: &'a LandmarkSet, width: u32, height: u32) -> Result<Self, GeometryError> {
        if landmarks.len() < MIN_LANDMARKS {
            return Err(GeometryError::InvalidLandmarks {
                expected: MIN_LANDMARKS,
                got: landmarks.len(),
            });
        }
        if width == 0 || height == 0 {
            return Err(GeometryError::InvalidDimensions { width, height });
        }
        if let Some(index) = landmarks
            .points()
            .iter()
            .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
        {
            return Err(GeometryError::NonFiniteLandmark { index });
        }
        Ok(Self {
            landmarks,
            width,
            height,
        })
    }

    fn landmark(&self, index: usize) -> Landmark {
        // Length checked in `new` against MIN_LANDMARKS, which covers every index used here.
        self.landmarks.points()[index]
    }

    fn pixel(&self, index: usize) -> Point2<f64> {
        let lm = self.landmark(index);
        Point2::new(
            lm.x as f64 * self.width as f64,
            lm.y as f64 * self.height as f64,
        )
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        nalgebra::distance(&self.pixel(a), &self.pixel(b))
    }

    fn ratio(&self, gap: (usize, usize), span: (usize, usize), feature: &'static str) -> Result<f64, GeometryError> {
        let width = self.distance(span.0, span.1);
        if !(width > 0.0) {
            return Err(GeometryError::DegenerateFeature { feature });
        }
        let ratio = self.distance(gap.0, gap.1) / width;
        if !ratio.is_finite() {
            return Err(GeometryError::DegenerateFeature { feature });
        }
        Ok(ratio)
    }

    /// Head pitch, yaw and roll in degrees.
    pub fn head_pose(&self) -> Result<PoseAngles, GeometryError> {
        let w = self.width as f64;
        let h = self.height as f64;

        let mut image_points = Vec::with_capacity(POSE_LANDMARKS.len());
        let mut object_points = Vec::with_capacity(POSE_LANDMARKS.len());
        for index in POSE_LANDMARKS {
            let lm = self.landmark(index);
            let px = (lm.x as f64 * w).trunc();
            let py = (lm.y as f64 * h).trunc();
            image_points.push(Point2::new(px, py));
            object_points.push(Point3::new(px, py, lm.z as f64));
        }

        let camera = CameraIntrinsics::approximate(self.width, self.height);
        let pose = pnp::solve_pnp(&object_points, &image_points, &camera)?;
        let euler = pnp::rq_euler_degrees(pose.rotation.matrix());

        Ok(PoseAngles {
            pitch: euler.x * EULER_SCALE,
            yaw: euler.y * EULER_SCALE,
            roll: euler.z * EULER_SCALE,
        })
    }

    /// Eye aspect ratio (lid gap over corner distance) for the left and right eye.
    pub fn eye_aspect_ratios(&self) -> Result<(f64, f64), GeometryError> {
        let left = self.ratio(
            (LEFT_EYE.top, LEFT_EYE.bottom),
            (LEFT_EYE.outer, LEFT_EYE.inner),
            "left eye",
        )?;
        let right = self.ratio(
            (RIGHT_EYE.top, RIGHT_EYE.bottom),
            (RIGHT_EYE.inner, RIGHT_EYE.outer),
            "right eye",
        )?;
        Ok((left, right))
    }

    /// Mouth aspect ratio (lip gap over corner distance).
    pub fn mouth_aspect_ratio(&self) -> Result<f64, GeometryError> {
        self.ratio((MOUTH_TOP, MOUTH_BOTTOM), (MOUTH_LEFT, MOUTH_RIGHT), "mouth")
    }

    pub fn ratios(&self) -> Result<FaceRatios, GeometryError> {
        let (left_ear, right_ear) = self.eye_aspect_ratios()?;
        let mar = self.mouth_aspect_ratio()?;
        Ok(FaceRatios {
            left_ear,
            right_ear,
            mar,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{face, turned_face, HEIGHT, WIDTH};
    use super::*;

    #[test]
    fn test_rejects_short_landmark_set() {
        let set = LandmarkSet::new(vec![Landmark::default(); 10]);
        let err = FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap_err();
        assert_eq!(
            err,
            GeometryError::InvalidLandmarks {
                expected: MIN_LANDMARKS,
                got: 10
            }
        );
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        let set = face(0.3, 0.1);
        assert!(matches!(
            FaceGeometry::new(&set, 0, HEIGHT),
            Err(GeometryError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_eye_aspect_ratios() {
        let set = face(0.30, 0.1);
        let geometry = FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap();
        let (left, right) = geometry.eye_aspect_ratios().unwrap();
        assert!((left - 0.30).abs() < 1e-4);
        assert!((right - 0.30).abs() < 1e-4);
    }

    #[test]
    fn test_mouth_aspect_ratio() {
        let set = face(0.30, 0.55);
        let geometry = FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap();
        assert!((geometry.mouth_aspect_ratio().unwrap() - 0.55).abs() < 1e-4);
    }

    #[test]
    fn test_ratios_scale_with_frame_dimensions() {
        // The same normalized lid gap reads as a wider-open eye on a taller frame.
        let set = face(0.30, 0.1);
        let tall = FaceGeometry::new(&set, WIDTH, HEIGHT * 2).unwrap();
        let (left, _) = tall.eye_aspect_ratios().unwrap();
        assert!((left - 0.60).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_eye_width() {
        let mut points = face(0.3, 0.1).points().to_vec();
        points[133] = points[33];
        let set = LandmarkSet::new(points);
        let geometry = FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap();
        assert_eq!(
            geometry.eye_aspect_ratios().unwrap_err(),
            GeometryError::DegenerateFeature {
                feature: "left eye"
            }
        );
    }

    #[test]
    fn test_rejects_non_finite_landmark() {
        let mut points = face(0.3, 0.1).points().to_vec();
        points[159] = Landmark::new(0.40, f32::NAN, 0.0);
        let set = LandmarkSet::new(points);
        assert_eq!(
            FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap_err(),
            GeometryError::NonFiniteLandmark { index: 159 }
        );

        let mut points = face(0.3, 0.1).points().to_vec();
        points[1].z = f32::INFINITY;
        let set = LandmarkSet::new(points);
        assert!(matches!(
            FaceGeometry::new(&set, WIDTH, HEIGHT),
            Err(GeometryError::NonFiniteLandmark { index: 1 })
        ));
    }

    #[test]
    fn test_frontal_face_has_near_zero_pose() {
        let set = face(0.3, 0.1);
        let geometry = FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap();
        let pose = geometry.head_pose().unwrap();
        assert!(pose.pitch.abs() < 0.5, "pitch {}", pose.pitch);
        assert!(pose.yaw.abs() < 0.5, "yaw {}", pose.yaw);
        assert!(pose.roll.abs() < 0.5, "roll {}", pose.roll);
    }

    #[test]
    fn test_depth_profile_turns_head() {
        let left = turned_face(0.3, 0.1, -1.0);
        let pose = FaceGeometry::new(&left, WIDTH, HEIGHT).unwrap().head_pose().unwrap();
        assert!(pose.yaw < -25.0 && pose.yaw > -40.0, "yaw {}", pose.yaw);
        assert!(pose.pitch.abs() < 2.0, "pitch {}", pose.pitch);
        assert!(pose.roll.abs() < 2.0, "roll {}", pose.roll);

        let right = turned_face(0.3, 0.1, 1.0);
        let pose = FaceGeometry::new(&right, WIDTH, HEIGHT).unwrap().head_pose().unwrap();
        assert!(pose.yaw > 25.0 && pose.yaw < 40.0, "yaw {}", pose.yaw);
    }

    #[test]
    fn test_yaw_grows_with_depth_gradient() {
        let yaw = |gradient: f64| {
            let set = turned_face(0.3, 0.1, gradient);
            FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap().head_pose().unwrap().yaw
        };
        let (slight, strong) = (yaw(-0.2), yaw(-1.0));
        assert!(slight < 0.0 && slight > -20.0, "yaw {slight}");
        assert!(strong < slight);
    }

    #[test]
    fn test_collapsed_pose_points_fail() {
        let mut points = face(0.3, 0.1).points().to_vec();
        for index in POSE_LANDMARKS {
            points[index] = Landmark::new(0.5, 0.5, 0.0);
        }
        let set = LandmarkSet::new(points);
        let geometry = FaceGeometry::new(&set, WIDTH, HEIGHT).unwrap();
        assert!(matches!(
            geometry.head_pose(),
            Err(GeometryError::PoseEstimationFailed(PoseError::Degenerate))
        ));
    }
}
