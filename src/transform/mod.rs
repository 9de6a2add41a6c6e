//! 坐标系变换
//!
//! 约定：`frame_a2b` 表示坐标系 B 在坐标系 A 中的位姿，
//! 即把 B 中的点变换到 A 中。因此 `frame_work2cam` 的平移就是相机在工作坐标系下的位置，
//! 平齐后的第 11 个元素是相机高度。

mod grasp;

pub use grasp::{transform_grasp, GraspLayout};

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::Rng;

use crate::config::FRAME_LEN;
use crate::error::{PipelineError, Result};
use crate::global_cast::FlatFrame;
use crate::utility::Utility;

/// 刚体齐次变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame(pub Isometry3<f64>);

impl Default for Frame {
    fn default() -> Self {
        Self::identity()
    }
}

impl Frame {
    pub fn identity() -> Self {
        Self(Isometry3::identity())
    }

    /// 从行优先的 3x4 矩阵（12 个元素）构造
    pub fn from_flat(values: &[f64]) -> Result<Self> {
        if values.len() != FRAME_LEN {
            return Err(PipelineError::ShapeMismatch {
                field: "frame".to_string(),
                expected: FRAME_LEN,
                found: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::schema("frame contains non-finite values"));
        }
        let mut flat = [0.0; FRAME_LEN];
        flat.copy_from_slice(values);
        Ok(FlatFrame(flat).into())
    }

    pub fn to_flat(&self) -> [f64; FRAME_LEN] {
        FlatFrame::from(*self).0
    }

    #[cfg(test)]
    pub fn translation(&self) -> Vector3<f64> {
        self.0.translation.vector
    }

    /// 平移的 z 分量
    #[inline]
    pub fn height(&self) -> f64 {
        self.0.translation.vector.z
    }

    pub fn inverse(&self) -> Self {
        Self(self.0.inverse())
    }

    /// `self` 为 A2B，`other` 为 B2C，结果为 A2C
    pub fn compose(&self, other: &Frame) -> Self {
        Self(self.0 * other.0)
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.0.transform_point(p)
    }

    /// 只旋转，不平移（法向量、方向）
    pub fn transform_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.0.transform_vector(v)
    }

    #[cfg(test)]
    pub fn approx_eq(&self, other: &Frame, eps: f64) -> bool {
        self.to_flat()
            .iter()
            .zip(other.to_flat().iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

pub fn invert(frame: &Frame) -> Frame {
    frame.inverse()
}

#[allow(dead_code)]
pub fn compose(frame_ab: &Frame, frame_bc: &Frame) -> Frame {
    frame_ab.compose(frame_bc)
}

/// 在 `base` 附近随机生成一个相机位姿。
///
/// 先在 `base` 自身坐标系下做局部旋转，再绕工作坐标系原点做全局旋转，
/// 最后沿新位姿的视线方向（局部 z 轴）偏移 `base_offset ± offset_mag`。
pub fn randomize_pose<R: Rng + ?Sized>(
    base: &Frame,
    local_rot: [f64; 3],
    global_rot: [f64; 3],
    base_offset: f64,
    offset_mag: f64,
    rng: &mut R,
) -> Frame {
    let local = Utility::random_rotation(local_rot, rng);
    let global = Utility::random_rotation(global_rot, rng);
    let offset = base_offset + Utility::uniform_sym(offset_mag, rng);

    let local = Isometry3::from_parts(Translation3::identity(), local);
    let global = Isometry3::from_parts(Translation3::identity(), global);
    let mut pose = global * base.0 * local;

    let view_axis = pose.rotation * Vector3::z();
    pose.translation.vector += view_axis * offset;
    Frame(pose)
}

impl From<UnitQuaternion<f64>> for Frame {
    fn from(rotation: UnitQuaternion<f64>) -> Self {
        Self(Isometry3::from_parts(Translation3::identity(), rotation))
    }
}
