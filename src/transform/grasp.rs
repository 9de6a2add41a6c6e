use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::Frame;
use crate::error::{PipelineError, Result};

/// 抓取描述向量中位姿相关字段的位置。
///
/// 每个接触点占 3 个元素。`points_offset` 处为接触点位置（旋转 + 平移），
/// `normals_offset` 处为接触法向（只旋转）。其余元素保持不变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraspLayout {
    pub num_contacts: usize,
    pub points_offset: usize,
    pub normals_offset: Option<usize>,
}

impl Default for GraspLayout {
    fn default() -> Self {
        Self {
            num_contacts: 3,
            points_offset: 0,
            normals_offset: Some(9),
        }
    }
}

impl GraspLayout {
    /// 描述向量的最小长度
    pub fn required_len(&self) -> usize {
        let span = 3 * self.num_contacts;
        let points_end = self.points_offset + span;
        match self.normals_offset {
            Some(offset) => points_end.max(offset + span),
            None => points_end,
        }
    }
}

/// 把工作坐标系下的抓取描述转换到新坐标系下。
///
/// `frame` 为 `frame_cam2work` 时，结果为相机坐标系下的抓取。
pub fn transform_grasp(frame: &Frame, grasp: &[f64], layout: &GraspLayout) -> Result<Vec<f64>> {
    let required = layout.required_len();
    if grasp.len() < required {
        return Err(PipelineError::schema(format!(
            "grasp descriptor has {} values, layout needs {}",
            grasp.len(),
            required
        )));
    }

    let mut out = grasp.to_vec();
    for c in 0..layout.num_contacts {
        let i = layout.points_offset + 3 * c;
        let p = frame.transform_point(&Point3::new(grasp[i], grasp[i + 1], grasp[i + 2]));
        out[i..i + 3].copy_from_slice(&[p.x, p.y, p.z]);
    }
    if let Some(offset) = layout.normals_offset {
        for c in 0..layout.num_contacts {
            let i = offset + 3 * c;
            let n = frame.transform_vector(&Vector3::new(grasp[i], grasp[i + 1], grasp[i + 2]));
            out[i..i + 3].copy_from_slice(&[n.x, n.y, n.z]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Isometry3, UnitQuaternion};

    fn grasp_fixture() -> Vec<f64> {
        // 3 个接触点、3 个法向，再加两个关节标量
        let mut g: Vec<f64> = (0..18).map(|i| i as f64 * 0.1).collect();
        g.extend_from_slice(&[0.5, -0.25]);
        g
    }

    #[test]
    fn identity_is_noop() {
        let grasp = grasp_fixture();
        let out = transform_grasp(&Frame::identity(), &grasp, &GraspLayout::default()).unwrap();
        for (a, b) in out.iter().zip(grasp.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn normals_ignore_translation() {
        let frame = Frame(Isometry3::translation(1.0, 2.0, 3.0));
        let grasp = grasp_fixture();
        let out = transform_grasp(&frame, &grasp, &GraspLayout::default()).unwrap();
        assert!((out[0] - (grasp[0] + 1.0)).abs() < 1e-12);
        assert!((out[1] - (grasp[1] + 2.0)).abs() < 1e-12);
        assert!((out[2] - (grasp[2] + 3.0)).abs() < 1e-12);
        assert_eq!(&out[9..], &grasp[9..]);
    }

    #[test]
    fn rotation_applies_to_points_and_normals() {
        let rot = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let frame = Frame::from(rot);
        let mut grasp = vec![0.0; 18];
        grasp[0] = 1.0; // 点 (1, 0, 0)
        grasp[9] = 1.0; // 法向 (1, 0, 0)
        let out = transform_grasp(&frame, &grasp, &GraspLayout::default()).unwrap();
        assert!(out[0].abs() < 1e-12 && (out[1] - 1.0).abs() < 1e-12);
        assert!(out[9].abs() < 1e-12 && (out[10] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn round_trip_through_inverse() {
        let frame = Frame(Isometry3::new(
            nalgebra::Vector3::new(0.3, 0.1, -0.2),
            nalgebra::Vector3::new(0.5, 0.2, -0.7),
        ));
        let layout = GraspLayout::default();
        let grasp = grasp_fixture();
        let cam = transform_grasp(&frame, &grasp, &layout).unwrap();
        let back = transform_grasp(&frame.inverse(), &cam, &layout).unwrap();
        for (a, b) in back.iter().zip(grasp.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn short_descriptor_is_schema_error() {
        let err = transform_grasp(&Frame::identity(), &[0.0; 10], &GraspLayout::default());
        assert!(matches!(err, Err(PipelineError::Schema(_))));
    }
}
