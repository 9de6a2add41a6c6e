//! 全局类型转换
//!
//! 平齐的 3x4 矩阵与 [Frame] 之间的转换，以及图像数组到 [Mat] 的转换。
//!
//! 时间： 2026-10-16
//! 版本： 0.1.0
//!

use nalgebra::*;
use ndarray::ArrayView3;
use opencv::core::{Mat, Scalar, Vec3b, CV_8UC3};
use opencv::prelude::*;
use std::fmt::Display;

use crate::config::FRAME_LEN;
use crate::transform::Frame;

/// 行优先的 3x4 齐次矩阵
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatFrame(pub [f64; FRAME_LEN]);

impl Display for FlatFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.0.chunks(4) {
            writeln!(f, "{:.4}, {:.4}, {:.4}, {:.4}", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}

/// 将 [FlatFrame] 转换为 [Frame]，旋转部分取最近的正交矩阵
impl From<FlatFrame> for Frame {
    fn from(flat: FlatFrame) -> Self {
        let v = flat.0;
        let matrix = Matrix3::new(v[0], v[1], v[2], v[4], v[5], v[6], v[8], v[9], v[10]);
        let rotation = Rotation3::from_matrix(&matrix);
        Frame(Isometry3::from_parts(
            Translation3::new(v[3], v[7], v[11]),
            UnitQuaternion::from_rotation_matrix(&rotation),
        ))
    }
}

/// 将 [Frame] 转换为 [FlatFrame]
impl From<Frame> for FlatFrame {
    fn from(frame: Frame) -> Self {
        let m = frame.0.to_homogeneous();
        let mut flat = [0.0; FRAME_LEN];
        for i in 0..3 {
            for j in 0..4 {
                flat[i * 4 + j] = m[(i, j)];
            }
        }
        FlatFrame(flat)
    }
}

#[test]
fn test_flat_frame() {
    let rotation = Rotation3::from_euler_angles(0.1, 0.2, 0.3);
    let frame = Frame(Isometry3::from_parts(
        Translation::from(Vector3::new(1.0, 2.0, 3.0)),
        UnitQuaternion::from(rotation),
    ));
    let flat = FlatFrame::from(frame);
    println!("flat: \n{}", flat);
    let back: Frame = flat.into();
    assert!(back.approx_eq(&frame, 1e-12));
}

#[test]
fn test_flat_frame_orthonormalizes() {
    // 轻微误差的旋转矩阵
    let mut flat = FlatFrame::from(Frame::identity());
    flat.0[0] = 1.001;
    let frame: Frame = flat.into();
    let r = frame.0.rotation.to_rotation_matrix();
    let should_be_identity = r.matrix() * r.matrix().transpose();
    assert!((should_be_identity - Matrix3::identity()).norm() < 1e-9);
}

/// `[C, R, R]` 图像的前三个通道（RGB，取值 [0, 1]）
pub struct RgbView<'a>(pub ArrayView3<'a, f32>);

impl RgbView<'_> {
    /// 转换为 8 位 BGR [Mat]
    pub fn to_mat(&self) -> opencv::Result<Mat> {
        let (_, rows, cols) = self.0.dim();
        let mut mat = Mat::new_rows_cols_with_default(
            rows as i32,
            cols as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        for r in 0..rows {
            for c in 0..cols {
                let px = mat.at_2d_mut::<Vec3b>(r as i32, c as i32)?;
                // opencv 使用 BGR
                for ch in 0..3 {
                    px[2 - ch] = (self.0[[ch, r, c]].clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
        }
        Ok(mat)
    }
}

#[test]
fn test_rgb_to_mat() {
    let mut image = ndarray::Array3::<f32>::zeros((5, 4, 6));
    image[[0, 1, 2]] = 1.0;
    let mat = RgbView(image.view()).to_mat().unwrap();
    assert_eq!(mat.rows(), 4);
    assert_eq!(mat.cols(), 6);
    let px = mat.at_2d::<Vec3b>(1, 2).unwrap();
    assert_eq!(px[2], 255);
    assert_eq!(px[0], 0);
}
