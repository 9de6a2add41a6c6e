//! 调试用的对比图：左边为只有物体的图像，右边为带夹爪的图像

use std::path::{Path, PathBuf};

use ndarray::ArrayView3;
use opencv::core::{Mat, Vector};
use opencv::imgcodecs;

use crate::error::{PipelineError, Result};
use crate::global_cast::RgbView;

/// `<记录>_<视角>_<物体>.png`
pub fn debug_image_path(dir: &Path, record: usize, view: usize, object: &str) -> PathBuf {
    dir.join(format!("{}_{}_{}.png", record, view, object))
}

pub fn plot_queried_images(
    image_without_gripper: ArrayView3<f32>,
    image_with_gripper: ArrayView3<f32>,
    path: &Path,
) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let left = RgbView(image_without_gripper).to_mat()?;
    let right = RgbView(image_with_gripper).to_mat()?;
    let mut fig = Mat::default();
    opencv::core::hconcat2(&left, &right, &mut fig)?;

    let name = path
        .to_str()
        .ok_or_else(|| PipelineError::Image(format!("bad path {}", path.display())))?;
    if !imgcodecs::imwrite(name, &fig, &Vector::<i32>::new())? {
        return Err(PipelineError::Image(format!("failed to write {}", name)));
    }
    log::trace!("saved {}", name);
    Ok(())
}
