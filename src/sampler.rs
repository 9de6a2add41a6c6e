//! 视角采样
//!
//! 以成功抓取时的手掌位姿为种子，随机生成相机位姿并渲染，
//! 直到得到物体完整可见的图像；然后显示夹爪，在同一位姿下再渲染一张配对图像。

use std::path::PathBuf;

use ndarray::Axis;
use rand::Rng;

use crate::config::{
    PoseParams, RunConfig, SamplerLimits, MASK_CHANNEL, MIN_TABLE_CLEARANCE, SAMPLER_PIXEL_THRESH,
};
use crate::error::{PipelineError, Result};
use crate::plot;
use crate::simulator::{ImageCube, RenderParams, SimSession, Simulator};
use crate::subset::GraspRecord;
use crate::transform::{invert, randomize_pose, transform_grasp, Frame, GraspLayout};
use crate::validator::is_usable;

/// 一个通过校验的视角
#[derive(Debug, Clone)]
pub struct SampledView {
    pub image_without_gripper: ImageCube,
    pub image_with_gripper: ImageCube,
    /// 相机坐标系下的抓取描述
    pub grasp_in_camera_frame: Vec<f64>,
    /// 模拟器实际使用的相机位姿
    pub frame_work2cam: Frame,
    /// 得到该视角共渲染的次数（不含配对图像）
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub struct ViewSampler {
    query: RenderParams,
    /// 配对图像使用的参数，关闭所有随机化
    fixed: RenderParams,
    pose: PoseParams,
    limits: SamplerLimits,
    layout: GraspLayout,
    min_object_pixels: usize,
    debug_dir: Option<PathBuf>,
}

impl ViewSampler {
    pub fn new(
        query: RenderParams,
        pose: PoseParams,
        limits: SamplerLimits,
        layout: GraspLayout,
    ) -> Self {
        Self {
            fixed: query.non_random(),
            query,
            pose,
            limits,
            layout,
            min_object_pixels: SAMPLER_PIXEL_THRESH,
            debug_dir: None,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.query.clone(),
            config.pose.clone(),
            config.limits,
            config.grasp_layout.clone(),
        )
        .with_debug_dir(config.debug_dir.clone())
    }

    /// 设置后每个视角保存一张对比图
    pub fn with_debug_dir(mut self, debug_dir: Option<PathBuf>) -> Self {
        self.debug_dir = debug_dir;
        self
    }

    pub fn query_params(&self) -> &RenderParams {
        &self.query
    }

    pub fn layout(&self) -> &GraspLayout {
        &self.layout
    }

    /// 对已布置好的记录采样 `num_views` 个视角
    pub fn sample_views<S, R>(
        &self,
        session: &mut SimSession<S>,
        record: &GraspRecord,
        num_views: usize,
        rng: &mut R,
    ) -> Result<Vec<SampledView>>
    where
        S: Simulator,
        R: Rng + ?Sized,
    {
        let frame_work2palm = record.frame_work2palm()?;
        let frame_world2work = record.frame_world2work()?;
        let grasp = record.grasp().to_vec();

        let mut views = Vec::with_capacity(num_views);
        for view in 0..num_views {
            // 先隐藏夹爪，拍摄只有物体的图像
            session.set_gripper_properties(false, false)?;

            let (image_without_gripper, frame_work2cam, attempts) = self.find_view(
                &mut **session,
                record.index,
                view,
                &frame_work2palm,
                &frame_world2work,
                rng,
            )?;

            // 在模拟器返回的位姿下拍摄带夹爪的图像
            session.set_gripper_properties(true, true)?;
            let (image_with_gripper, _) =
                session.query(&frame_work2cam, &frame_world2work, &self.fixed)?;
            let image_with_gripper = image_with_gripper.ok_or(PipelineError::RenderFailure {
                record: record.index,
                view,
            })?;

            let frame_cam2work = invert(&frame_work2cam);
            let grasp_in_camera_frame = transform_grasp(&frame_cam2work, &grasp, &self.layout)?;

            if let Some(dir) = &self.debug_dir {
                let path = plot::debug_image_path(dir, record.index, view, record.object_name()?);
                plot::plot_queried_images(
                    image_without_gripper.view(),
                    image_with_gripper.view(),
                    &path,
                )?;
            }

            log::debug!(
                "record {} view {}: accepted after {} renders",
                record.index,
                view,
                attempts
            );
            views.push(SampledView {
                image_without_gripper,
                image_with_gripper,
                grasp_in_camera_frame,
                frame_work2cam,
                attempts,
            });
        }
        Ok(views)
    }

    /// 随机生成相机位姿并渲染，返回第一张通过校验的图像
    fn find_view<S, R>(
        &self,
        sim: &mut S,
        record: usize,
        view: usize,
        frame_work2palm: &Frame,
        frame_world2work: &Frame,
        rng: &mut R,
    ) -> Result<(ImageCube, Frame, usize)>
    where
        S: Simulator + ?Sized,
        R: Rng + ?Sized,
    {
        let mut renders = 0;
        let mut candidates = 0;
        loop {
            if renders >= self.limits.max_render_attempts
                || candidates >= self.limits.max_pose_candidates
            {
                log::warn!(
                    "record {} view {}: gave up after {} renders, {} candidates",
                    record,
                    view,
                    renders,
                    candidates
                );
                return Err(PipelineError::ViewSamplingTimeout {
                    record,
                    view,
                    attempts: renders,
                });
            }
            candidates += 1;

            let frame_work2cam = randomize_pose(
                frame_work2palm,
                self.pose.local_rot,
                self.pose.global_rot,
                self.pose.base_offset,
                self.pose.offset_mag,
                rng,
            );
            // 相机需要在桌面以上，不用渲染就能排除
            if frame_work2cam.height() <= MIN_TABLE_CLEARANCE {
                continue;
            }

            renders += 1;
            let (image, refined) = sim.query(&frame_work2cam, frame_world2work, &self.query)?;
            let image = image.ok_or(PipelineError::RenderFailure { record, view })?;
            if image.len_of(Axis(0)) <= MASK_CHANNEL {
                return Err(PipelineError::ShapeMismatch {
                    field: "image channels".to_string(),
                    expected: MASK_CHANNEL + 1,
                    found: image.len_of(Axis(0)),
                });
            }
            if !is_usable(image.index_axis(Axis(0), MASK_CHANNEL), self.min_object_pixels) {
                log::trace!("record {} view {}: rejected render {}", record, view, renders);
                continue;
            }
            return Ok((image, refined, renders));
        }
    }
}
