use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// 一次渲染请求的参数。字段即模拟器可识别的全部选项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderParams {
    /// RGB 相机近/远裁剪面
    pub rgb_near_clip: f64,
    pub rgb_far_clip: f64,
    /// 深度相机近/远裁剪面，深度值在此区间内归一化
    pub depth_near_clip: f64,
    pub depth_far_clip: f64,
    /// 视场角（弧度）
    pub camera_fov: f64,
    /// 输出图像为 resolution x resolution
    pub resolution: usize,
    /// 随机光照
    pub randomize_lighting: bool,
    /// 随机纹理，使用 `texture_path`
    pub randomize_texture: bool,
    /// 随机颜色
    pub randomize_colour: bool,
    /// 随机调整相机 up 方向
    pub reorient_up: bool,
    /// 每盏灯关闭的概率
    pub p_light_off: f64,
    /// 光照强度扰动幅度
    pub p_light_mag: f64,
    pub texture_path: PathBuf,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            rgb_near_clip: 0.01,
            rgb_far_clip: 10.0,
            depth_near_clip: 0.01,
            depth_far_clip: 1.25,
            camera_fov: 70.0_f64.to_radians(),
            resolution: 256,
            randomize_lighting: true,
            randomize_texture: true,
            randomize_colour: true,
            reorient_up: true,
            p_light_off: 0.25,
            p_light_mag: 0.1,
            texture_path: PathBuf::from("texture.png"),
        }
    }
}

impl RenderParams {
    /// 关闭所有随机化，用于拍摄带夹爪的配对图像
    pub fn non_random(&self) -> Self {
        Self {
            randomize_lighting: false,
            randomize_texture: false,
            randomize_colour: false,
            reorient_up: false,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let clip_ok = |near: f64, far: f64| near > 0.0 && far > near;
        if !clip_ok(self.rgb_near_clip, self.rgb_far_clip) {
            return Err(PipelineError::Config(format!(
                "bad rgb clip planes: {} / {}",
                self.rgb_near_clip, self.rgb_far_clip
            )));
        }
        if !clip_ok(self.depth_near_clip, self.depth_far_clip) {
            return Err(PipelineError::Config(format!(
                "bad depth clip planes: {} / {}",
                self.depth_near_clip, self.depth_far_clip
            )));
        }
        if !(self.camera_fov > 0.0 && self.camera_fov < std::f64::consts::PI) {
            return Err(PipelineError::Config(format!(
                "camera_fov out of range: {}",
                self.camera_fov
            )));
        }
        if self.resolution == 0 {
            return Err(PipelineError::Config("resolution must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.p_light_off) || self.p_light_mag < 0.0 {
            return Err(PipelineError::Config(format!(
                "bad lighting parameters: p_light_off={}, p_light_mag={}",
                self.p_light_off, self.p_light_mag
            )));
        }
        Ok(())
    }
}
