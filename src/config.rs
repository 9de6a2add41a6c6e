#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::simulator::RenderParams;
use crate::transform::GraspLayout;

/// 相机高度下限，低于该值认为在桌面以下。
pub const MIN_TABLE_CLEARANCE: f64 = 0.2;
/// 通用的物体像素阈值
pub const DEFAULT_PIXEL_THRESH: usize = 400;
/// 视角采样使用的物体像素阈值，比通用阈值更严格。
pub const SAMPLER_PIXEL_THRESH: usize = 600;

/// 图像通道：RGB(3) + depth(1) + mask(1)
pub const IMAGE_CHANNELS: usize = 5;
pub const DEPTH_CHANNEL: usize = 3;
pub const MASK_CHANNEL: usize = 4;
/// 平齐的 3x4 齐次矩阵长度
pub const FRAME_LEN: usize = 12;

/// 源数据库中每个物体下的子表名称
pub const PREGRASP_TABLE: &str = "pregrasp";
pub const GRASP_FIELD: &str = "grasp";
pub const OBJECT_NAME_FIELD: &str = "object_name";
pub const FRAME_WORK2CAM_FIELD: &str = "frame_work2cam";
pub const MASS_FIELD: &str = "mass_wrt_world";
pub const COM_FIELD: &str = "com_wrt_world";
pub const INERTIA_FIELD: &str = "inertia_wrt_world";
pub const FRAME_WORLD2WORK_FIELD: &str = "frame_world2work";
pub const FRAME_WORK2OBJ_FIELD: &str = "frame_work2obj";
pub const FRAME_WORK2PALM_FIELD: &str = "frame_work2palm";

/// 连接模拟器的参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpawnParams {
    pub ip: String,
    pub port: u16,
    /// 每次调用的超时时间（秒），包括渲染
    pub timeout_secs: f64,
}

impl Default for SpawnParams {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 19997,
            timeout_secs: 30.0,
        }
    }
}

/// 相机位姿随机化参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoseParams {
    /// 局部旋转范围（度）
    pub local_rot: [f64; 3],
    /// 全局旋转范围（度）
    pub global_rot: [f64; 3],
    /// 沿视线方向的基础偏移
    pub base_offset: f64,
    pub offset_mag: f64,
}

impl Default for PoseParams {
    fn default() -> Self {
        Self {
            local_rot: [10.0, 10.0, 10.0],
            global_rot: [50.0, 50.0, 50.0],
            base_offset: -0.4,
            offset_mag: 0.4,
        }
    }
}

/// 采样循环的上限
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerLimits {
    /// 每个视角最多渲染次数
    pub max_render_attempts: usize,
    /// 每个视角最多生成的候选位姿数（包括被桌面高度过滤掉的）
    pub max_pose_candidates: usize,
}

impl Default for SamplerLimits {
    fn default() -> Self {
        Self {
            max_render_attempts: 200,
            max_pose_candidates: 10_000,
        }
    }
}

/// 某条记录采样失败时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFailurePolicy {
    /// 直接终止
    #[default]
    Abort,
    /// 跳过该记录，并在 manifest 中记录
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// 源抓取数据库目录
    pub source_dir: PathBuf,
    /// 网格文件目录
    pub mesh_dir: PathBuf,
    /// 输出数据集目录
    pub dataset_path: PathBuf,
    /// 调试图像目录，为空时不保存
    pub debug_dir: Option<PathBuf>,
    /// 只处理这些物体，为空时处理全部
    pub objects: Option<Vec<String>>,
    pub seed: u64,
    pub num_views: usize,
    pub shuffle_data: bool,
    pub failure_policy: RecordFailurePolicy,
    pub spawn: SpawnParams,
    pub query: RenderParams,
    pub pose: PoseParams,
    pub limits: SamplerLimits,
    pub grasp_layout: GraspLayout,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("output/grasps"),
            mesh_dir: PathBuf::from("meshes"),
            dataset_path: PathBuf::from("dataset"),
            debug_dir: None,
            objects: None,
            seed: 1234,
            num_views: 10,
            shuffle_data: false,
            failure_policy: RecordFailurePolicy::Abort,
            spawn: SpawnParams::default(),
            query: RenderParams::default(),
            pose: PoseParams::default(),
            limits: SamplerLimits::default(),
            grasp_layout: GraspLayout::default(),
        }
    }
}

impl RunConfig {
    pub fn read_from_json(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_views == 0 {
            return Err(PipelineError::Config("num_views must be positive".into()));
        }
        if self.limits.max_render_attempts == 0 || self.limits.max_pose_candidates == 0 {
            return Err(PipelineError::Config("sampler limits must be positive".into()));
        }
        if self.pose.offset_mag < 0.0 {
            return Err(PipelineError::Config("offset_mag must not be negative".into()));
        }
        self.query.validate()
    }
}
