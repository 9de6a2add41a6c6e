//! 数据集生成流程中的错误类型

use thiserror::Error;

/// 采集流程的错误。
///
/// 图像校验失败不是错误，只会触发重新采样。
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 源数据库结构不符合要求（缺少字段、列宽不一致等）。
    #[error("schema error: {0}")]
    Schema(String),

    /// 同一物体下各属性的行数不一致。
    #[error("inconsistent length for {object}/{property}: expected {expected} rows, found {found}")]
    InconsistentLength {
        object: String,
        property: String,
        expected: usize,
        found: usize,
    },

    /// 模拟器没有返回图像。
    #[error("no image returned for record {record}, view {view}")]
    RenderFailure { record: usize, view: usize },

    /// 超出采样次数上限，仍未得到可用视角。
    #[error("no usable view for record {record}, view {view} after {attempts} attempts")]
    ViewSamplingTimeout {
        record: usize,
        view: usize,
        attempts: usize,
    },

    /// 找不到物体对应的网格文件。
    #[error("no mesh for object {object:?} in {dir}")]
    MissingMesh { object: String, dir: String },

    /// 同一行被写入两次。
    #[error("store row {0} written twice")]
    SlotCollision(usize),

    /// 关闭时仍有未写入的行。
    #[error("store finalized with {missing} unwritten rows")]
    IncompleteStore { missing: usize },

    #[error("shape mismatch for {field}: expected {expected}, found {found}")]
    ShapeMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    /// 模拟器通信或调用失败。
    #[error("simulator error: {0}")]
    Simulator(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn schema(reason: impl Into<String>) -> Self {
        Self::Schema(reason.into())
    }

    pub fn simulator(reason: impl Into<String>) -> Self {
        Self::Simulator(reason.into())
    }
}

impl From<opencv::Error> for PipelineError {
    fn from(err: opencv::Error) -> Self {
        Self::Image(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
