use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// 每个数组的存储精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// 半精度，用于图像
    F16,
    /// 单精度，用于抓取、属性和位姿
    F32,
    /// 变长字符串，保存为 json
    Str,
}

impl Dtype {
    pub fn size(&self) -> usize {
        match self {
            Dtype::F16 => 2,
            Dtype::F32 => 4,
            Dtype::Str => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySpec {
    pub name: String,
    /// 第一维是行数
    pub shape: Vec<usize>,
    pub dtype: Dtype,
    /// 相对于数据集目录的路径
    pub file: PathBuf,
}

impl ArraySpec {
    /// 每行的元素个数
    pub fn row_len(&self) -> usize {
        self.shape[1..].iter().product()
    }

    pub fn row_bytes(&self) -> usize {
        self.row_len() * self.dtype.size()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub name: String,
    pub rows: usize,
    pub arrays: Vec<ArraySpec>,
    /// 跳过的记录及其占用的行，这些行保持为 0
    #[serde(default)]
    pub skipped_records: Vec<usize>,
    #[serde(default)]
    pub skipped_rows: Vec<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    /// 所有记录处理完成后才为 true
    pub complete: bool,
}

impl StoreManifest {
    pub fn array(&self, name: &str) -> Result<&ArraySpec> {
        self.arrays
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| PipelineError::schema(format!("store has no array {name}")))
    }
}

/// 读取已完成的数据集
pub struct StoreReader {
    root: PathBuf,
    pub manifest: StoreManifest,
}

impl StoreReader {
    pub fn open(root: &Path) -> Result<Self> {
        let file = File::open(root.join(MANIFEST_FILE))?;
        let manifest: StoreManifest = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    /// 读取数值数组的一行，统一转换为 f32
    #[allow(dead_code)]
    pub fn read_row(&self, name: &str, row: usize) -> Result<Vec<f32>> {
        let spec = self.manifest.array(name)?;
        if spec.dtype == Dtype::Str {
            return Err(PipelineError::schema(format!("{name} is a string array")));
        }
        if row >= self.manifest.rows {
            return Err(PipelineError::ShapeMismatch {
                field: name.to_string(),
                expected: self.manifest.rows,
                found: row,
            });
        }
        let mut file = File::open(self.root.join(&spec.file))?;
        file.seek(SeekFrom::Start((row * spec.row_bytes()) as u64))?;
        let mut bytes = vec![0u8; spec.row_bytes()];
        file.read_exact(&mut bytes)?;

        let values = match spec.dtype {
            Dtype::F16 => bytes
                .chunks_exact(2)
                .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect(),
            _ => bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        };
        Ok(values)
    }

    #[allow(dead_code)]
    pub fn read_text(&self, name: &str) -> Result<Vec<Option<String>>> {
        let spec = self.manifest.array(name)?;
        if spec.dtype != Dtype::Str {
            return Err(PipelineError::schema(format!("{name} is not a string array")));
        }
        let file = File::open(self.root.join(&spec.file))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
