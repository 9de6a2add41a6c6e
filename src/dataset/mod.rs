//! 源抓取数据库
//!
//! 以物体名为键，每个物体下有一张 `pregrasp` 表：属性名 -> 每次抓取一行。
mod csv_db;

pub use csv_db::CsvGraspDatabase;

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::Result;

/// 一个物体的全部抓取属性，每个属性一行对应一次抓取
pub type ObjectTable = BTreeMap<String, Array2<f64>>;

pub trait GraspSource {
    /// 数据库中的全部物体名
    fn object_keys(&self) -> Result<Vec<String>>;
    /// 读取某个物体的 `pregrasp` 表
    fn read_object(&self, key: &str) -> Result<ObjectTable>;
}

#[cfg(test)]
impl GraspSource for BTreeMap<String, ObjectTable> {
    fn object_keys(&self) -> Result<Vec<String>> {
        Ok(self.keys().cloned().collect())
    }

    fn read_object(&self, key: &str) -> Result<ObjectTable> {
        self.get(key)
            .cloned()
            .ok_or_else(|| crate::error::PipelineError::schema(format!("unknown object {key}")))
    }
}
