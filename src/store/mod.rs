//! 预分配、可按行写入的数据集存储
//!
//! 数据集是一个目录：`manifest.json` 记录每个数组的形状和精度，
//! 每个数值数组是一个小端序的二进制文件，创建时按最终大小分配并填 0。
//! 字符串数组在内存中累积，关闭时写成 json。

mod manifest;

pub use manifest::{ArraySpec, Dtype, StoreManifest, StoreReader, MANIFEST_FILE};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ndarray::ArrayView3;

use crate::config::{FRAME_LEN, FRAME_WORK2CAM_FIELD};
use crate::error::{PipelineError, Result};
use crate::subset::{Column, GraspBatch, GraspRecord};

pub const IMAGES_WITH_GRIPPER: &str = "images_with_gripper";
pub const IMAGES_WITHOUT_GRIPPER: &str = "images_without_gripper";
pub const GRASPS: &str = "grasps";
pub const PROPS_GROUP: &str = "props";

pub fn prop_array_name(property: &str) -> String {
    format!("{PROPS_GROUP}/{property}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// 每行的宽度
    Numeric(usize),
    Text,
}

/// 数据集的形状，创建后不再改变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub rows: usize,
    /// [通道, 行, 列]
    pub image_shape: [usize; 3],
    pub grasp_width: usize,
    pub props: Vec<(String, PropertyKind)>,
}

impl StoreLayout {
    /// 按输入批量的结构确定形状，行数为 `len(batch) * num_views`
    pub fn for_batch(
        batch: &GraspBatch,
        num_views: usize,
        channels: usize,
        resolution: usize,
    ) -> Self {
        let props = batch
            .props
            .iter()
            .map(|(name, column)| {
                let kind = match column {
                    Column::Numeric(_) => PropertyKind::Numeric(column.width()),
                    Column::Text(_) => PropertyKind::Text,
                };
                (name.to_string(), kind)
            })
            .collect();
        Self {
            rows: batch.len() * num_views,
            image_shape: [channels, resolution, resolution],
            grasp_width: batch.grasps.ncols(),
            props,
        }
    }

    fn array_specs(&self) -> Vec<ArraySpec> {
        let numeric = |name: String, width: &[usize], dtype: Dtype| {
            let mut shape = vec![self.rows];
            shape.extend_from_slice(width);
            ArraySpec {
                file: PathBuf::from(format!("{name}.bin")),
                name,
                shape,
                dtype,
            }
        };

        let mut specs = vec![
            numeric(IMAGES_WITH_GRIPPER.to_string(), &self.image_shape, Dtype::F16),
            numeric(IMAGES_WITHOUT_GRIPPER.to_string(), &self.image_shape, Dtype::F16),
            numeric(GRASPS.to_string(), &[self.grasp_width], Dtype::F32),
        ];
        for (property, kind) in &self.props {
            let name = prop_array_name(property);
            specs.push(match kind {
                PropertyKind::Numeric(width) => numeric(name, &[*width], Dtype::F32),
                PropertyKind::Text => ArraySpec {
                    file: PathBuf::from(format!("{name}.json")),
                    name,
                    shape: vec![self.rows, 1],
                    dtype: Dtype::Str,
                },
            });
        }
        specs.push(numeric(
            prop_array_name(FRAME_WORK2CAM_FIELD),
            &[FRAME_LEN],
            Dtype::F32,
        ));
        specs
    }
}

/// 写入一行所需的数据
pub struct StoreRow<'a> {
    pub image_without_gripper: ArrayView3<'a, f32>,
    pub image_with_gripper: ArrayView3<'a, f32>,
    pub grasp: &'a [f64],
    pub frame_work2cam: &'a [f64],
    /// 属性从这条记录复制
    pub record: GraspRecord<'a>,
}

pub struct DatasetStore {
    root: PathBuf,
    manifest: StoreManifest,
    files: BTreeMap<String, File>,
    text: BTreeMap<String, Vec<Option<String>>>,
    written: Vec<bool>,
    skipped: Vec<bool>,
}

impl DatasetStore {
    /// 创建数据集目录，并按最终形状分配所有数组
    pub fn create(
        root: &Path,
        name: &str,
        layout: &StoreLayout,
        seed: Option<u64>,
    ) -> Result<Self> {
        std::fs::create_dir_all(root.join(PROPS_GROUP))?;

        let arrays = layout.array_specs();
        let mut files = BTreeMap::new();
        let mut text = BTreeMap::new();
        for spec in &arrays {
            if spec.dtype == Dtype::Str {
                text.insert(spec.name.clone(), vec![None; layout.rows]);
                continue;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(root.join(&spec.file))?;
            file.set_len((layout.rows * spec.row_bytes()) as u64)?;
            files.insert(spec.name.clone(), file);
        }

        let store = Self {
            root: root.to_path_buf(),
            manifest: StoreManifest {
                name: name.to_string(),
                rows: layout.rows,
                arrays,
                skipped_records: Vec::new(),
                skipped_rows: Vec::new(),
                seed,
                complete: false,
            },
            files,
            text,
            written: vec![false; layout.rows],
            skipped: vec![false; layout.rows],
        };
        store.write_manifest()?;
        log::info!(
            "created dataset {} with {} rows at {}",
            name,
            layout.rows,
            root.display()
        );
        Ok(store)
    }

    fn check_free(&self, row: usize) -> Result<()> {
        if row >= self.manifest.rows {
            return Err(PipelineError::ShapeMismatch {
                field: "row".to_string(),
                expected: self.manifest.rows,
                found: row,
            });
        }
        if self.written[row] || self.skipped[row] {
            return Err(PipelineError::SlotCollision(row));
        }
        Ok(())
    }

    fn check_len(&self, name: &str, found: usize) -> Result<()> {
        let expected = self.manifest.array(name)?.row_len();
        if expected != found {
            return Err(PipelineError::ShapeMismatch {
                field: name.to_string(),
                expected,
                found,
            });
        }
        Ok(())
    }

    fn write_values<I>(&mut self, name: &str, row: usize, values: I) -> Result<()>
    where
        I: IntoIterator<Item = f32>,
    {
        let spec = self.manifest.array(name)?;
        let (dtype, row_bytes) = (spec.dtype, spec.row_bytes());

        let mut bytes = Vec::with_capacity(row_bytes);
        for v in values {
            match dtype {
                Dtype::F16 => bytes.extend_from_slice(&half::f16::from_f32(v).to_le_bytes()),
                _ => bytes.extend_from_slice(&v.to_le_bytes()),
            }
        }
        debug_assert_eq!(bytes.len(), row_bytes);

        let file = self
            .files
            .get_mut(name)
            .ok_or_else(|| PipelineError::schema(format!("store has no array {name}")))?;
        file.seek(SeekFrom::Start((row * row_bytes) as u64))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// 写入第 `row` 行，每行只能写一次
    pub fn write_row(&mut self, row: usize, data: &StoreRow) -> Result<()> {
        self.check_free(row)?;

        // 先检查所有形状，避免写入一半
        self.check_len(IMAGES_WITHOUT_GRIPPER, data.image_without_gripper.len())?;
        self.check_len(IMAGES_WITH_GRIPPER, data.image_with_gripper.len())?;
        let image_shape = &self.manifest.array(IMAGES_WITH_GRIPPER)?.shape[1..];
        for image in [&data.image_with_gripper, &data.image_without_gripper] {
            if image.shape() != image_shape {
                return Err(PipelineError::ShapeMismatch {
                    field: "image".to_string(),
                    expected: image_shape.iter().product(),
                    found: image.len(),
                });
            }
        }
        self.check_len(GRASPS, data.grasp.len())?;
        self.check_len(&prop_array_name(FRAME_WORK2CAM_FIELD), data.frame_work2cam.len())?;
        let props = data.record.props();
        for (property, column) in props.iter() {
            if let Column::Numeric(values) = column {
                self.check_len(&prop_array_name(property), values.ncols())?;
            }
        }

        self.write_values(
            IMAGES_WITHOUT_GRIPPER,
            row,
            data.image_without_gripper.iter().copied(),
        )?;
        self.write_values(IMAGES_WITH_GRIPPER, row, data.image_with_gripper.iter().copied())?;
        self.write_values(GRASPS, row, data.grasp.iter().map(|&v| v as f32))?;
        self.write_values(
            &prop_array_name(FRAME_WORK2CAM_FIELD),
            row,
            data.frame_work2cam.iter().map(|&v| v as f32),
        )?;
        let index = data.record.index;
        for (property, column) in props.iter() {
            let name = prop_array_name(property);
            match column {
                Column::Numeric(values) => {
                    self.write_values(&name, row, values.row(index).iter().map(|&v| v as f32))?;
                }
                Column::Text(values) => {
                    if let Some(text) = self.text.get_mut(&name) {
                        text[row] = Some(values[index].clone());
                    }
                }
            }
        }

        self.written[row] = true;
        Ok(())
    }

    /// 标记某条记录的行被跳过，这些行保持为 0
    pub fn mark_skipped(&mut self, record: usize, rows: &[usize]) -> Result<()> {
        for &row in rows {
            self.check_free(row)?;
        }
        for &row in rows {
            self.skipped[row] = true;
        }
        self.manifest.skipped_records.push(record);
        self.manifest.skipped_rows.extend_from_slice(rows);
        Ok(())
    }

    fn write_manifest(&self) -> Result<()> {
        let file = File::create(self.root.join(MANIFEST_FILE))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.manifest)?;
        writer.flush()?;
        Ok(())
    }

    /// 所有行都写入（或被跳过）后关闭数据集
    pub fn finalize(mut self) -> Result<StoreManifest> {
        let missing = self
            .written
            .iter()
            .zip(self.skipped.iter())
            .filter(|(w, s)| !**w && !**s)
            .count();
        if missing > 0 {
            return Err(PipelineError::IncompleteStore { missing });
        }

        for (name, values) in &self.text {
            let spec = self.manifest.array(name)?;
            let file = File::create(self.root.join(&spec.file))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, values)?;
            writer.flush()?;
        }
        for file in self.files.values() {
            file.sync_all()?;
        }

        self.manifest.skipped_rows.sort_unstable();
        self.manifest.complete = true;
        self.write_manifest()?;
        log::info!(
            "dataset {} finalized: {} rows, {} skipped records",
            self.manifest.name,
            self.manifest.rows,
            self.manifest.skipped_records.len()
        );
        Ok(self.manifest)
    }
}
