use std::path::{Path, PathBuf};

use ndarray::Array2;

use super::{GraspSource, ObjectTable};
use crate::config::PREGRASP_TABLE;
use crate::error::{PipelineError, Result};

/// 目录形式的抓取数据库：
///
/// ```text
/// <root>/<object>/pregrasp/<property>.csv
/// ```
///
/// csv 无表头，每行为一次抓取。
#[derive(Debug, Default)]
pub struct CsvGraspDatabase {
    pub root: PathBuf,
}

impl CsvGraspDatabase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn read_property(path: &Path) -> Result<Array2<f64>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut values = Vec::new();
        let mut width = None;
        let mut rows = 0;
        for record in reader.records() {
            let record = record?;
            match width {
                None => width = Some(record.len()),
                Some(w) if w != record.len() => {
                    return Err(PipelineError::schema(format!(
                        "{}: row {} has {} values, expected {}",
                        path.display(),
                        rows,
                        record.len(),
                        w
                    )));
                }
                _ => {}
            }
            for field in record.iter() {
                let v = field.parse::<f64>().map_err(|_| {
                    PipelineError::schema(format!(
                        "{}: row {}: {:?} is not a number",
                        path.display(),
                        rows,
                        field
                    ))
                })?;
                values.push(v);
            }
            rows += 1;
        }
        Array2::from_shape_vec((rows, width.unwrap_or(0)), values)
            .map_err(|e| PipelineError::schema(format!("{}: {}", path.display(), e)))
    }

    #[cfg(test)]
    pub fn write_object(&self, key: &str, table: &ObjectTable) -> Result<()> {
        let dir = self.root.join(key).join(PREGRASP_TABLE);
        std::fs::create_dir_all(&dir)?;
        for (name, rows) in table {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(dir.join(format!("{name}.csv")))?;
            for row in rows.rows() {
                writer.write_record(row.iter().map(|v| v.to_string()))?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

impl GraspSource for CsvGraspDatabase {
    fn object_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn read_object(&self, key: &str) -> Result<ObjectTable> {
        let dir = self.root.join(key).join(PREGRASP_TABLE);
        if !dir.is_dir() {
            return Err(PipelineError::schema(format!(
                "object {key:?} has no {PREGRASP_TABLE} table"
            )));
        }
        let mut table = ObjectTable::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            table.insert(name.to_string(), Self::read_property(&path)?);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_write_then_read_object() {
        let dir = tempfile::tempdir().unwrap();
        let db = CsvGraspDatabase::new(dir.path());
        let mut table = ObjectTable::new();
        table.insert("grasp".to_string(), array![[0.1, 0.2, 0.3], [1.0, 2.0, 3.0]]);
        table.insert("mass_wrt_world".to_string(), array![[0.5], [0.5]]);
        db.write_object("mug", &table).unwrap();
        db.write_object("bowl", &table).unwrap();

        assert_eq!(db.object_keys().unwrap(), vec!["bowl", "mug"]);
        let read = db.read_object("mug").unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn test_ragged_rows_are_schema_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("mug").join(PREGRASP_TABLE);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("grasp.csv"), "1,2,3\n4,5\n").unwrap();
        let db = CsvGraspDatabase::new(root.path());
        assert!(matches!(db.read_object("mug"), Err(PipelineError::Schema(_))));
    }

    #[test]
    fn test_empty_object_has_no_rows() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("cup").join(PREGRASP_TABLE);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("grasp.csv"), "").unwrap();
        let table = CsvGraspDatabase::new(root.path()).read_object("cup").unwrap();
        assert_eq!(table["grasp"].nrows(), 0);
    }

    #[test]
    fn test_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let db = CsvGraspDatabase::new(dir.path());
        assert!(matches!(db.read_object("nothing"), Err(PipelineError::Schema(_))));
    }
}
