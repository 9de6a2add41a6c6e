//! 按物体读取抓取子集，合并成按行对齐的批量数组

use std::collections::BTreeMap;

use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{
    COM_FIELD, FRAME_LEN, FRAME_WORK2OBJ_FIELD, FRAME_WORK2PALM_FIELD, FRAME_WORLD2WORK_FIELD,
    GRASP_FIELD, INERTIA_FIELD, MASS_FIELD, OBJECT_NAME_FIELD,
};
use crate::dataset::{GraspSource, ObjectTable};
use crate::error::{PipelineError, Result};
use crate::transform::{Frame, GraspLayout};

/// 属性列
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Array2<f64>),
    /// 变长字符串，比如物体名
    Text(Vec<String>),
}

impl Column {
    /// 每行的宽度，字符串列为 1
    pub fn width(&self) -> usize {
        match self {
            Column::Numeric(values) => values.ncols(),
            Column::Text(_) => 1,
        }
    }

    fn select(&self, index: &[usize]) -> Column {
        match self {
            Column::Numeric(values) => Column::Numeric(values.select(Axis(0), index)),
            Column::Text(values) => {
                Column::Text(index.iter().map(|&i| values[i].clone()).collect())
            }
        }
    }
}

/// 属性名 -> 列，所有列行数相同、行顺序一致。
///
/// 只能通过 [GraspBatch::permute] 整体重排。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTable {
    columns: BTreeMap<String, Column>,
}

impl PropertyTable {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn numeric(&self, name: &str) -> Result<ArrayView2<'_, f64>> {
        match self.columns.get(name) {
            Some(Column::Numeric(values)) => Ok(values.view()),
            Some(Column::Text(_)) => Err(PipelineError::schema(format!("{name} is not numeric"))),
            None => Err(PipelineError::schema(format!("missing property {name}"))),
        }
    }

    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.columns.get(name) {
            Some(Column::Text(values)) => Ok(values),
            Some(Column::Numeric(_)) => Err(PipelineError::schema(format!("{name} is not text"))),
            None => Err(PipelineError::schema(format!("missing property {name}"))),
        }
    }

    /// 关节角属性（名称中带 `joint`）
    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.columns
            .keys()
            .map(String::as_str)
            .filter(|name| name.contains("joint"))
    }

    fn insert(&mut self, name: String, column: Column) {
        self.columns.insert(name, column);
    }
}

/// 抓取描述和属性表，按行对齐
#[derive(Debug, Clone, PartialEq)]
pub struct GraspBatch {
    pub grasps: Array2<f64>,
    pub props: PropertyTable,
}

impl GraspBatch {
    pub fn len(&self) -> usize {
        self.grasps.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.grasps.nrows() == 0
    }

    /// 用同一个排列重排抓取和所有属性
    pub fn permute(&mut self, index: &[usize]) {
        self.grasps = self.grasps.select(Axis(0), index);
        for column in self.props.columns.values_mut() {
            *column = column.select(index);
        }
    }

    /// 抓取描述的宽度需要满足 `layout`
    pub fn check_layout(&self, layout: &GraspLayout) -> Result<()> {
        let required = layout.required_len();
        if self.grasps.ncols() < required {
            return Err(PipelineError::schema(format!(
                "grasp descriptor has {} values, layout needs {}",
                self.grasps.ncols(),
                required
            )));
        }
        Ok(())
    }

    pub fn record(&self, index: usize) -> GraspRecord<'_> {
        GraspRecord {
            index,
            batch: self,
        }
    }
}

/// 批量数据中的一行
#[derive(Debug, Clone, Copy)]
pub struct GraspRecord<'a> {
    pub index: usize,
    batch: &'a GraspBatch,
}

impl<'a> GraspRecord<'a> {
    pub fn object_name(&self) -> Result<&'a str> {
        Ok(self.batch.props.text(OBJECT_NAME_FIELD)?[self.index].as_str())
    }

    pub fn props(&self) -> &'a PropertyTable {
        &self.batch.props
    }

    pub fn grasp(&self) -> ArrayView1<'a, f64> {
        self.batch.grasps.row(self.index)
    }

    pub fn property(&self, name: &str) -> Result<ArrayView1<'a, f64>> {
        Ok(self
            .batch
            .props
            .numeric(name)?
            .index_axis_move(Axis(0), self.index))
    }

    pub fn scalar(&self, name: &str) -> Result<f64> {
        self.property(name)?
            .get(0)
            .copied()
            .ok_or_else(|| PipelineError::schema(format!("property {name} is empty")))
    }

    pub fn frame(&self, name: &str) -> Result<Frame> {
        Frame::from_flat(&self.property(name)?.to_vec())
    }

    pub fn mass(&self) -> Result<f64> {
        self.scalar(MASS_FIELD)
    }

    pub fn center_of_mass(&self) -> Result<Vec<f64>> {
        Ok(self.property(COM_FIELD)?.to_vec())
    }

    pub fn inertia(&self) -> Result<Vec<f64>> {
        Ok(self.property(INERTIA_FIELD)?.to_vec())
    }

    pub fn frame_world2work(&self) -> Result<Frame> {
        self.frame(FRAME_WORLD2WORK_FIELD)
    }

    pub fn frame_work2obj(&self) -> Result<Frame> {
        self.frame(FRAME_WORK2OBJ_FIELD)
    }

    pub fn frame_work2palm(&self) -> Result<Frame> {
        self.frame(FRAME_WORK2PALM_FIELD)
    }

    /// (关节名, 角度)
    pub fn joints(&self) -> Result<Vec<(&'a str, f64)>> {
        self.batch
            .props
            .joint_names()
            .map(|name| self.scalar(name).map(|angle| (name, angle)))
            .collect()
    }
}

/// 布置场景需要的属性及其宽度
const REQUIRED_FIELDS: [(&str, usize); 6] = [
    (MASS_FIELD, 1),
    (COM_FIELD, 3),
    (INERTIA_FIELD, 9),
    (FRAME_WORLD2WORK_FIELD, FRAME_LEN),
    (FRAME_WORK2OBJ_FIELD, FRAME_LEN),
    (FRAME_WORK2PALM_FIELD, FRAME_LEN),
];

/// 检查一个物体的表，返回该物体的抓取数
fn check_object(key: &str, table: &ObjectTable) -> Result<usize> {
    let grasp = table.get(GRASP_FIELD).ok_or_else(|| {
        PipelineError::schema(format!("object {key:?} has no {GRASP_FIELD} field"))
    })?;
    if table.contains_key(OBJECT_NAME_FIELD) {
        return Err(PipelineError::schema(format!(
            "object {key:?} already has a {OBJECT_NAME_FIELD} field"
        )));
    }
    let rows = grasp.nrows();
    for (name, values) in table {
        if values.nrows() != rows {
            return Err(PipelineError::InconsistentLength {
                object: key.to_string(),
                property: name.clone(),
                expected: rows,
                found: values.nrows(),
            });
        }
    }

    for (name, width) in REQUIRED_FIELDS {
        let values = table
            .get(name)
            .ok_or_else(|| PipelineError::schema(format!("object {key:?} has no {name} field")))?;
        // 空表读不出列宽
        if rows > 0 && values.ncols() != width {
            return Err(PipelineError::schema(format!(
                "{key}/{name} has {} columns, expected {width}",
                values.ncols()
            )));
        }
    }
    if rows > 0 {
        for (name, values) in table.iter().filter(|(name, _)| name.contains("joint")) {
            if values.ncols() == 0 {
                return Err(PipelineError::schema(format!("{key}/{name} has no columns")));
            }
        }
    }
    Ok(rows)
}

/// 读取 `keys` 中各物体的抓取，按给定顺序拼接。
///
/// `shuffle` 为真时，抓取和所有属性使用同一个随机排列。
pub fn load_subset<S, R>(
    source: &S,
    keys: &[String],
    shuffle: bool,
    rng: &mut R,
) -> Result<GraspBatch>
where
    S: GraspSource + ?Sized,
    R: Rng + ?Sized,
{
    if keys.is_empty() {
        return Err(PipelineError::schema("no objects to load"));
    }

    let mut tables = Vec::with_capacity(keys.len());
    for key in keys {
        let table = source.read_object(key)?;
        let rows = check_object(key, &table)?;
        tables.push((key.as_str(), rows, table));
    }

    // 以第一个非空物体为准确定列宽
    let (first_key, _, first) = tables
        .iter()
        .find(|(_, rows, _)| *rows > 0)
        .unwrap_or(&tables[0]);
    let widths: BTreeMap<&str, usize> = first
        .iter()
        .map(|(k, v)| (k.as_str(), v.ncols()))
        .collect();
    for (key, rows, table) in &tables {
        if table.len() != widths.len() || table.keys().any(|k| !widths.contains_key(k.as_str())) {
            return Err(PipelineError::schema(format!(
                "object {key:?} has different properties than {first_key:?}"
            )));
        }
        if *rows == 0 {
            continue;
        }
        for (name, values) in table {
            if values.ncols() != widths[name.as_str()] {
                return Err(PipelineError::schema(format!(
                    "{key}/{name} has {} columns, expected {}",
                    values.ncols(),
                    widths[name.as_str()]
                )));
            }
        }
    }

    let total: usize = tables.iter().map(|(_, rows, _)| rows).sum();
    let mut columns: BTreeMap<&str, Array2<f64>> = widths
        .iter()
        .map(|(&name, &width)| (name, Array2::zeros((total, width))))
        .collect();
    let mut names = Vec::with_capacity(total);

    let mut offset = 0;
    for (key, rows, table) in &tables {
        if *rows == 0 {
            continue;
        }
        for (name, values) in table {
            if let Some(column) = columns.get_mut(name.as_str()) {
                column.slice_mut(s![offset..offset + rows, ..]).assign(values);
            }
        }
        names.extend(std::iter::repeat(key.to_string()).take(*rows));
        offset += rows;
    }

    let grasps = columns
        .remove(GRASP_FIELD)
        .ok_or_else(|| PipelineError::schema("no grasp field"))?;
    let mut props = PropertyTable::default();
    for (name, values) in columns {
        props.insert(name.to_string(), Column::Numeric(values));
    }
    props.insert(OBJECT_NAME_FIELD.to_string(), Column::Text(names));

    let mut batch = GraspBatch { grasps, props };
    if shuffle {
        let mut index: Vec<usize> = (0..total).collect();
        index.shuffle(rng);
        batch.permute(&index);
    }
    log::info!(
        "loaded {} grasps from {} objects (shuffle={})",
        total,
        keys.len(),
        shuffle
    );
    Ok(batch)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// 构造一个物体的表，第 i 行的各属性都能还原出全局行号 `start + i`
    pub(crate) fn object_table(start: usize, rows: usize) -> ObjectTable {
        let mut table = ObjectTable::new();
        let ids: Vec<f64> = (start..start + rows).map(|i| i as f64).collect();
        let grasp = Array2::from_shape_fn((rows, 18), |(r, c)| {
            if c == 0 {
                ids[r]
            } else {
                0.01 * c as f64
            }
        });
        table.insert(GRASP_FIELD.to_string(), grasp);
        table.insert(
            "mass_wrt_world".to_string(),
            Array2::from_shape_fn((rows, 1), |(r, _)| ids[r] * 10.0),
        );
        table.insert("com_wrt_world".to_string(), Array2::zeros((rows, 3)));
        table.insert("inertia_wrt_world".to_string(), Array2::zeros((rows, 9)));
        let identity = Frame::identity().to_flat();
        let mut palm = identity;
        palm[11] = 0.3;
        for (name, flat) in [
            ("frame_world2work", identity),
            ("frame_work2obj", identity),
            ("frame_work2palm", palm),
        ] {
            table.insert(
                name.to_string(),
                Array2::from_shape_fn((rows, 12), |(_, c)| flat[c]),
            );
        }
        table.insert(
            "joint_1".to_string(),
            Array2::from_shape_fn((rows, 1), |(r, _)| ids[r] * 0.01),
        );
        table
    }

    pub(crate) fn two_objects() -> BTreeMap<String, ObjectTable> {
        let mut db = BTreeMap::new();
        db.insert("A".to_string(), object_table(0, 3));
        db.insert("B".to_string(), object_table(3, 2));
        db
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_object_order_without_shuffle() {
        let db = two_objects();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let batch = load_subset(&db, &keys(&["B", "A"]), false, &mut rng).unwrap();
        assert_eq!(batch.len(), 5);
        let names = batch.props.text(OBJECT_NAME_FIELD).unwrap();
        assert_eq!(names, &["B", "B", "A", "A", "A"]);
        let ids: Vec<f64> = batch.grasps.column(0).to_vec();
        assert_eq!(ids, vec![3.0, 4.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn shuffle_keeps_rows_aligned() {
        let db = two_objects();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let batch = load_subset(&db, &keys(&["A", "B"]), true, &mut rng).unwrap();
        let mass = batch.props.numeric("mass_wrt_world").unwrap();
        let joint = batch.props.numeric("joint_1").unwrap();
        let names = batch.props.text(OBJECT_NAME_FIELD).unwrap();

        let mut seen: Vec<usize> = Vec::new();
        for i in 0..batch.len() {
            let id = batch.grasps[[i, 0]];
            assert_eq!(mass[[i, 0]], id * 10.0);
            assert!((joint[[i, 0]] - id * 0.01).abs() < 1e-12);
            let expected = if id < 3.0 { "A" } else { "B" };
            assert_eq!(names[i], expected);
            seen.push(id as usize);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn missing_grasp_is_schema_error() {
        let mut db = two_objects();
        db.get_mut("B").unwrap().remove(GRASP_FIELD);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = load_subset(&db, &keys(&["A", "B"]), false, &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn ragged_property_is_inconsistent_length() {
        let mut db = two_objects();
        db.get_mut("A")
            .unwrap()
            .insert("mass_wrt_world".to_string(), Array2::zeros((2, 1)));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = load_subset(&db, &keys(&["A"]), false, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InconsistentLength { expected: 3, found: 2, .. }
        ));
    }

    #[test]
    fn missing_staging_field_is_schema_error() {
        for (field, _) in REQUIRED_FIELDS {
            let mut db = two_objects();
            db.get_mut("A").unwrap().remove(field);
            db.get_mut("B").unwrap().remove(field);
            let mut rng = ChaCha8Rng::seed_from_u64(0);
            let err = load_subset(&db, &keys(&["A", "B"]), false, &mut rng).unwrap_err();
            assert!(matches!(err, PipelineError::Schema(ref m) if m.contains(field)), "{field}");
        }
    }

    #[test]
    fn frame_width_is_checked() {
        let mut db = two_objects();
        db.get_mut("A")
            .unwrap()
            .insert(FRAME_WORK2PALM_FIELD.to_string(), Array2::zeros((3, 9)));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = load_subset(&db, &keys(&["A"]), false, &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(ref m) if m.contains(FRAME_WORK2PALM_FIELD)));
    }

    #[test]
    fn empty_joint_column_is_schema_error() {
        let mut db = two_objects();
        db.get_mut("B")
            .unwrap()
            .insert("joint_1".to_string(), Array2::zeros((2, 0)));
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = load_subset(&db, &keys(&["B"]), false, &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn empty_object_does_not_fix_widths() {
        // 没有抓取的物体，csv 为空，列宽都是 0
        let mut db = two_objects();
        let empty: ObjectTable = db["A"]
            .keys()
            .map(|name| (name.clone(), Array2::zeros((0, 0))))
            .collect();
        db.insert("E".to_string(), empty);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let batch = load_subset(&db, &keys(&["E", "A", "E", "B"]), false, &mut rng).unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.grasps.ncols(), 18);
        assert_eq!(batch.props.numeric(FRAME_WORK2OBJ_FIELD).unwrap().ncols(), FRAME_LEN);
        assert_eq!(batch.props.text(OBJECT_NAME_FIELD).unwrap()[0], "A");
    }

    #[test]
    fn grasp_width_is_checked_against_layout() {
        let db = two_objects();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let batch = load_subset(&db, &keys(&["A"]), false, &mut rng).unwrap();
        batch.check_layout(&GraspLayout::default()).unwrap();
        let wide = GraspLayout {
            num_contacts: 4,
            ..Default::default()
        };
        assert!(matches!(batch.check_layout(&wide), Err(PipelineError::Schema(_))));
    }

    #[test]
    fn record_accessors() {
        let db = two_objects();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let batch = load_subset(&db, &keys(&["A", "B"]), false, &mut rng).unwrap();
        let record = batch.record(4);
        assert_eq!(record.object_name().unwrap(), "B");
        assert_eq!(record.mass().unwrap(), 40.0);
        assert_eq!(record.frame_work2palm().unwrap().height(), 0.3);
        assert_eq!(record.joints().unwrap(), vec![("joint_1", 0.04)]);
        assert_eq!(record.inertia().unwrap().len(), 9);
    }
}
