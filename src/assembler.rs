//! 数据集组装
//!
//! 所有输出行先做一次全局随机排列。第 r 条记录的 V 个视角写到排列中的
//! `[r*V, (r+1)*V)` 这一段，同一物体的相似视角因此分散在整个数据集中。

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{RecordFailurePolicy, RunConfig, IMAGE_CHANNELS};
use crate::error::{PipelineError, Result};
use crate::sampler::{SampledView, ViewSampler};
use crate::simulator::{SimSession, Simulator};
use crate::store::{DatasetStore, StoreLayout, StoreManifest, StoreRow};
use crate::subset::{GraspBatch, GraspRecord};

/// 所有输出行的随机排列
pub fn slot_permutation<R: Rng + ?Sized>(
    num_records: usize,
    num_views: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut slots: Vec<usize> = (0..num_records * num_views).collect();
    slots.shuffle(rng);
    slots
}

/// 第 `record` 条记录占用的行
pub fn record_slots(slots: &[usize], record: usize, num_views: usize) -> &[usize] {
    &slots[record * num_views..(record + 1) * num_views]
}

/// 在 `mesh_dir` 中查找以物体名开头的网格文件
pub fn find_mesh(mesh_dir: &Path, object: &str) -> Result<PathBuf> {
    let missing = || PipelineError::MissingMesh {
        object: object.to_string(),
        dir: mesh_dir.display().to_string(),
    };
    let entries = std::fs::read_dir(mesh_dir).map_err(|_| missing())?;
    let mut matches = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(object));
        if is_match && path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    matches.into_iter().next().ok_or_else(missing)
}

/// 布置场景：加载物体、设置物体和夹爪位姿、关节角
pub fn stage_record<S: Simulator>(
    session: &mut SimSession<S>,
    record: &GraspRecord,
    mesh_dir: &Path,
) -> Result<()> {
    let object_path = find_mesh(mesh_dir, record.object_name()?)?;
    session.load_object(
        &object_path,
        &record.center_of_mass()?,
        record.mass()?,
        &record.inertia()?,
    )?;
    session.set_object_pose(&record.frame_work2obj()?)?;
    session.set_gripper_pose(&record.frame_work2palm()?)?;
    for (name, angle) in record.joints()? {
        session.set_joint_position_by_name(name, angle)?;
    }
    Ok(())
}

pub struct DatasetAssembler {
    sampler: ViewSampler,
    mesh_dir: PathBuf,
    num_views: usize,
    policy: RecordFailurePolicy,
    seed: Option<u64>,
}

impl DatasetAssembler {
    pub fn new(sampler: ViewSampler, mesh_dir: impl Into<PathBuf>, num_views: usize) -> Self {
        Self {
            sampler,
            mesh_dir: mesh_dir.into(),
            num_views,
            policy: RecordFailurePolicy::Abort,
            seed: None,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            ViewSampler::from_config(config),
            config.mesh_dir.clone(),
            config.num_views,
        )
        .with_policy(config.failure_policy)
        .with_seed(Some(config.seed))
    }

    pub fn with_policy(mut self, policy: RecordFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 只记录到 manifest 中
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn record_views<S, R>(
        &self,
        session: &mut SimSession<S>,
        record: &GraspRecord,
        rng: &mut R,
    ) -> Result<Vec<SampledView>>
    where
        S: Simulator,
        R: Rng + ?Sized,
    {
        stage_record(session, record, &self.mesh_dir)?;
        self.sampler
            .sample_views(session, record, self.num_views, rng)
    }

    /// 为每条记录采样视角，并按随机排列写入 `path` 处的数据集
    pub fn create_dataset<S, R>(
        &self,
        session: &mut SimSession<S>,
        batch: &GraspBatch,
        path: &Path,
        rng: &mut R,
    ) -> Result<StoreManifest>
    where
        S: Simulator,
        R: Rng + ?Sized,
    {
        if batch.is_empty() {
            return Err(PipelineError::schema("no grasps to render"));
        }
        // 源数据的问题要在动用模拟器和创建数据集之前发现
        batch.check_layout(self.sampler.layout())?;
        let num_views = self.num_views;
        let layout = StoreLayout::for_batch(
            batch,
            num_views,
            IMAGE_CHANNELS,
            self.sampler.query_params().resolution,
        );
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        let mut store = DatasetStore::create(path, &name, &layout, self.seed)?;

        let slots = slot_permutation(batch.len(), num_views, rng);
        for index in 0..batch.len() {
            log::info!("{} / {}", index, batch.len());
            let record = batch.record(index);
            let record_slots = record_slots(&slots, index, num_views);

            let views = match self.record_views(session, &record, rng) {
                Ok(views) => views,
                Err(err) => match self.policy {
                    RecordFailurePolicy::Abort => {
                        log::error!("record {} failed: {}", index, err);
                        return Err(err);
                    }
                    RecordFailurePolicy::Skip => {
                        log::warn!("record {} skipped: {}", index, err);
                        store.mark_skipped(index, record_slots)?;
                        continue;
                    }
                },
            };

            log::debug!(
                "record {} took {} renders",
                index,
                views.iter().map(|v| v.attempts).sum::<usize>()
            );
            for (view, &slot) in views.iter().zip(record_slots) {
                let frame = view.frame_work2cam.to_flat();
                store.write_row(
                    slot,
                    &StoreRow {
                        image_without_gripper: view.image_without_gripper.view(),
                        image_with_gripper: view.image_with_gripper.view(),
                        grasp: &view.grasp_in_camera_frame,
                        frame_work2cam: &frame,
                        record,
                    },
                )?;
            }
        }

        store.finalize()
    }
}
