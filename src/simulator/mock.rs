//! 测试用的脚本化模拟器

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;

use nalgebra::Isometry3;
use ndarray::{s, Array3};

use super::{ImageCube, QueryResult, RenderParams, Simulator};
use crate::config::{DEPTH_CHANNEL, IMAGE_CHANNELS, MASK_CHANNEL};
use crate::error::Result;
use crate::transform::Frame;

/// 随机化渲染返回的图像类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// 物体居中，像素足够
    Valid,
    /// 物体碰到左上边界
    BorderTouching,
    /// 没有物体
    Empty,
    /// 不返回图像
    NoImage,
}

#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub requested: Frame,
    pub refined: Frame,
    pub params: RenderParams,
}

pub struct ScriptedSimulator {
    resolution: usize,
    script: VecDeque<Scripted>,
    gripper_visible: bool,
    log: Rc<RefCell<Vec<String>>>,
    queries: Rc<RefCell<Vec<RecordedQuery>>>,
}

impl ScriptedSimulator {
    /// 脚本为空时，随机化渲染总是返回有效图像
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution,
            script: VecDeque::new(),
            gripper_visible: false,
            log: Rc::new(RefCell::new(Vec::new())),
            queries: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_script(mut self, script: impl IntoIterator<Item = Scripted>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    pub fn call_log(&self) -> Rc<RefCell<Vec<String>>> {
        self.log.clone()
    }

    pub fn query_log(&self) -> Rc<RefCell<Vec<RecordedQuery>>> {
        self.queries.clone()
    }

    fn image(&self, kind: Scripted) -> ImageCube {
        let r = self.resolution;
        let rgb = if self.gripper_visible { 0.8 } else { 0.5 };
        let mut image = Array3::<f32>::from_elem((IMAGE_CHANNELS, r, r), rgb);
        image.slice_mut(s![DEPTH_CHANNEL, .., ..]).fill(0.3);
        let mut mask = image.slice_mut(s![MASK_CHANNEL, .., ..]);
        mask.fill(1.0);
        match kind {
            Scripted::Valid => mask.slice_mut(s![2..r - 2, 2..r - 2]).fill(0.0),
            Scripted::BorderTouching => mask.slice_mut(s![0..r / 2, 0..r / 2]).fill(0.0),
            Scripted::Empty | Scripted::NoImage => {}
        }
        image
    }
}

/// 模拟器对请求位姿的微调
pub fn refine(pose: &Frame) -> Frame {
    Frame(pose.0 * Isometry3::translation(0.0, 0.0, 0.001))
}

impl Simulator for ScriptedSimulator {
    fn load_object(
        &mut self,
        path: &Path,
        _center_of_mass: &[f64],
        _mass: f64,
        _inertia: &[f64],
    ) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("load_object:{}", path.display()));
        Ok(())
    }

    fn set_object_pose(&mut self, _frame: &Frame) -> Result<()> {
        self.log.borrow_mut().push("set_object_pose".to_string());
        Ok(())
    }

    fn set_gripper_pose(&mut self, _frame: &Frame) -> Result<()> {
        self.log.borrow_mut().push("set_gripper_pose".to_string());
        Ok(())
    }

    fn set_joint_position_by_name(&mut self, name: &str, angle: f64) -> Result<()> {
        self.log.borrow_mut().push(format!("joint:{}={}", name, angle));
        Ok(())
    }

    fn set_gripper_properties(&mut self, visible: bool, renderable: bool) -> Result<()> {
        self.gripper_visible = visible && renderable;
        self.log
            .borrow_mut()
            .push(format!("gripper:{},{}", visible, renderable));
        Ok(())
    }

    fn query(
        &mut self,
        camera_pose: &Frame,
        _world_frame: &Frame,
        params: &RenderParams,
    ) -> Result<QueryResult> {
        self.log.borrow_mut().push("query".to_string());
        let refined = refine(camera_pose);
        self.queries.borrow_mut().push(RecordedQuery {
            requested: *camera_pose,
            refined,
            params: params.clone(),
        });

        // 只有随机化渲染按脚本返回
        let kind = if params.randomize_lighting {
            self.script.pop_front().unwrap_or(Scripted::Valid)
        } else {
            Scripted::Valid
        };
        if kind == Scripted::NoImage {
            return Ok((None, refined));
        }
        Ok((Some(self.image(kind)), refined))
    }

    fn close(&mut self) -> Result<()> {
        self.log.borrow_mut().push("close".to_string());
        Ok(())
    }
}
