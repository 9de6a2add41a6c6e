//! 模拟器接口
//!
//! 模拟器是有状态的外部服务，一次只能处理一个布置或渲染请求，
//! 所以由 [SimSession] 独占持有，以 `&mut` 传给各个组件。

#[cfg(test)]
pub mod mock;
mod params;
mod remote;

pub use params::RenderParams;
pub use remote::RemoteSimulator;

use std::ops::{Deref, DerefMut};
use std::path::Path;

use ndarray::Array3;

use crate::error::Result;
use crate::transform::Frame;

/// `[5, R, R]` 图像：RGB、深度、分割掩码
pub type ImageCube = Array3<f32>;

/// 一次渲染的结果：图像（可能为空）以及模拟器实际使用的相机位姿
pub type QueryResult = (Option<ImageCube>, Frame);

/// 模拟器的控制接口
pub trait Simulator {
    fn load_object(
        &mut self,
        path: &Path,
        center_of_mass: &[f64],
        mass: f64,
        inertia: &[f64],
    ) -> Result<()>;

    fn set_object_pose(&mut self, frame_work2obj: &Frame) -> Result<()>;

    fn set_gripper_pose(&mut self, frame_work2palm: &Frame) -> Result<()>;

    fn set_joint_position_by_name(&mut self, name: &str, angle: f64) -> Result<()>;

    /// 默认都为 false，即隐藏夹爪
    fn set_gripper_properties(&mut self, visible: bool, renderable: bool) -> Result<()>;

    /// 在 `camera_pose`（相对于工作坐标系）渲染场景
    fn query(
        &mut self,
        camera_pose: &Frame,
        world_frame: &Frame,
        params: &RenderParams,
    ) -> Result<QueryResult>;

    fn close(&mut self) -> Result<()>;
}

/// 模拟器会话：开始处理前打开一次，数据集写完后关闭一次。
pub struct SimSession<S: Simulator> {
    sim: S,
    closed: bool,
}

impl<S: Simulator> SimSession<S> {
    pub fn open(sim: S) -> Self {
        log::info!("simulator session opened");
        Self { sim, closed: false }
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        let result = self.sim.close();
        log::info!("simulator session closed");
        result
    }
}

impl<S: Simulator> Deref for SimSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.sim
    }
}

impl<S: Simulator> DerefMut for SimSession<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.sim
    }
}

impl<S: Simulator> Drop for SimSession<S> {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("simulator session dropped without close");
            if let Err(err) = self.sim.close() {
                log::error!("failed to close simulator: {}", err);
            }
        }
    }
}
