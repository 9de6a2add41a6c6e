//! 通过 TCP 连接模拟器桥接进程。
//!
//! 每个请求是一行 JSON，`cmd` 字段为命令名；每个响应也是一行 JSON。

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use super::{QueryResult, RenderParams, Simulator};
use crate::config::{SpawnParams, FRAME_LEN, IMAGE_CHANNELS};
use crate::error::{PipelineError, Result};
use crate::transform::Frame;

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request<'a> {
    LoadObject {
        path: &'a Path,
        com: &'a [f64],
        mass: f64,
        inertia: &'a [f64],
    },
    SetObjectPose {
        frame: [f64; FRAME_LEN],
    },
    SetGripperPose {
        frame: [f64; FRAME_LEN],
    },
    SetJointPositionByName {
        name: &'a str,
        angle: f64,
    },
    SetGripperProperties {
        visible: bool,
        renderable: bool,
    },
    Query {
        camera_pose: [f64; FRAME_LEN],
        world_frame: [f64; FRAME_LEN],
        params: &'a RenderParams,
    },
    Close,
}

#[derive(Debug, Default, Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    /// `[5, R, R]` 顺序的平铺图像
    #[serde(default)]
    image: Option<Vec<f32>>,
    #[serde(default)]
    camera_pose: Option<Vec<f64>>,
}

pub struct RemoteSimulator {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    line: String,
}

impl RemoteSimulator {
    pub fn connect(params: &SpawnParams) -> Result<Self> {
        log::info!("connecting to simulator at {}:{}", params.ip, params.port);
        let stream = TcpStream::connect((params.ip.as_str(), params.port))?;
        if params.timeout_secs > 0.0 {
            let timeout = Some(Duration::from_secs_f64(params.timeout_secs));
            stream.set_read_timeout(timeout)?;
            stream.set_write_timeout(timeout)?;
        }
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            line: String::new(),
        })
    }

    fn call(&mut self, request: &Request) -> Result<Response> {
        serde_json::to_writer(&mut self.writer, request)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Err(PipelineError::simulator("connection closed by simulator"));
        }
        let response: Response = serde_json::from_str(self.line.trim_end())?;
        if !response.ok {
            let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(PipelineError::simulator(reason));
        }
        Ok(response)
    }
}

impl Simulator for RemoteSimulator {
    fn load_object(
        &mut self,
        path: &Path,
        center_of_mass: &[f64],
        mass: f64,
        inertia: &[f64],
    ) -> Result<()> {
        self.call(&Request::LoadObject {
            path,
            com: center_of_mass,
            mass,
            inertia,
        })?;
        Ok(())
    }

    fn set_object_pose(&mut self, frame_work2obj: &Frame) -> Result<()> {
        self.call(&Request::SetObjectPose {
            frame: frame_work2obj.to_flat(),
        })?;
        Ok(())
    }

    fn set_gripper_pose(&mut self, frame_work2palm: &Frame) -> Result<()> {
        self.call(&Request::SetGripperPose {
            frame: frame_work2palm.to_flat(),
        })?;
        Ok(())
    }

    fn set_joint_position_by_name(&mut self, name: &str, angle: f64) -> Result<()> {
        self.call(&Request::SetJointPositionByName { name, angle })?;
        Ok(())
    }

    fn set_gripper_properties(&mut self, visible: bool, renderable: bool) -> Result<()> {
        self.call(&Request::SetGripperProperties {
            visible,
            renderable,
        })?;
        Ok(())
    }

    fn query(
        &mut self,
        camera_pose: &Frame,
        world_frame: &Frame,
        params: &RenderParams,
    ) -> Result<QueryResult> {
        let response = self.call(&Request::Query {
            camera_pose: camera_pose.to_flat(),
            world_frame: world_frame.to_flat(),
            params,
        })?;

        // 模拟器可能会微调位姿，没有返回时使用请求的位姿
        let refined = match response.camera_pose {
            Some(flat) => Frame::from_flat(&flat)?,
            None => *camera_pose,
        };
        let image = match response.image {
            Some(values) => {
                let r = params.resolution;
                let expected = IMAGE_CHANNELS * r * r;
                if values.len() != expected {
                    return Err(PipelineError::ShapeMismatch {
                        field: "image".to_string(),
                        expected,
                        found: values.len(),
                    });
                }
                Array3::from_shape_vec((IMAGE_CHANNELS, r, r), values)
                    .map(Some)
                    .map_err(|e| PipelineError::Image(e.to_string()))?
            }
            None => None,
        };
        Ok((image, refined))
    }

    fn close(&mut self) -> Result<()> {
        self.call(&Request::Close)?;
        Ok(())
    }
}
