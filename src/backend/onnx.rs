//! ONNX backend: loads a `cv::dnn::Net` from a `.onnx` file, either from
//! disk or from an in-memory buffer.

use std::path::Path;

use opencv::core::Vector;
use opencv::dnn::{read_net_from_onnx, read_net_from_onnx_buffer};

use crate::backend::net::LoadedNet;
use crate::error::{CiraError, CiraResult};
use crate::image_utils::to_blob;

#[derive(Debug)]
pub struct OnnxBackend {
    net: LoadedNet,
    input_w: u32,
    input_h: u32,
}

impl OnnxBackend {
    pub fn load(path: &Path, input_w: u32, input_h: u32) -> CiraResult<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| CiraError::Input("onnx path is not valid UTF-8".into()))?;
        let net = read_net_from_onnx(path_str)
            .map_err(|e| CiraError::Model(format!("read_net_from_onnx failed: {e}")))?;
        Ok(Self {
            net: LoadedNet::new(net),
            input_w,
            input_h,
        })
    }

    pub fn load_from_bytes(bytes: &[u8], input_w: u32, input_h: u32) -> CiraResult<Self> {
        let net = read_net_from_onnx_buffer(&Vector::from_slice(bytes))
            .map_err(|e| CiraError::Model(format!("read_net_from_onnx_buffer failed: {e}")))?;
        Ok(Self {
            net: LoadedNet::new(net),
            input_w,
            input_h,
        })
    }

    pub fn infer(&self, frame: &opencv::core::Mat) -> CiraResult<Vec<(Vec<f32>, Vec<usize>)>> {
        let blob = to_blob(frame, self.input_w as i32, self.input_h as i32)?;
        self.net.forward_all(&blob)
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.input_w, self.input_h)
    }
}
