//! Darknet (`.cfg` + `.weights`) backend, loaded into a `cv::dnn::Net` via
//! OpenCV's `dnn` module rather than a dedicated Darknet runtime.

use std::path::Path;

use opencv::dnn::read_net_from_darknet;

use crate::backend::net::LoadedNet;
use crate::error::{CiraError, CiraResult};
use crate::image_utils::to_blob;

#[derive(Debug)]
pub struct DarknetBackend {
    net: LoadedNet,
    input_w: u32,
    input_h: u32,
}

impl DarknetBackend {
    pub fn load(cfg_path: &Path, weights_path: &Path, input_w: u32, input_h: u32) -> CiraResult<Self> {
        let cfg = cfg_path
            .to_str()
            .ok_or_else(|| CiraError::Input("cfg path is not valid UTF-8".into()))?;
        let weights = weights_path
            .to_str()
            .ok_or_else(|| CiraError::Input("weights path is not valid UTF-8".into()))?;

        let net = read_net_from_darknet(cfg, weights)
            .map_err(|e| CiraError::Model(format!("read_net_from_darknet failed: {e}")))?;

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
