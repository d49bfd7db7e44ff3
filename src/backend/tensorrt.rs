//! TensorRT backend slot (§9 design notes), stubbed for the same reason as
//! [`super::ncnn`]: no TensorRT binding is present in this crate's
//! dependency stack.

use std::path::Path;

use crate::error::{CiraError, CiraResult};

#[derive(Debug)]
pub struct TensorRtBackend;

impl TensorRtBackend {
    pub fn load(_engine_path: &Path, _input_w: u32, _input_h: u32) -> CiraResult<Self> {
        Err(CiraError::Model(
            "tensorrt backend is not available in this build".into(),
        ))
    }
}
