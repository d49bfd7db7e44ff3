//! NCNN backend slot (§9 design notes). No NCNN binding exists in this
//! crate's dependency stack, so this slot is kept present and honest: it
//! always fails to load rather than being silently omitted from the format
//! probe order (§4.1), or worse, faked with a stub inference path.

use std::path::Path;

use crate::error::{CiraError, CiraResult};

#[derive(Debug)]
pub struct NcnnBackend;

impl NcnnBackend {
    pub fn load(_param_path: &Path, _bin_path: &Path, _input_w: u32, _input_h: u32) -> CiraResult<Self> {
        Err(CiraError::Model(
            "ncnn backend is not available in this build".into(),
        ))
    }
}
