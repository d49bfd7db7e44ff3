//! Shared `cv::dnn::Net` plumbing for the Darknet and ONNX backends (§4.2).
//!
//! `Net` holds no thread-local state but Rust can't know that, so
//! `Send`/`Sync` are asserted by hand.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use opencv::core::{Mat, MatTraitConst, Vector};
use opencv::dnn::{NetTrait, NetTraitConst};
use opencv::prelude::*;

use crate::error::{CiraError, CiraResult};

#[derive(Debug)]
pub struct NetWrapper(pub opencv::dnn::Net);

impl Deref for NetWrapper {
    type Target = opencv::dnn::Net;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for NetWrapper {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

unsafe impl Send for NetWrapper {}
unsafe impl Sync for NetWrapper {}

/// A loaded `cv::dnn::Net` guarded by a mutex, since `forward` takes `&mut
/// Net` but backends are shared behind `Arc` (§5).
pub struct LoadedNet {
    net: Mutex<NetWrapper>,
}

impl std::fmt::Debug for LoadedNet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedNet").finish_non_exhaustive()
    }
}

impl LoadedNet {
    pub fn new(net: opencv::dnn::Net) -> Self {
        Self {
            net: Mutex::new(NetWrapper(net)),
        }
    }

    fn output_names(net: &opencv::dnn::Net) -> CiraResult<Vector<String>> {
        let out_layers = net
            .get_unconnected_out_layers()
            .map_err(|e| CiraError::Model(format!("get_unconnected_out_layers: {e}")))?;
        let layer_names = net
            .get_layer_names()
            .map_err(|e| CiraError::Model(format!("get_layer_names: {e}")))?;

        let mut names = Vector::new();
        for layer_num in out_layers.iter() {
            let name = layer_names
                .get((layer_num - 1) as usize)
                .map_err(|e| CiraError::Model(format!("layer name lookup: {e}")))?;
            names.push(&name);
        }
        Ok(names)
    }

    /// Runs the blob through the network and flattens every output layer
    /// into a row-major `f32` buffer plus its shape (§4.2: "ONNX iterates
    /// over all output tensors — YOLO models often expose three scales").
    /// Darknet exports through the same `cv::dnn::Net` path and benefits
    /// identically when a `.cfg` defines multiple YOLO output layers.
    pub fn forward_all(&self, blob: &Mat) -> CiraResult<Vec<(Vec<f32>, Vec<usize>)>> {
        let mut guard = self
            .net
            .lock()
            .map_err(|_| CiraError::Generic("net mutex poisoned".into()))?;

        let names = Self::output_names(&guard)?;
        guard
            .set_input(blob, "", 1.0, opencv::core::Scalar::from(0.0))
            .map_err(|e| CiraError::Model(format!("set_input: {e}")))?;

        let mut outputs: Vector<Mat> = Vector::new();
        guard
            .forward(&mut outputs, &names)
            .map_err(|e| CiraError::Model(format!("forward: {e}")))?;

        if outputs.is_empty() {
            return Err(CiraError::Model("network produced no output layers".into()));
        }

        let mut tensors = Vec::with_capacity(outputs.len());
        for output in outputs.iter() {
            let shape: Vec<usize> = output
                .mat_size()
                .iter()
                .map(|&d| d.max(0) as usize)
                .collect();
            let data: &[f32] = output
                .data_typed()
                .map_err(|e| CiraError::Model(format!("unexpected output element type: {e}")))?;
            tensors.push((data.to_vec(), shape));
        }
        Ok(tensors)
    }
}
