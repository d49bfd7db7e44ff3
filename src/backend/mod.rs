//! Backend adapters (§4.2): a tagged-sum dispatch over the four model
//! runtimes. A `BackendHandle` is loaded once per model swap and then
//! called through a uniform `infer` surface regardless of which runtime
//! actually backs it.

mod darknet;
mod ncnn;
mod net;
mod onnx;
mod tensorrt;

use std::path::{Path, PathBuf};

use opencv::core::Mat;

use crate::error::{CiraError, CiraResult};

pub use darknet::DarknetBackend;
pub use ncnn::NcnnBackend;
pub use onnx::OnnxBackend;
pub use tensorrt::TensorRtBackend;

/// The model formats the dispatcher knows how to probe for (§4.1, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFormat {
    Onnx,
    Darknet,
    Ncnn,
    TensorRt,
}

impl std::fmt::Display for BackendFormat {
    /// Renders the exact strings the `/stats` `model_name` field documents
    /// (§6): `"ONNX"`, `"Darknet"`, `"NCNN"`, `"TensorRT"`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Onnx => "ONNX",
            Self::Darknet => "Darknet",
            Self::Ncnn => "NCNN",
            Self::TensorRt => "TensorRT",
        };
        f.write_str(s)
    }
}

/// Extensions the probe recognizes, keyed to the format that owns them
/// (§4.1, §6). TensorRT accepts either `.engine` or `.trt` — different
/// export tools favor one or the other and neither is more canonical.
const DARKNET_CFG_EXT: &str = "cfg";
const DARKNET_WEIGHTS_EXT: &str = "weights";
const NCNN_PARAM_EXT: &str = "param";
const NCNN_BIN_EXT: &str = "bin";
const ONNX_EXT: &str = "onnx";
const TENSORRT_EXTS: [&str; 2] = ["engine", "trt"];

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Finds the single file directly inside `dir` carrying `ext`, regardless
/// of its basename (§4.1: "one `.cfg`, one `.weights`", any filename).
/// Zero or more than one match is not a layout this probe recognizes.
fn find_one_with_extension(dir: &Path, ext: &str) -> Option<PathBuf> {
    let mut matches = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && has_extension(p, ext));
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first)
}

fn find_one_with_any_extension(dir: &Path, exts: &[&str]) -> Option<PathBuf> {
    exts.iter().find_map(|ext| find_one_with_extension(dir, ext))
}

/// The concrete files a probe resolved to, carrying whatever basenames the
/// directory actually used.
#[derive(Debug, Clone)]
pub enum ModelFiles {
    Darknet { cfg: PathBuf, weights: PathBuf },
    Onnx(PathBuf),
    Ncnn { param: PathBuf, bin: PathBuf },
    TensorRt(PathBuf),
}

impl ModelFiles {
    pub fn format(&self) -> BackendFormat {
        match self {
            Self::Darknet { .. } => BackendFormat::Darknet,
            Self::Onnx(_) => BackendFormat::Onnx,
            Self::Ncnn { .. } => BackendFormat::Ncnn,
            Self::TensorRt(_) => BackendFormat::TensorRt,
        }
    }
}

/// Resolves `path` to a concrete model file set (§4.1, §6).
///
/// A directory is scanned by extension alone — any basename is accepted as
/// long as exactly one file carries the required extension — in the fixed
/// probe order Darknet → NCNN → ONNX → TensorRT. The first complete match
/// wins, so a directory carrying both a `.onnx` file and a complete Darknet
/// `.cfg`/`.weights` pair is still detected as Darknet (§8 boundary
/// behavior). A single file (not a directory) dispatches on its own
/// extension instead: `.onnx` → ONNX, `.engine`/`.trt` → TensorRT; Darknet
/// and NCNN both need two files and so never match a bare file path.
pub fn resolve_model_files(path: &Path) -> Option<ModelFiles> {
    if path.is_file() {
        if has_extension(path, ONNX_EXT) {
            return Some(ModelFiles::Onnx(path.to_path_buf()));
        }
        if TENSORRT_EXTS.iter().any(|ext| has_extension(path, ext)) {
            return Some(ModelFiles::TensorRt(path.to_path_buf()));
        }
        return None;
    }

    if let (Some(cfg), Some(weights)) = (
        find_one_with_extension(path, DARKNET_CFG_EXT),
        find_one_with_extension(path, DARKNET_WEIGHTS_EXT),
    ) {
        return Some(ModelFiles::Darknet { cfg, weights });
    }
    if let (Some(param), Some(bin)) = (
        find_one_with_extension(path, NCNN_PARAM_EXT),
        find_one_with_extension(path, NCNN_BIN_EXT),
    ) {
        return Some(ModelFiles::Ncnn { param, bin });
    }
    if let Some(onnx) = find_one_with_extension(path, ONNX_EXT) {
        return Some(ModelFiles::Onnx(onnx));
    }
    if let Some(engine) = find_one_with_any_extension(path, &TENSORRT_EXTS) {
        return Some(ModelFiles::TensorRt(engine));
    }
    None
}

/// Probes `path` for a known model layout, returning only the format tag.
/// See [`resolve_model_files`] for the full file resolution `load` uses.
pub fn probe_format(path: &Path) -> Option<BackendFormat> {
    resolve_model_files(path).map(|f| f.format())
}

/// A loaded model, regardless of which backend produced it.
#[derive(Debug)]
pub enum BackendHandle {
    Darknet(DarknetBackend),
    Onnx(OnnxBackend),
    Ncnn(NcnnBackend),
    TensorRt(TensorRtBackend),
}

impl BackendHandle {
    /// Resolves `path` (a model directory, or a single model file) and
    /// loads whichever backend matches (§4.1). Returns a [`CiraError::Model`]
    /// both when no known layout is present and when a matched backend's
    /// loader itself fails (including the NCNN/TensorRT slots, which always
    /// fail — see their modules).
    pub fn load(path: &Path, input_w: u32, input_h: u32) -> CiraResult<Self> {
        match resolve_model_files(path) {
            Some(ModelFiles::Onnx(p)) => OnnxBackend::load(&p, input_w, input_h).map(Self::Onnx),
            Some(ModelFiles::Darknet { cfg, weights }) => {
                DarknetBackend::load(&cfg, &weights, input_w, input_h).map(Self::Darknet)
            }
            Some(ModelFiles::Ncnn { param, bin }) => {
                NcnnBackend::load(&param, &bin, input_w, input_h).map(Self::Ncnn)
            }
            Some(ModelFiles::TensorRt(p)) => {
                TensorRtBackend::load(&p, input_w, input_h).map(Self::TensorRt)
            }
            None => Err(CiraError::Model(format!(
                "no recognized model files at {}",
                path.display()
            ))),
        }
    }

    /// Runs inference, returning one flattened row-major output tensor (plus
    /// its shape) per output layer the network exposes — YOLO models
    /// commonly expose three per-scale outputs (§4.2), each of which
    /// `decoder::decode_multi` decodes independently before a final
    /// cross-scale NMS pass.
    pub fn infer(&self, frame: &Mat) -> CiraResult<Vec<(Vec<f32>, Vec<usize>)>> {
        match self {
            Self::Darknet(b) => b.infer(frame),
            Self::Onnx(b) => b.infer(frame),
            Self::Ncnn(_) | Self::TensorRt(_) => {
                Err(CiraError::Model("backend slot has no loaded model".into()))
            }
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        match self {
            Self::Darknet(b) => b.input_size(),
            Self::Onnx(b) => b.input_size(),
            Self::Ncnn(_) | Self::TensorRt(_) => (0, 0),
        }
    }

    pub fn format(&self) -> BackendFormat {
        match self {
            Self::Darknet(_) => BackendFormat::Darknet,
            Self::Onnx(_) => BackendFormat::Onnx,
            Self::Ncnn(_) => BackendFormat::Ncnn,
            Self::TensorRt(_) => BackendFormat::TensorRt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cira-backend-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn probe_prefers_darknet_over_onnx() {
        // §8 boundary behavior: a directory containing both `.onnx` and a
        // complete Darknet pair is detected as Darknet.
        let dir = tempdir();
        std::fs::write(dir.join("yolov8n.onnx"), b"").unwrap();
        std::fs::write(dir.join("best.cfg"), b"").unwrap();
        std::fs::write(dir.join("best.weights"), b"").unwrap();
        assert_eq!(probe_format(&dir), Some(BackendFormat::Darknet));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn probe_requires_both_darknet_files() {
        let dir = tempdir();
        std::fs::write(dir.join("best.cfg"), b"").unwrap();
        assert_eq!(probe_format(&dir), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn probe_accepts_any_basename() {
        // Any filename works as long as exactly one carries the extension.
        let dir = tempdir();
        std::fs::write(dir.join("whatever-i-want.onnx"), b"").unwrap();
        assert_eq!(probe_format(&dir), Some(BackendFormat::Onnx));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn probe_rejects_ambiguous_extension_count() {
        // Two `.onnx` files in the same directory isn't a layout this probe
        // can resolve unambiguously.
        let dir = tempdir();
        std::fs::write(dir.join("a.onnx"), b"").unwrap();
        std::fs::write(dir.join("b.onnx"), b"").unwrap();
        assert_eq!(probe_format(&dir), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn probe_finds_ncnn_and_both_tensorrt_extensions() {
        let dir = tempdir();
        std::fs::write(dir.join("net.param"), b"").unwrap();
        std::fs::write(dir.join("net.bin"), b"").unwrap();
        assert_eq!(probe_format(&dir), Some(BackendFormat::Ncnn));
        std::fs::remove_dir_all(&dir).unwrap();

        let dir2 = tempdir();
        std::fs::write(dir2.join("model.engine"), b"").unwrap();
        assert_eq!(probe_format(&dir2), Some(BackendFormat::TensorRt));
        std::fs::remove_dir_all(&dir2).unwrap();

        let dir3 = tempdir();
        std::fs::write(dir3.join("model.trt"), b"").unwrap();
        assert_eq!(probe_format(&dir3), Some(BackendFormat::TensorRt));
        std::fs::remove_dir_all(&dir3).unwrap();
    }

    #[test]
    fn single_file_path_dispatches_by_its_own_extension() {
        let dir = tempdir();
        let onnx_path = dir.join("detector.onnx");
        std::fs::write(&onnx_path, b"").unwrap();
        assert_eq!(probe_format(&onnx_path), Some(BackendFormat::Onnx));

        let trt_path = dir.join("detector.trt");
        std::fs::write(&trt_path, b"").unwrap();
        assert_eq!(probe_format(&trt_path), Some(BackendFormat::TensorRt));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_directory_has_no_format() {
        let dir = tempdir();
        assert_eq!(probe_format(&dir), None);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn ncnn_slot_always_fails_to_load() {
        let dir = tempdir();
        std::fs::write(dir.join("net.param"), b"").unwrap();
        std::fs::write(dir.join("net.bin"), b"").unwrap();
        let result = BackendHandle::load(&dir, 416, 416);
        assert!(result.is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
