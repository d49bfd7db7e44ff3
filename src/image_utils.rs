//! Pure image preprocessing helpers shared by the capture worker, the
//! backend adapters, and the annotator — plain functions around
//! `blob_from_image` so they can be unit tested without a live camera or a
//! loaded net.

use opencv::core::{Mat, MatTraitConst, Scalar, Size, CV_32F};
use opencv::dnn::blob_from_image;
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

use crate::error::{CiraError, CiraResult};

/// JPEG quality used for both the MJPEG stream and `/snapshot` (§4.5, §7).
pub const JPEG_QUALITY: i32 = 85;

/// Fallback spatial size for a dynamic (`<= 0`) input dimension (§4.2).
pub const DYNAMIC_DIM_DEFAULT: i32 = 416;

/// Builds the `1/255`-scaled, BGR-swapped, square-resized blob the backend
/// adapters feed into `cv::dnn::Net::forward` (§4.2).
///
/// Always emits NCHW — `blob_from_image` has no NHWC mode, and probing a
/// loaded net's declared input layout is out of reach of `opencv::dnn`'s
/// bindings (see DESIGN.md's Open Question decisions). A `<= 0` spatial
/// dimension, which would only ever reach here from a caller passing an
/// unset size through, clamps to [`DYNAMIC_DIM_DEFAULT`] rather than being
/// handed to OpenCV as-is.
pub fn to_blob(frame: &Mat, input_w: i32, input_h: i32) -> CiraResult<Mat> {
    let w = if input_w <= 0 { DYNAMIC_DIM_DEFAULT } else { input_w };
    let h = if input_h <= 0 { DYNAMIC_DIM_DEFAULT } else { input_h };
    blob_from_image(
        frame,
        1.0 / 255.0,
        Size::new(w, h),
        Scalar::from(0.0),
        true,
        false,
        CV_32F,
    )
    .map_err(|e| CiraError::Model(format!("blob_from_image failed: {e}")))
}

/// Resizes `frame` to exactly `(w, h)` using bilinear interpolation. Used
/// for the inference input path and, separately, to size the annotated
/// frame-file down if it is ever published at a reduced resolution.
pub fn resize(frame: &Mat, w: i32, h: i32) -> CiraResult<Mat> {
    let mut out = Mat::default();
    imgproc::resize(
        frame,
        &mut out,
        Size::new(w, h),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )
    .map_err(|e| CiraError::Model(format!("resize failed: {e}")))?;
    Ok(out)
}

/// Encodes a BGR frame to JPEG bytes at [`JPEG_QUALITY`] (§4.5, §6, §7 —
/// used by `/snapshot`, `/frame/latest`, and each MJPEG part).
pub fn encode_jpeg(frame: &Mat) -> CiraResult<Vec<u8>> {
    let mut buf = opencv::core::Vector::<u8>::new();
    let params = opencv::core::Vector::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, JPEG_QUALITY]);
    imgcodecs::imencode(".jpg", frame, &mut buf, &params)
        .map_err(|e| CiraError::Model(format!("imencode failed: {e}")))?;
    Ok(buf.to_vec())
}

/// Frame width/height in pixels, the denominator used to convert normalized
/// detections back to pixel space (§3).
pub fn frame_dims(frame: &Mat) -> CiraResult<(u32, u32)> {
    let size = frame
        .size()
        .map_err(|e| CiraError::Model(format!("frame has no size: {e}")))?;
    if size.width <= 0 || size.height <= 0 {
        return Err(CiraError::Input("frame has zero or negative dimensions".into()));
    }
    Ok((size.width as u32, size.height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Mat, CV_8UC3};

    fn blank_mat(w: i32, h: i32) -> Mat {
        Mat::new_rows_cols_with_default(h, w, CV_8UC3, Scalar::from(0.0)).unwrap()
    }

    #[test]
    fn resize_produces_requested_dimensions() {
        let frame = blank_mat(640, 480);
        let resized = resize(&frame, 320, 240).unwrap();
        let (w, h) = frame_dims(&resized).unwrap();
        assert_eq!((w, h), (320, 240));
    }

    #[test]
    fn frame_dims_reports_source_size() {
        let frame = blank_mat(800, 600);
        assert_eq!(frame_dims(&frame).unwrap(), (800, 600));
    }

    #[test]
    fn encode_jpeg_produces_nonempty_buffer() {
        let frame = blank_mat(64, 64);
        let bytes = encode_jpeg(&frame).unwrap();
        assert!(!bytes.is_empty());
        // JPEG magic bytes.
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn to_blob_accepts_non_square_input() {
        let frame = blank_mat(640, 480);
        let blob = to_blob(&frame, 416, 416).unwrap();
        assert_eq!(frame_dims(&frame).is_ok(), true);
        let _ = blob; // presence of a blob without panicking is the assertion
    }

    #[test]
    fn to_blob_clamps_non_positive_dims_to_default() {
        let frame = blank_mat(640, 480);
        // A dynamic (<= 0) dimension must not reach blob_from_image as-is.
        let blob = to_blob(&frame, 0, -1).unwrap();
        let _ = blob;
    }
}
