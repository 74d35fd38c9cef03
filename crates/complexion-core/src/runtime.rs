//! Tensor runtime: turns decoded photos into canonical fixed-shape tensors.
//!
//! Backends are selected once, in probe order (accelerated first, portable
//! last). A probe that fails is logged and skipped; the caller only sees an
//! error when no backend at all can be brought up.

use crate::error::PipelineError;
use crate::types::PixelBuffer;
use ndarray::{Array3, ArrayView3};

/// Default edge length of the canonical square tensor.
pub const DEFAULT_CANONICAL_SIZE: usize = 224;

/// An RGB tensor of shape (size, size, 3) with samples in [0, 1].
#[derive(Debug, Clone)]
pub struct CanonicalTensor {
    data: Array3<f32>,
}

impl CanonicalTensor {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// (height, width, channels)
    pub fn shape(&self) -> [usize; 3] {
        let (h, w, c) = self.data.dim();
        [h, w, c]
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Accelerated,
    Portable,
}

/// A ready-to-use tensor backend.
pub trait TensorBackend: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> BackendKind;
    fn canonicalize(
        &self,
        image: &PixelBuffer,
        size: usize,
    ) -> Result<CanonicalTensor, PipelineError>;
}

/// Attempts to bring up one backend.
pub trait BackendProbe: Send {
    fn name(&self) -> &str;
    fn probe(&self) -> Result<Box<dyn TensorBackend>, PipelineError>;
}

/// Portable backend: bilinear resampling on the CPU.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl TensorBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Portable
    }

    fn canonicalize(
        &self,
        image: &PixelBuffer,
        size: usize,
    ) -> Result<CanonicalTensor, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::DecodeFailure("image has no pixels".into()));
        }
        Ok(CanonicalTensor::new(resize_rgb(image, size, size)))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CpuProbe;

impl BackendProbe for CpuProbe {
    fn name(&self) -> &str {
        "cpu"
    }

    fn probe(&self) -> Result<Box<dyn TensorBackend>, PipelineError> {
        Ok(Box::new(CpuBackend))
    }
}

/// Explicitly owned, lazily initialized tensor runtime handle.
pub struct TensorRuntime {
    probes: Vec<Box<dyn BackendProbe>>,
    backend: Option<Box<dyn TensorBackend>>,
    canonical_size: usize,
}

impl TensorRuntime {
    /// Runtime with the portable CPU backend only.
    pub fn new(canonical_size: usize) -> Self {
        Self::with_probes(vec![Box::new(CpuProbe)], canonical_size)
    }

    /// Runtime that tries `probes` in order.
    pub fn with_probes(probes: Vec<Box<dyn BackendProbe>>, canonical_size: usize) -> Self {
        Self {
            probes,
            backend: None,
            canonical_size,
        }
    }

    pub fn canonical_size(&self) -> usize {
        self.canonical_size
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    /// Select a backend. Safe to call repeatedly; later calls return the selected backend.
    pub fn initialize(&mut self) -> Result<&dyn TensorBackend, PipelineError> {
        let backend = match self.backend.take() {
            Some(backend) => backend,
            None => self.select_backend()?,
        };
        Ok(&**self.backend.insert(backend))
    }

    fn select_backend(&self) -> Result<Box<dyn TensorBackend>, PipelineError> {
        let mut failures = Vec::new();

        for probe in &self.probes {
            match probe.probe() {
                Ok(backend) => {
                    tracing::info!(
                        backend = backend.name(),
                        kind = ?backend.kind(),
                        skipped = failures.len(),
                        "tensor runtime initialized"
                    );
                    return Ok(backend);
                }
                Err(e) => {
                    tracing::warn!(
                        probe = probe.name(),
                        error = %e,
                        "tensor backend unavailable, trying next"
                    );
                    failures.push(format!("{}: {e}", probe.name()));
                }
            }
        }

        Err(PipelineError::CapabilityUnavailable(if failures.is_empty() {
            "no tensor backends configured".into()
        } else {
            failures.join("; ")
        }))
    }

    /// Canonicalize `image`, initializing the runtime on first use.
    pub fn canonicalize(&mut self, image: &PixelBuffer) -> Result<CanonicalTensor, PipelineError> {
        let size = self.canonical_size;
        self.initialize()?.canonicalize(image, size)
    }
}

/// Bilinear resize of the RGB channels to (height, width, 3), scaled to [0, 1].
pub fn resize_rgb(image: &PixelBuffer, width: usize, height: usize) -> Array3<f32> {
    let (src_w, src_h) = (image.width() as usize, image.height() as usize);
    let mut out = Array3::<f32>::zeros((height, width, 3));
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return out;
    }

    let scale_x = src_w as f32 / width as f32;
    let scale_y = src_h as f32 / height as f32;

    for y in 0..height {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as u32;
        let y1 = (y0 + 1).min(src_h as u32 - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..width {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as u32;
            let x1 = (x0 + 1).min(src_w as u32 - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = image.rgb(x0, y0);
            let tr = image.rgb(x1, y0);
            let bl = image.rgb(x0, y1);
            let br = image.rgb(x1, y1);

            for ch in 0..3 {
                let val = tl[ch] as f32 * (1.0 - fx) * (1.0 - fy)
                    + tr[ch] as f32 * fx * (1.0 - fy)
                    + bl[ch] as f32 * (1.0 - fx) * fy
                    + br[ch] as f32 * fx * fy;
                out[[y, x, ch]] = val / 255.0;
            }
        }
    }

    out
}
