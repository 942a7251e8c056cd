//! Decides whether loss equations get their powers expanded.
//!
//! The rewrite is only worth applying when gradients are computed on an
//! accelerator. The decision takes the parameter/device context the loss is
//! evaluated with, plus the override flag from [`RewriteConfig`](crate::config::RewriteConfig).
//!
//! Classification never fails from the caller's point of view: an error or a
//! panic inside a [`DeviceClassifier`] is logged and counted as "not a GPU".

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, warn};

use crate::errors::DeviceError;

/// Coarse classification of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Other,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
            DeviceKind::Other => write!(f, "other"),
        }
    }
}

/// Something that can tell which kind of device it lives on.
pub trait DeviceClassifier {
    fn classify(&self) -> Result<DeviceKind, DeviceError>;
}

/// Returns true when the power rewrite should be applied.
///
/// - No parameters: `false`
/// - `force` set: `true`
/// - Otherwise: `true` only if `params` classifies as [`DeviceKind::Gpu`]
///
/// # Example
/// ```
/// use powexpand::gating::{should_apply_gpu_transform, DeviceDescriptor};
///
/// let gpu = DeviceDescriptor::new("NVIDIA A100", "cuda");
/// let cpu = DeviceDescriptor::new("x86_64", "cpu");
///
/// assert!(should_apply_gpu_transform(Some(&gpu), false));
/// assert!(!should_apply_gpu_transform(Some(&cpu), false));
/// assert!(should_apply_gpu_transform(Some(&cpu), true));
/// assert!(!should_apply_gpu_transform::<DeviceDescriptor>(None, true));
/// ```
pub fn should_apply_gpu_transform<P>(params: Option<&P>, force: bool) -> bool
where
    P: DeviceClassifier + ?Sized,
{
    let Some(params) = params else {
        return false;
    };
    if force {
        debug!("power rewrite forced by configuration");
        return true;
    }

    match panic::catch_unwind(AssertUnwindSafe(|| params.classify())) {
        Ok(Ok(kind)) => {
            debug!("device classified as {kind}");
            kind == DeviceKind::Gpu
        }
        Ok(Err(e)) => {
            warn!("device classification failed, assuming no GPU: {e}");
            false
        }
        Err(_) => {
            warn!("device classification panicked, assuming no GPU");
            false
        }
    }
}

/// Name/backend pair describing where a computation runs.
///
/// Classification is a keyword match over the words of both strings,
/// case-insensitive. Words are split on anything that is not alphanumeric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub backend: String,
}

const GPU_KEYWORDS: [&str; 7] = ["cuda", "rocm", "hip", "metal", "oneapi", "vulkan", "gpu"];
const CPU_KEYWORDS: [&str; 2] = ["cpu", "host"];

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
        }
    }
}

impl DeviceClassifier for DeviceDescriptor {
    fn classify(&self) -> Result<DeviceKind, DeviceError> {
        let name = words(&self.name);
        let backend = words(&self.backend);
        if name.is_empty() && backend.is_empty() {
            return Err(DeviceError::Empty);
        }
        // Backend wins over the marketing name
        if has(&backend, &GPU_KEYWORDS) {
            Ok(DeviceKind::Gpu)
        } else if has(&backend, &CPU_KEYWORDS) {
            Ok(DeviceKind::Cpu)
        } else if has(&name, &GPU_KEYWORDS) {
            Ok(DeviceKind::Gpu)
        } else if has(&name, &CPU_KEYWORDS) {
            Ok(DeviceKind::Cpu)
        } else {
            Ok(DeviceKind::Other)
        }
    }
}

fn has(words: &[String], keywords: &[&str]) -> bool {
    words.iter().any(|w| keywords.contains(&w.as_str()))
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl<T: DeviceClassifier + ?Sized> DeviceClassifier for &T {
    fn classify(&self) -> Result<DeviceKind, DeviceError> {
        (**self).classify()
    }
}

impl DeviceClassifier for DeviceKind {
    fn classify(&self) -> Result<DeviceKind, DeviceError> {
        Ok(*self)
    }
}
