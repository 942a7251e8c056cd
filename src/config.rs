//! Configuration of the power rewrite.
//!
//! The only setting is the override that forces the rewrite regardless of the
//! device the loss is evaluated on. It is read from the environment once and then
//! passed around explicitly.

/// Environment variable that forces the power rewrite when set to `"1"`.
pub const ENV_FORCE_GPU_TRANSFORM: &str = "POWEXPAND_FORCE_GPU_TRANSFORM";

/// Settings consumed by [`should_apply_gpu_transform`](crate::gating::should_apply_gpu_transform).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Rewrite powers even when the device is not classified as a GPU
    pub force_gpu_transform: bool,
}

impl RewriteConfig {
    pub fn new(force_gpu_transform: bool) -> Self {
        Self {
            force_gpu_transform,
        }
    }

    /// Reads [`ENV_FORCE_GPU_TRANSFORM`] from the process environment.
    pub fn from_env() -> Self {
        let value = std::env::var(ENV_FORCE_GPU_TRANSFORM).ok();
        Self::from_env_value(value.as_deref())
    }

    /// Interprets a raw value of [`ENV_FORCE_GPU_TRANSFORM`].
    ///
    /// Only the literal string `"1"` enables the override; `"true"`, `" 1"` and
    /// any other value do not.
    pub fn from_env_value(value: Option<&str>) -> Self {
        Self::new(value == Some("1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_value() {
        assert!(RewriteConfig::from_env_value(Some("1")).force_gpu_transform);
        assert!(!RewriteConfig::from_env_value(None).force_gpu_transform);
        assert!(!RewriteConfig::from_env_value(Some("0")).force_gpu_transform);
        assert!(!RewriteConfig::from_env_value(Some("true")).force_gpu_transform);
        assert!(!RewriteConfig::from_env_value(Some(" 1")).force_gpu_transform);
        assert!(!RewriteConfig::from_env_value(Some("")).force_gpu_transform);
    }

    #[test]
    fn test_default_is_off() {
        assert_eq!(RewriteConfig::default(), RewriteConfig::new(false));
    }
}
