//! Named pose store.
//!
//! Registry of named joint configurations. Poses come from TOML config
//! files (`[named_poses]` tables) or are added at runtime. Names are unique
//! across the whole store and compared exactly.
//!
//! ```toml
//! [named_poses]
//! ready = [0.0, -1.5708, 1.5708, -1.5708, -1.5708, 0.0]
//! stowed = [0.0, -3.0, 2.6, -1.2, -1.5708, 0.0]
//! ```
//!
//! The store is shared between client handles and the control loop as
//! [`SharedPoseStore`]; it never touches motion or safety state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use armctl_common::config::ConfigLoader;
use armctl_common::error::DriverError;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;

/// Store shared between the control loop and client handles.
pub type SharedPoseStore = Arc<RwLock<NamedPoseStore>>;

/// A named joint configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPose {
    /// Joint positions [rad].
    pub joints: Vec<f64>,
    /// Config file that contributed this pose, `None` for runtime additions.
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PoseFile {
    #[serde(default)]
    named_poses: BTreeMap<String, Vec<f64>>,
}

/// Registry of named poses for a robot with `dof` joints.
#[derive(Debug, Clone)]
pub struct NamedPoseStore {
    dof: usize,
    poses: BTreeMap<String, NamedPose>,
    configs: Vec<PathBuf>,
}

impl NamedPoseStore {
    pub fn new(dof: usize) -> Self {
        Self {
            dof,
            poses: BTreeMap::new(),
            configs: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedPoseStore {
        Arc::new(RwLock::new(self))
    }

    fn check_joints(&self, name: &str, joints: &[f64]) -> Result<(), DriverError> {
        if name.is_empty() {
            return Err(DriverError::Validation("pose name cannot be empty".to_string()));
        }
        if joints.len() != self.dof {
            return Err(DriverError::Validation(format!(
                "pose '{name}' has {} joints, robot has {}",
                joints.len(),
                self.dof
            )));
        }
        if joints.iter().any(|v| !v.is_finite()) {
            return Err(DriverError::Validation(format!(
                "pose '{name}' contains non-finite values"
            )));
        }
        Ok(())
    }

    /// Load every pose in the config file at `path`.
    ///
    /// Atomic: on any error, nothing is added.
    ///
    /// # Errors
    /// - `ConfigAlreadyLoaded` if `path` is already loaded
    /// - `DuplicateName` if a pose name already exists in the store
    /// - `Validation` if a joint vector is malformed
    /// - `Config` if the file is missing or not valid TOML
    pub fn add_config(&mut self, path: &Path) -> Result<usize, DriverError> {
        if self.configs.iter().any(|p| p == path) {
            return Err(DriverError::ConfigAlreadyLoaded(path.to_path_buf()));
        }
        let file = PoseFile::load(path)?;

        for (name, joints) in &file.named_poses {
            self.check_joints(name, joints)?;
            if self.poses.contains_key(name) {
                return Err(DriverError::DuplicateName(name.clone()));
            }
        }

        let count = file.named_poses.len();
        for (name, joints) in file.named_poses {
            self.poses.insert(
                name,
                NamedPose {
                    joints,
                    source: Some(path.to_path_buf()),
                },
            );
        }
        self.configs.push(path.to_path_buf());
        info!("Loaded {} named poses from {}", count, path.display());
        Ok(count)
    }

    /// Unload a config and every pose it contributed.
    ///
    /// Poses the config contributed but that were later overwritten at
    /// runtime belong to the runtime and stay.
    pub fn remove_config(&mut self, path: &Path) -> Result<usize, DriverError> {
        let idx = self
            .configs
            .iter()
            .position(|p| p == path)
            .ok_or_else(|| DriverError::NotFound(path.display().to_string()))?;
        self.configs.remove(idx);

        let before = self.poses.len();
        self.poses
            .retain(|_, pose| pose.source.as_deref() != Some(path));
        let removed = before - self.poses.len();
        info!("Removed {} named poses from {}", removed, path.display());
        Ok(removed)
    }

    /// Add a pose at runtime.
    ///
    /// # Errors
    /// `NameExists` if the name is taken and `overwrite` is false.
    pub fn add(&mut self, name: &str, joints: Vec<f64>, overwrite: bool) -> Result<(), DriverError> {
        self.check_joints(name, &joints)?;
        if !overwrite && self.poses.contains_key(name) {
            return Err(DriverError::NameExists(name.to_string()));
        }
        self.poses.insert(
            name.to_string(),
            NamedPose {
                joints,
                source: None,
            },
        );
        Ok(())
    }

    /// Remove a pose by name.
    pub fn remove(&mut self, name: &str) -> Result<NamedPose, DriverError> {
        self.poses
            .remove(name)
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&NamedPose> {
        self.poses.get(name)
    }

    /// All poses, keyed by name.
    pub fn list(&self) -> BTreeMap<String, NamedPose> {
        self.poses.clone()
    }

    /// Loaded config paths in load order.
    pub fn configs(&self) -> &[PathBuf] {
        &self.configs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
