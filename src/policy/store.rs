use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;

use super::{read_policy_file, CameraPolicy};

/// Read-mostly map of camera id to policy.
///
/// Records are handed out as `Arc<CameraPolicy>` and only ever replaced
/// whole, so a reader holding a record never observes a partial update.
pub struct PolicyStore {
    source: Option<PathBuf>,
    policies: RwLock<HashMap<String, Arc<CameraPolicy>>>,
}

impl PolicyStore {
    pub fn new(policies: Vec<CameraPolicy>) -> Self {
        Self {
            source: None,
            policies: RwLock::new(index(policies)),
        }
    }

    /// Load policies from a TOML file; [`PolicyStore::reload`] re-reads it.
    pub fn load(path: &Path) -> Result<Self> {
        let policies = read_policy_file(path)?;
        log::info!(
            "loaded {} camera policies from {}",
            policies.len(),
            path.display()
        );
        Ok(Self {
            source: Some(path.to_path_buf()),
            policies: RwLock::new(index(policies)),
        })
    }

    /// `None` means the camera is disabled.
    pub fn get_policy(&self, camera_id: &str) -> Option<Arc<CameraPolicy>> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(camera_id)
            .cloned()
    }

    /// Replace (or add) one camera's record.
    pub fn replace(&self, policy: CameraPolicy) {
        self.policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(policy.camera_id.clone(), Arc::new(policy));
    }

    /// Swap in a complete new policy set. Cameras missing from `policies`
    /// become disabled.
    pub fn replace_all(&self, policies: Vec<CameraPolicy>) {
        let fresh = index(policies);
        *self
            .policies
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    /// Re-read the backing file. On error the current policies stay in place.
    pub fn reload(&self) -> Result<usize> {
        let Some(path) = &self.source else {
            log::debug!("policy store has no backing file; reload skipped");
            return Ok(self.len());
        };
        let policies = read_policy_file(path)?;
        let count = policies.len();
        self.replace_all(policies);
        log::info!("reloaded {} camera policies from {}", count, path.display());
        Ok(count)
    }

    pub fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn index(policies: Vec<CameraPolicy>) -> HashMap<String, Arc<CameraPolicy>> {
    policies
        .into_iter()
        .map(|p| (p.camera_id.clone(), Arc::new(p)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn policy(id: &str, class_idx: u32) -> CameraPolicy {
        CameraPolicy::new(id)
            .and_then(|p| p.select(class_idx, None))
            .expect("policy")
    }

    #[test]
    fn unknown_camera_is_absent() {
        let store = PolicyStore::new(vec![policy("front-door", 0)]);
        assert!(store.get_policy("front-door").is_some());
        assert!(store.get_policy("back-door").is_none());
    }

    #[test]
    fn replace_does_not_mutate_records_already_handed_out() {
        let store = PolicyStore::new(vec![policy("cam", 0)]);
        let before = store.get_policy("cam").expect("policy");
        store.replace(policy("cam", 2));
        let after = store.get_policy("cam").expect("policy");

        assert!(before.class_selected(0));
        assert!(!before.class_selected(2));
        assert!(after.class_selected(2));
        assert!(!after.class_selected(0));
    }

    #[test]
    fn reload_swaps_file_contents_and_keeps_old_on_error() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "[[camera]]\nid = \"a\"\nclasses = [\"person\"]\n")?;
        let store = PolicyStore::load(file.path())?;
        assert_eq!(store.camera_ids(), vec!["a"]);

        std::fs::write(
            file.path(),
            "[[camera]]\nid = \"b\"\nclasses = [\"car\"]\n[[camera]]\nid = \"c\"\n",
        )?;
        assert_eq!(store.reload()?, 2);
        assert_eq!(store.camera_ids(), vec!["b", "c"]);
        assert!(store.get_policy("a").is_none());

        std::fs::write(file.path(), "[[camera]]\nid = \"bad id\"\n")?;
        assert!(store.reload().is_err());
        assert_eq!(store.camera_ids(), vec!["b", "c"]);
        Ok(())
    }
}
