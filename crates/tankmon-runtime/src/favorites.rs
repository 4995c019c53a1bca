//! Per-account starred plugins, persisted as `{account_id: [class_name]}`.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

type Entries = BTreeMap<String, BTreeSet<String>>;

pub struct Favorites {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl Favorites {
    /// Load from `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Entries>(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "favorites file unreadable, starting empty");
                Entries::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Entries::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "favorites file unreadable, starting empty");
                Entries::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, account_id: &str) -> HashSet<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Star or unstar `class_name` and write the file. Returns whether the
    /// plugin is starred afterwards. The in-memory change stands even if the
    /// write fails.
    pub fn toggle(&self, account_id: &str, class_name: &str) -> anyhow::Result<bool> {
        // Held across the write so the file never lags an older snapshot.
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let set = entries.entry(account_id.to_string()).or_default();
        let starred = if set.remove(class_name) {
            false
        } else {
            set.insert(class_name.to_string());
            true
        };
        if set.is_empty() {
            entries.remove(account_id);
        }
        self.persist(&entries)?;
        Ok(starred)
    }

    fn persist(&self, entries: &Entries) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let output = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, format!("{output}\n"))?;
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_persists_and_reloads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("favorites.json");
        let favorites = Favorites::load(&path);

        assert!(favorites.toggle("bob", "net.microbot.A").expect("star"));
        assert!(favorites.toggle("bob", "net.microbot.B").expect("star"));
        assert!(!favorites.toggle("bob", "net.microbot.A").expect("unstar"));

        let reloaded = Favorites::load(&path);
        assert_eq!(
            reloaded.get("bob"),
            HashSet::from(["net.microbot.B".to_string()])
        );
        assert!(reloaded.get("alice").is_empty());
    }

    #[test]
    fn file_format_is_id_to_class_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("favorites.json");
        std::fs::write(&path, r#"{"a1": ["x.Y", "x.Z"]}"#).expect("write");

        let favorites = Favorites::load(&path);
        assert_eq!(favorites.get("a1").len(), 2);

        favorites.toggle("a1", "x.Y").expect("unstar");
        favorites.toggle("a1", "x.Z").expect("unstar");
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(written, serde_json::json!({}));
    }

    #[test]
    fn concurrent_toggles_leave_the_latest_state_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("favorites.json");
        let favorites = Favorites::load(&path);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let favorites = &favorites;
                scope.spawn(move || {
                    for i in 0..25 {
                        favorites
                            .toggle("bob", &format!("x.W{worker}P{}", i % 5))
                            .expect("toggle");
                    }
                });
            }
        });

        let in_memory = favorites.get("bob");
        assert_eq!(in_memory.len(), 8 * 5);
        assert_eq!(Favorites::load(&path).get("bob"), in_memory);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("favorites.json");
        std::fs::write(&path, "[1, 2").expect("write");

        let favorites = Favorites::load(&path);
        assert!(favorites.get("a1").is_empty());
        assert!(favorites.toggle("a1", "x.Y").expect("overwrite"));
        assert_eq!(Favorites::load(&path).get("a1").len(), 1);
    }
}
