use crate::config::schema::EngineConfig;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        Self::load_with_inheritance(path, &mut visited, false)
    }

    fn load_with_inheritance(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        is_parent_load: bool,
    ) -> Result<EngineConfig> {
        let path = fs::canonicalize(path).map_err(|e| {
            Error::Config(format!("{}: {}", path.display(), e))
        })?;

        if visited.contains(&path) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }
        visited.insert(path.clone());

        let config = Self::load_file(&path)?;

        let final_config = if let Some(parent_path_str) = &config.extends {
            let parent_path = path.parent()
                .ok_or_else(|| Error::Config(format!(
                    "Cannot determine parent directory for {}",
                    path.display()
                )))?
                .join(parent_path_str);

            let parent_config = Self::load_with_inheritance(&parent_path, visited, true)?;
            Self::merge_configs(parent_config, config)
        } else {
            config
        };

        if !is_parent_load {
            final_config.validate()
                .map_err(Error::Validation)?;
        }

        Ok(final_config)
    }

    fn load_file(path: &Path) -> Result<EngineConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let config: EngineConfig = serde_json::from_str(&content)?;
                Ok(config)
            }
            Some("yaml") | Some("yml") => {
                let config: EngineConfig = serde_yaml::from_str(&content)?;
                Ok(config)
            }
            Some("toml") => {
                let config: EngineConfig = toml::from_str(&content)?;
                Ok(config)
            }
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    /// Child values win when they differ from the built-in defaults;
    /// per-retailer rate buckets are merged key by key.
    fn merge_configs(mut parent: EngineConfig, child: EngineConfig) -> EngineConfig {
        let defaults = EngineConfig::default();

        if child.max_urls_per_run != defaults.max_urls_per_run {
            parent.max_urls_per_run = child.max_urls_per_run;
        }
        if child.concurrency != defaults.concurrency {
            parent.concurrency = child.concurrency;
        }
        if child.request_timeout_secs != defaults.request_timeout_secs {
            parent.request_timeout_secs = child.request_timeout_secs;
        }
        if child.limiter_acquire_timeout_secs != defaults.limiter_acquire_timeout_secs {
            parent.limiter_acquire_timeout_secs = child.limiter_acquire_timeout_secs;
        }
        if child.retry != defaults.retry {
            parent.retry = child.retry;
        }
        if child.rate_limits.default != defaults.rate_limits.default {
            parent.rate_limits.default = child.rate_limits.default;
        }

        for (retailer, bucket) in child.rate_limits.per_retailer {
            parent.rate_limits.per_retailer.insert(retailer, bucket);
        }

        parent.extends = None;
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn empty_json_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "engine.json", "{}");
        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.max_urls_per_run, 20);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.rate_limits.default.capacity, 5);
    }

    #[test]
    fn toml_with_retailer_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "engine.toml",
            r#"
            concurrency = 8

            [rate_limits.per_retailer.ozon]
            capacity = 2
            refill_ms = 3000
            "#,
        );
        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.concurrency, 8);
        let ozon = &config.rate_limits.per_retailer["ozon"];
        assert_eq!(ozon.capacity, 2);
        assert_eq!(ozon.refill_ms, 3000);
    }

    #[test]
    fn inheritance_merges_child_over_parent() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            &dir,
            "base.yaml",
            "concurrency: 8\nretry:\n  max_attempts: 5\n",
        );
        let child = write_config(
            &dir,
            "child.yaml",
            "extends: base.yaml\nmax_urls_per_run: 10\n",
        );
        let config = ConfigLoader::load(&child).unwrap();
        assert_eq!(config.max_urls_per_run, 10);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.extends.is_none());
    }

    #[test]
    fn circular_inheritance_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_config(&dir, "a.yaml", "extends: b.yaml\n");
        let b = write_config(&dir, "b.yaml", "extends: a.yaml\n");
        let result = ConfigLoader::load(&b);
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Circular")));
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "engine.json", r#"{"max_urls_per_run": 500}"#);
        assert!(matches!(ConfigLoader::load(&path), Err(Error::Validation(_))));
    }
}
