use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use directories::BaseDirs;

use crate::execution::ExecutorSettings;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    /// Defaults, then `.scriptrunrc`, then `SCRIPTRUN_*` environment variables.
    pub fn load() -> Self {
        let mut cfg = Self::load_from(&default_config_path());

        // Overlay environment variables (take precedence)
        for (k, v) in env::vars() {
            if is_config_key(&k) {
                cfg.inner.insert(k, v);
            }
        }
        cfg
    }

    /// Defaults overlaid with `KEY=VALUE` lines from `path`, if it exists.
    /// Environment variables are not consulted.
    pub fn load_from(path: &Path) -> Self {
        let mut map = default_map();

        if let Ok(file) = fs::File::open(path) {
            let reader = BufReader::new(file);
            for line in reader.lines().map_while(Result::ok) {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((k, v)) = line.split_once('=') {
                    map.insert(k.trim().to_string(), v.trim().to_string());
                }
            }
        }

        Self {
            inner: map,
            config_path: path.to_path_buf(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }

    pub fn interpreter(&self) -> String {
        self.get("SCRIPTRUN_INTERPRETER").unwrap_or_default()
    }

    pub fn parameter(&self) -> String {
        self.get("SCRIPTRUN_PARAMETER").unwrap_or_default()
    }

    /// `0` or an unparsable value means no timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.get_u64("SCRIPTRUN_TIMEOUT")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            temp_dir: self.get_path("SCRIPTRUN_TEMP_DIR"),
            timeout: self.timeout(),
        }
    }
}

fn is_config_key(k: &str) -> bool {
    k.starts_with("SCRIPTRUN_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("scriptrun").join(".scriptrunrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let (interpreter, parameter) = if cfg!(windows) {
        ("cmd.exe", "/c")
    } else {
        ("/bin/sh", "-c")
    };
    m.insert("SCRIPTRUN_INTERPRETER".into(), interpreter.into());
    m.insert("SCRIPTRUN_PARAMETER".into(), parameter.into());
    m.insert("SCRIPTRUN_TEMP_DIR".into(), String::new());
    m.insert("SCRIPTRUN_TIMEOUT".into(), "0".into());
    m
}
