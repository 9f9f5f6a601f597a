use r8ci_core::clock::Clock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Scratch layout shared by integration tests: a local blob store, a
/// repository directory and a config file pointing at both.
pub struct TestContext {
    pub _temp_dir: tempfile::TempDir,
    pub test_root: PathBuf,
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub store_dir: PathBuf,
    pub repo_dir: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_layout("record")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn with_layout(layout: &str) -> Self {
        let temp_dir = tempfile::Builder::new()
            .prefix("r8ci-test-")
            .tempdir()
            .expect("Failed to create temp dir");
        let test_root = temp_dir.path().to_path_buf();

        let config_dir = test_root.join("config");
        let cache_dir = test_root.join("cache");
        let store_dir = test_root.join("store");
        let repo_dir = test_root.join("repo");
        for dir in [&config_dir, &cache_dir, &store_dir, &repo_dir] {
            fs::create_dir_all(dir).expect("Failed to create test dir");
        }
        let r8ci_config_subdir = config_dir.join("r8ci");
        fs::create_dir(&r8ci_config_subdir).expect("Failed to create r8ci config subdir");
        let config_path = r8ci_config_subdir.join("config.toml");

        let context = Self {
            _temp_dir: temp_dir,
            test_root,
            config_dir,
            config_path,
            cache_dir,
            store_dir,
            repo_dir,
        };
        context.write_config(layout, &[("unit", "true"), ("integration", "true")]);
        context
    }

    /// Rewrites the config with one `[[tester.commands]]` entry per
    /// `(name, shell snippet)` pair.
    pub fn write_config(&self, layout: &str, commands: &[(&str, &str)]) {
        let mut content = format!(
            r#"
[storage]
backend = "local"
root = "{store}"

[protocol]
layout = "{layout}"
poll_interval_secs = 1

[tester]
repo = "{repo}"
run_timeout_secs = 60
poll_interval_secs = 1

[historic]
prefix = "main"
artifact = "r8.jar"
download_path = "{root}/libs/r8.jar"
output_dir = "{root}/historic"

[historic.storage]
backend = "local"
root = "{store}"
"#,
            store = self.store_dir.display(),
            repo = self.repo_dir.display(),
            root = self.test_root.display(),
            layout = layout,
        );
        for (name, script) in commands {
            content.push_str(&format!(
                "\n[[tester.commands]]\nname = \"{}\"\nargv = [\"sh\", \"-c\", \"{}\"]\n",
                name, script
            ));
        }
        fs::write(&self.config_path, content).expect("Failed to write temp config");
    }

    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.store_dir.join(key)
    }

    pub fn write_blob(&self, key: &str, content: &str) {
        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create blob parent");
        }
        fs::write(path, content).expect("Failed to write blob");
    }

    pub fn read_blob(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.blob_path(key))
            .ok()
            .map(|s| s.trim().to_string())
    }

    pub fn blob_exists(&self, key: &str) -> bool {
        self.blob_path(key).exists()
    }

    pub fn store_is_empty_at(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| !self.blob_exists(key))
    }
}

type SleepHook = Box<dyn FnMut(usize) + Send>;

/// Virtual time: `sleep` returns immediately and advances `now`.
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
    on_sleep: Mutex<Option<SleepHook>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
            on_sleep: Mutex::new(None),
        }
    }

    /// Runs `hook` with the number of sleeps so far after every sleep, e.g.
    /// to let a simulated tester act between two polls.
    pub fn with_hook(hook: impl FnMut(usize) + Send + 'static) -> Self {
        let clock = Self::new();
        *lock(&clock.on_sleep) = Some(Box::new(hook));
        clock
    }

    pub fn advance(&self, duration: Duration) {
        *lock(&self.offset) += duration;
    }

    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        let count = {
            let mut sleeps = lock(&self.sleeps);
            sleeps.push(duration);
            sleeps.len()
        };
        let hook = lock(&self.on_sleep).take();
        if let Some(mut hook) = hook {
            hook(count);
            *lock(&self.on_sleep) = Some(hook);
        }
    }
}

pub fn read_file(path: &Path) -> String {
    fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}
