//! Config - 設定
//!
//! - `GlobalOptions`: 全キュー共通（owner index、エラーハンドラ、backtrace）
//! - `QueueOptions`: キューごとの before / after フック
//! - `Settings`: TOML から読み込めるシリアライズ可能な部分

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::queue::ErrorHandler;

/// Hook run once per flush pass.
pub type Hook = Rc<dyn Fn()>;

/// Options shared by every queue of a scheduling session.
#[derive(Clone)]
pub struct GlobalOptions {
    /// Consult `Target::identity` for O(1) dedup. When off, `push_unique`
    /// always scans the pending sequence.
    pub use_owner_index: bool,

    /// Attach a backtrace to contexts built by `TaskQueue::context`.
    pub capture_backtraces: bool,

    /// Isolate task failures through this handler instead of aborting the flush.
    pub on_error: Option<ErrorHandler>,
}

impl GlobalOptions {
    pub fn new() -> Self {
        Self {
            use_owner_index: true,
            capture_backtraces: false,
            on_error: None,
        }
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    pub fn with_owner_index(mut self, enabled: bool) -> Self {
        self.use_owner_index = enabled;
        self
    }

    pub fn with_backtraces(mut self, enabled: bool) -> Self {
        self.capture_backtraces = enabled;
        self
    }
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GlobalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalOptions")
            .field("use_owner_index", &self.use_owner_index)
            .field("capture_backtraces", &self.capture_backtraces)
            .field("on_error", &self.on_error)
            .finish()
    }
}

impl From<&Settings> for GlobalOptions {
    fn from(settings: &Settings) -> Self {
        Self::new()
            .with_owner_index(settings.owner_index)
            .with_backtraces(settings.capture_backtraces)
    }
}

/// Per-queue hooks.
#[derive(Clone, Default)]
pub struct QueueOptions {
    pub(crate) before: Option<Hook>,
    pub(crate) after: Option<Hook>,
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run before the first task of every non-empty pass.
    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }

    /// Run after the last task of every pass that was not aborted.
    pub fn after(mut self, hook: impl Fn() + 'static) -> Self {
        self.after = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for QueueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOptions")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Serializable settings, e.g. from `deferq.toml`.
///
/// ```toml
/// queues = ["actions", "render"]
/// owner_index = true
/// capture_backtraces = false
/// continue_if_more = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub queues: Vec<String>,
    pub owner_index: bool,
    pub capture_backtraces: bool,
    /// Default for `flush` requests that don't say otherwise.
    pub continue_if_more: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queues: vec!["actions".to_string()],
            owner_index: true,
            capture_backtraces: false,
            continue_if_more: true,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
