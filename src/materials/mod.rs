pub mod api_client;
pub mod fallback;
pub mod lock;
pub mod notify;
pub mod panel;
pub mod reload_queue;
pub mod types;

pub use api_client::{ApiClient, MaterialsBackend};
pub use fallback::{RestTableQuery, TableQuery};
pub use lock::{UiLock, UiLockGuard};
pub use notify::{AutoConfirm, Confirm, LogNotifier, Notice, NoticeLevel, Notifier, RecordingNotifier};
pub use panel::{MaterialsPanel, PanelSettings, Selection};
pub use reload_queue::{LockedPolicy, QueuePolicy, QueueStats, ReloadQueue, ReloadRequest};
