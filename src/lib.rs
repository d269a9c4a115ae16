pub mod api;
pub mod config;
pub mod database;
pub mod errors;
pub mod local_cache;
pub mod logging;
pub mod models;
pub mod navigation;
pub mod progress_client;
pub mod reconcile;
pub mod revision_service;
pub mod session;
pub mod status_tracker;

pub use config::Config;
pub use database::Database;
pub use errors::*;
pub use local_cache::{FileStorage, LocalCache, LocalCacheEntry, MemoryStorage};
pub use models::*;
pub use navigation::CardNavigator;
pub use progress_client::{HttpProgressStore, ProgressStore, TokioDispatcher};
pub use reconcile::{reconcile, Resolution, ResumeSource};
pub use revision_service::RevisionService;
pub use session::{CardSession, SessionDeps, SessionMode};
pub use status_tracker::{StatusCounts, TopicStatusTracker};
