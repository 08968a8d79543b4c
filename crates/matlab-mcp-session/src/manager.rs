//! Session pool manager.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use matlab_mcp_core::{
    ConsoleWindowStatus, Error, LibrarySettings, Platform, Result, ServerConfig, SessionHandle,
    SessionInfo,
};
use matlab_mcp_loader::{LibraryLoader, LibraryRegistry, SystemLoader};

use crate::discovery::{locator_for_platform, FixedLocator, InstallLocator, SearchPathGuard};
use crate::session::EngineSession;

/// Configuration for the session pool.
#[derive(Debug, Clone)]
pub struct EngineManagerConfig {
    /// Console visibility policy for new sessions
    pub console: ConsoleWindowStatus,

    /// Output buffer size for new sessions
    pub output_buffer_size: usize,

    /// Install directory overriding discovery
    pub install_dir: Option<PathBuf>,

    /// Library search-path variable to extend
    pub library_path_var: String,

    /// Library file names
    pub libraries: LibrarySettings,

    /// Platform conventions
    pub platform: Platform,
}

impl From<&ServerConfig> for EngineManagerConfig {
    fn from(config: &ServerConfig) -> Self {
        let platform = Platform::detect();
        Self {
            console: config.engine.console,
            output_buffer_size: config.engine.output_buffer_size,
            install_dir: config.engine.install_dir.clone(),
            library_path_var: config.engine.library_path_var(platform),
            libraries: config.libraries.clone(),
            platform,
        }
    }
}

impl Default for EngineManagerConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

/// Pool of engine sessions keyed by integer handle.
///
/// The manager owns the library registry and every session. Construction
/// runs [`EngineManager::establish_library_directory`]; sessions are created
/// on first reference by [`EngineManager::get_session`] and destroyed (with a
/// forced close) when deleted or when the manager is dropped.
pub struct EngineManager {
    libs: Arc<LibraryRegistry>,
    sessions: BTreeMap<SessionHandle, Box<EngineSession>>,
    config: EngineManagerConfig,
    locator: Box<dyn InstallLocator>,
    install_dir: Option<PathBuf>,
    available: bool,
}

impl EngineManager {
    /// Create a manager using the system loader and platform discovery.
    pub fn new(config: EngineManagerConfig) -> Self {
        let locator = locator_for_platform(config.platform);
        Self::with_parts(config, Arc::new(SystemLoader), locator)
    }

    /// Create a manager with a custom loader and locator.
    ///
    /// A configured `install_dir` still takes precedence over `locator`.
    pub fn with_parts(
        config: EngineManagerConfig,
        loader: Arc<dyn LibraryLoader>,
        locator: Box<dyn InstallLocator>,
    ) -> Self {
        let locator: Box<dyn InstallLocator> = match &config.install_dir {
            Some(dir) => Box::new(FixedLocator::new(dir)),
            None => locator,
        };

        let mut manager = Self {
            libs: Arc::new(LibraryRegistry::with_loader(&config.libraries, loader)),
            sessions: BTreeMap::new(),
            config,
            locator,
            install_dir: None,
            available: false,
        };
        manager.establish_library_directory();
        manager
    }

    /// Find the install, extend the library search path and probe the
    /// engine library.
    ///
    /// The engine library is opened from the directory itself and released
    /// again, so libraries already loaded by sessions stay in place.
    ///
    /// On success the install directory is recorded and the engine is
    /// available. On failure the search-path variable is restored to its
    /// previous value and no directory is recorded.
    pub fn establish_library_directory(&mut self) -> Option<&Path> {
        self.available = false;
        self.install_dir = None;

        let Some(dir) = self.locator.locate() else {
            info!("No MATLAB install found by {} locator", self.locator.name());
            return None;
        };
        let dir = std::fs::canonicalize(&dir).unwrap_or(dir);

        let guard = SearchPathGuard::append(
            self.config.library_path_var.as_str(),
            &dir,
            self.config.platform.path_separator(),
        );

        match self.libs.engine().try_open_in(&dir) {
            Ok(()) => {
                guard.commit();
                self.libs.set_search_dir(Some(&dir));
                info!("MATLAB libraries available in {}", dir.display());
                self.available = true;
                self.install_dir = Some(dir);
            }
            Err(e) => {
                warn!("MATLAB install at {} is not usable: {}", dir.display(), e);
                guard.restore();
                self.libs.set_search_dir(None);
            }
        }

        self.install_dir.as_deref()
    }

    /// Session for `handle`, created and opened on first reference.
    ///
    /// A new session is built even when the engine is unavailable; it then
    /// stays closed and its operations fail.
    pub fn get_session(&mut self, handle: impl Into<SessionHandle>) -> &mut EngineSession {
        let handle = handle.into();
        let libs = Arc::clone(&self.libs);
        let buffer_size = self.config.output_buffer_size;
        let show_console = self.show_console();
        let platform = self.config.platform;

        self.sessions.entry(handle).or_insert_with(|| {
            if let Err(e) = libs.load_runtime() {
                warn!("Engine library unavailable for session {}: {}", handle, e);
            }
            let mut session = EngineSession::with_platform(libs, buffer_size, platform);
            session.open(show_console);
            info!("Created session {} ({:?})", handle, session.status());
            Box::new(session)
        })
    }

    /// Existing session for `handle`.
    pub fn session(&self, handle: impl Into<SessionHandle>) -> Result<&EngineSession> {
        let handle = handle.into();
        self.sessions
            .get(&handle)
            .map(|session| &**session)
            .ok_or(Error::SessionNotFound(handle))
    }

    /// Existing session for `handle`, mutably.
    pub fn session_mut(&mut self, handle: impl Into<SessionHandle>) -> Result<&mut EngineSession> {
        let handle = handle.into();
        self.sessions
            .get_mut(&handle)
            .map(|session| &mut **session)
            .ok_or(Error::SessionNotFound(handle))
    }

    /// Close and destroy the session for `handle`.
    ///
    /// Returns whether a session was removed; an unknown handle is a no-op.
    pub fn delete_session(&mut self, handle: impl Into<SessionHandle>) -> bool {
        let handle = handle.into();
        match self.sessions.remove(&handle) {
            Some(session) => {
                drop(session);
                info!("Deleted session {}", handle);
                true
            }
            None => {
                debug!("No session {} to delete", handle);
                false
            }
        }
    }

    /// Close and destroy every session. Returns how many were removed.
    pub fn delete_all(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        if count > 0 {
            info!("Deleted {} sessions", count);
        }
        count
    }

    /// Whether a session exists for `handle`.
    pub fn exists(&self, handle: impl Into<SessionHandle>) -> bool {
        self.sessions.contains_key(&handle.into())
    }

    /// Number of sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Handles in ascending order.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.keys().copied().collect()
    }

    /// Snapshot of every session, by ascending handle.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|(handle, session)| SessionInfo {
                handle: *handle,
                status: session.status(),
                single_use: session.is_single_use(),
                visible: session.is_visible(),
                buffer_size: session.buffer_size(),
            })
            .collect()
    }

    /// Console visibility for new sessions.
    ///
    /// `Auto` shows the console in debug builds only.
    pub fn show_console(&self) -> bool {
        self.config.console.resolve()
    }

    /// Current console policy.
    pub fn console_policy(&self) -> ConsoleWindowStatus {
        self.config.console
    }

    /// Change the console policy for sessions created from now on.
    pub fn set_console_policy(&mut self, policy: ConsoleWindowStatus) {
        self.config.console = policy;
    }

    /// Use `dir` as the install directory and probe it again.
    ///
    /// Returns whether the engine is available afterwards.
    pub fn set_install_dir(&mut self, dir: impl AsRef<Path>) -> bool {
        self.locator = Box::new(FixedLocator::new(dir));
        self.establish_library_directory();
        self.available
    }

    /// Install directory found by the last probe.
    pub fn install_dir(&self) -> Option<&Path> {
        self.install_dir.as_deref()
    }

    /// Whether the last probe loaded the engine library.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Shared library registry.
    pub fn libraries(&self) -> &Arc<LibraryRegistry> {
        &self.libs
    }

    /// Pool configuration.
    pub fn config(&self) -> &EngineManagerConfig {
        &self.config
    }
}

impl std::fmt::Debug for EngineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineManager")
            .field("sessions", &self.handles())
            .field("install_dir", &self.install_dir)
            .field("available", &self.available)
            .finish()
    }
}
