//! Engine session management.

use std::ffi::{c_int, CString};
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, info, warn};

use matlab_mcp_core::{Error, Platform, Result, SessionStatus};
use matlab_mcp_loader::ffi::{
    EngClose, EngEvalString, EngGetVariable, EngGetVisible, EngOpen, EngOpenSingleUse,
    EngOutputBuffer, EngPutVariable, EngSetVisible,
};
use matlab_mcp_loader::{Engine, LibraryRegistry};

use crate::output::OutputBuffer;
use crate::value::MxArray;

/// Command that empties the engine workspace and function cache.
pub const CLEAR_WORKSPACE_COMMAND: &str = "clear functions;clear;";

/// One connection to an engine instance.
///
/// A session moves `Closed -> Open -> Closed`. Every operation needs the
/// engine library to be loaded in the shared registry; when it is not, the
/// operation reports failure and leaves the session untouched. Dropping a
/// session performs a forced close.
pub struct EngineSession {
    libs: Arc<LibraryRegistry>,
    engine: Option<NonNull<Engine>>,
    output: OutputBuffer,
    single_use: bool,
    platform: Platform,
}

// SAFETY: the engine handle is owned by this session and only used through
// `&self`/`&mut self`. Callers serialise access to the session.
unsafe impl Send for EngineSession {}

impl EngineSession {
    /// Create a closed session with an output buffer of `buffer_size` bytes.
    pub fn new(libs: Arc<LibraryRegistry>, buffer_size: usize) -> Self {
        Self::with_platform(libs, buffer_size, Platform::detect())
    }

    /// Create a closed session that opens engines the way `platform` does.
    pub fn with_platform(
        libs: Arc<LibraryRegistry>,
        buffer_size: usize,
        platform: Platform,
    ) -> Self {
        Self {
            libs,
            engine: None,
            output: OutputBuffer::with_capacity(buffer_size),
            single_use: false,
            platform,
        }
    }

    /// Create a session and open it.
    ///
    /// The session is returned even if opening fails; it then stays closed.
    pub fn create(libs: Arc<LibraryRegistry>, buffer_size: usize, show_console: bool) -> Self {
        let mut session = Self::new(libs, buffer_size);
        session.open(show_console);
        session
    }

    /// Start an engine, wire the output buffer and apply the visibility.
    ///
    /// Returns whether the engine is live afterwards. Opening an open
    /// session starts nothing and reports the current liveness.
    pub fn open(&mut self, show_console: bool) -> bool {
        if self.engine.is_some() {
            return self.is_connected();
        }

        if !self.libs.engine().is_loaded() {
            debug!("Engine library not loaded; session stays closed");
            return false;
        }

        match self.start() {
            Ok(engine) => {
                self.engine = Some(engine);
                info!("Engine opened (single_use={})", self.single_use);
            }
            Err(e) => {
                warn!("Failed to open engine: {}", e);
                return false;
            }
        }

        if let Err(e) = self.register_output(&self.output) {
            warn!("Failed to register output buffer: {}", e);
        }
        if let Err(e) = self.apply_visible(show_console) {
            warn!("Failed to set engine visibility: {}", e);
        }

        self.is_connected()
    }

    fn start(&mut self) -> Result<NonNull<Engine>> {
        let engine = self.libs.engine();

        if self.platform.opens_single_use() {
            let open = engine.resolve::<EngOpenSingleUse>()?;
            let mut status: c_int = 0;
            let ptr = unsafe { open(std::ptr::null(), std::ptr::null_mut(), &mut status) };
            let handle = NonNull::new(ptr).ok_or(Error::NativeCall {
                call: "engOpenSingleUse",
                status,
            })?;
            self.single_use = true;
            Ok(handle)
        } else {
            let open = engine.resolve::<EngOpen>()?;
            let start = CString::default();
            let ptr = unsafe { open(start.as_ptr()) };
            NonNull::new(ptr).ok_or(Error::NativeCall {
                call: "engOpen",
                status: -1,
            })
        }
    }

    /// Close the engine connection.
    ///
    /// With `force_close` a live engine is first told to `exit`. Either way
    /// the handle is released and the session ends `Closed`. Returns the
    /// liveness after closing, which is always `false`.
    pub fn close(&mut self, force_close: bool) -> bool {
        let Some(engine) = self.engine else {
            return false;
        };

        if force_close && self.is_connected() {
            if let Err(e) = self.eval("exit") {
                debug!("Engine did not accept exit: {}", e);
            }
        }

        if self.libs.engine().is_loaded() {
            match self.libs.engine().resolve::<EngClose>() {
                Ok(close) => {
                    let status = unsafe { close(engine.as_ptr()) };
                    if status != 0 {
                        debug!("engClose returned {}", status);
                    }
                }
                Err(e) => warn!("Cannot release engine handle: {}", e),
            }
        }

        self.engine = None;
        self.single_use = false;
        info!("Engine closed (force={})", force_close);
        self.is_connected()
    }

    fn handle(&self) -> Result<NonNull<Engine>> {
        self.engine.ok_or(Error::NotConnected)
    }

    fn eval(&self, command: &str) -> Result<()> {
        let engine = self.handle()?;
        let eval = self.libs.engine().resolve::<EngEvalString>()?;
        let command = CString::new(command)?;

        let status = unsafe { eval(engine.as_ptr(), command.as_ptr()) };
        if status == 0 {
            Ok(())
        } else {
            Err(Error::NativeCall {
                call: "engEvalString",
                status,
            })
        }
    }

    /// Evaluate a command in the engine.
    ///
    /// Returns `true` iff the engine reported success.
    pub fn run_command(&mut self, command: &str) -> bool {
        match self.eval(command) {
            Ok(()) => true,
            Err(e) => {
                debug!("Command failed: {}", e);
                false
            }
        }
    }

    /// Whether the engine is open and answers an empty command.
    pub fn is_connected(&self) -> bool {
        self.engine.is_some() && self.eval("").is_ok()
    }

    /// Copy a variable out of the engine workspace.
    pub fn get_var(&self, name: &str) -> Option<MxArray> {
        match self.fetch(name) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("get_var('{}') failed: {}", name, e);
                None
            }
        }
    }

    fn fetch(&self, name: &str) -> Result<MxArray> {
        let engine = self.handle()?;
        let get = self.libs.engine().resolve::<EngGetVariable>()?;
        let var = CString::new(name)?;

        let ptr = unsafe { get(engine.as_ptr(), var.as_ptr()) };
        let ptr = NonNull::new(ptr)
            .ok_or_else(|| Error::Other(format!("variable '{}' is not defined", name)))?;
        // SAFETY: engGetVariable returns a fresh array owned by the caller.
        Ok(unsafe { MxArray::from_raw(ptr, Arc::clone(&self.libs)) })
    }

    /// Copy a value into the engine workspace under `name`.
    pub fn put_var(&mut self, name: &str, value: &MxArray) -> bool {
        match self.store(name, value) {
            Ok(()) => true,
            Err(e) => {
                debug!("put_var('{}') failed: {}", name, e);
                false
            }
        }
    }

    fn store(&self, name: &str, value: &MxArray) -> Result<()> {
        let engine = self.handle()?;
        let put = self.libs.engine().resolve::<EngPutVariable>()?;
        let var = CString::new(name)?;

        let status = unsafe { put(engine.as_ptr(), var.as_ptr(), value.as_ptr()) };
        if status == 0 {
            Ok(())
        } else {
            Err(Error::NativeCall {
                call: "engPutVariable",
                status,
            })
        }
    }

    /// Whether the engine console is visible.
    pub fn is_visible(&self) -> bool {
        let visible = || -> Result<bool> {
            let engine = self.handle()?;
            let get = self.libs.engine().resolve::<EngGetVisible>()?;
            let mut visible = false;
            let status = unsafe { get(engine.as_ptr(), &mut visible) };
            Ok(status == 0 && visible)
        };
        visible().unwrap_or(false)
    }

    /// Show or hide the engine console. Returns whether the call succeeded.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        match self.apply_visible(visible) {
            Ok(()) => true,
            Err(e) => {
                debug!("set_visible({}) failed: {}", visible, e);
                false
            }
        }
    }

    fn apply_visible(&self, visible: bool) -> Result<()> {
        let engine = self.handle()?;
        let set = self.libs.engine().resolve::<EngSetVisible>()?;
        let status = unsafe { set(engine.as_ptr(), visible) };
        if status == 0 {
            Ok(())
        } else {
            Err(Error::NativeCall {
                call: "engSetVisible",
                status,
            })
        }
    }

    /// Replace the output buffer with one of `size` bytes.
    ///
    /// A size of 0 disables capture. An open session keeps its old buffer
    /// until the engine has accepted the new one, so the engine never holds
    /// a freed buffer. Returns `false` and leaves the buffer unchanged when
    /// the session is open and the engine library is not loaded or refuses
    /// the new buffer.
    pub fn set_output_buffer(&mut self, size: usize) -> bool {
        let buffer = OutputBuffer::with_capacity(size);

        if self.engine.is_some() {
            if !self.libs.engine().is_loaded() {
                debug!("Engine library not loaded; output buffer unchanged");
                return false;
            }
            if let Err(e) = self.register_output(&buffer) {
                warn!("Failed to register output buffer: {}", e);
                return false;
            }
        }

        self.output = buffer;
        debug!("Output buffer set to {} bytes", size);
        true
    }

    fn register_output(&self, buffer: &OutputBuffer) -> Result<()> {
        let engine = self.handle()?;
        let register = self.libs.engine().resolve::<EngOutputBuffer>()?;
        let status = unsafe { register(engine.as_ptr(), buffer.as_native_ptr(), buffer.native_len()) };
        if status == 0 {
            Ok(())
        } else {
            Err(Error::NativeCall {
                call: "engOutputBuffer",
                status,
            })
        }
    }

    /// Output captured from the most recent command.
    pub fn engine_output(&self) -> String {
        self.output.contents()
    }

    /// Whether output capture is enabled.
    pub fn has_output_buffer(&self) -> bool {
        self.output.is_enabled()
    }

    /// Output buffer capacity in bytes.
    pub fn buffer_size(&self) -> usize {
        self.output.capacity()
    }

    /// Clear the engine workspace and function cache.
    pub fn clear_workspace(&mut self) -> bool {
        self.run_command(CLEAR_WORKSPACE_COMMAND)
    }

    /// Whether the engine was opened as a single-use instance.
    pub fn is_single_use(&self) -> bool {
        self.single_use
    }

    /// Whether the session holds an engine handle.
    pub fn status(&self) -> SessionStatus {
        if self.engine.is_some() {
            SessionStatus::Open
        } else {
            SessionStatus::Closed
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.close(true);
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("status", &self.status())
            .field("single_use", &self.single_use)
            .field("buffer_size", &self.output.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matlab_mcp_core::LibrarySettings;
    use matlab_mcp_loader::testing::FakeLoader;

    fn libs(loader: &FakeLoader) -> Arc<LibraryRegistry> {
        Arc::new(LibraryRegistry::with_loader(
            &LibrarySettings::for_platform(Platform::detect()),
            Arc::new(loader.clone()),
        ))
    }

    fn loaded_libs() -> Arc<LibraryRegistry> {
        let libs = libs(&FakeLoader::new());
        libs.load_runtime().unwrap();
        libs
    }

    #[test]
    fn test_new_session_is_closed() {
        let session = EngineSession::new(loaded_libs(), 512);
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(!session.is_connected());
        assert!(session.has_output_buffer());
        assert_eq!(session.buffer_size(), 512);
    }

    #[test]
    fn test_create_opens_engine() {
        let session = EngineSession::create(loaded_libs(), 512, false);
        assert_eq!(session.status(), SessionStatus::Open);
        assert!(session.is_connected());
        assert!(!session.is_visible());
    }

    #[test]
    fn test_open_applies_visibility() {
        let mut session = EngineSession::new(loaded_libs(), 512);
        assert!(session.open(true));
        assert!(session.is_visible());
    }

    #[test]
    fn test_open_without_library_stays_closed() {
        let libs = libs(&FakeLoader::new());
        let mut session = EngineSession::new(libs, 512);

        assert!(!session.open(false));
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(!session.run_command("x = 1;"));
        assert!(session.get_var("x").is_none());
        assert!(!session.set_visible(true));
        assert!(!session.is_visible());
    }

    #[test]
    fn test_open_twice_keeps_engine() {
        let loader = FakeLoader::new();
        let libs = libs(&loader);
        libs.load_runtime().unwrap();

        let mut session = EngineSession::new(libs, 512);
        assert!(session.open(false));
        assert!(session.run_command("x = 1;"));
        assert!(session.open(false));

        // Same engine: the workspace survived.
        let value = session.get_var("x").unwrap();
        assert_eq!(value.to_scalar().unwrap(), Some(1.0));
    }

    #[test]
    fn test_single_use_open() {
        let mut session = EngineSession::with_platform(loaded_libs(), 512, Platform::Windows);
        assert!(session.open(false));
        assert!(session.is_single_use());

        session.close(false);
        assert!(!session.is_single_use());
    }

    #[test]
    fn test_close_variants() {
        for force in [true, false] {
            let mut session = EngineSession::create(loaded_libs(), 512, false);
            assert!(!session.close(force));
            assert_eq!(session.status(), SessionStatus::Closed);
            assert!(!session.is_connected());
        }
    }

    #[test]
    fn test_close_closed_session() {
        let mut session = EngineSession::new(loaded_libs(), 512);
        assert!(!session.close(true));
    }

    #[test]
    fn test_crashed_engine_is_not_connected() {
        let mut session = EngineSession::create(loaded_libs(), 512, false);
        assert!(!session.run_command("crash"));
        assert_eq!(session.status(), SessionStatus::Open);
        assert!(!session.is_connected());
        assert!(!session.close(true));
    }

    #[test]
    fn test_run_command_captures_output() {
        let mut session = EngineSession::create(loaded_libs(), 512, false);
        assert!(session.run_command("disp('hello')"));
        assert_eq!(session.engine_output(), "hello\n");

        assert!(session.run_command(""));
        assert_eq!(session.engine_output(), "");
    }

    #[test]
    fn test_output_truncated_to_buffer() {
        let mut session = EngineSession::create(loaded_libs(), 4, false);
        assert!(session.run_command("disp('abcdefgh')"));
        // The engine keeps one byte of the registered length for the NUL.
        assert_eq!(session.engine_output(), "abc");
    }

    #[test]
    fn test_set_output_buffer_zero_disables_capture() {
        let mut session = EngineSession::create(loaded_libs(), 512, false);
        assert!(session.set_output_buffer(0));
        assert!(!session.has_output_buffer());
        assert_eq!(session.buffer_size(), 0);

        assert!(session.run_command("disp('hello')"));
        assert_eq!(session.engine_output(), "");
    }

    #[test]
    fn test_set_output_buffer_reregisters() {
        let mut session = EngineSession::create(loaded_libs(), 0, false);
        assert!(!session.has_output_buffer());

        assert!(session.set_output_buffer(64));
        assert!(session.has_output_buffer());
        assert!(session.run_command("disp('again')"));
        assert_eq!(session.engine_output(), "again\n");
    }

    #[test]
    fn test_set_output_buffer_on_closed_session() {
        let mut session = EngineSession::new(loaded_libs(), 512);
        assert!(session.set_output_buffer(1024));
        assert_eq!(session.buffer_size(), 1024);

        assert!(session.open(false));
        assert!(session.run_command("disp('late')"));
        assert_eq!(session.engine_output(), "late\n");
    }

    #[test]
    fn test_resized_buffer_empty_after_no_op() {
        let mut session = EngineSession::create(loaded_libs(), 512, false);
        assert!(session.run_command("disp('before')"));

        assert!(session.set_output_buffer(128));
        assert!(session.run_command(""));
        assert!(session.has_output_buffer());
        assert_eq!(session.buffer_size(), 128);
        assert_eq!(session.engine_output(), "");
    }

    #[test]
    fn test_refused_buffer_keeps_registered_one() {
        let loader = FakeLoader::new();
        let libs = libs(&loader);
        libs.load_runtime().unwrap();
        let mut session = EngineSession::create(Arc::clone(&libs), 512, false);

        libs.engine().unload();
        loader.hide_symbol("engOutputBuffer");
        libs.engine().load().unwrap();

        assert!(!session.set_output_buffer(64));
        assert_eq!(session.buffer_size(), 512);

        assert!(session.run_command("disp('hello')"));
        assert_eq!(session.engine_output(), "hello\n");
    }

    #[test]
    fn test_resize_with_unloaded_library_is_no_op() {
        let libs = loaded_libs();
        let mut session = EngineSession::create(Arc::clone(&libs), 512, false);

        libs.engine().unload();
        assert!(!session.set_output_buffer(64));
        assert_eq!(session.buffer_size(), 512);

        libs.engine().load().unwrap();
        assert!(session.run_command("disp('kept')"));
        assert_eq!(session.engine_output(), "kept\n");
    }

    #[test]
    fn test_variable_exchange() {
        let libs = loaded_libs();
        let mut session = EngineSession::create(Arc::clone(&libs), 512, false);

        let value = MxArray::string(&libs, "abc").unwrap();
        assert!(session.put_var("s", &value));

        let copy = session.get_var("s").unwrap();
        assert_eq!(copy.to_text().unwrap().as_deref(), Some("abc"));
        assert!(session.get_var("missing").is_none());
    }

    #[test]
    fn test_invalid_variable_name() {
        let mut session = EngineSession::create(loaded_libs(), 512, false);
        assert!(session.get_var("a\0b").is_none());
        assert!(!session.run_command("x\0= 1"));
    }

    #[test]
    fn test_clear_workspace() {
        let mut session = EngineSession::create(loaded_libs(), 512, false);
        assert!(session.run_command("x = 1;"));
        assert!(session.clear_workspace());
        assert!(session.get_var("x").is_none());
    }

    #[test]
    fn test_unloaded_library_after_open() {
        let libs = loaded_libs();
        let mut session = EngineSession::create(Arc::clone(&libs), 512, false);
        libs.engine().unload();

        assert!(!session.run_command(""));
        assert!(!session.is_connected());
        assert!(!session.close(true));
        assert_eq!(session.status(), SessionStatus::Closed);
    }
}
