//! Fake engine library.
//!
//! Engine handles are boxed [`FakeEngine`]s. The engine understands a tiny
//! command language:
//!
//! - `""` does nothing (liveness probe)
//! - `exit` / `quit` shut the engine down
//! - `crash` kills the engine without a shutdown, like a dead process
//! - `clear ...` empties the workspace
//! - `disp(text)` prints `text`
//! - `name = value` assigns a number, `'text'`, `true` or `false`
//! - `name` prints a variable

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr};

use super::matrix::FakeValue;
use crate::ffi::{
    EngClose, EngEvalString, EngGetVariable, EngGetVisible, EngOpen, EngOpenSingleUse,
    EngOutputBuffer, EngPutVariable, EngSetVisible, Engine, EntryPoint, RawArray,
};

struct FakeEngine {
    alive: bool,
    visible: bool,
    output: *mut c_char,
    output_len: c_int,
    workspace: HashMap<String, FakeValue>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            alive: true,
            visible: false,
            output: std::ptr::null_mut(),
            output_len: 0,
            workspace: HashMap::new(),
        }
    }

    fn eval(&mut self, command: &str) -> (c_int, String) {
        let command = command.trim();

        match command {
            "" => return (0, String::new()),
            "exit" | "quit" => {
                self.alive = false;
                return (0, String::new());
            }
            "crash" => {
                self.alive = false;
                return (1, String::new());
            }
            _ => {}
        }

        if command.starts_with("clear") {
            self.workspace.clear();
            return (0, String::new());
        }

        if let Some(text) = command
            .strip_prefix("disp(")
            .and_then(|rest| rest.trim_end_matches(';').strip_suffix(')'))
        {
            return (0, format!("{}\n", text.trim_matches('\'')));
        }

        if let Some((name, expr)) = command.split_once('=') {
            let name = name.trim().to_string();
            let quiet = expr.trim_end().ends_with(';');
            let value = FakeValue::parse(expr.trim().trim_end_matches(';').trim());
            let output = if quiet {
                String::new()
            } else {
                format!("{name} = {}\n", value.display())
            };
            self.workspace.insert(name, value);
            return (0, output);
        }

        match self.workspace.get(command) {
            Some(value) => (0, format!("{command} = {}\n", value.display())),
            None => (
                0,
                format!("Undefined function or variable '{command}'.\n"),
            ),
        }
    }

    unsafe fn write_output(&self, text: &str) {
        if self.output.is_null() || self.output_len <= 0 {
            return;
        }

        let room = (self.output_len as usize).saturating_sub(1);
        let len = text.len().min(room);
        unsafe {
            std::ptr::copy_nonoverlapping(text.as_ptr(), self.output as *mut u8, len);
            *self.output.add(len) = 0;
        }
    }
}

unsafe fn engine<'a>(ep: *mut Engine) -> Option<&'a mut FakeEngine> {
    unsafe { (ep as *mut FakeEngine).as_mut() }
}

unsafe fn text<'a>(ptr: *const c_char) -> &'a str {
    if ptr.is_null() {
        return "";
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().unwrap_or("")
}

unsafe extern "C" fn eng_open(_startcmd: *const c_char) -> *mut Engine {
    Box::into_raw(Box::new(FakeEngine::new())) as *mut Engine
}

unsafe extern "C" fn eng_open_single_use(
    _startcmd: *const c_char,
    _reserved: *mut c_void,
    retstatus: *mut c_int,
) -> *mut Engine {
    if !retstatus.is_null() {
        unsafe { *retstatus = 0 };
    }
    Box::into_raw(Box::new(FakeEngine::new())) as *mut Engine
}

unsafe extern "C" fn eng_close(ep: *mut Engine) -> c_int {
    if ep.is_null() {
        return 1;
    }
    let engine = unsafe { Box::from_raw(ep as *mut FakeEngine) };
    if engine.alive {
        0
    } else {
        1
    }
}

unsafe extern "C" fn eng_eval_string(ep: *mut Engine, command: *const c_char) -> c_int {
    let Some(engine) = (unsafe { engine(ep) }) else {
        return 1;
    };
    if !engine.alive {
        return 1;
    }

    let (status, output) = engine.eval(unsafe { text(command) });
    unsafe { engine.write_output(&output) };
    status
}

unsafe extern "C" fn eng_get_variable(ep: *mut Engine, name: *const c_char) -> *mut RawArray {
    let Some(engine) = (unsafe { engine(ep) }) else {
        return std::ptr::null_mut();
    };
    if !engine.alive {
        return std::ptr::null_mut();
    }

    match engine.workspace.get(unsafe { text(name) }) {
        Some(value) => value.clone().into_raw(),
        None => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn eng_put_variable(
    ep: *mut Engine,
    name: *const c_char,
    value: *const RawArray,
) -> c_int {
    let Some(engine) = (unsafe { engine(ep) }) else {
        return 1;
    };
    let Some(value) = (unsafe { FakeValue::from_ptr(value) }) else {
        return 1;
    };
    if !engine.alive {
        return 1;
    }

    let name = unsafe { text(name) }.to_string();
    engine.workspace.insert(name, value.clone());
    0
}

unsafe extern "C" fn eng_output_buffer(ep: *mut Engine, buffer: *mut c_char, len: c_int) -> c_int {
    let Some(engine) = (unsafe { engine(ep) }) else {
        return 1;
    };
    engine.output = buffer;
    engine.output_len = len;
    0
}

unsafe extern "C" fn eng_get_visible(ep: *mut Engine, visible: *mut bool) -> c_int {
    let Some(engine) = (unsafe { engine(ep) }) else {
        return 1;
    };
    if visible.is_null() || !engine.alive {
        return 1;
    }
    unsafe { *visible = engine.visible };
    0
}

unsafe extern "C" fn eng_set_visible(ep: *mut Engine, visible: bool) -> c_int {
    let Some(engine) = (unsafe { engine(ep) }) else {
        return 1;
    };
    if !engine.alive {
        return 1;
    }
    engine.visible = visible;
    0
}

pub(super) fn symbol(name: &str) -> Option<*const c_void> {
    let table: [(&str, *const c_void); 9] = [
        (EngOpen::SYMBOL, eng_open as *const c_void),
        (EngOpenSingleUse::SYMBOL, eng_open_single_use as *const c_void),
        (EngClose::SYMBOL, eng_close as *const c_void),
        (EngEvalString::SYMBOL, eng_eval_string as *const c_void),
        (EngGetVariable::SYMBOL, eng_get_variable as *const c_void),
        (EngPutVariable::SYMBOL, eng_put_variable as *const c_void),
        (EngOutputBuffer::SYMBOL, eng_output_buffer as *const c_void),
        (EngGetVisible::SYMBOL, eng_get_visible as *const c_void),
        (EngSetVisible::SYMBOL, eng_set_visible as *const c_void),
    ];

    table
        .iter()
        .find(|(symbol, _)| *symbol == name)
        .map(|(_, address)| *address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_assignment_and_lookup() {
        let mut engine = FakeEngine::new();
        assert_eq!(engine.eval("x = 3;"), (0, String::new()));
        assert_eq!(engine.eval("x"), (0, "x = 3\n".to_string()));
        assert_eq!(engine.workspace.get("x"), Some(&FakeValue::Double(3.0)));
    }

    #[test]
    fn test_eval_disp() {
        let mut engine = FakeEngine::new();
        assert_eq!(engine.eval("disp('hello')"), (0, "hello\n".to_string()));
    }

    #[test]
    fn test_eval_exit_and_crash() {
        let mut engine = FakeEngine::new();
        assert_eq!(engine.eval("exit").0, 0);
        assert!(!engine.alive);

        let mut engine = FakeEngine::new();
        assert_eq!(engine.eval("crash").0, 1);
        assert!(!engine.alive);
    }

    #[test]
    fn test_eval_clear() {
        let mut engine = FakeEngine::new();
        engine.eval("a = 1;");
        engine.eval("clear functions;clear;");
        assert!(engine.workspace.is_empty());
    }

    #[test]
    fn test_write_output_truncates() {
        let mut buffer = [0xffu8; 5];
        let mut engine = FakeEngine::new();
        engine.output = buffer.as_mut_ptr() as *mut c_char;
        engine.output_len = 4;

        unsafe { engine.write_output("abcdef") };
        assert_eq!(&buffer[..4], b"abc\0");
        assert_eq!(buffer[4], 0xff);
    }
}
