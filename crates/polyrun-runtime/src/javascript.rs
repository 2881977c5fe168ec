//! Dynamic-language backend: JavaScript on an embedded QuickJS engine.
//!
//! Every run gets a fresh runtime and context, so globals, prototypes and
//! the console capture never outlive the call.

use async_trait::async_trait;
use polyrun_core::compose::compose_script;
use polyrun_core::{BackendKind, CodeRunner, ExecutionError, ExecutionResult, LoadError};
use rquickjs::convert::Coerced;
use rquickjs::prelude::Rest;
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Object, Runtime, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

const SUCCESS_LINE: &str = "✅ JavaScript execution successful.";
const CONSOLE_METHODS: [&str; 4] = ["log", "info", "warn", "error"];

/// Heap ceiling for a single run's interpreter.
const MEMORY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct JavaScriptRuntime;

impl JavaScriptRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CodeRunner for JavaScriptRuntime {
    fn language(&self) -> &str {
        "javascript"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Dynamic
    }

    async fn load(&self) -> Result<(), LoadError> {
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        true
    }

    async fn run(&self, code: &str, validation_script: Option<&str>) -> ExecutionResult {
        let program = wrap(&compose_script(code, validation_script));
        match tokio::task::spawn_blocking(move || evaluate(&program)).await {
            Ok(result) => result,
            Err(e) => ExecutionError::Trap {
                message: format!("Evaluation task failed: {}", e),
            }
            .into_result(Vec::new()),
        }
    }
}

/// Give the program its own function scope.
fn wrap(program: &str) -> String {
    format!("(function() {{\n{}\n}})();", program)
}

fn evaluate(program: &str) -> ExecutionResult {
    let lines = Rc::new(RefCell::new(Vec::new()));
    let outcome = run_in_fresh_context(program, lines.clone());
    let output = lines.take();

    match outcome {
        Ok(()) => {
            let mut output = output;
            output.push(SUCCESS_LINE.to_string());
            ExecutionResult::passed(output)
        }
        Err(message) => {
            debug!("JavaScript threw: {}", message);
            ExecutionError::Trap { message }.into_result(output)
        }
    }
}

fn run_in_fresh_context(program: &str, lines: Rc<RefCell<Vec<String>>>) -> Result<(), String> {
    let runtime = Runtime::new().map_err(|e| e.to_string())?;
    runtime.set_memory_limit(MEMORY_LIMIT);
    let context = Context::full(&runtime).map_err(|e| e.to_string())?;

    context.with(|ctx| {
        install_console(&ctx, lines).map_err(|e| e.to_string())?;
        ctx.eval::<(), _>(program)
            .catch(&ctx)
            .map_err(|caught| describe(&ctx, caught))
    })
}

/// Replace `console` with one that records each call as an output line.
fn install_console<'js>(ctx: &Ctx<'js>, lines: Rc<RefCell<Vec<String>>>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;
    for method in CONSOLE_METHODS {
        let lines = lines.clone();
        let capture = Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            let line = args
                .0
                .iter()
                .map(|value| render(&ctx, value))
                .collect::<Vec<_>>()
                .join(" ");
            lines.borrow_mut().push(line);
        })?;
        console.set(method, capture)?;
    }
    ctx.globals().set("console", console)
}

/// Objects as JSON, everything else through string coercion.
fn render<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> String {
    if value.is_object() && !value.is_function() {
        if let Ok(Some(json)) = ctx.json_stringify(value.clone()) {
            if let Ok(text) = json.to_string() {
                return text;
            }
        }
    }
    value
        .get::<Coerced<String>>()
        .map(|coerced| coerced.0)
        .unwrap_or_else(|_| "[unprintable]".to_string())
}

fn describe<'js>(ctx: &Ctx<'js>, caught: CaughtError<'js>) -> String {
    match caught {
        CaughtError::Exception(exception) => exception
            .message()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| exception.to_string()),
        CaughtError::Value(value) => render(ctx, &value),
        CaughtError::Error(error) => error.to_string(),
    }
}
