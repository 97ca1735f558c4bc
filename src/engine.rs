use anyhow::{Context as AnyhowContext, Result};
use rquickjs::{Context, Ctx, Error as JsError, Function, Runtime, Value};

/// JavaScript runtime backed by QuickJS.
///
/// Owns the QuickJS runtime and context for one page load and provides
/// helpers for evaluating scripts. A minimal `console` implementation is
/// installed up front, forwarding logs to Rust tracing.
pub struct QuickJsEngine {
    runtime: Runtime,
    context: Context,
}

impl QuickJsEngine {
    /// Create a new QuickJS engine with `console.log` wired up to `tracing`.
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new().context("failed to create QuickJS runtime")?;
        let context = Context::full(&runtime).context("failed to create QuickJS context")?;
        let engine = Self { runtime, context };
        engine.init_console()?;
        Ok(engine)
    }

    /// Evaluate a script body and discard the result.
    pub fn eval(&self, source: &str, label: &str) -> Result<()> {
        self.eval_with::<()>(source, label)
    }

    /// Evaluate a script body and deserialize the result into `V`.
    pub fn eval_with<V>(&self, source: &str, label: &str) -> Result<V>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        let script = Self::with_source_url(source, label);
        let value = self
            .context
            .with(|ctx| ctx.eval::<V, _>(script))
            .map_err(|err| self.materialize_error(err))?;

        // Promise continuations queued during evaluation run before control
        // returns to the host; there is exactly one thread of control.
        self.drain_jobs()?;

        Ok(value)
    }

    /// Provide access to the underlying QuickJS context. A pending exception
    /// is materialized into an error carrying its message and stack.
    pub fn with_context<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> rquickjs::Result<T>,
    {
        self.context
            .with(f)
            .map_err(|err| self.materialize_error(err))
    }

    /// Execute pending jobs (promise continuations, microtasks) until the
    /// queue is empty. Returns whether any job ran.
    pub fn drain_jobs(&self) -> Result<bool> {
        let mut job_count = 0usize;
        const MAX_JOBS: usize = 1000;

        while self.runtime.is_job_pending() {
            match self.runtime.execute_pending_job() {
                Ok(true) => {
                    job_count += 1;
                    if job_count >= MAX_JOBS {
                        tracing::warn!(
                            target: "quickjs",
                            "stopped processing jobs after {} iterations (possible runaway loop)",
                            MAX_JOBS
                        );
                        break;
                    }
                }
                Ok(false) => break,
                Err(job_exception) => {
                    // A throwing job is a routine script fault; report it and
                    // keep the host going.
                    tracing::error!(target: "quickjs", "job execution error: {:?}", job_exception);
                    break;
                }
            }
        }

        Ok(job_count > 0)
    }

    /// Convert a QuickJS error into one that carries the thrown exception's
    /// message (and stack, when present) instead of an opaque marker.
    fn materialize_error(&self, err: JsError) -> anyhow::Error {
        match err {
            JsError::Exception => {
                let message = self
                    .context
                    .with(|ctx| capture_exception_message(&ctx))
                    .unwrap_or_else(|| "QuickJS exception".to_string());
                anyhow::anyhow!(message)
            }
            other => anyhow::Error::from(other),
        }
    }

    fn init_console(&self) -> Result<()> {
        self.context
            .with(|ctx| {
                let global = ctx.globals();
                let log_fn = Function::new(ctx.clone(), log_from_js)?.with_name("__page_log")?;
                global.set("__page_log", log_fn)?;
                ctx.eval::<(), _>(CONSOLE_BOOTSTRAP.as_bytes())
            })
            .map_err(anyhow::Error::from)
    }

    fn with_source_url(source: &str, label: &str) -> Vec<u8> {
        let mut script = String::with_capacity(source.len() + label.len() + 32);
        script.push_str(source);
        if !source.ends_with('\n') {
            script.push('\n');
        }
        script.push_str("//# sourceURL=");
        script.push_str(label);
        script.push('\n');
        script.into_bytes()
    }
}

fn log_from_js(message: String) -> rquickjs::Result<()> {
    tracing::info!(target = "quickjs", message = %message);
    Ok(())
}

fn capture_exception_message(ctx: &Ctx<'_>) -> Option<String> {
    let exception: Value = ctx.catch();

    if let Some(obj) = exception.as_object() {
        if let Ok(message) = obj.get::<_, String>("message") {
            if let Ok(stack) = obj.get::<_, String>("stack") {
                return Some(format!("Error: {}\nStack: {}", message, stack));
            }
            return Some(format!("Error: {}", message));
        }
    }

    Some(format!("{:?}", exception))
}

const CONSOLE_BOOTSTRAP: &str = r#"
(() => {
    const global = globalThis;
    const stringify = (value) => {
        try {
            if (typeof value === 'string') {
                return value;
            }
            if (value === undefined) {
                return 'undefined';
            }
            if (value === null) {
                return 'null';
            }
            return String(value);
        } catch (err) {
            return '[unprintable]';
        }
    };

    const logImpl = (...args) => {
        try {
            const joined = args.map(stringify).join(' ');
            global.__page_log(joined);
        } catch (err) {
            // Swallow logging errors; console must never throw.
        }
    };

    if (typeof global.console !== 'object' || global.console === null) {
        global.console = {};
    }

    global.console.log = logImpl;
    global.console.error = logImpl;
    global.console.warn = logImpl;
    global.console.info = logImpl;
    global.console.debug = logImpl;
})();
"#;
