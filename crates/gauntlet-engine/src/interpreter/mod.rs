//! Embedded Python runtime host.
//!
//! One RustPython interpreter per worker, owned by a dedicated OS thread and
//! driven through a job channel. The interpreter, its global scope, and
//! every object in it stay on that thread for the worker's entire lifetime;
//! callers get `oneshot` replies they can race against a timeout. A job that
//! outlives its caller keeps running on the thread until it finishes on its
//! own - there is no preemption - and its reply is simply dropped.
//!
//! Boot happens once: load the runtime with the native stdlib and the frozen
//! Python library, install the `__emit__` output hook, evaluate the harness.
//! The harness redirects `sys.stdout`/`sys.stderr` into the hook, defines
//! the namespace scrub routine, and records its own global name set. There
//! is no retry on boot failure.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use rustpython_vm::builtins::PyStrRef;
use rustpython_vm::compiler::Mode;
use rustpython_vm::scope::Scope;
use rustpython_vm::{
    AsObject, Interpreter, PyObjectRef, PyRef, Settings, VirtualMachine,
    builtins::PyBaseException,
    convert::TryFromObject,
};
use tokio::sync::{mpsc, oneshot};

use crate::sink::{Channel, OutputSink};

/// The fixed bootstrap program, evaluated exactly once per worker.
const HARNESS: &str = include_str!("harness.py");

/// How a piece of source failed inside the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecFailure {
    /// The source did not compile.
    Parse(String),
    /// Execution raised; the message is `ExceptionType: detail`.
    Raised(String),
}

/// What the bootstrapper reports once the harness has been evaluated.
#[derive(Debug, Clone)]
pub struct BootReport {
    /// The harness's own global names, recorded at boot. Between requests
    /// the namespace holds only these (plus underscore-prefixed machinery).
    pub harness_names: BTreeSet<String>,
}

enum Job {
    /// Compile and run one piece of source in the shared global scope.
    Exec {
        source: String,
        reply: oneshot::Sender<Result<(), ExecFailure>>,
    },
    /// Invoke the harness scrub routine.
    Scrub {
        reply: oneshot::Sender<Result<(), ExecFailure>>,
    },
    /// Bind the captured output text as the global `output`.
    BindOutput {
        text: String,
        reply: oneshot::Sender<Result<(), ExecFailure>>,
    },
    /// Call `check(globals())` if the namespace defines a callable `check`.
    /// Replies with whether the hook existed.
    InvokeCheck {
        reply: oneshot::Sender<Result<bool, ExecFailure>>,
    },
}

/// Handle to the interpreter thread.
pub struct InterpreterHost {
    jobs: mpsc::UnboundedSender<Job>,
}

impl InterpreterHost {
    /// Spawn the interpreter thread. The returned receiver resolves once the
    /// runtime is loaded and the harness has been evaluated - or with the
    /// fatal initialization message when either step fails.
    pub fn spawn(sink: Arc<OutputSink>) -> (Self, oneshot::Receiver<Result<BootReport, String>>) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (boot_tx, boot_rx) = oneshot::channel();
        thread::Builder::new()
            .name("interpreter".to_string())
            .spawn(move || interpreter_main(jobs_rx, sink, boot_tx))
            .expect("failed to spawn the interpreter thread");
        (Self { jobs: jobs_tx }, boot_rx)
    }

    pub fn exec(&self, source: String) -> oneshot::Receiver<Result<(), ExecFailure>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.jobs.send(Job::Exec { source, reply });
        rx
    }

    pub fn scrub(&self) -> oneshot::Receiver<Result<(), ExecFailure>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.jobs.send(Job::Scrub { reply });
        rx
    }

    pub fn bind_output(&self, text: String) -> oneshot::Receiver<Result<(), ExecFailure>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.jobs.send(Job::BindOutput { text, reply });
        rx
    }

    pub fn invoke_check(&self) -> oneshot::Receiver<Result<bool, ExecFailure>> {
        let (reply, rx) = oneshot::channel();
        let _ = self.jobs.send(Job::InvokeCheck { reply });
        rx
    }
}

/// Everything the job loop needs from a successful boot.
struct Session {
    scope: Scope,
    scrub: PyObjectRef,
}

fn interpreter_main(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    sink: Arc<OutputSink>,
    boot: oneshot::Sender<Result<BootReport, String>>,
) {
    let started = Instant::now();
    let interpreter = Interpreter::with_init(Settings::default(), |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
    });

    let (session, names) = match interpreter.enter(|vm| boot_session(vm, &sink)) {
        Ok(parts) => parts,
        Err(message) => {
            let _ = boot.send(Err(message));
            return;
        }
    };
    tracing::debug!(elapsed = ?started.elapsed(), "harness evaluated");
    let _ = boot.send(Ok(BootReport {
        harness_names: names,
    }));

    while let Some(job) = jobs.blocking_recv() {
        match job {
            Job::Exec { source, reply } => {
                let result = interpreter.enter(|vm| run_source(vm, &session.scope, &source));
                let _ = reply.send(result);
            }
            Job::Scrub { reply } => {
                let result = interpreter.enter(|vm| {
                    session
                        .scrub
                        .call((), vm)
                        .map(drop)
                        .map_err(|exc| ExecFailure::Raised(describe_exception(vm, &exc)))
                });
                let _ = reply.send(result);
            }
            Job::BindOutput { text, reply } => {
                let result = interpreter.enter(|vm| {
                    session
                        .scope
                        .globals
                        .set_item("output", vm.ctx.new_str(text).into(), vm)
                        .map_err(|exc| ExecFailure::Raised(describe_exception(vm, &exc)))
                });
                let _ = reply.send(result);
            }
            Job::InvokeCheck { reply } => {
                let result = interpreter.enter(|vm| invoke_check(vm, &session.scope));
                let _ = reply.send(result);
            }
        }
    }
}

fn boot_session(
    vm: &VirtualMachine,
    sink: &Arc<OutputSink>,
) -> Result<(Session, BTreeSet<String>), String> {
    let scope = vm.new_scope_with_builtins();

    let sink = Arc::clone(sink);
    let emit = vm.new_function("__emit__", move |channel: PyStrRef, text: PyStrRef| {
        let channel = match channel.as_str() {
            "stderr" => Channel::Stderr,
            _ => Channel::Stdout,
        };
        sink.write(channel, text.as_str());
    });
    scope
        .globals
        .set_item("__emit__", emit.into(), vm)
        .map_err(|exc| describe_exception(vm, &exc))?;

    let code = vm
        .compile(HARNESS, Mode::Exec, "<harness>".to_owned())
        .map_err(|err| format!("harness does not compile: {err}"))?;
    vm.run_code_obj(code, scope.clone())
        .map_err(|exc| format!("harness evaluation failed: {}", describe_exception(vm, &exc)))?;

    let scrub = scope
        .globals
        .get_item("_scrub", vm)
        .map_err(|exc| format!("harness did not define _scrub: {}", describe_exception(vm, &exc)))?;
    let recorded = scope.globals.get_item("_HARNESS_NAMES", vm).map_err(|exc| {
        format!(
            "harness did not record its names: {}",
            describe_exception(vm, &exc)
        )
    })?;
    let names: Vec<String> = vm
        .extract_elements_with(&recorded, |obj| String::try_from_object(vm, obj))
        .map_err(|exc| describe_exception(vm, &exc))?;

    Ok((Session { scope, scrub }, names.into_iter().collect()))
}

fn run_source(vm: &VirtualMachine, scope: &Scope, source: &str) -> Result<(), ExecFailure> {
    let code = vm
        .compile(source, Mode::Exec, "<submission>".to_owned())
        .map_err(|err| ExecFailure::Parse(err.to_string()))?;
    vm.run_code_obj(code, scope.clone())
        .map(drop)
        .map_err(|exc| ExecFailure::Raised(describe_exception(vm, &exc)))
}

fn invoke_check(vm: &VirtualMachine, scope: &Scope) -> Result<bool, ExecFailure> {
    let hook = scope
        .globals
        .get_item_opt("check", vm)
        .map_err(|exc| ExecFailure::Raised(describe_exception(vm, &exc)))?;
    let Some(hook) = hook else {
        return Ok(false);
    };
    if !hook.is_callable() {
        return Ok(false);
    }
    hook.call((scope.globals.clone(),), vm)
        .map(|_| true)
        .map_err(|exc| ExecFailure::Raised(describe_exception(vm, &exc)))
}

/// `ExceptionType: detail`, or just the type when the exception carries no
/// message (a bare `assert` for instance).
fn describe_exception(vm: &VirtualMachine, exc: &PyRef<PyBaseException>) -> String {
    let kind = exc.as_object().class().name().to_string();
    let detail = exc
        .as_object()
        .str(vm)
        .map(|text| text.as_str().to_owned())
        .unwrap_or_default();
    if detail.is_empty() {
        kind
    } else {
        format!("{kind}: {detail}")
    }
}
