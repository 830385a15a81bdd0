//! VM execution tracing infrastructure.
//!
//! The [`VmTracer`] trait defines hook points at key execution events
//! (instruction dispatch, calls, returns, caught errors). Concrete
//! implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (default) |
//! | [`LogTracer`] | Execution log through the `Trace` log category |
//! | [`ProfilingTracer`] | Opcode frequency counters and call depth tracking |
//! | [`RecordingTracer`] | Full event recording for tests and post-mortem |
//!
//! A context holds its tracer as a boxed trait object, so a tracer can be
//! swapped in with `Context::set_tracer` without changing the context type.

use ahash::AHashMap;

use crate::{bytecode::Opcode, errors::ErrorKind, log::LogCategory, log_debug};

/// Trace event recorded by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An opcode was dispatched at the given address.
    Instruction {
        pc: usize,
        opcode: Opcode,
        /// Operand stack depth at dispatch.
        stack_depth: usize,
    },
    /// A call pushed a new frame.
    Call { name: String, depth: usize },
    /// A return popped a frame.
    Return { depth: usize },
    /// A try record caught an error.
    Catch { kind: ErrorKind, depth: usize },
}

/// Trait for VM execution tracing.
///
/// All methods have default no-op implementations, so implementations only
/// override the hooks they care about.
pub trait VmTracer: std::fmt::Debug + Send {
    /// Called before each opcode dispatch in the main execution loop.
    ///
    /// This is the hottest hook; implementations should be as lightweight as possible.
    ///
    /// # Arguments
    /// * `pc` - Address of the instruction
    /// * `opcode` - The opcode about to be executed
    /// * `stack_depth` - Number of values on the operand stack
    /// * `frame_depth` - Number of call frames active
    #[inline(always)]
    fn on_instruction(&mut self, _pc: usize, _opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {}

    /// Called when a call frame is pushed.
    #[inline(always)]
    fn on_call(&mut self, _name: &str, _depth: usize) {}

    /// Called when a call frame is popped.
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called when a try record catches an error.
    #[inline(always)]
    fn on_catch(&mut self, _kind: ErrorKind, _depth: usize) {}
}

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Tracer that writes an execution log through the `Trace` log category.
///
/// Output format:
/// ```text
/// (3) [    0] Push           stack=0  frames=0
///   >>> CALL foo              depth=1
///   <<< RETURN                depth=0
/// ```
#[derive(Debug, Default)]
pub struct LogTracer {
    thread_id: u32,
    limit: Option<usize>,
    count: usize,
}

impl LogTracer {
    #[must_use]
    pub fn new(thread_id: u32) -> Self {
        Self {
            thread_id,
            limit: None,
            count: 0,
        }
    }

    /// A tracer that goes quiet after `limit` instructions.
    #[must_use]
    pub fn with_limit(thread_id: u32, limit: usize) -> Self {
        Self {
            thread_id,
            limit: Some(limit),
            count: 0,
        }
    }

    fn stopped(&self) -> bool {
        self.limit.is_some_and(|limit| self.count >= limit)
    }
}

impl VmTracer for LogTracer {
    fn on_instruction(&mut self, pc: usize, opcode: Opcode, stack_depth: usize, frame_depth: usize) {
        if self.stopped() {
            return;
        }
        let name: &'static str = opcode.into();
        log_debug!(
            LogCategory::Trace,
            "({}) [{pc:>5}] {name:<14} stack={stack_depth}  frames={frame_depth}",
            self.thread_id
        );
        self.count += 1;
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        if !self.stopped() {
            log_debug!(LogCategory::Trace, "({})   >>> CALL {name:<20} depth={depth}", self.thread_id);
        }
    }

    fn on_return(&mut self, depth: usize) {
        if !self.stopped() {
            log_debug!(LogCategory::Trace, "({})   <<< RETURN              depth={depth}", self.thread_id);
        }
    }

    fn on_catch(&mut self, kind: ErrorKind, depth: usize) {
        log_debug!(LogCategory::Trace, "({})   !!! CATCH {kind} depth={depth}", self.thread_id);
    }
}

/// Tracer that collects execution statistics.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    opcode_counts: AHashMap<Opcode, u64>,
    total_instructions: u64,
    max_depth: usize,
    total_calls: u64,
    total_catches: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug)]
pub struct ProfilingReport {
    /// Per-opcode execution counts, sorted by frequency (highest first).
    pub opcode_counts: Vec<(Opcode, u64)>,
    pub total_instructions: u64,
    /// Maximum call depth observed.
    pub max_depth: usize,
    pub total_calls: u64,
    pub total_catches: u64,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a profiling report from the collected data.
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut opcode_counts: Vec<_> = self.opcode_counts.iter().map(|(&k, &v)| (k, v)).collect();
        opcode_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ProfilingReport {
            opcode_counts,
            total_instructions: self.total_instructions,
            max_depth: self.max_depth,
            total_calls: self.total_calls,
            total_catches: self.total_catches,
        }
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _pc: usize, opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
        self.total_instructions += 1;
    }

    fn on_call(&mut self, _name: &str, depth: usize) {
        self.total_calls += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    fn on_catch(&mut self, _kind: ErrorKind, _depth: usize) {
        self.total_catches += 1;
    }
}

/// Tracer that records every event.
///
/// The recording is shared, so a test can keep a handle to it after the
/// tracer has been moved into a context.
#[derive(Debug, Default, Clone)]
pub struct RecordingTracer {
    events: std::sync::Arc<parking_lot::Mutex<Vec<TraceEvent>>>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }
}

impl VmTracer for RecordingTracer {
    fn on_instruction(&mut self, pc: usize, opcode: Opcode, stack_depth: usize, _frame_depth: usize) {
        self.events.lock().push(TraceEvent::Instruction {
            pc,
            opcode,
            stack_depth,
        });
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        self.events.lock().push(TraceEvent::Call {
            name: name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.events.lock().push(TraceEvent::Return { depth });
    }

    fn on_catch(&mut self, kind: ErrorKind, depth: usize) {
        self.events.lock().push(TraceEvent::Catch { kind, depth });
    }
}
