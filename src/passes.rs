pub mod analysis;
pub mod transform;
pub mod visitor;

pub use analysis::{HashGenerators, VerifyGeneratorConnectivity};
pub use transform::{
	CreateModuleInstantiation, DecoupleGeneratorPorts, FixAssignmentType, InsertVerilatorPublic, MergeWireAssignments,
	RemoveUnusedVars, UniquifyGenerators,
};
pub use visitor::{visit_generator_tree, Visitor};

use crate::design::{DesignError, GeneratorHandle, GeneratorId, StmtId, VarId};
use log::info;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

static NUM_CPUS: AtomicUsize = AtomicUsize::new(0);

/// Worker pool size used by pure-per-generator passes. Defaults to the
/// detected core count; the NUM_CPUS environment variable overrides it.
pub fn get_num_cpus() -> usize {
	let n = NUM_CPUS.load(Ordering::Relaxed);
	if n != 0 {
		return n;
	}
	let detected = std::env::var("NUM_CPUS")
		.ok()
		.and_then(|s| s.parse::<usize>().ok())
		.filter(|n| *n > 0)
		.unwrap_or_else(num_cpus::get);
	NUM_CPUS.store(detected, Ordering::Relaxed);
	detected
}

pub fn set_num_cpus(n: usize) {
	NUM_CPUS.store(n.max(1), Ordering::Relaxed);
}

/// Severity of a pipeline diagnostic
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Severity {
	Info,
	Warning,
	Error,
}

/// Kinds of diagnostics raised by passes, referencing the offending
/// IR nodes
#[derive(Clone, Debug, Error)]
pub enum DiagnosticKind {
	#[error("signal has no driver")]
	SignalNotDriven(VarId),

	#[error("signal is never driven nor used")]
	SignalUnused(VarId),

	#[error("input port is driven from within its own generator")]
	InputPortDriven { port: VarId, stmt: StmtId },

	#[error("assignment width mismatch")]
	WidthMismatch { stmt: StmtId },

	#[error("combinational loop through signal")]
	CombLoop { var: VarId },

	#[error("conflicting assignment types on the same destination")]
	AssignTypeMismatch { var: VarId, stmts: Vec<StmtId> },

	#[error("notice: {0}")]
	Notice(String),
}

pub trait SeverityPolicy {
	fn severity(&self, kind: &DiagnosticKind) -> Severity;
}

pub struct DefaultSeverityPolicy;

impl SeverityPolicy for DefaultSeverityPolicy {
	fn severity(&self, kind: &DiagnosticKind) -> Severity {
		use DiagnosticKind::*;
		use Severity::*;
		match kind {
			SignalUnused(_) => Warning,
			SignalNotDriven(_) => Error,
			InputPortDriven { .. } => Error,
			WidthMismatch { .. } => Error,
			CombLoop { .. } => Error,
			AssignTypeMismatch { .. } => Error,
			Notice(_) => Info,
		}
	}
}

/// A diagnostic message attached to the IR nodes that participated
#[derive(Clone, Debug)]
pub struct Diagnostic {
	severity: Severity,
	kind: DiagnosticKind,
	generator: GeneratorId,
}

impl Diagnostic {
	pub fn new(kind: DiagnosticKind, generator: GeneratorId) -> Self {
		let severity = DefaultSeverityPolicy.severity(&kind);
		Self {
			severity,
			kind,
			generator,
		}
	}

	pub fn kind(&self) -> &DiagnosticKind {
		&self.kind
	}

	pub fn severity(&self) -> Severity {
		self.severity
	}

	pub fn generator_id(&self) -> GeneratorId {
		self.generator
	}
}

impl std::fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}: {}", self.severity, self.kind)
	}
}

/// Accumulated diagnostics of a pipeline run
#[derive(Clone, Debug, Default)]
pub struct PassReport {
	messages: Vec<Diagnostic>,
}

impl PassReport {
	pub fn add_message(&mut self, msg: Diagnostic) {
		self.messages.push(msg);
	}

	pub fn extend(&mut self, other: &PassReport) {
		self.messages.extend(other.messages.iter().cloned());
	}

	pub fn messages(&self) -> &[Diagnostic] {
		&self.messages
	}

	pub fn has_errors(&self) -> bool {
		self.messages.iter().any(|m| m.severity() == Severity::Error)
	}

	pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
		self.messages.iter().filter(|m| m.severity() == Severity::Error)
	}
}

/// Hard pipeline failures. Semantic problems go through `PassReport`.
#[derive(Clone, Debug, Error)]
pub enum PassError {
	#[error(transparent)]
	Design(#[from] DesignError),

	#[error("pass '{pass}' exceeded its wall-clock budget")]
	PassTimeout { pass: String },

	#[error("pipeline cancelled")]
	Cancelled,
}

/// A single transformation or validation over the generator tree.
/// Passes must be deterministic given the same IR.
pub trait Pass {
	/// Returns the name of the pass
	fn name(&self) -> &'static str;

	/// Runs the pass on the tree rooted at `top`
	fn run(&mut self, top: &GeneratorHandle, report: &mut PassReport) -> Result<(), PassError>;
}

/// Ordered pass pipeline. Dependencies between passes are expressed by
/// registration order.
pub struct PassManager {
	passes: Vec<Box<dyn Pass>>,
	best_effort: bool,
	pass_timeout: Option<Duration>,
	cancel: Arc<AtomicBool>,
}

impl PassManager {
	pub fn new() -> Self {
		Self {
			passes: Vec::new(),
			best_effort: false,
			pass_timeout: None,
			cancel: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Adds a new pass at the end of the pipeline
	pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
		info!("registering pass: {}", pass.name());
		self.passes.push(pass);
	}

	/// In best-effort mode the pipeline keeps running after a pass
	/// reports errors, collecting diagnostics
	pub fn set_best_effort(&mut self, best_effort: bool) {
		self.best_effort = best_effort;
	}

	/// Optional per-pass wall-clock budget
	pub fn set_pass_timeout(&mut self, timeout: Duration) {
		self.pass_timeout = Some(timeout);
	}

	/// Cooperative cancellation flag, checked between passes and between
	/// generators inside parallel passes
	pub fn cancel_flag(&self) -> Arc<AtomicBool> {
		self.cancel.clone()
	}

	/// Runs all passes in order on the tree rooted at `top`
	pub fn run(&mut self, top: &GeneratorHandle) -> Result<PassReport, PassError> {
		let mut report = PassReport::default();
		for pass in &mut self.passes {
			if self.cancel.load(Ordering::Relaxed) {
				return Err(PassError::Cancelled);
			}
			info!("running pass: {}", pass.name());
			let started = Instant::now();
			let mut pass_report = PassReport::default();
			pass.run(top, &mut pass_report)?;
			if let Some(budget) = self.pass_timeout {
				if started.elapsed() > budget {
					return Err(PassError::PassTimeout {
						pass: pass.name().into(),
					});
				}
			}
			let failed = pass_report.has_errors();
			report.extend(&pass_report);
			if failed && !self.best_effort {
				break;
			}
		}
		Ok(report)
	}
}

impl Default for PassManager {
	fn default() -> Self {
		Self::new()
	}
}
