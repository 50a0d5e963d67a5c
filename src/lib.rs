pub mod codegen;
pub mod debug;
pub mod design;
pub mod passes;

pub use codegen::{create_stub, extract_interface_info, generate_verilog, CodegenError, SystemVerilogCodegen};
pub use debug::{DebugDatabase, DebugSnapshot, InjectDebugBreakPoints};
pub use design::{
	AssignmentType, BlockHandle, Context, DesignError, EdgeKind, ExprOp, Generator, GeneratorHandle, GeneratorId,
	InterfaceDef, PortDirection, PortType, StmtId, VarHandle, VarId,
};
pub use passes::{
	get_num_cpus, set_num_cpus, Diagnostic, DiagnosticKind, Pass, PassError, PassManager, PassReport, Severity,
};

use passes::{
	CreateModuleInstantiation, DecoupleGeneratorPorts, FixAssignmentType, HashGenerators, InsertVerilatorPublic,
	MergeWireAssignments, RemoveUnusedVars, UniquifyGenerators, VerifyGeneratorConnectivity,
};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum SilicaError {
	#[error(transparent)]
	DesignError(#[from] DesignError),

	#[error(transparent)]
	PassError(#[from] PassError),

	#[error(transparent)]
	CodegenError(#[from] CodegenError),
}

/// Compilation options for `compile`
#[derive(Clone, Debug)]
pub struct CompileOptions {
	/// Track emitted line numbers and build a debug database
	pub debug: bool,

	/// 0 disables dead-code removal and wire merging
	pub optimize_level: u8,

	/// Restricts the pipeline to the named passes, in standard order
	pub pass_subset: Option<Vec<String>>,

	/// Keep collecting diagnostics after the first failing pass
	pub best_effort: bool,

	/// Per-pass wall-clock budget
	pub pass_timeout: Option<Duration>,

	/// Variables to decorate with a verilator public marker
	pub verilator_public_vars: Vec<VarId>,
}

impl Default for CompileOptions {
	fn default() -> Self {
		Self {
			debug: false,
			optimize_level: 1,
			pass_subset: None,
			best_effort: false,
			pass_timeout: None,
			verilator_public_vars: Vec::new(),
		}
	}
}

/// Result of a compilation: emitted sources keyed by module name, the
/// diagnostics report, and the debug database when requested
pub struct CompileOutput {
	pub sources: BTreeMap<String, String>,
	pub report: PassReport,
	pub debug_db: Option<DebugDatabase>,
}

/// Runs the standard pass pipeline on the tree rooted at `top` and
/// emits SystemVerilog. On semantic errors the report carries the
/// diagnostics and no sources are produced.
pub fn compile(top: &GeneratorHandle, options: CompileOptions) -> Result<CompileOutput, SilicaError> {
	if options.debug {
		let handle = top.ctx();
		let mut core = handle.write().unwrap();
		for gen_id in core.generator_tree(top.id()) {
			core.get_generator_mut(gen_id).unwrap().debug = true;
		}
	}

	let mut manager = PassManager::new();
	manager.set_best_effort(options.best_effort);
	if let Some(budget) = options.pass_timeout {
		manager.set_pass_timeout(budget);
	}

	let mut pipeline: Vec<Box<dyn Pass>> = vec![Box::new(FixAssignmentType), Box::new(VerifyGeneratorConnectivity)];
	if options.optimize_level > 0 {
		pipeline.push(Box::new(RemoveUnusedVars));
		pipeline.push(Box::new(MergeWireAssignments));
	}
	pipeline.push(Box::new(DecoupleGeneratorPorts));
	pipeline.push(Box::new(CreateModuleInstantiation));
	pipeline.push(Box::new(HashGenerators::with_cancel(manager.cancel_flag())));
	pipeline.push(Box::new(UniquifyGenerators));
	if !options.verilator_public_vars.is_empty() {
		pipeline.push(Box::new(InsertVerilatorPublic::new(options.verilator_public_vars.clone())));
	}

	let break_points = if options.debug {
		let inject = InjectDebugBreakPoints::new();
		let sink = inject.sink();
		pipeline.push(Box::new(inject));
		Some(sink)
	}
	else {
		None
	};

	if let Some(subset) = &options.pass_subset {
		pipeline.retain(|p| subset.iter().any(|n| n == p.name()));
	}
	for pass in pipeline {
		manager.add_pass(pass);
	}

	let report = manager.run(top)?;
	if report.has_errors() {
		return Ok(CompileOutput {
			sources: BTreeMap::new(),
			report,
			debug_db: None,
		});
	}

	let sources = generate_verilog(top)?;

	let debug_db = match break_points {
		Some(sink) => {
			let mut db = DebugDatabase::new(&top.name());
			db.set_break_points(&sink.lock().unwrap());
			db.capture(top);
			Some(db)
		},
		None => None,
	};

	Ok(CompileOutput {
		sources,
		report,
		debug_db,
	})
}
