use super::{get_num_cpus, visitor, Diagnostic, DiagnosticKind, Pass, PassError, PassReport};
use crate::design::{
	BlockType, ContextCore, GeneratorHandle, GeneratorId, PortDirection, StmtId, StmtKind, VarId, VarKind,
};
use indexmap::IndexSet;
use petgraph::prelude::DiGraphMap;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Collects the named leaf variables an operand ultimately reads
pub(crate) fn leaf_vars(core: &ContextCore, id: VarId, out: &mut IndexSet<VarId>) {
	let var = core.get_var(id).unwrap();
	match &var.kind() {
		VarKind::Base | VarKind::Port { .. } | VarKind::Param { .. } | VarKind::Enum { .. } | VarKind::PackedStruct { .. } => {
			out.insert(id);
		},
		VarKind::Slice { parent, .. } | VarKind::SignedView { parent } => leaf_vars(core, *parent, out),
		VarKind::Expression { left, right, .. } => {
			leaf_vars(core, *left, out);
			if let Some(r) = right {
				leaf_vars(core, *r, out);
			}
		},
		VarKind::Concat { parts } => {
			for p in parts {
				leaf_vars(core, *p, out);
			}
		},
		VarKind::Const { .. } => {},
	}
}

/// Read-position references of every statement in a generator:
/// right-hand sides, predicates, switch targets, sensitivity lists,
/// call arguments and instantiation bindings.
pub(crate) fn referenced_vars(core: &ContextCore, gen: GeneratorId) -> IndexSet<VarId> {
	let mut used = IndexSet::new();
	for stmt_id in visitor::collect_stmts(core, gen) {
		match core.get_stmt(stmt_id).unwrap().kind() {
			StmtKind::Assign { right, .. } => leaf_vars(core, *right, &mut used),
			StmtKind::If { predicate, .. } => leaf_vars(core, *predicate, &mut used),
			StmtKind::Switch { target, .. } => leaf_vars(core, *target, &mut used),
			StmtKind::Block {
				kind: crate::design::BlockKind::Sequential { sensitivity },
				..
			} => {
				for (_, var) in sensitivity {
					leaf_vars(core, *var, &mut used);
				}
			},
			StmtKind::FunctionCall { args, .. } => {
				for arg in args {
					leaf_vars(core, *arg, &mut used);
				}
			},
			StmtKind::Return { value } | StmtKind::Assert { value, .. } => leaf_vars(core, *value, &mut used),
			StmtKind::ModuleInstantiation { port_mapping, .. } => {
				for (_, external) in port_mapping {
					leaf_vars(core, *external, &mut used);
				}
			},
			_ => {},
		}
	}
	used
}

/// True when the variable or any of its slices has a driver
fn has_driver(core: &ContextCore, id: VarId) -> bool {
	let var = core.get_var(id).unwrap();
	if !var.sources().is_empty() {
		return true;
	}
	var.slices.values().any(|s| has_driver(core, *s))
}

/// True when the variable or any of its slices has a consumer
fn has_consumer(core: &ContextCore, id: VarId) -> bool {
	let var = core.get_var(id).unwrap();
	if !var.sinks().is_empty() {
		return true;
	}
	var.slices.values().any(|s| has_consumer(core, *s))
}

/// Verifies the driver graph of every generator: non-inputs must have a
/// driver, input ports must not be driven from inside their own
/// generator, drive widths must match, and combinational logic must be
/// acyclic.
pub struct VerifyGeneratorConnectivity;

impl Pass for VerifyGeneratorConnectivity {
	fn name(&self) -> &'static str {
		"verify_generator_connectivity"
	}

	fn run(&mut self, top: &GeneratorHandle, report: &mut PassReport) -> Result<(), PassError> {
		let handle = top.ctx();
		let core = handle.read().unwrap();

		for gen_id in core.generator_tree(top.id()) {
			let gen = core.get_generator(gen_id).unwrap();
			if gen.external || gen.is_stub {
				continue;
			}

			let read_set = referenced_vars(&core, gen_id);
			for var_id in gen.vars().values() {
				let var = core.get_var(*var_id).unwrap();
				match var.kind() {
					VarKind::Param { .. } | VarKind::Const { .. } => continue,
					VarKind::Port {
						direction: PortDirection::In,
						..
					} => {
						// inputs are driven by the parent, never from inside
						for stmt in var.sources() {
							if core.stmt_generator(*stmt) == Some(gen_id) {
								report.add_message(Diagnostic::new(
									DiagnosticKind::InputPortDriven {
										port: *var_id,
										stmt: *stmt,
									},
									gen_id,
								));
							}
						}
					},
					_ => {
						let driven = has_driver(&core, *var_id);
						let used = has_consumer(&core, *var_id) || read_set.contains(var_id);
						// outputs are observable from outside: they must
						// be driven even when nothing reads them here
						if var.is_port() {
							if !driven {
								report.add_message(Diagnostic::new(DiagnosticKind::SignalNotDriven(*var_id), gen_id));
							}
						}
						else if !driven && !used {
							report.add_message(Diagnostic::new(DiagnosticKind::SignalUnused(*var_id), gen_id));
						}
						else if !driven {
							report.add_message(Diagnostic::new(DiagnosticKind::SignalNotDriven(*var_id), gen_id));
						}
					},
				}
			}

			self.check_widths(&core, gen_id, report);
			self.check_comb_loops(&core, gen_id, report);
		}
		Ok(())
	}
}

impl VerifyGeneratorConnectivity {
	fn check_widths(&self, core: &ContextCore, gen: GeneratorId, report: &mut PassReport) {
		for stmt_id in visitor::collect_stmts(core, gen) {
			if let StmtKind::Assign { left, right, .. } = core.get_stmt(stmt_id).unwrap().kind() {
				let lw = core.get_var(*left).unwrap().width;
				let rw = core.get_var(*right).unwrap().width;
				if lw != rw {
					report.add_message(Diagnostic::new(DiagnosticKind::WidthMismatch { stmt: stmt_id }, gen));
				}
			}
		}
	}

	/// Builds the combinational dependency graph (assignments outside
	/// sequential processes) and reports cycles
	fn check_comb_loops(&self, core: &ContextCore, gen: GeneratorId, report: &mut PassReport) {
		let mut graph = DiGraphMap::<VarId, ()>::new();

		for stmt_id in visitor::collect_stmts(core, gen) {
			let stmt = core.get_stmt(stmt_id).unwrap();
			if let StmtKind::Assign { left, right, .. } = stmt.kind() {
				if core.enclosing_process(stmt_id) == Some(BlockType::Sequential) {
					continue;
				}
				let mut dests = IndexSet::new();
				leaf_vars(core, *left, &mut dests);
				let mut deps = IndexSet::new();
				leaf_vars(core, *right, &mut deps);
				for dst in &dests {
					for dep in &deps {
						graph.add_edge(*dep, *dst, ());
					}
				}
			}
		}

		if petgraph::algo::is_cyclic_directed(&graph) {
			// attribute the loop to some participating node
			let var = graph.nodes().next().unwrap();
			report.add_message(Diagnostic::new(DiagnosticKind::CombLoop { var }, gen));
		}
	}
}

/// Computes a width-aware structural fingerprint for every generator in
/// the tree: a Merkle-style hash over ports, parameters, variables,
/// statements and child hashes. Pure per generator, so the tree is
/// fingerprinted on the worker pool.
pub struct HashGenerators {
	cancel: Option<Arc<AtomicBool>>,
}

impl HashGenerators {
	pub fn new() -> Self {
		Self { cancel: None }
	}

	pub fn with_cancel(cancel: Arc<AtomicBool>) -> Self {
		Self { cancel: Some(cancel) }
	}
}

impl Default for HashGenerators {
	fn default() -> Self {
		Self::new()
	}
}

impl Pass for HashGenerators {
	fn name(&self) -> &'static str {
		"hash_generators"
	}

	fn run(&mut self, top: &GeneratorHandle, report: &mut PassReport) -> Result<(), PassError> {
		let _ = report;
		let handle = top.ctx();
		let order = handle.read().unwrap().generator_tree(top.id());

		let pool = rayon::ThreadPoolBuilder::new()
			.num_threads(get_num_cpus())
			.build()
			.map_err(|e| PassError::Design(crate::design::DesignError::Internal(e.to_string())))?;

		let cancel = self.cancel.clone();
		let hashes: Vec<(GeneratorId, u64)> = pool.install(|| {
			order
				.par_iter()
				.map(|id| {
					if let Some(flag) = &cancel {
						if flag.load(Ordering::Relaxed) {
							return None;
						}
					}
					let core = handle.read().unwrap();
					Some((*id, hash_generator(&core, *id)))
				})
				.while_some()
				.collect()
		});
		if hashes.len() != order.len() {
			return Err(PassError::Cancelled);
		}

		let mut core = handle.write().unwrap();
		for (id, hash) in hashes {
			core.get_generator_mut(id).unwrap().structural_hash = Some(hash);
		}
		Ok(())
	}
}

/// Structural hash of a single generator subtree
pub fn hash_generator(core: &ContextCore, id: GeneratorId) -> u64 {
	let mut hasher = DefaultHasher::new();
	let gen = core.get_generator(id).unwrap();

	gen.header_include.hash(&mut hasher);
	gen.package_import.hash(&mut hasher);
	for name in gen.port_names() {
		let var = core.get_var(*gen.vars().get(name).unwrap()).unwrap();
		name.hash(&mut hasher);
		var.width.hash(&mut hasher);
		var.is_signed.hash(&mut hasher);
		var.size.hash(&mut hasher);
		if let VarKind::Port { direction, port_type } = var.kind() {
			(*direction as u8).hash(&mut hasher);
			(*port_type as u8).hash(&mut hasher);
		}
	}
	for (name, param) in gen.params() {
		name.hash(&mut hasher);
		core.get_var(*param).unwrap().const_value().hash(&mut hasher);
	}
	for (name, var_id) in gen.vars() {
		let var = core.get_var(*var_id).unwrap();
		if matches!(var.kind(), VarKind::Base | VarKind::Enum { .. } | VarKind::PackedStruct { .. }) {
			name.hash(&mut hasher);
			var.width.hash(&mut hasher);
			var.is_signed.hash(&mut hasher);
		}
	}
	for (name, def) in gen.enums() {
		name.hash(&mut hasher);
		def.width.hash(&mut hasher);
		for (value_name, value) in &def.values {
			value_name.hash(&mut hasher);
			value.hash(&mut hasher);
		}
	}
	for stmt in gen.functions().values().chain(gen.stmts().iter()) {
		hash_stmt(core, *stmt, &mut hasher);
	}
	for (inst_name, child) in gen.children() {
		inst_name.hash(&mut hasher);
		hash_generator(core, *child).hash(&mut hasher);
	}
	hasher.finish()
}

fn hash_var_ref(core: &ContextCore, id: VarId, hasher: &mut DefaultHasher) {
	let var = core.get_var(id).unwrap();
	core.var_to_string(id).hash(hasher);
	var.width.hash(hasher);
	var.is_signed.hash(hasher);
}

fn hash_stmt(core: &ContextCore, id: StmtId, hasher: &mut DefaultHasher) {
	let stmt = core.get_stmt(id).unwrap();
	std::mem::discriminant(stmt.kind()).hash(hasher);
	match stmt.kind() {
		StmtKind::Assign {
			left,
			right,
			assign_type,
		} => {
			hash_var_ref(core, *left, hasher);
			hash_var_ref(core, *right, hasher);
			(*assign_type as u8).hash(hasher);
		},
		StmtKind::Block { kind, children, label } => {
			label.hash(hasher);
			if let crate::design::BlockKind::Sequential { sensitivity } = kind {
				for (edge, var) in sensitivity {
					(*edge as u8).hash(hasher);
					hash_var_ref(core, *var, hasher);
				}
			}
			if let crate::design::BlockKind::Function { name, ports, .. } = kind {
				name.hash(hasher);
				for p in ports {
					hash_var_ref(core, *p, hasher);
				}
			}
			(kind.block_type() as u8).hash(hasher);
			for child in children {
				hash_stmt(core, *child, hasher);
			}
		},
		StmtKind::If {
			predicate,
			then_body,
			else_body,
		} => {
			hash_var_ref(core, *predicate, hasher);
			hash_stmt(core, *then_body, hasher);
			hash_stmt(core, *else_body, hasher);
		},
		StmtKind::Switch { target, cases } => {
			hash_var_ref(core, *target, hasher);
			for case in cases {
				match case.cond {
					Some(c) => core.get_var(c).unwrap().const_value().hash(hasher),
					None => u8::MAX.hash(hasher),
				}
				hash_stmt(core, case.body, hasher);
			}
		},
		StmtKind::ModuleInstantiation { target, port_mapping } => {
			core.get_generator(*target).unwrap().name.hash(hasher);
			for (port, external) in port_mapping {
				hash_var_ref(core, *port, hasher);
				hash_var_ref(core, *external, hasher);
			}
		},
		StmtKind::InterfaceInstantiation { interface } => interface.hash(hasher),
		StmtKind::FunctionCall { function, args } => {
			function.hash(hasher);
			for arg in args {
				hash_var_ref(core, *arg, hasher);
			}
		},
		StmtKind::Return { value } => hash_var_ref(core, *value, hasher),
		StmtKind::Assert { value, .. } => hash_var_ref(core, *value, hasher),
		StmtKind::Comment { lines } | StmtKind::RawString { lines } => lines.hash(hasher),
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::{Context, DesignError, PortType};

	fn build_passthrough(c: &mut Context, name: &str) -> Result<GeneratorHandle, DesignError> {
		let mut m = c.new_generator(name)?;
		let i = m.port("in_data", 8, PortDirection::In, PortType::Data, false)?;
		let o = m.port("out_data", 8, PortDirection::Out, PortType::Data, false)?;
		let stmt = o.assign(&i)?;
		m.add_stmt(stmt)?;
		Ok(m)
	}

	#[test]
	fn test_connectivity_clean() -> Result<(), DesignError> {
		let mut c = Context::new();
		let top = build_passthrough(&mut c, "top")?;

		let mut report = PassReport::default();
		VerifyGeneratorConnectivity.run(&top, &mut report).unwrap();
		assert!(!report.has_errors());
		Ok(())
	}

	#[test]
	fn test_undriven_output() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let i = m.port("in_data", 8, PortDirection::In, PortType::Data, false)?;
		let o = m.port("out_data", 8, PortDirection::Out, PortType::Data, false)?;
		// use the output so it is not reported as plain unused
		let cmp = o.eq(&i)?;
		let flag = m.var("flag", 1, false)?;
		let stmt = flag.assign(&cmp)?;
		m.add_stmt(stmt)?;

		let mut report = PassReport::default();
		VerifyGeneratorConnectivity.run(&m, &mut report).unwrap();
		assert!(report
			.errors()
			.any(|d| matches!(d.kind(), DiagnosticKind::SignalNotDriven(v) if *v == o.id())));
		Ok(())
	}

	#[test]
	fn test_input_driven_internally() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let i = m.port("in_data", 8, PortDirection::In, PortType::Data, false)?;
		let v = m.var("v", 8, false)?;
		let stmt = i.assign(&v)?;
		m.add_stmt(stmt)?;

		let mut report = PassReport::default();
		VerifyGeneratorConnectivity.run(&m, &mut report).unwrap();
		assert!(report
			.errors()
			.any(|d| matches!(d.kind(), DiagnosticKind::InputPortDriven { .. })));
		Ok(())
	}

	#[test]
	fn test_comb_loop_detection() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let b = m.var("b", 8, false)?;
		let s1 = a.assign(&b)?;
		let s2 = b.assign(&a)?;
		m.add_stmt(s1)?;
		m.add_stmt(s2)?;

		let mut report = PassReport::default();
		VerifyGeneratorConnectivity.run(&m, &mut report).unwrap();
		assert!(report.errors().any(|d| matches!(d.kind(), DiagnosticKind::CombLoop { .. })));
		Ok(())
	}

	#[test]
	fn test_registered_feedback_is_not_a_loop() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let clk = m.port("clk", 1, PortDirection::In, PortType::Clock, false)?;
		let val = m.var("val", 8, false)?;
		let one = m.constant(1, 8, false)?;
		let next = val.add(&one)?;

		let seq = m.seq_block(vec![(crate::design::EdgeKind::Posedge, clk.id())])?;
		seq.assign(&val, &next)?;

		let mut report = PassReport::default();
		VerifyGeneratorConnectivity.run(&m, &mut report).unwrap();
		assert!(!report.errors().any(|d| matches!(d.kind(), DiagnosticKind::CombLoop { .. })));
		Ok(())
	}

	#[test]
	fn test_identical_bodies_hash_equal() -> Result<(), DesignError> {
		let mut c = Context::new();
		let a = build_passthrough(&mut c, "mod_a")?;
		let b = build_passthrough(&mut c, "mod_b")?;

		let mut report = PassReport::default();
		HashGenerators::new().run(&a, &mut report).unwrap();
		HashGenerators::new().run(&b, &mut report).unwrap();

		let handle = a.ctx();
		let core = handle.read().unwrap();
		let ha = core.get_generator(a.id()).unwrap().structural_hash().unwrap();
		let hb = core.get_generator(b.id()).unwrap().structural_hash().unwrap();
		assert_eq!(ha, hb);
		Ok(())
	}

	#[test]
	fn test_width_changes_hash() -> Result<(), DesignError> {
		let mut c = Context::new();
		let a = build_passthrough(&mut c, "mod_a")?;
		let mut b = c.new_generator("mod_b")?;
		let i = b.port("in_data", 16, PortDirection::In, PortType::Data, false)?;
		let o = b.port("out_data", 16, PortDirection::Out, PortType::Data, false)?;
		let stmt = o.assign(&i)?;
		b.add_stmt(stmt)?;

		let handle = a.ctx();
		let core = handle.read().unwrap();
		assert_ne!(hash_generator(&core, a.id()), hash_generator(&core, b.id()));
		Ok(())
	}
}
