use crate::design::{ContextCore, GeneratorHandle, GeneratorId, Stmt, StmtId, StmtKind, StmtParent};
use crate::passes::{visitor, Pass, PassError, PassReport};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Name of the synthetic trace function injected at breakpoints
pub const BREAK_POINT_FUNC_NAME: &str = "breakpoint_trace";

/// Inserts a `breakpoint_trace(id)` call before every statement
/// matching the breakpoint predicate, and publishes the statement-to-id
/// map for the debug database.
pub struct InjectDebugBreakPoints {
	sink: Arc<Mutex<IndexMap<StmtId, u32>>>,
	predicate: Option<Box<dyn Fn(&ContextCore, StmtId) -> bool + Send>>,
	counter: u32,
}

impl InjectDebugBreakPoints {
	pub fn new() -> Self {
		Self {
			sink: Arc::new(Mutex::new(IndexMap::new())),
			predicate: None,
			counter: 0,
		}
	}

	/// Restricts injection to statements matching the predicate.
	/// The default is every assignment inside a process block.
	pub fn with_predicate(mut self, predicate: Box<dyn Fn(&ContextCore, StmtId) -> bool + Send>) -> Self {
		self.predicate = Some(predicate);
		self
	}

	/// Shared handle to the statement-to-breakpoint-id map
	pub fn sink(&self) -> Arc<Mutex<IndexMap<StmtId, u32>>> {
		self.sink.clone()
	}
}

impl Default for InjectDebugBreakPoints {
	fn default() -> Self {
		Self::new()
	}
}

impl Pass for InjectDebugBreakPoints {
	fn name(&self) -> &'static str {
		"inject_debug_break_points"
	}

	fn run(&mut self, top: &GeneratorHandle, report: &mut PassReport) -> Result<(), PassError> {
		let _ = report;
		let handle = top.ctx();
		let mut core = handle.write().unwrap();

		for gen_id in core.generator_tree(top.id()) {
			let gen = core.get_generator(gen_id).unwrap();
			if gen.external || gen.is_stub {
				continue;
			}

			let targets: Vec<StmtId> = visitor::collect_stmts(&core, gen_id)
				.into_iter()
				.filter(|sid| {
					let stmt = core.get_stmt(*sid).unwrap();
					let in_block = matches!(stmt.parent(), StmtParent::Stmt(_));
					let is_assign = matches!(stmt.kind(), StmtKind::Assign { .. });
					let matches_predicate = match &self.predicate {
						Some(p) => p(&core, *sid),
						None => true,
					};
					in_block && is_assign && matches_predicate
				})
				.collect();

			for sid in targets {
				let block = match core.get_stmt(sid).unwrap().parent() {
					StmtParent::Stmt(p) => p,
					_ => continue,
				};
				let id = self.counter;
				self.counter += 1;
				let arg = core.make_const(gen_id, id as i64, 32, false)?;
				let call = core.alloc_stmt(Stmt::new(StmtKind::FunctionCall {
					function: BREAK_POINT_FUNC_NAME.into(),
					args: vec![arg],
				}));
				core.insert_stmt_before(block, call, sid)?;
				self.sink.lock().unwrap().insert(sid, id);
			}
		}
		Ok(())
	}
}

#[derive(Clone, Debug, Serialize)]
pub struct BreakPointRow {
	pub id: u32,
	pub filename: String,
	pub line_num: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct VariableRow {
	pub handle: String,
	pub var: String,
	pub front_var: String,
	pub id: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConnectionRow {
	pub handle_from: String,
	pub var_from: String,
	pub handle_to: String,
	pub var_to: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HierarchyRow {
	pub parent_handle: String,
	pub child_handle: String,
}

/// Flat table snapshot of the debug database. Persistence of the rows
/// is the collaborator's concern.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DebugSnapshot {
	pub break_points: Vec<BreakPointRow>,
	pub variables: Vec<VariableRow>,
	pub connections: Vec<ConnectionRow>,
	pub hierarchy: Vec<HierarchyRow>,
}

/// Maps emitted statements back to source locations and exposes the
/// table-oriented snapshot captured after emission.
pub struct DebugDatabase {
	top_name: String,
	ext: String,
	break_points: IndexMap<StmtId, u32>,
	generator_break_points: IndexMap<GeneratorId, BTreeSet<u32>>,
	stmt_mapping: IndexMap<StmtId, (String, u32)>,
	variables: Vec<VariableRow>,
	connections: Vec<ConnectionRow>,
	hierarchy: Vec<HierarchyRow>,
	var_id_counter: u32,
}

impl DebugDatabase {
	pub fn new(top_name: &str) -> Self {
		Self {
			top_name: top_name.into(),
			ext: ".sv".into(),
			break_points: IndexMap::new(),
			generator_break_points: IndexMap::new(),
			stmt_mapping: IndexMap::new(),
			variables: Vec::new(),
			connections: Vec::new(),
			hierarchy: Vec::new(),
			var_id_counter: 0,
		}
	}

	/// Registers the breakpoint statement ids published by the
	/// injection pass
	pub fn set_break_points(&mut self, break_points: &IndexMap<StmtId, u32>) {
		self.break_points = break_points.clone();
	}

	pub fn set_break_points_with_ext(&mut self, break_points: &IndexMap<StmtId, u32>, ext: &str) {
		self.break_points = break_points.clone();
		self.ext = ext.into();
	}

	/// Records additional front-end variable names for a generator handle
	pub fn set_variable_mapping(&mut self, handle: &str, mapping: &IndexMap<String, String>) {
		for (front_var, var) in mapping {
			let id = self.var_id_counter;
			self.var_id_counter += 1;
			self.variables.push(VariableRow {
				handle: handle.into(),
				var: var.clone(),
				front_var: front_var.clone(),
				id,
			});
		}
	}

	/// Dotted instance path of every generator in the tree
	fn handle_names(&self, core: &ContextCore, top: GeneratorId) -> IndexMap<GeneratorId, String> {
		let mut paths = IndexMap::new();
		paths.insert(top, self.top_name.clone());
		for gen_id in core.generator_tree(top) {
			let parent_path = paths.get(&gen_id).cloned().unwrap_or_else(|| self.top_name.clone());
			let gen = core.get_generator(gen_id).unwrap();
			for (inst_name, child) in gen.children() {
				paths.insert(*child, format!("{}.{}", parent_path, inst_name));
			}
		}
		paths
	}

	/// Captures statement locations, variable names, connections and
	/// hierarchy from the emitted design. Call after code generation so
	/// the line numbers are final.
	pub fn capture(&mut self, top: &GeneratorHandle) {
		let handle = top.ctx();
		let core = handle.read().unwrap();
		let paths = self.handle_names(&core, top.id());

		for gen_id in core.generator_tree(top.id()) {
			let gen = core.get_generator(gen_id).unwrap();
			let path = paths.get(&gen_id).cloned().unwrap();
			let filename = format!("{}{}", gen.name, self.ext);

			for (stmt, bp_id) in &self.break_points {
				if core.stmt_generator(*stmt) == Some(gen_id) {
					self.generator_break_points.entry(gen_id).or_default().insert(*bp_id);
					let line = core.get_stmt(*stmt).unwrap().verilog_ln;
					self.stmt_mapping.insert(*stmt, (filename.clone(), line));
				}
			}

			for name in gen.vars().keys() {
				let id = self.var_id_counter;
				self.var_id_counter += 1;
				self.variables.push(VariableRow {
					handle: path.clone(),
					var: name.clone(),
					front_var: name.clone(),
					id,
				});
			}

			for (inst_name, child) in gen.children() {
				let child_path = paths.get(child).cloned().unwrap_or_else(|| inst_name.clone());
				self.hierarchy.push(HierarchyRow {
					parent_handle: path.clone(),
					child_handle: child_path.clone(),
				});

				for stmt_id in gen.stmts() {
					if let StmtKind::ModuleInstantiation { target, port_mapping } = core.get_stmt(*stmt_id).unwrap().kind()
					{
						if target != child {
							continue;
						}
						for (port, external) in port_mapping {
							self.connections.push(ConnectionRow {
								handle_from: path.clone(),
								var_from: core.var_to_string(*external),
								handle_to: child_path.clone(),
								var_to: core.get_var(*port).unwrap().name.clone(),
							});
						}
					}
				}
			}
		}
	}

	pub fn break_points(&self) -> &IndexMap<StmtId, u32> {
		&self.break_points
	}

	pub fn generator_break_points(&self) -> &IndexMap<GeneratorId, BTreeSet<u32>> {
		&self.generator_break_points
	}

	/// Flat-row snapshot of all four tables
	pub fn snapshot(&self) -> DebugSnapshot {
		let mut break_points: Vec<BreakPointRow> = self
			.break_points
			.iter()
			.map(|(stmt, id)| {
				let (filename, line_num) = self
					.stmt_mapping
					.get(stmt)
					.cloned()
					.unwrap_or_else(|| (format!("{}{}", self.top_name, self.ext), 0));
				BreakPointRow {
					id: *id,
					filename,
					line_num,
				}
			})
			.collect();
		break_points.sort_by_key(|r| r.id);

		DebugSnapshot {
			break_points,
			variables: self.variables.clone(),
			connections: self.connections.clone(),
			hierarchy: self.hierarchy.clone(),
		}
	}
}
