use crate::design::{ContextCore, GeneratorId, StmtId, StmtKind, VarId};

/// Generic pre-order IR visitor. Callbacks are keyed by node kind;
/// children are traversed deterministically in insertion order.
///
/// Mutation of child lists during traversal is not supported; collect
/// the node ids of interest and apply edits afterwards.
pub trait Visitor {
	fn visit_generator(&mut self, _core: &ContextCore, _gen: GeneratorId) {}
	fn visit_stmt(&mut self, _core: &ContextCore, _stmt: StmtId) {}
	fn visit_var(&mut self, _core: &ContextCore, _var: VarId) {}

	/// Early-termination check, consulted before each node
	fn stop(&self) -> bool {
		false
	}
}

/// Visits every generator reachable from `top` pre-order: the generator
/// itself, its named variables, its statements (recursively), then its
/// children in insertion order.
pub fn visit_generator_tree<V: Visitor>(core: &ContextCore, top: GeneratorId, visitor: &mut V) {
	for gen_id in core.generator_tree(top) {
		if visitor.stop() {
			return;
		}
		visitor.visit_generator(core, gen_id);

		let gen = core.get_generator(gen_id).unwrap();
		for var_id in gen.vars().values() {
			if visitor.stop() {
				return;
			}
			visitor.visit_var(core, *var_id);
		}
		for stmt_id in gen.functions().values().chain(gen.stmts().iter()) {
			visit_stmt_recursive(core, *stmt_id, visitor);
			if visitor.stop() {
				return;
			}
		}
	}
}

fn visit_stmt_recursive<V: Visitor>(core: &ContextCore, id: StmtId, visitor: &mut V) {
	if visitor.stop() {
		return;
	}
	visitor.visit_stmt(core, id);

	match core.get_stmt(id).unwrap().kind() {
		StmtKind::Block { children, .. } => {
			for child in children.clone() {
				visit_stmt_recursive(core, child, visitor);
			}
		},
		StmtKind::If {
			then_body, else_body, ..
		} => {
			visit_stmt_recursive(core, *then_body, visitor);
			visit_stmt_recursive(core, *else_body, visitor);
		},
		StmtKind::Switch { cases, .. } => {
			for case in cases.clone() {
				visit_stmt_recursive(core, case.body, visitor);
			}
		},
		_ => {},
	}
}

/// Collects every statement of a generator (top-level and functions),
/// pre-order
pub fn collect_stmts(core: &ContextCore, gen: GeneratorId) -> Vec<StmtId> {
	struct Collector {
		target: GeneratorId,
		current: GeneratorId,
		stmts: Vec<StmtId>,
	}
	impl Visitor for Collector {
		fn visit_generator(&mut self, _core: &ContextCore, gen: GeneratorId) {
			self.current = gen;
		}
		fn visit_stmt(&mut self, _core: &ContextCore, stmt: StmtId) {
			if self.current == self.target {
				self.stmts.push(stmt);
			}
		}
	}

	let mut c = Collector {
		target: gen,
		current: gen,
		stmts: vec![],
	};
	visit_generator_tree(core, gen, &mut c);
	c.stmts
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::{Context, DesignError, EdgeKind, PortDirection, PortType};

	#[test]
	fn test_preorder_traversal() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut top = c.new_generator("top")?;
		let mut child = c.new_generator("child")?;
		let _p = child.port("x", 1, PortDirection::In, PortType::Data, false)?;
		top.add_child("u0", &child)?;

		let clk = top.port("clk", 1, PortDirection::In, PortType::Clock, false)?;
		let a = top.var("a", 1, false)?;
		let seq = top.seq_block(vec![(EdgeKind::Posedge, clk.id())])?;
		let iff = seq.if_stmt(&a)?;
		iff.then_block().assign(&a, &clk)?;

		struct Counter {
			generators: usize,
			stmts: usize,
			vars: usize,
		}
		impl Visitor for Counter {
			fn visit_generator(&mut self, _core: &ContextCore, _gen: GeneratorId) {
				self.generators += 1;
			}
			fn visit_stmt(&mut self, _core: &ContextCore, _stmt: StmtId) {
				self.stmts += 1;
			}
			fn visit_var(&mut self, _core: &ContextCore, _var: VarId) {
				self.vars += 1;
			}
		}

		let mut counter = Counter {
			generators: 0,
			stmts: 0,
			vars: 0,
		};
		let handle = c.handle();
		let core = handle.read().unwrap();
		visit_generator_tree(&core, top.id(), &mut counter);

		assert_eq!(counter.generators, 2);
		// seq block + if + two scoped bodies + assignment
		assert_eq!(counter.stmts, 5);
		assert_eq!(counter.vars, 3);
		Ok(())
	}

	#[test]
	fn test_early_termination() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut top = c.new_generator("top")?;
		for i in 0..4 {
			top.var(&format!("v{}", i), 1, false)?;
		}

		struct StopAfterTwo {
			vars: usize,
		}
		impl Visitor for StopAfterTwo {
			fn visit_var(&mut self, _core: &ContextCore, _var: VarId) {
				self.vars += 1;
			}
			fn stop(&self) -> bool {
				self.vars >= 2
			}
		}

		let mut v = StopAfterTwo { vars: 0 };
		let handle = c.handle();
		let core = handle.read().unwrap();
		visit_generator_tree(&core, top.id(), &mut v);
		assert_eq!(v.vars, 2);
		Ok(())
	}
}
