use super::{ContextCore, ContextHandle, DesignError, GeneratorId, HasComment, StmtId, VarHandle, VarId, VarKind};

/// RTL assignment semantics. `Undefined` is resolved by the
/// assignment-type inference pass.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AssignmentType {
	Blocking,
	NonBlocking,
	Undefined,
}

impl AssignmentType {
	pub fn to_str(&self) -> &'static str {
		match self {
			AssignmentType::Blocking => "blocking",
			AssignmentType::NonBlocking => "non-blocking",
			AssignmentType::Undefined => "undefined",
		}
	}
}

/// Clock edge selector in a sensitivity list
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeKind {
	Posedge,
	Negedge,
}

impl EdgeKind {
	pub fn to_str(&self) -> &'static str {
		match self {
			EdgeKind::Posedge => "posedge",
			EdgeKind::Negedge => "negedge",
		}
	}
}

/// Classification of a statement block, without payload
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockType {
	Sequential,
	Combinational,
	Scope,
	Function,
	Initial,
}

/// Typed payload of a statement block
#[derive(Clone, Debug)]
pub enum BlockKind {
	Sequential { sensitivity: Vec<(EdgeKind, VarId)> },
	Combinational,
	Scope,
	Function { name: String, ports: Vec<VarId>, has_return: bool },
	Initial,
}

impl BlockKind {
	pub fn block_type(&self) -> BlockType {
		match self {
			BlockKind::Sequential { .. } => BlockType::Sequential,
			BlockKind::Combinational => BlockType::Combinational,
			BlockKind::Scope => BlockType::Scope,
			BlockKind::Function { .. } => BlockType::Function,
			BlockKind::Initial => BlockType::Initial,
		}
	}
}

/// One arm of a switch statement. `cond = None` is the default arm.
#[derive(Clone, Debug)]
pub struct SwitchCase {
	pub cond: Option<VarId>,
	pub body: StmtId,
}

/// Owner of a statement
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StmtParent {
	None,
	Generator(GeneratorId),
	Stmt(StmtId),
}

/// Variant payload of a statement node
#[derive(Clone, Debug)]
pub enum StmtKind {
	Assign {
		left: VarId,
		right: VarId,
		assign_type: AssignmentType,
	},
	Block {
		kind: BlockKind,
		children: Vec<StmtId>,
		label: Option<String>,
	},
	If {
		predicate: VarId,
		then_body: StmtId,
		else_body: StmtId,
	},
	Switch {
		target: VarId,
		cases: Vec<SwitchCase>,
	},
	ModuleInstantiation {
		target: GeneratorId,
		port_mapping: Vec<(VarId, VarId)>,
	},
	InterfaceInstantiation {
		interface: String,
	},
	FunctionCall {
		function: String,
		args: Vec<VarId>,
	},
	Return {
		value: VarId,
	},
	Assert {
		value: VarId,
		else_stmt: Option<StmtId>,
	},
	Comment {
		lines: Vec<String>,
	},
	RawString {
		lines: Vec<String>,
	},
}

/// A statement node
#[derive(Clone, Debug)]
pub struct Stmt {
	/// Self-reference
	pub(crate) id: StmtId,

	/// Owning block or generator
	pub(crate) parent: StmtParent,

	/// Variant payload
	pub(crate) kind: StmtKind,

	/// Source-code comment
	pub comment: Option<String>,

	/// Line number in the emitted output (when the generator has debug on)
	pub verilog_ln: u32,
}

impl Stmt {
	pub(crate) fn new(kind: StmtKind) -> Self {
		Self {
			id: StmtId { id: 0 },
			parent: StmtParent::None,
			kind,
			comment: None,
			verilog_ln: 0,
		}
	}

	pub fn id(&self) -> StmtId {
		self.id
	}

	pub fn kind(&self) -> &StmtKind {
		&self.kind
	}

	pub fn parent(&self) -> StmtParent {
		self.parent
	}

	pub fn assign_type(&self) -> Option<AssignmentType> {
		match self.kind {
			StmtKind::Assign { assign_type, .. } => Some(assign_type),
			_ => None,
		}
	}

	pub fn block_type(&self) -> Option<BlockType> {
		match &self.kind {
			StmtKind::Block { kind, .. } => Some(kind.block_type()),
			_ => None,
		}
	}

	pub fn block_children(&self) -> Option<&Vec<StmtId>> {
		match &self.kind {
			StmtKind::Block { children, .. } => Some(children),
			_ => None,
		}
	}
}

impl HasComment for Stmt {
	fn get_comment(&self) -> Option<String> {
		self.comment.clone()
	}
}

impl ContextCore {
	/// Creates or reuses an assignment `left <- right`.
	///
	/// Assignment is idempotent by equality: a structurally equal statement
	/// already registered on the source is returned instead of a new one,
	/// upgrading an `Undefined` type to the requested concrete type.
	/// A concrete-type disagreement with the existing statement fails.
	pub(crate) fn make_assign(
		&mut self,
		left: VarId,
		right: VarId,
		assign_type: AssignmentType,
	) -> Result<StmtId, DesignError> {
		let dst = self
			.get_var(left)
			.ok_or_else(|| DesignError::Internal("dangling variable id".into()))?;
		if !dst.is_assignable() {
			return Err(DesignError::NotAssignable(left));
		}
		let src = self
			.get_var(right)
			.ok_or_else(|| DesignError::Internal("dangling variable id".into()))?;
		if dst.width != src.width {
			return Err(DesignError::WidthMismatch {
				left,
				right,
				left_width: dst.width,
				right_width: src.width,
			});
		}

		// reuse a structurally equal assignment if one exists
		let existing = self
			.sink_set_of(right)
			.iter()
			.copied()
			.find(|sid| match self.get_stmt(*sid).unwrap().kind {
				StmtKind::Assign { left: l, right: r, .. } => l == left && r == right,
				_ => false,
			});
		if let Some(sid) = existing {
			let current = self.get_stmt(sid).unwrap().assign_type().unwrap();
			match (current, assign_type) {
				(_, AssignmentType::Undefined) => {},
				(AssignmentType::Undefined, requested) => {
					if let StmtKind::Assign { assign_type: t, .. } = &mut self.get_stmt_mut(sid).unwrap().kind {
						*t = requested;
					}
				},
				(have, requested) if have != requested => {
					return Err(DesignError::AssignTypeMismatch { var: left, stmt: sid });
				},
				_ => {},
			}
			return Ok(sid);
		}

		let id = self.alloc_stmt(Stmt::new(StmtKind::Assign {
			left,
			right,
			assign_type,
		}));
		self.add_sink(right, id);
		self.get_var_mut(left).unwrap().sources.insert(id);
		Ok(id)
	}

	/// Removes a statement's sink registration, undoing `add_sink`
	fn remove_sink(&mut self, var: VarId, stmt: StmtId) {
		let target = match self.get_var(var).unwrap().kind {
			VarKind::SignedView { parent } => parent,
			_ => var,
		};
		self.get_var_mut(target).unwrap().sinks.shift_remove(&stmt);
	}

	/// Unlinks a statement from its parent block and, for assignments,
	/// from the driver graph of its operands.
	pub(crate) fn remove_stmt(&mut self, id: StmtId) {
		let stmt = match self.get_stmt(id) {
			Some(s) => s,
			None => return,
		};
		let parent = stmt.parent;
		if let StmtKind::Assign { left, right, .. } = stmt.kind {
			self.get_var_mut(left).unwrap().sources.shift_remove(&id);
			self.remove_sink(right, id);
		}

		match parent {
			StmtParent::Generator(gid) => {
				let gen = self.get_generator_mut(gid).unwrap();
				gen.stmts.retain(|s| *s != id);
			},
			StmtParent::Stmt(pid) => {
				if let StmtKind::Block { children, .. } = &mut self.get_stmt_mut(pid).unwrap().kind {
					children.retain(|s| *s != id);
				}
			},
			StmtParent::None => {},
		}
		self.get_stmt_mut(id).unwrap().parent = StmtParent::None;
	}

	/// Appends a statement to a block. A statement has at most one parent;
	/// double-parenting is a hard error.
	pub(crate) fn add_stmt_to_block(&mut self, block: StmtId, child: StmtId) -> Result<(), DesignError> {
		let c = self
			.get_stmt(child)
			.ok_or_else(|| DesignError::Internal("dangling statement id".into()))?;
		if c.parent != StmtParent::None {
			return Err(DesignError::StmtAlreadyOwned(child));
		}
		let is_return = matches!(c.kind, StmtKind::Return { .. });

		match &mut self.get_stmt_mut(block).unwrap().kind {
			StmtKind::Block { children, kind, .. } => {
				children.push(child);
				if is_return {
					if let BlockKind::Function { has_return, .. } = kind {
						*has_return = true;
					}
				}
			},
			_ => return Err(DesignError::Internal("parent is not a block".into())),
		}
		self.get_stmt_mut(child).unwrap().parent = StmtParent::Stmt(block);
		Ok(())
	}

	/// Inserts a statement into a block before the given sibling
	pub(crate) fn insert_stmt_before(&mut self, block: StmtId, child: StmtId, before: StmtId) -> Result<(), DesignError> {
		self.add_stmt_to_block(block, child)?;
		if let StmtKind::Block { children, .. } = &mut self.get_stmt_mut(block).unwrap().kind {
			children.pop();
			let pos = children.iter().position(|s| *s == before).unwrap_or(children.len());
			children.insert(pos, child);
		}
		Ok(())
	}

	/// Appends a top-level statement to a generator
	pub(crate) fn add_stmt_to_generator(&mut self, gen: GeneratorId, stmt: StmtId) -> Result<(), DesignError> {
		let s = self
			.get_stmt(stmt)
			.ok_or_else(|| DesignError::Internal("dangling statement id".into()))?;
		if s.parent != StmtParent::None {
			return Err(DesignError::StmtAlreadyOwned(stmt));
		}
		self.get_stmt_mut(stmt).unwrap().parent = StmtParent::Generator(gen);
		self.get_generator_mut(gen).unwrap().stmts.push(stmt);
		Ok(())
	}

	/// The generator a statement ultimately belongs to
	pub fn stmt_generator(&self, id: StmtId) -> Option<GeneratorId> {
		let mut current = id;
		loop {
			match self.get_stmt(current)?.parent {
				StmtParent::Generator(g) => return Some(g),
				StmtParent::Stmt(p) => current = p,
				StmtParent::None => return None,
			}
		}
	}

	/// The nearest enclosing process block type, looking through scopes.
	/// `None` for top-level statements.
	pub fn enclosing_process(&self, id: StmtId) -> Option<BlockType> {
		let mut current = id;
		loop {
			match self.get_stmt(current)?.parent {
				StmtParent::Generator(_) | StmtParent::None => return None,
				StmtParent::Stmt(p) => {
					match self.get_stmt(p)?.block_type() {
						Some(BlockType::Scope) | None => current = p,
						Some(t) => return Some(t),
					}
				},
			}
		}
	}

	pub(crate) fn make_block(&mut self, kind: BlockKind) -> Result<StmtId, DesignError> {
		if let BlockKind::Sequential { sensitivity } = &kind {
			if sensitivity.is_empty() {
				return Err(DesignError::EmptySensitivityList);
			}
		}
		Ok(self.alloc_stmt(Stmt::new(StmtKind::Block {
			kind,
			children: vec![],
			label: None,
		})))
	}

	pub(crate) fn make_if(&mut self, predicate: VarId) -> Result<StmtId, DesignError> {
		let then_body = self.make_block(BlockKind::Scope)?;
		let else_body = self.make_block(BlockKind::Scope)?;
		let id = self.alloc_stmt(Stmt::new(StmtKind::If {
			predicate,
			then_body,
			else_body,
		}));
		self.get_stmt_mut(then_body).unwrap().parent = StmtParent::Stmt(id);
		self.get_stmt_mut(else_body).unwrap().parent = StmtParent::Stmt(id);
		Ok(id)
	}

	pub(crate) fn make_switch(&mut self, target: VarId) -> Result<StmtId, DesignError> {
		Ok(self.alloc_stmt(Stmt::new(StmtKind::Switch {
			target,
			cases: vec![],
		})))
	}

	/// Adds a case arm to a switch. `cond = None` is the default arm.
	/// Case constants must share the target's width.
	pub(crate) fn add_switch_case(&mut self, switch: StmtId, cond: Option<VarId>) -> Result<StmtId, DesignError> {
		let target = match self.get_stmt(switch).unwrap().kind {
			StmtKind::Switch { target, .. } => target,
			_ => return Err(DesignError::Internal("not a switch statement".into())),
		};
		if let Some(c) = cond {
			let cv = self
				.get_var(c)
				.ok_or_else(|| DesignError::Internal("dangling variable id".into()))?;
			if !matches!(cv.kind, VarKind::Const { .. }) {
				return Err(DesignError::Internal("switch case condition must be a constant".into()));
			}
			if cv.width != self.get_var(target).unwrap().width {
				return Err(DesignError::CaseWidthMismatch { stmt: switch, var: c });
			}
		}

		let body = self.make_block(BlockKind::Scope)?;
		self.get_stmt_mut(body).unwrap().parent = StmtParent::Stmt(switch);
		if let StmtKind::Switch { cases, .. } = &mut self.get_stmt_mut(switch).unwrap().kind {
			cases.push(SwitchCase { cond, body });
		}
		Ok(body)
	}
}

/// Handle to a statement block
#[derive(Clone)]
pub struct BlockHandle {
	ctx: ContextHandle,
	id: StmtId,
}

impl BlockHandle {
	pub(crate) fn new(ctx: ContextHandle, id: StmtId) -> Self {
		Self { ctx, id }
	}

	pub fn id(&self) -> StmtId {
		self.id
	}

	pub fn ctx(&self) -> ContextHandle {
		self.ctx.clone()
	}

	/// Appends an existing statement to this block
	pub fn add_stmt(&self, stmt: StmtId) -> Result<(), DesignError> {
		self.ctx.write().unwrap().add_stmt_to_block(self.id, stmt)
	}

	/// Creates an assignment in this block; its type is inferred later
	/// from the enclosing process
	pub fn assign(&self, dst: &VarHandle, src: &VarHandle) -> Result<StmtId, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.make_assign(dst.id(), src.id(), AssignmentType::Undefined)?;
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(stmt)
	}

	/// Creates an if statement in this block and returns its handle
	pub fn if_stmt(&self, predicate: &VarHandle) -> Result<IfHandle, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.make_if(predicate.id())?;
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(IfHandle::new(self.ctx.clone(), stmt))
	}

	/// Creates a switch statement in this block and returns its handle
	pub fn switch(&self, target: &VarHandle) -> Result<SwitchHandle, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.make_switch(target.id())?;
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(SwitchHandle::new(self.ctx.clone(), stmt))
	}

	/// Creates a function call statement in this block
	pub fn call(&self, function: &str, args: &[&VarHandle]) -> Result<StmtId, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.alloc_stmt(Stmt::new(StmtKind::FunctionCall {
			function: function.into(),
			args: args.iter().map(|a| a.id()).collect(),
		}));
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(stmt)
	}

	/// Creates a return statement; only meaningful inside function blocks
	pub fn return_stmt(&self, value: &VarHandle) -> Result<StmtId, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.alloc_stmt(Stmt::new(StmtKind::Return { value: value.id() }));
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(stmt)
	}

	/// Creates an assertion statement in this block
	pub fn assert_stmt(&self, value: &VarHandle) -> Result<StmtId, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.alloc_stmt(Stmt::new(StmtKind::Assert {
			value: value.id(),
			else_stmt: None,
		}));
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(stmt)
	}

	/// Creates a comment statement in this block
	pub fn comment_stmt(&self, text: &str) -> Result<StmtId, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.alloc_stmt(Stmt::new(StmtKind::Comment {
			lines: text.lines().map(String::from).collect(),
		}));
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(stmt)
	}

	/// Creates a raw string statement emitted verbatim
	pub fn raw_stmt(&self, text: &str) -> Result<StmtId, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.alloc_stmt(Stmt::new(StmtKind::RawString {
			lines: text.lines().map(String::from).collect(),
		}));
		core.add_stmt_to_block(self.id, stmt)?;
		Ok(stmt)
	}

	/// Labels this block; the label is emitted with begin/end and must be
	/// unique within the owning generator
	pub fn label(&self, name: &str) -> Result<(), DesignError> {
		let mut core = self.ctx.write().unwrap();
		if !super::utils::is_name_valid(name) {
			return Err(DesignError::InvalidName(name.into()));
		}
		let gen = core
			.stmt_generator(self.id)
			.ok_or_else(|| DesignError::Internal("cannot label an unparented block".into()))?;
		if let StmtKind::Block { label, .. } = &mut core.get_stmt_mut(self.id).unwrap().kind {
			*label = Some(name.into());
		}
		core.get_generator_mut(gen).unwrap().named_blocks.insert(name.into(), self.id);
		Ok(())
	}

	pub fn set_comment(&self, comment: &str) {
		self.ctx.write().unwrap().get_stmt_mut(self.id).unwrap().comment = Some(comment.into());
	}
}

/// Handle to an if statement and its two scoped bodies
#[derive(Clone)]
pub struct IfHandle {
	ctx: ContextHandle,
	id: StmtId,
}

impl IfHandle {
	pub(crate) fn new(ctx: ContextHandle, id: StmtId) -> Self {
		Self { ctx, id }
	}

	pub fn id(&self) -> StmtId {
		self.id
	}

	pub fn then_block(&self) -> BlockHandle {
		match self.ctx.read().unwrap().get_stmt(self.id).unwrap().kind {
			StmtKind::If { then_body, .. } => BlockHandle::new(self.ctx.clone(), then_body),
			_ => unreachable!(),
		}
	}

	pub fn else_block(&self) -> BlockHandle {
		match self.ctx.read().unwrap().get_stmt(self.id).unwrap().kind {
			StmtKind::If { else_body, .. } => BlockHandle::new(self.ctx.clone(), else_body),
			_ => unreachable!(),
		}
	}
}

/// Handle to a switch statement
#[derive(Clone)]
pub struct SwitchHandle {
	ctx: ContextHandle,
	id: StmtId,
}

impl SwitchHandle {
	pub(crate) fn new(ctx: ContextHandle, id: StmtId) -> Self {
		Self { ctx, id }
	}

	pub fn id(&self) -> StmtId {
		self.id
	}

	/// Adds a case arm; `None` adds the default arm
	pub fn case(&self, cond: Option<&VarHandle>) -> Result<BlockHandle, DesignError> {
		let body = self
			.ctx
			.write()
			.unwrap()
			.add_switch_case(self.id, cond.map(|c| c.id()))?;
		Ok(BlockHandle::new(self.ctx.clone(), body))
	}
}

impl VarHandle {
	/// Assigns `src` to this variable with an undefined assignment type
	pub fn assign(&self, src: &VarHandle) -> Result<StmtId, DesignError> {
		self.assign_typed(src, AssignmentType::Undefined)
	}

	/// Assigns `src` to this variable with an explicit assignment type
	pub fn assign_typed(&self, src: &VarHandle, assign_type: AssignmentType) -> Result<StmtId, DesignError> {
		self.ctx().write().unwrap().make_assign(self.id(), src.id(), assign_type)
	}

	/// Removes the assignment `self <- src` if one exists. Resolved through
	/// the driver graph; never creates a statement.
	pub fn unassign(&self, src: &VarHandle) -> Option<StmtId> {
		let ctx = self.ctx();
		let mut core = ctx.write().unwrap();
		let found = core
			.get_var(self.id())
			.unwrap()
			.sources
			.iter()
			.copied()
			.find(|sid| match core.get_stmt(*sid).unwrap().kind {
				StmtKind::Assign { right, .. } => right == src.id(),
				_ => false,
			});
		if let Some(sid) = found {
			core.remove_stmt(sid);
		}
		found
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::{Context, PortDirection, PortType};

	#[test]
	fn test_assign_dedup_and_upgrade() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let b = m.var("b", 8, false)?;

		let s1 = a.assign(&b)?;
		let s2 = a.assign(&b)?;
		assert_eq!(s1, s2);

		// upgrade from undefined to a concrete type
		let s3 = a.assign_typed(&b, AssignmentType::Blocking)?;
		assert_eq!(s1, s3);
		{
			let core = c.handle();
			let core = core.read().unwrap();
			assert_eq!(
				core.get_stmt(s1).unwrap().assign_type(),
				Some(AssignmentType::Blocking)
			);
		}

		// conflicting concrete type is rejected
		let err = a.assign_typed(&b, AssignmentType::NonBlocking);
		assert!(matches!(err, Err(DesignError::AssignTypeMismatch { .. })));
		Ok(())
	}

	#[test]
	fn test_driver_graph_registration() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let b = m.var("b", 8, false)?;

		let stmt = a.assign(&b)?;
		let core = c.handle();
		let core = core.read().unwrap();
		assert!(core.get_var(a.id()).unwrap().sources().contains(&stmt));
		assert!(core.get_var(b.id()).unwrap().sinks().contains(&stmt));
		Ok(())
	}

	#[test]
	fn test_not_assignable() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let b = m.var("b", 8, false)?;
		let k = m.constant(1, 8, false)?;
		let e = a.add(&b)?;
		let sv = a.signed_view()?;

		assert!(matches!(k.assign(&a), Err(DesignError::NotAssignable(..))));
		assert!(matches!(e.assign(&a), Err(DesignError::NotAssignable(..))));
		assert!(matches!(sv.assign(&b), Err(DesignError::NotAssignable(..))));
		Ok(())
	}

	#[test]
	fn test_signed_view_sink_forwarding() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let d = m.var("d", 8, true)?;

		let sv = a.signed_view()?;
		let stmt = d.assign(&sv)?;

		let core = c.handle();
		let core = core.read().unwrap();
		// the sink lands on the parent, not the view
		assert!(core.get_var(a.id()).unwrap().sinks().contains(&stmt));
		assert!(core.get_var(sv.id()).unwrap().sinks().is_empty());
		Ok(())
	}

	#[test]
	fn test_unassign() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let b = m.var("b", 8, false)?;

		let stmt = a.assign(&b)?;
		m.add_stmt(stmt)?;

		assert_eq!(a.unassign(&b), Some(stmt));
		{
			let core = c.handle();
			let core = core.read().unwrap();
			assert!(core.get_var(a.id()).unwrap().sources().is_empty());
			assert!(core.get_var(b.id()).unwrap().sinks().is_empty());
			assert!(core.get_generator(m.id()).unwrap().stmts().is_empty());
		}

		// no side effects when no such assignment exists
		assert_eq!(a.unassign(&b), None);
		Ok(())
	}

	#[test]
	fn test_double_parenting() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let b = m.var("b", 8, false)?;

		let blk = m.comb_block()?;
		let stmt = blk.assign(&a, &b)?;
		let blk2 = m.comb_block()?;
		assert!(matches!(blk2.add_stmt(stmt), Err(DesignError::StmtAlreadyOwned(..))));
		Ok(())
	}

	#[test]
	fn test_switch_case_width() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let sel = m.port("sel", 2, PortDirection::In, PortType::Data, false)?;
		let blk = m.comb_block()?;
		let sw = blk.switch(&sel)?;

		let k0 = m.constant(0, 2, false)?;
		sw.case(Some(&k0))?;
		let bad = m.constant(1, 3, false)?;
		assert!(matches!(
			sw.case(Some(&bad)),
			Err(DesignError::CaseWidthMismatch { .. })
		));
		sw.case(None)?;
		Ok(())
	}

	#[test]
	fn test_empty_sensitivity_list() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		assert!(matches!(m.seq_block(vec![]), Err(DesignError::EmptySensitivityList)));
		Ok(())
	}

	#[test]
	fn test_enclosing_process_through_scopes() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let clk = m.port("clk", 1, PortDirection::In, PortType::Clock, false)?;
		let a = m.var("a", 1, false)?;

		let seq = m.seq_block(vec![(EdgeKind::Posedge, clk.id())])?;
		let if_stmt = seq.if_stmt(&a)?;
		let stmt = if_stmt.then_block().assign(&a, &clk)?;

		let core = c.handle();
		let core = core.read().unwrap();
		assert_eq!(core.enclosing_process(stmt), Some(BlockType::Sequential));
		assert_eq!(core.stmt_generator(stmt), Some(m.id()));
		Ok(())
	}
}
