pub mod generator;
pub mod interface;
pub mod stmt;
pub mod utils;
pub mod var;

pub use generator::{EnumDef, FunctionHandle, Generator, GeneratorHandle};
pub use interface::{InterfaceDef, InterfacePort, InterfaceRef};
pub use stmt::{
	AssignmentType, BlockHandle, BlockKind, BlockType, EdgeKind, IfHandle, Stmt, StmtKind, StmtParent, SwitchCase,
	SwitchHandle,
};
pub use var::{ExprOp, PortDirection, PortType, Var, VarHandle, VarKind};

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use thiserror::Error;

/// References a generator in a context
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct GeneratorId {
	pub(crate) id: usize,
}

impl GeneratorId {
	/// Checks if the reference is valid
	pub fn is_null(&self) -> bool {
		self.id == 0
	}
}

/// References a variable in a context
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct VarId {
	pub(crate) id: usize,
}

impl VarId {
	/// Checks if the reference is valid
	pub fn is_null(&self) -> bool {
		self.id == 0
	}
}

/// References a statement in a context
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct StmtId {
	pub(crate) id: usize,
}

impl StmtId {
	/// Checks if the reference is valid
	pub fn is_null(&self) -> bool {
		self.id == 0
	}
}

/// Objects which may carry a source-level comment
pub trait HasComment {
	fn get_comment(&self) -> Option<String>;
}

/// Key for the canonical constant pool: (generator, value, width, signedness)
type ConstKey = (GeneratorId, i64, u32, bool);

/// Core part of the design representation. All generators, variables and
/// statements live in the arenas owned here. Referred to via handles with
/// reference counting; passes running on the worker pool share it through
/// the coarse lock.
pub struct ContextCore {
	pub(crate) weak: WeakContextHandle,
	pub(crate) generators: Vec<Generator>,
	pub(crate) vars: Vec<Var>,
	pub(crate) stmts: Vec<Stmt>,
	pub(crate) const_pool: HashMap<ConstKey, VarId>,
	pub(crate) generator_names: IndexMap<String, Vec<GeneratorId>>,
}

impl ContextCore {
	fn new() -> Self {
		Self {
			weak: WeakContextHandle::new(),
			generators: Vec::new(),
			vars: Vec::new(),
			stmts: Vec::new(),
			const_pool: HashMap::new(),
			generator_names: IndexMap::new(),
		}
	}

	/// Adds a variable to the arena and hands back its ID
	pub(crate) fn alloc_var(&mut self, mut var: Var) -> VarId {
		let id = VarId {
			id: self.vars.len() + 1,
		};
		var.id = id;
		self.vars.push(var);
		id
	}

	/// Adds a statement to the arena and hands back its ID
	pub(crate) fn alloc_stmt(&mut self, mut stmt: Stmt) -> StmtId {
		let id = StmtId {
			id: self.stmts.len() + 1,
		};
		stmt.id = id;
		self.stmts.push(stmt);
		id
	}

	pub fn get_var(&self, id: VarId) -> Option<&Var> {
		self.vars.get(id.id.wrapping_sub(1))
	}

	pub fn get_var_mut(&mut self, id: VarId) -> Option<&mut Var> {
		self.vars.get_mut(id.id.wrapping_sub(1))
	}

	pub fn get_stmt(&self, id: StmtId) -> Option<&Stmt> {
		self.stmts.get(id.id.wrapping_sub(1))
	}

	pub fn get_stmt_mut(&mut self, id: StmtId) -> Option<&mut Stmt> {
		self.stmts.get_mut(id.id.wrapping_sub(1))
	}

	pub fn get_generator(&self, id: GeneratorId) -> Option<&Generator> {
		self.generators.get(id.id.wrapping_sub(1))
	}

	pub fn get_generator_mut(&mut self, id: GeneratorId) -> Option<&mut Generator> {
		self.generators.get_mut(id.id.wrapping_sub(1))
	}

	pub fn get_generator_handle(&self, id: GeneratorId) -> Option<GeneratorHandle> {
		Some(GeneratorHandle::new(self.weak.upgrade()?, id))
	}

	pub fn get_var_handle(&self, id: VarId) -> Option<VarHandle> {
		Some(VarHandle::new(self.weak.upgrade()?, id))
	}

	/// Creates a new generator in the context
	pub fn new_generator(&mut self, name: &str) -> Result<GeneratorId, DesignError> {
		if !utils::is_name_valid(name) {
			return Err(DesignError::InvalidName(name.into()));
		}

		let id = GeneratorId {
			id: self.generators.len() + 1,
		};
		let gen = Generator::new(id, name);
		self.generators.push(gen);
		self.generator_names.entry(name.into()).or_default().push(id);
		Ok(id)
	}

	/// All generators registered under the given type name, in creation
	/// order
	pub fn generators_by_name(&self, name: &str) -> Vec<GeneratorId> {
		self.generator_names.get(name).cloned().unwrap_or_default()
	}

	/// All generators reachable from the given root, root first,
	/// children in insertion order
	pub fn generator_tree(&self, top: GeneratorId) -> Vec<GeneratorId> {
		let mut order = vec![];
		let mut pending = vec![top];
		while let Some(id) = pending.pop() {
			order.push(id);
			let gen = self.get_generator(id).unwrap();
			for child in gen.children.values().rev() {
				pending.push(*child);
			}
		}
		order
	}
}

/// Weak reference to a context
pub type WeakContextHandle = Weak<RwLock<ContextCore>>;

/// Strong reference to a context
pub type ContextHandle = Arc<RwLock<ContextCore>>;

/// Process-wide compilation state. Constructed once per compilation;
/// every factory receives a handle to it.
pub struct Context {
	handle: ContextHandle,
}

impl Context {
	/// Creates a new empty context
	pub fn new() -> Self {
		let c = Self {
			handle: Arc::new(RwLock::new(ContextCore::new())),
		};

		c.handle.write().unwrap().weak = Arc::downgrade(&c.handle);
		c
	}

	pub fn handle(&self) -> ContextHandle {
		self.handle.clone()
	}

	/// Creates a new generator and returns a handle to it
	pub fn new_generator(&mut self, name: &str) -> Result<GeneratorHandle, DesignError> {
		let id = self.handle.write().unwrap().new_generator(name)?;
		Ok(GeneratorHandle::new(self.handle.clone(), id))
	}

	pub fn get_generator_handle(&self, id: GeneratorId) -> Option<GeneratorHandle> {
		self.handle.read().unwrap().get_generator_handle(id)
	}

	/// Registers an externally implemented module by its port list.
	/// External modules take part in hierarchy and wiring but are never
	/// emitted; extracting the port list from foreign source text is the
	/// caller's concern.
	pub fn external_module(
		&mut self,
		name: &str,
		ports: Vec<(String, u32, PortDirection, PortType, bool)>,
	) -> Result<GeneratorHandle, DesignError> {
		let mut gen = self.new_generator(name)?;
		for (port_name, width, direction, port_type, is_signed) in ports {
			gen.port(&port_name, width, direction, port_type, is_signed)?;
		}
		self.handle.write().unwrap().get_generator_mut(gen.id()).unwrap().external = true;
		Ok(gen)
	}
}

impl Default for Context {
	fn default() -> Self {
		Self::new()
	}
}

/// Represents an error that can occur during design construction.
/// Pass and code generation errors are not accounted for here.
#[derive(Clone, Debug, Error)]
pub enum DesignError {
	#[error("no variable named '{name}' in this generator")]
	NameNotFound { generator: GeneratorId, name: String },

	#[error("operands belong to different generators")]
	CrossGenerator { left: VarId, right: VarId },

	#[error("operand widths disagree ({left_width} vs {right_width})")]
	WidthMismatch {
		left: VarId,
		right: VarId,
		left_width: u32,
		right_width: u32,
	},

	#[error("slice [{high}:{low}] is out of range for width {width}")]
	SliceOutOfRange {
		var: VarId,
		high: u32,
		low: u32,
		width: u32,
	},

	#[error("value {value} does not fit in {width} bits")]
	OutOfRange { value: i64, width: u32, is_signed: bool },

	#[error("variable is not a legal assignment destination")]
	NotAssignable(VarId),

	#[error("conflicting assignment types on the same destination")]
	AssignTypeMismatch { var: VarId, stmt: StmtId },

	#[error("cannot move sources/sinks of a non-base variable")]
	NotReparentable(VarId),

	#[error("invalid name '{0}'")]
	InvalidName(String),

	#[error("name '{name}' already declared in this generator")]
	NameConflict { generator: GeneratorId, name: String },

	#[error("statement already has a parent")]
	StmtAlreadyOwned(StmtId),

	#[error("instance name '{0}' already used in this generator")]
	DuplicateInstance(String),

	#[error("sequential block requires a non-empty sensitivity list")]
	EmptySensitivityList,

	#[error("invalid width {0}")]
	InvalidWidth(u32),

	#[error("switch case constant width does not match previous cases")]
	CaseWidthMismatch { stmt: StmtId, var: VarId },

	#[error("compiler invariant violated: {0}")]
	Internal(String),
}
