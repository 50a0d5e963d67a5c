use super::interface::{InterfaceDef, InterfaceRef};
use super::stmt::{BlockHandle, BlockKind, EdgeKind, Stmt, StmtKind};
use super::var::{PortDirection, PortType, Var, VarHandle, VarKind};
use super::{utils, ContextCore, ContextHandle, DesignError, GeneratorId, HasComment, StmtId, VarId};
use indexmap::IndexMap;

/// An enumeration definition owned by a generator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumDef {
	pub name: String,
	pub width: u32,
	pub values: IndexMap<String, i64>,
}

/// A parameterizable module definition: namespace authority for its
/// ports, variables and parameters, registry of top-level statements and
/// named child generators.
#[derive(Clone, Debug)]
pub struct Generator {
	/// Self-reference
	pub(crate) id: GeneratorId,

	/// Module type name
	pub name: String,

	/// Instance name within the parent generator
	pub instance_name: String,

	/// All named variables (ports, vars, params) keyed by name
	pub(crate) vars: IndexMap<String, VarId>,

	/// Port names, in declaration order
	pub(crate) ports: Vec<String>,

	/// Parameters keyed by name
	pub(crate) params: IndexMap<String, VarId>,

	/// Top-level statements, in insertion order
	pub(crate) stmts: Vec<StmtId>,

	/// Child generators keyed by instance name
	pub(crate) children: IndexMap<String, GeneratorId>,

	/// Function blocks keyed by function name
	pub(crate) functions: IndexMap<String, StmtId>,

	/// Enum definitions keyed by name
	pub(crate) enums: IndexMap<String, EnumDef>,

	/// Interface instances keyed by instance name
	pub(crate) interfaces: IndexMap<String, InterfaceRef>,

	/// Labeled blocks keyed by label
	pub(crate) named_blocks: IndexMap<String, StmtId>,

	/// Header file included before the module definition
	pub header_include: Option<String>,

	/// Package imported before the module definition
	pub package_import: Option<String>,

	/// Track emitted line numbers for the debug database
	pub debug: bool,

	/// External modules are not emitted
	pub external: bool,

	/// Stub modules emit ports and zero-drives only
	pub is_stub: bool,

	/// Structural fingerprint, filled in by the hashing pass
	pub(crate) structural_hash: Option<u64>,

	/// Source-code comment
	pub comment: Option<String>,

	/// Line number in the emitted output
	pub verilog_ln: u32,
}

impl Generator {
	pub(crate) fn new(id: GeneratorId, name: &str) -> Self {
		Self {
			id,
			name: name.into(),
			instance_name: name.into(),
			vars: IndexMap::new(),
			ports: Vec::new(),
			params: IndexMap::new(),
			stmts: Vec::new(),
			children: IndexMap::new(),
			functions: IndexMap::new(),
			enums: IndexMap::new(),
			interfaces: IndexMap::new(),
			named_blocks: IndexMap::new(),
			header_include: None,
			package_import: None,
			debug: false,
			external: false,
			is_stub: false,
			structural_hash: None,
			comment: None,
			verilog_ln: 0,
		}
	}

	pub fn id(&self) -> GeneratorId {
		self.id
	}

	pub fn stmts(&self) -> &Vec<StmtId> {
		&self.stmts
	}

	pub fn vars(&self) -> &IndexMap<String, VarId> {
		&self.vars
	}

	pub fn params(&self) -> &IndexMap<String, VarId> {
		&self.params
	}

	pub fn children(&self) -> &IndexMap<String, GeneratorId> {
		&self.children
	}

	pub fn functions(&self) -> &IndexMap<String, StmtId> {
		&self.functions
	}

	pub fn enums(&self) -> &IndexMap<String, EnumDef> {
		&self.enums
	}

	pub fn port_names(&self) -> &Vec<String> {
		&self.ports
	}

	pub fn structural_hash(&self) -> Option<u64> {
		self.structural_hash
	}
}

impl HasComment for Generator {
	fn get_comment(&self) -> Option<String> {
		self.comment.clone()
	}
}

impl ContextCore {
	/// Registers a named variable in a generator. Name and registration
	/// are atomic so the namespace stays authoritative.
	fn register_named_var(&mut self, gen: GeneratorId, var: Var) -> Result<VarId, DesignError> {
		if !utils::is_name_valid(&var.name) {
			return Err(DesignError::InvalidName(var.name));
		}
		if var.width == 0 {
			return Err(DesignError::InvalidWidth(var.width));
		}
		let g = self
			.get_generator(gen)
			.ok_or_else(|| DesignError::Internal("dangling generator id".into()))?;
		if g.vars.contains_key(&var.name) {
			return Err(DesignError::NameConflict {
				generator: gen,
				name: var.name,
			});
		}

		let name = var.name.clone();
		let is_port = var.is_port();
		let is_param = matches!(var.kind, VarKind::Param { .. });
		let id = self.alloc_var(var);
		let g = self.get_generator_mut(gen).unwrap();
		g.vars.insert(name.clone(), id);
		if is_port {
			g.ports.push(name);
		}
		else if is_param {
			g.params.insert(name, id);
		}
		Ok(id)
	}

	pub(crate) fn make_var(
		&mut self,
		gen: GeneratorId,
		name: &str,
		width: u32,
		is_signed: bool,
	) -> Result<VarId, DesignError> {
		self.register_named_var(gen, Var::new(gen, name, width, is_signed, VarKind::Base))
	}

	pub(crate) fn make_port(
		&mut self,
		gen: GeneratorId,
		name: &str,
		width: u32,
		direction: PortDirection,
		port_type: PortType,
		is_signed: bool,
	) -> Result<VarId, DesignError> {
		self.register_named_var(
			gen,
			Var::new(gen, name, width, is_signed, VarKind::Port { direction, port_type }),
		)
	}

	pub(crate) fn make_param(&mut self, gen: GeneratorId, name: &str, value: i64) -> Result<VarId, DesignError> {
		self.register_named_var(gen, Var::new(gen, name, 32, false, VarKind::Param { value }))
	}

	/// Creates a compiler-generated variable, uniquifying the requested
	/// name with a numeric suffix if it is already taken
	pub(crate) fn make_synthetic_var(
		&mut self,
		gen: GeneratorId,
		base_name: &str,
		width: u32,
		is_signed: bool,
	) -> Result<VarId, DesignError> {
		let taken = |core: &Self, name: &str| core.get_generator(gen).unwrap().vars.contains_key(name);
		let mut name = base_name.to_string();
		let mut suffix = 0;
		while taken(self, &name) {
			name = format!("{}_{}", base_name, suffix);
			suffix += 1;
		}
		let mut var = Var::new(gen, &name, width, is_signed, VarKind::Base);
		var.synthetic = true;
		self.register_named_var(gen, var)
	}

	/// Rewires every driver of `var` to `new_var`, recursing into slices,
	/// then links the two with `var <- new_var` in the parent generator.
	pub(crate) fn move_src_to(
		&mut self,
		var: VarId,
		new_var: VarId,
		parent: GeneratorId,
	) -> Result<(), DesignError> {
		if !self.get_var(var).unwrap().is_reparentable() {
			return Err(DesignError::NotReparentable(var));
		}
		self.move_src_impl(var, new_var)?;
		let stmt = self.make_assign(var, new_var, super::AssignmentType::Undefined)?;
		self.add_stmt_to_generator(parent, stmt)
	}

	fn move_src_impl(&mut self, var: VarId, new_var: VarId) -> Result<(), DesignError> {
		let sources: Vec<StmtId> = self.get_var(var).unwrap().sources.iter().copied().collect();
		for sid in sources {
			match &mut self.get_stmt_mut(sid).unwrap().kind {
				StmtKind::Assign { left, .. } => {
					if *left != var {
						return Err(DesignError::Internal("driver graph out of sync with statement".into()));
					}
					*left = new_var;
				},
				_ => return Err(DesignError::Internal("non-assignment in source set".into())),
			}
			self.get_var_mut(new_var).unwrap().sources.insert(sid);
		}
		self.get_var_mut(var).unwrap().sources.clear();

		let slices: Vec<((u32, u32), VarId)> = self
			.get_var(var)
			.unwrap()
			.slices
			.iter()
			.map(|(k, v)| (*k, *v))
			.collect();
		for ((high, low), slice) in slices {
			let new_slice = self.make_slice(new_var, high, low)?;
			self.move_src_impl(slice, new_slice)?;
		}
		Ok(())
	}

	/// Rewires every consumer of `var` to `new_var`, recursing into slices,
	/// then links the two with `new_var <- var` in the parent generator.
	pub(crate) fn move_sink_to(
		&mut self,
		var: VarId,
		new_var: VarId,
		parent: GeneratorId,
	) -> Result<(), DesignError> {
		if !self.get_var(var).unwrap().is_reparentable() {
			return Err(DesignError::NotReparentable(var));
		}
		self.move_sink_impl(var, new_var)?;
		let stmt = self.make_assign(new_var, var, super::AssignmentType::Undefined)?;
		self.add_stmt_to_generator(parent, stmt)
	}

	fn move_sink_impl(&mut self, var: VarId, new_var: VarId) -> Result<(), DesignError> {
		let sinks: Vec<StmtId> = self.get_var(var).unwrap().sinks.iter().copied().collect();
		for sid in sinks {
			match &mut self.get_stmt_mut(sid).unwrap().kind {
				StmtKind::Assign { right, .. } => {
					if *right != var {
						return Err(DesignError::Internal("driver graph out of sync with statement".into()));
					}
					*right = new_var;
				},
				_ => return Err(DesignError::Internal("non-assignment in sink set".into())),
			}
			self.get_var_mut(new_var).unwrap().sinks.insert(sid);
		}
		self.get_var_mut(var).unwrap().sinks.clear();

		let slices: Vec<((u32, u32), VarId)> = self
			.get_var(var)
			.unwrap()
			.slices
			.iter()
			.map(|(k, v)| (*k, *v))
			.collect();
		for ((high, low), slice) in slices {
			let new_slice = self.make_slice(new_var, high, low)?;
			self.move_sink_impl(slice, new_slice)?;
		}
		Ok(())
	}
}

/// Handle used for manipulating generators outside of the design
#[derive(Clone)]
pub struct GeneratorHandle {
	ctx: ContextHandle,
	id: GeneratorId,
}

macro_rules! this_gen {
	($self:ident) => {
		$self.ctx.write().unwrap().get_generator_mut($self.id).unwrap()
	};
}

impl GeneratorHandle {
	pub(crate) fn new(ctx: ContextHandle, id: GeneratorId) -> Self {
		Self { ctx, id }
	}

	pub fn id(&self) -> GeneratorId {
		self.id
	}

	pub fn ctx(&self) -> ContextHandle {
		self.ctx.clone()
	}

	pub fn name(&self) -> String {
		self.ctx.read().unwrap().get_generator(self.id).unwrap().name.clone()
	}

	pub fn instance_name(&self) -> String {
		self.ctx
			.read()
			.unwrap()
			.get_generator(self.id)
			.unwrap()
			.instance_name
			.clone()
	}

	pub fn set_debug(&mut self, debug: bool) {
		this_gen!(self).debug = debug;
	}

	pub fn set_external(&mut self, external: bool) {
		this_gen!(self).external = external;
	}

	pub fn set_is_stub(&mut self, is_stub: bool) {
		this_gen!(self).is_stub = is_stub;
	}

	pub fn set_comment(&mut self, comment: &str) {
		this_gen!(self).comment = Some(comment.into());
	}

	/// Includes a header file before the emitted module definition
	pub fn set_header_include(&mut self, header: &str) {
		this_gen!(self).header_include = Some(header.into());
	}

	/// Imports a package before the emitted module definition
	pub fn set_package_import(&mut self, package: &str) {
		this_gen!(self).package_import = Some(package.into());
	}

	/// Declares a new variable
	pub fn var(&mut self, name: &str, width: u32, is_signed: bool) -> Result<VarHandle, DesignError> {
		let id = self.ctx.write().unwrap().make_var(self.id, name, width, is_signed)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Declares a new array variable with the given shape
	pub fn var_array(&mut self, name: &str, width: u32, size: Vec<u32>, is_signed: bool) -> Result<VarHandle, DesignError> {
		if size.is_empty() || size.contains(&0) {
			return Err(DesignError::InvalidWidth(0));
		}
		let mut core = self.ctx.write().unwrap();
		let id = core.make_var(self.id, name, width, is_signed)?;
		core.get_var_mut(id).unwrap().size = size;
		drop(core);
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Declares a new port at the generator boundary
	pub fn port(
		&mut self,
		name: &str,
		width: u32,
		direction: PortDirection,
		port_type: PortType,
		is_signed: bool,
	) -> Result<VarHandle, DesignError> {
		let id = self
			.ctx
			.write()
			.unwrap()
			.make_port(self.id, name, width, direction, port_type, is_signed)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Declares a new parameter
	pub fn param(&mut self, name: &str, value: i64) -> Result<VarHandle, DesignError> {
		let id = self.ctx.write().unwrap().make_param(self.id, name, value)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Returns the canonical constant for (value, width, signed)
	pub fn constant(&mut self, value: i64, width: u32, is_signed: bool) -> Result<VarHandle, DesignError> {
		let id = self.ctx.write().unwrap().make_const(self.id, value, width, is_signed)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Looks a variable up by name
	pub fn get_var(&self, name: &str) -> Result<VarHandle, DesignError> {
		let core = self.ctx.read().unwrap();
		let id = core
			.get_generator(self.id)
			.unwrap()
			.vars
			.get(name)
			.copied()
			.ok_or_else(|| DesignError::NameNotFound {
				generator: self.id,
				name: name.into(),
			})?;
		drop(core);
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Declares an enum definition in this generator. Width is derived
	/// from the largest value.
	pub fn add_enum(&mut self, name: &str, values: Vec<(String, i64)>) -> Result<EnumDef, DesignError> {
		if !utils::is_name_valid(name) {
			return Err(DesignError::InvalidName(name.into()));
		}
		let max = values.iter().map(|(_, v)| *v).max().unwrap_or(0);
		let mut width = 1;
		while (1i64 << width) <= max {
			width += 1;
		}
		let def = EnumDef {
			name: name.into(),
			width,
			values: values.into_iter().collect(),
		};
		this_gen!(self).enums.insert(name.into(), def.clone());
		Ok(def)
	}

	/// Declares a variable typed by an enum definition
	pub fn enum_var(&mut self, name: &str, enum_name: &str) -> Result<VarHandle, DesignError> {
		let width = {
			let core = self.ctx.read().unwrap();
			let gen = core.get_generator(self.id).unwrap();
			gen.enums
				.get(enum_name)
				.map(|e| e.width)
				.ok_or_else(|| DesignError::NameNotFound {
					generator: self.id,
					name: enum_name.into(),
				})?
		};
		let var = Var::new(
			self.id,
			name,
			width,
			false,
			VarKind::Enum {
				def: enum_name.into(),
			},
		);
		let id = self.ctx.write().unwrap().register_named_var(self.id, var)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Declares a variable typed by a packed struct definition
	pub fn struct_var(&mut self, name: &str, struct_name: &str, width: u32) -> Result<VarHandle, DesignError> {
		let var = Var::new(
			self.id,
			name,
			width,
			false,
			VarKind::PackedStruct {
				def: struct_name.into(),
			},
		);
		let id = self.ctx.write().unwrap().register_named_var(self.id, var)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Binds an interface instance to this generator
	pub fn add_interface(&mut self, def: InterfaceDef, inst_name: &str) -> Result<(), DesignError> {
		if !utils::is_name_valid(inst_name) {
			return Err(DesignError::InvalidName(inst_name.into()));
		}
		let mut core = self.ctx.write().unwrap();
		if core.get_generator(self.id).unwrap().interfaces.contains_key(inst_name) {
			return Err(DesignError::DuplicateInstance(inst_name.into()));
		}
		let stmt = core.alloc_stmt(Stmt::new(StmtKind::InterfaceInstantiation {
			interface: inst_name.into(),
		}));
		core.add_stmt_to_generator(self.id, stmt)?;
		core.get_generator_mut(self.id).unwrap().interfaces.insert(
			inst_name.into(),
			InterfaceRef {
				inst_name: inst_name.into(),
				def,
			},
		);
		Ok(())
	}

	/// Adds a child generator under the given instance name
	pub fn add_child(&mut self, inst_name: &str, child: &GeneratorHandle) -> Result<(), DesignError> {
		if !utils::is_name_valid(inst_name) {
			return Err(DesignError::InvalidName(inst_name.into()));
		}
		let mut core = self.ctx.write().unwrap();
		let gen = core.get_generator(self.id).unwrap();
		if gen.children.contains_key(inst_name) {
			return Err(DesignError::DuplicateInstance(inst_name.into()));
		}
		core.get_generator_mut(child.id()).unwrap().instance_name = inst_name.into();
		core.get_generator_mut(self.id)
			.unwrap()
			.children
			.insert(inst_name.into(), child.id());
		Ok(())
	}

	/// Retrieves a child generator by instance name
	pub fn child(&self, inst_name: &str) -> Option<GeneratorHandle> {
		let id = self
			.ctx
			.read()
			.unwrap()
			.get_generator(self.id)
			.unwrap()
			.children
			.get(inst_name)
			.copied()?;
		Some(GeneratorHandle::new(self.ctx.clone(), id))
	}

	/// Adds an existing statement at the generator's top level
	pub fn add_stmt(&mut self, stmt: StmtId) -> Result<(), DesignError> {
		self.ctx.write().unwrap().add_stmt_to_generator(self.id, stmt)
	}

	/// Unlinks a statement from this generator and the driver graph
	pub fn remove_stmt(&mut self, stmt: StmtId) {
		self.ctx.write().unwrap().remove_stmt(stmt);
	}

	/// Creates a sequential block sensitive to the given edges
	pub fn seq_block(&mut self, sensitivity: Vec<(EdgeKind, VarId)>) -> Result<BlockHandle, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.make_block(BlockKind::Sequential { sensitivity })?;
		core.add_stmt_to_generator(self.id, stmt)?;
		Ok(BlockHandle::new(self.ctx.clone(), stmt))
	}

	/// Creates a combinational block
	pub fn comb_block(&mut self) -> Result<BlockHandle, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.make_block(BlockKind::Combinational)?;
		core.add_stmt_to_generator(self.id, stmt)?;
		Ok(BlockHandle::new(self.ctx.clone(), stmt))
	}

	/// Creates an initial block
	pub fn initial_block(&mut self) -> Result<BlockHandle, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let stmt = core.make_block(BlockKind::Initial)?;
		core.add_stmt_to_generator(self.id, stmt)?;
		Ok(BlockHandle::new(self.ctx.clone(), stmt))
	}

	/// Creates a function definition block
	pub fn function(&mut self, name: &str) -> Result<FunctionHandle, DesignError> {
		if !utils::is_name_valid(name) {
			return Err(DesignError::InvalidName(name.into()));
		}
		let mut core = self.ctx.write().unwrap();
		if core.get_generator(self.id).unwrap().functions.contains_key(name) {
			return Err(DesignError::DuplicateInstance(name.into()));
		}
		let stmt = core.make_block(BlockKind::Function {
			name: name.into(),
			ports: vec![],
			has_return: false,
		})?;
		core.get_stmt_mut(stmt).unwrap().parent = super::StmtParent::Generator(self.id);
		core.get_generator_mut(self.id).unwrap().functions.insert(name.into(), stmt);
		Ok(FunctionHandle {
			ctx: self.ctx.clone(),
			id: stmt,
			generator: self.id,
		})
	}

	/// Rewires every driver of `var` to `new_var` (slices included) and
	/// links them with an explicit assignment in this generator
	pub fn move_src_to(&mut self, var: &VarHandle, new_var: &VarHandle) -> Result<(), DesignError> {
		self.ctx.write().unwrap().move_src_to(var.id(), new_var.id(), self.id)
	}

	/// Rewires every consumer of `var` to `new_var` (slices included) and
	/// links them with an explicit assignment in this generator
	pub fn move_sink_to(&mut self, var: &VarHandle, new_var: &VarHandle) -> Result<(), DesignError> {
		self.ctx.write().unwrap().move_sink_to(var.id(), new_var.id(), self.id)
	}

	pub fn stmts(&self) -> Vec<StmtId> {
		self.ctx.read().unwrap().get_generator(self.id).unwrap().stmts.clone()
	}
}

impl std::fmt::Debug for GeneratorHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}", self.ctx.read().unwrap().get_generator(self.id).unwrap())
	}
}

/// Handle to a function definition block
#[derive(Clone)]
pub struct FunctionHandle {
	ctx: ContextHandle,
	id: StmtId,
	generator: GeneratorId,
}

impl FunctionHandle {
	pub fn id(&self) -> StmtId {
		self.id
	}

	/// Declares a function input. Inputs live in the generator namespace.
	pub fn input(&mut self, name: &str, width: u32, is_signed: bool) -> Result<VarHandle, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let id = core.make_port(
			self.generator,
			name,
			width,
			PortDirection::In,
			PortType::Data,
			is_signed,
		)?;
		// function inputs are not module ports
		let gen = core.get_generator_mut(self.generator).unwrap();
		gen.ports.retain(|p| p != name);
		if let StmtKind::Block {
			kind: BlockKind::Function { ports, .. },
			..
		} = &mut core.get_stmt_mut(self.id).unwrap().kind
		{
			ports.push(id);
		}
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// The function body block
	pub fn body(&self) -> BlockHandle {
		BlockHandle::new(self.ctx.clone(), self.id)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::{AssignmentType, Context};

	#[test]
	fn test_children() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut parent = c.new_generator("parent")?;
		let child = c.new_generator("child")?;

		parent.add_child("u0", &child)?;
		assert!(parent.child("u0").is_some());
		assert!(parent.child("u1").is_none());
		assert_eq!(parent.child("u0").unwrap().instance_name(), "u0");

		let other = c.new_generator("other")?;
		assert!(matches!(
			parent.add_child("u0", &other),
			Err(DesignError::DuplicateInstance(..))
		));
		Ok(())
	}

	#[test]
	fn test_move_src_to() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let old = m.var("old", 8, false)?;
		let new = m.var("new", 8, false)?;
		let d = m.var("d", 8, false)?;

		let drive = old.assign(&d)?;
		m.add_stmt(drive)?;

		m.move_src_to(&old, &new)?;

		let core = c.handle();
		let core = core.read().unwrap();
		// the driver now targets the new variable
		match core.get_stmt(drive).unwrap().kind() {
			StmtKind::Assign { left, .. } => assert_eq!(*left, new.id()),
			_ => unreachable!(),
		}
		assert!(core.get_var(new.id()).unwrap().sources().contains(&drive));
		// and the old variable is linked from the new one
		let link = core.get_var(old.id()).unwrap().sources().first().copied().unwrap();
		match core.get_stmt(link).unwrap().kind() {
			StmtKind::Assign { left, right, .. } => {
				assert_eq!(*left, old.id());
				assert_eq!(*right, new.id());
			},
			_ => unreachable!(),
		}
		Ok(())
	}

	#[test]
	fn test_move_sink_slices() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let old = m.var("old", 8, false)?;
		let new = m.var("new", 8, false)?;
		let d = m.var("d", 4, false)?;

		let use_slice = d.assign(&old.slice(3, 0)?)?;
		m.add_stmt(use_slice)?;

		m.move_sink_to(&old, &new)?;

		let core = c.handle();
		let core = core.read().unwrap();
		let new_slice = core.get_var(new.id()).unwrap().slices.get(&(3, 0)).copied().unwrap();
		match core.get_stmt(use_slice).unwrap().kind() {
			StmtKind::Assign { right, .. } => assert_eq!(*right, new_slice),
			_ => unreachable!(),
		}
		Ok(())
	}

	#[test]
	fn test_move_refuses_expressions() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let a = m.var("a", 8, false)?;
		let b = m.var("b", 8, false)?;
		let e = a.add(&b)?;
		let k = m.constant(3, 8, false)?;

		assert!(matches!(m.move_src_to(&e, &a), Err(DesignError::NotReparentable(..))));
		assert!(matches!(m.move_sink_to(&k, &a), Err(DesignError::NotReparentable(..))));
		Ok(())
	}

	#[test]
	fn test_function_definition() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let mut f = m.function("clamp")?;
		let x = f.input("x", 8, false)?;
		f.body().return_stmt(&x)?;

		let core = c.handle();
		let core = core.read().unwrap();
		let gen = core.get_generator(m.id()).unwrap();
		assert!(gen.functions.contains_key("clamp"));
		// function inputs are not module ports
		assert!(gen.port_names().is_empty());
		match &core.get_stmt(*gen.functions.get("clamp").unwrap()).unwrap().kind {
			StmtKind::Block {
				kind: BlockKind::Function { has_return, ports, .. },
				..
			} => {
				assert!(*has_return);
				assert_eq!(ports.len(), 1);
			},
			_ => unreachable!(),
		}
		Ok(())
	}

	#[test]
	fn test_param_and_linking_type() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("top")?;
		let p = m.param("WIDTH", 16)?;
		assert_eq!(p.name(), "WIDTH");

		let old = m.var("old", 8, false)?;
		let new = m.var("new", 8, false)?;
		m.move_src_to(&old, &new)?;
		let core = c.handle();
		let core = core.read().unwrap();
		let link = core.get_generator(m.id()).unwrap().stmts()[0];
		assert_eq!(
			core.get_stmt(link).unwrap().assign_type(),
			Some(AssignmentType::Undefined)
		);
		Ok(())
	}
}
