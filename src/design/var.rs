use super::{ContextCore, ContextHandle, DesignError, GeneratorId, HasComment, StmtId, VarId};
use indexmap::{IndexMap, IndexSet};
use log::error;

/// Expression operators. Unary operators use `right = None`;
/// unary minus shares `Minus` with the binary form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ExprOp {
	Add,
	Minus,
	Multiply,
	Divide,
	Mod,
	And,
	Or,
	Xor,
	UInvert,
	UPlus,
	ShiftLeft,
	LogicalShiftRight,
	SignedShiftRight,
	LessThan,
	GreaterThan,
	LessEqThan,
	GreaterEqThan,
	Eq,
	Neq,
}

impl ExprOp {
	/// Relational operators always produce a 1-bit result
	pub fn is_relational(&self) -> bool {
		use ExprOp::*;
		matches!(self, LessThan | GreaterThan | LessEqThan | GreaterEqThan | Eq | Neq)
	}

	pub fn to_str(&self) -> &'static str {
		use ExprOp::*;
		match self {
			Add => "+",
			Minus => "-",
			Multiply => "*",
			Divide => "/",
			Mod => "%",
			And => "&",
			Or => "|",
			Xor => "^",
			UInvert => "~",
			UPlus => "+",
			ShiftLeft => "<<",
			LogicalShiftRight => ">>",
			SignedShiftRight => ">>>",
			LessThan => "<",
			GreaterThan => ">",
			LessEqThan => "<=",
			GreaterEqThan => ">=",
			Eq => "==",
			Neq => "!=",
		}
	}
}

/// Port direction at a generator boundary
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PortDirection {
	In,
	Out,
	InOut,
}

impl PortDirection {
	pub fn to_str(&self) -> &'static str {
		match self {
			PortDirection::In => "input",
			PortDirection::Out => "output",
			PortDirection::InOut => "inout",
		}
	}
}

/// Semantic role of a port
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum PortType {
	Data,
	Clock,
	AsyncReset,
	ClockEnable,
	Reset,
}

/// Variant payload of a variable node
#[derive(Clone, Debug)]
pub enum VarKind {
	Base,
	Port {
		direction: PortDirection,
		port_type: PortType,
	},
	Slice {
		parent: VarId,
		high: u32,
		low: u32,
	},
	Expression {
		op: ExprOp,
		left: VarId,
		right: Option<VarId>,
	},
	Const {
		value: i64,
	},
	Param {
		value: i64,
	},
	SignedView {
		parent: VarId,
	},
	Concat {
		parts: Vec<VarId>,
	},
	Enum {
		def: String,
	},
	PackedStruct {
		def: String,
	},
}

/// The fundamental value-carrying IR node
#[derive(Clone, Debug)]
pub struct Var {
	/// Self-reference
	pub(crate) id: VarId,

	/// Name of the variable (empty for structurally-named variants)
	pub name: String,

	/// Bit width
	pub width: u32,

	/// Signedness
	pub is_signed: bool,

	/// Owning generator
	pub generator: GeneratorId,

	/// Array shape
	pub size: Vec<u32>,

	/// Variant payload
	pub(crate) kind: VarKind,

	/// Assignments whose left-hand side is this variable
	pub(crate) sources: IndexSet<StmtId>,

	/// Assignments whose right-hand side references this variable
	pub(crate) sinks: IndexSet<StmtId>,

	/// Slice cache: (high, low) -> slice variable
	pub(crate) slices: IndexMap<(u32, u32), VarId>,

	/// Concatenations this variable participates in
	pub(crate) concats: Vec<VarId>,

	/// Lazily created signed-view companion
	pub(crate) signed_view: Option<VarId>,

	/// Source-code comment
	pub comment: Option<String>,

	/// Line number in the emitted output (when the generator has debug on)
	pub verilog_ln: u32,

	/// Emit a verilator public marker after the declaration
	pub(crate) verilator_public: bool,

	/// Compiler-generated variable; its name carries no user intent
	pub(crate) synthetic: bool,
}

impl Var {
	pub(crate) fn new(generator: GeneratorId, name: &str, width: u32, is_signed: bool, kind: VarKind) -> Self {
		Self {
			id: VarId { id: 0 },
			name: name.into(),
			width,
			is_signed,
			generator,
			size: vec![1],
			kind,
			sources: IndexSet::new(),
			sinks: IndexSet::new(),
			slices: IndexMap::new(),
			concats: Vec::new(),
			signed_view: None,
			comment: None,
			verilog_ln: 0,
			verilator_public: false,
			synthetic: false,
		}
	}

	pub fn id(&self) -> VarId {
		self.id
	}

	pub fn kind(&self) -> &VarKind {
		&self.kind
	}

	pub fn sources(&self) -> &IndexSet<StmtId> {
		&self.sources
	}

	pub fn sinks(&self) -> &IndexSet<StmtId> {
		&self.sinks
	}

	pub fn is_port(&self) -> bool {
		matches!(self.kind, VarKind::Port { .. })
	}

	pub fn port_direction(&self) -> Option<PortDirection> {
		match self.kind {
			VarKind::Port { direction, .. } => Some(direction),
			_ => None,
		}
	}

	pub fn port_type(&self) -> Option<PortType> {
		match self.kind {
			VarKind::Port { port_type, .. } => Some(port_type),
			_ => None,
		}
	}

	pub fn const_value(&self) -> Option<i64> {
		match self.kind {
			VarKind::Const { value } | VarKind::Param { value } => Some(value),
			_ => None,
		}
	}

	/// Variables which refuse to be assignment destinations
	pub(crate) fn is_assignable(&self) -> bool {
		!matches!(
			self.kind,
			VarKind::Const { .. }
				| VarKind::Param { .. }
				| VarKind::Expression { .. }
				| VarKind::SignedView { .. }
				| VarKind::Concat { .. }
		)
	}

	/// Variables whose sources/sinks may be rewired by move_src_to/move_sink_to
	pub(crate) fn is_reparentable(&self) -> bool {
		matches!(self.kind, VarKind::Base | VarKind::Port { .. } | VarKind::Slice { .. })
	}
}

impl HasComment for Var {
	fn get_comment(&self) -> Option<String> {
		self.comment.clone()
	}
}

/// Checks that a constant value fits the declared width.
/// Signed range is two's complement, unsigned range is [0, 2^w - 1].
pub(crate) fn const_fits(value: i64, width: u32, is_signed: bool) -> bool {
	if width == 0 || width > 64 {
		return false;
	}
	let v = value as i128;
	if is_signed {
		let min = -(1i128 << (width - 1));
		let max = (1i128 << (width - 1)) - 1;
		v >= min && v <= max
	}
	else {
		let max = (1i128 << width) - 1;
		v >= 0 && v <= max
	}
}

impl ContextCore {
	/// Resolves an operand to the current in-scope definition of its name.
	/// Structurally-named variants resolve to themselves.
	pub(crate) fn resolve_operand(&self, id: VarId) -> Result<VarId, DesignError> {
		let var = self
			.get_var(id)
			.ok_or_else(|| DesignError::Internal("dangling variable id".into()))?;
		match var.kind {
			VarKind::Base | VarKind::Port { .. } | VarKind::Param { .. } => {
				let gen = self
					.get_generator(var.generator)
					.ok_or_else(|| DesignError::Internal("variable without generator".into()))?;
				gen.vars.get(&var.name).copied().ok_or(DesignError::NameNotFound {
					generator: var.generator,
					name: var.name.clone(),
				})
			},
			_ => Ok(id),
		}
	}

	/// Creates an expression node. Binary operands must live in the same
	/// generator and have equal widths; no node is created on failure.
	pub(crate) fn make_expr(&mut self, op: ExprOp, left: VarId, right: Option<VarId>) -> Result<VarId, DesignError> {
		let left = self.resolve_operand(left)?;
		let right = right.map(|r| self.resolve_operand(r)).transpose()?;

		let l = self.get_var(left).unwrap();
		let (width, is_signed, generator) = match right {
			Some(rid) => {
				let r = self.get_var(rid).unwrap();
				if l.generator != r.generator {
					return Err(DesignError::CrossGenerator { left, right: rid });
				}
				if l.width != r.width {
					return Err(DesignError::WidthMismatch {
						left,
						right: rid,
						left_width: l.width,
						right_width: r.width,
					});
				}
				let width = if op.is_relational() { 1 } else { l.width };
				(width, l.is_signed && r.is_signed, l.generator)
			},
			None => (l.width, l.is_signed, l.generator),
		};

		Ok(self.alloc_var(Var::new(
			generator,
			"",
			width,
			is_signed,
			VarKind::Expression { op, left, right },
		)))
	}

	/// Returns the cached slice for the given bounds, creating it on first
	/// use. Repeated slices with equal bounds return the same variable.
	pub(crate) fn make_slice(&mut self, parent: VarId, high: u32, low: u32) -> Result<VarId, DesignError> {
		let p = self
			.get_var(parent)
			.ok_or_else(|| DesignError::Internal("dangling variable id".into()))?;
		if low > high || high >= p.width {
			return Err(DesignError::SliceOutOfRange {
				var: parent,
				high,
				low,
				width: p.width,
			});
		}
		if let Some(existing) = p.slices.get(&(high, low)) {
			return Ok(*existing);
		}

		let slice = Var::new(
			p.generator,
			"",
			high - low + 1,
			p.is_signed,
			VarKind::Slice { parent, high, low },
		);
		let id = self.alloc_var(slice);
		self.get_var_mut(parent).unwrap().slices.insert((high, low), id);
		Ok(id)
	}

	/// Creates (or reuses) a concatenation with the given ordered members
	pub(crate) fn make_concat(&mut self, parts: Vec<VarId>) -> Result<VarId, DesignError> {
		debug_assert!(parts.len() >= 2);
		let first = parts[0];
		let generator = self.get_var(first).unwrap().generator;

		let mut width = 0u32;
		let mut is_signed = true;
		for part in &parts {
			let v = self
				.get_var(*part)
				.ok_or_else(|| DesignError::Internal("dangling variable id".into()))?;
			if v.generator != generator {
				return Err(DesignError::CrossGenerator {
					left: first,
					right: *part,
				});
			}
			width += v.width;
			is_signed &= v.is_signed;
		}

		// reuse an existing identical concatenation
		for cid in &self.get_var(first).unwrap().concats {
			if let VarKind::Concat { parts: existing } = &self.get_var(*cid).unwrap().kind {
				if *existing == parts {
					return Ok(*cid);
				}
			}
		}

		let id = self.alloc_var(Var::new(
			generator,
			"",
			width,
			is_signed,
			VarKind::Concat { parts: parts.clone() },
		));
		for part in parts {
			self.get_var_mut(part).unwrap().concats.push(id);
		}
		Ok(id)
	}

	/// Returns the signed view of a variable. Signed variables are their
	/// own view; the companion is created lazily and cached.
	pub(crate) fn make_signed_view(&mut self, parent: VarId) -> Result<VarId, DesignError> {
		let p = self
			.get_var(parent)
			.ok_or_else(|| DesignError::Internal("dangling variable id".into()))?;
		if p.is_signed {
			return Ok(parent);
		}
		if let Some(view) = p.signed_view {
			return Ok(view);
		}

		let view = Var::new(p.generator, "", p.width, true, VarKind::SignedView { parent });
		let id = self.alloc_var(view);
		self.get_var_mut(parent).unwrap().signed_view = Some(id);
		Ok(id)
	}

	/// Returns the canonical constant for (value, width, signed) within a
	/// generator, verifying the value fits the declared width.
	pub(crate) fn make_const(
		&mut self,
		generator: GeneratorId,
		value: i64,
		width: u32,
		is_signed: bool,
	) -> Result<VarId, DesignError> {
		if !const_fits(value, width, is_signed) {
			return Err(DesignError::OutOfRange {
				value,
				width,
				is_signed,
			});
		}
		if let Some(existing) = self.const_pool.get(&(generator, value, width, is_signed)) {
			return Ok(*existing);
		}

		let id = self.alloc_var(Var::new(generator, "", width, is_signed, VarKind::Const { value }));
		self.const_pool.insert((generator, value, width, is_signed), id);
		Ok(id)
	}

	/// Re-checks the range and updates the value. On failure the old value
	/// is kept and a diagnostic is emitted.
	pub(crate) fn set_const_value(&mut self, id: VarId, new_value: i64) {
		let var = self.get_var(id).unwrap();
		let (width, is_signed) = (var.width, var.is_signed);
		let old = match var.kind {
			VarKind::Const { value } | VarKind::Param { value } => value,
			_ => return,
		};
		if !const_fits(new_value, width, is_signed) {
			error!("unable to set constant value from {} to {}", old, new_value);
			return;
		}
		match &mut self.get_var_mut(id).unwrap().kind {
			VarKind::Const { value } | VarKind::Param { value } => *value = new_value,
			_ => unreachable!(),
		}
	}

	/// Registers a statement as a sink of a variable. Signed views forward
	/// their sinks to the parent variable.
	pub(crate) fn add_sink(&mut self, var: VarId, stmt: StmtId) {
		let target = match self.get_var(var).unwrap().kind {
			VarKind::SignedView { parent } => parent,
			_ => var,
		};
		self.get_var_mut(target).unwrap().sinks.insert(stmt);
	}

	/// The sink set used for assignment deduplication
	pub(crate) fn sink_set_of(&self, var: VarId) -> &IndexSet<StmtId> {
		let v = self.get_var(var).unwrap();
		match v.kind {
			VarKind::SignedView { parent } => &self.get_var(parent).unwrap().sinks,
			_ => &v.sinks,
		}
	}

	/// Textual form of a variable reference, as it appears in emitted code
	pub fn var_to_string(&self, id: VarId) -> String {
		let var = self.get_var(id).unwrap();
		match &var.kind {
			VarKind::Base | VarKind::Port { .. } | VarKind::Param { .. } | VarKind::Enum { .. } | VarKind::PackedStruct { .. } => {
				var.name.clone()
			},
			VarKind::Slice { parent, high, low } => {
				format!("{}[{}:{}]", self.var_to_string(*parent), high, low)
			},
			VarKind::Expression { op, left, right } => {
				let left_str = self.operand_to_string(*left);
				match right {
					Some(r) => format!("{} {} {}", left_str, op.to_str(), self.operand_to_string(*r)),
					None => format!("{}{}", op.to_str(), left_str),
				}
			},
			VarKind::Const { value } => {
				if var.is_signed && *value < 0 {
					format!("-{}'h{:X}", var.width, -(*value as i128))
				}
				else {
					format!("{}'h{:X}", var.width, value)
				}
			},
			VarKind::SignedView { parent } => format!("$signed({})", self.var_to_string(*parent)),
			VarKind::Concat { parts } => {
				let names: Vec<String> = parts.iter().map(|p| self.var_to_string(*p)).collect();
				format!("{{{}}}", names.join(", "))
			},
		}
	}

	/// Expression operands are parenthesized to preserve structure
	fn operand_to_string(&self, id: VarId) -> String {
		match self.get_var(id).unwrap().kind {
			VarKind::Expression { .. } => format!("({})", self.var_to_string(id)),
			_ => self.var_to_string(id),
		}
	}
}

/// Handle used for manipulating variables outside of the design
#[derive(Clone)]
pub struct VarHandle {
	ctx: ContextHandle,
	id: VarId,
}

macro_rules! this_var {
	($self:ident) => {
		$self.ctx.read().unwrap().get_var($self.id).unwrap()
	};
}

macro_rules! impl_binary_var_op {
	($func:ident, $op:ident) => {
		pub fn $func(&self, rhs: &VarHandle) -> Result<VarHandle, DesignError> {
			self.binary_expr(ExprOp::$op, rhs)
		}
	};
}

macro_rules! impl_unary_var_op {
	($func:ident, $op:ident) => {
		pub fn $func(&self) -> Result<VarHandle, DesignError> {
			self.unary_expr(ExprOp::$op)
		}
	};
}

impl VarHandle {
	pub(crate) fn new(ctx: ContextHandle, id: VarId) -> Self {
		Self { ctx, id }
	}

	pub fn id(&self) -> VarId {
		self.id
	}

	pub fn ctx(&self) -> ContextHandle {
		self.ctx.clone()
	}

	pub fn name(&self) -> String {
		this_var!(self).name.clone()
	}

	pub fn width(&self) -> u32 {
		this_var!(self).width
	}

	pub fn is_signed(&self) -> bool {
		this_var!(self).is_signed
	}

	pub fn generator(&self) -> GeneratorId {
		this_var!(self).generator
	}

	pub fn set_comment(&self, comment: &str) {
		self.ctx.write().unwrap().get_var_mut(self.id).unwrap().comment = Some(comment.into());
	}

	fn binary_expr(&self, op: ExprOp, rhs: &VarHandle) -> Result<VarHandle, DesignError> {
		let id = self.ctx.write().unwrap().make_expr(op, self.id, Some(rhs.id))?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	fn unary_expr(&self, op: ExprOp) -> Result<VarHandle, DesignError> {
		let id = self.ctx.write().unwrap().make_expr(op, self.id, None)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	impl_binary_var_op!(add, Add);
	impl_binary_var_op!(sub, Minus);
	impl_binary_var_op!(mul, Multiply);
	impl_binary_var_op!(div, Divide);
	impl_binary_var_op!(rem, Mod);
	impl_binary_var_op!(bitand, And);
	impl_binary_var_op!(bitor, Or);
	impl_binary_var_op!(bitxor, Xor);
	impl_binary_var_op!(shl, ShiftLeft);
	impl_binary_var_op!(shr, LogicalShiftRight);
	impl_binary_var_op!(ashr, SignedShiftRight);
	impl_binary_var_op!(lt, LessThan);
	impl_binary_var_op!(gt, GreaterThan);
	impl_binary_var_op!(le, LessEqThan);
	impl_binary_var_op!(ge, GreaterEqThan);
	impl_binary_var_op!(eq, Eq);
	impl_binary_var_op!(neq, Neq);

	impl_unary_var_op!(invert, UInvert);
	impl_unary_var_op!(plus, UPlus);
	impl_unary_var_op!(neg, Minus);

	/// Slices bits [high:low] of this variable. Idempotent: equal bounds
	/// return the same slice object.
	pub fn slice(&self, high: u32, low: u32) -> Result<VarHandle, DesignError> {
		let id = self.ctx.write().unwrap().make_slice(self.id, high, low)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Selects a single bit; sugar for `slice(bit, bit)`
	pub fn bit(&self, bit: u32) -> Result<VarHandle, DesignError> {
		self.slice(bit, bit)
	}

	/// Concatenates this variable with another, left to right
	pub fn concat(&self, rhs: &VarHandle) -> Result<VarHandle, DesignError> {
		let mut core = self.ctx.write().unwrap();
		let parts = match &core.get_var(self.id).unwrap().kind {
			VarKind::Concat { parts } => {
				let mut parts = parts.clone();
				parts.push(rhs.id);
				parts
			},
			_ => vec![self.id, rhs.id],
		};
		let id = core.make_concat(parts)?;
		drop(core);
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Returns the `$signed(...)` view of this variable
	pub fn signed_view(&self) -> Result<VarHandle, DesignError> {
		let id = self.ctx.write().unwrap().make_signed_view(self.id)?;
		Ok(VarHandle::new(self.ctx.clone(), id))
	}

	/// Updates a constant's value, keeping the old value if the new one
	/// does not fit the declared width
	pub fn set_value(&self, value: i64) {
		self.ctx.write().unwrap().set_const_value(self.id, value);
	}

	pub fn to_string(&self) -> String {
		self.ctx.read().unwrap().var_to_string(self.id)
	}
}

impl std::fmt::Debug for VarHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}", this_var!(self))
	}
}
