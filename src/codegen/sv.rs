use super::{line_wrap, CodegenError};
use crate::design::{
	AssignmentType, BlockKind, BlockType, ContextCore, ContextHandle, GeneratorId, PortDirection, StmtId, StmtKind,
	StmtParent, Var, VarId, VarKind,
};
use log::debug;
use std::collections::HashMap;

const INDENT_STEP: usize = 2;
const LINE_BUDGET: usize = 80;

/// Result of emitting one module: the source text plus the line numbers
/// recorded for the debug database
pub struct EmittedModule {
	pub name: String,
	pub text: String,
	pub stmt_lines: Vec<(StmtId, u32)>,
	pub var_lines: Vec<(VarId, u32)>,
}

/// SystemVerilog code generator for a single generator (module).
/// Serialization is deterministic: ports, parameters and bindings are
/// sorted by name, switch cases and enum members by value.
pub struct SystemVerilogCodegen {
	ctx: ContextHandle,
	generator: GeneratorId,
	indent_level: u32,
	skip_indent: bool,
	out: String,
	line_no: u32,
	debug: bool,
	stmt_lines: Vec<(StmtId, u32)>,
	var_lines: Vec<(VarId, u32)>,
	label_index: HashMap<StmtId, String>,
}

impl SystemVerilogCodegen {
	pub fn new(ctx: ContextHandle, generator: GeneratorId) -> Self {
		Self {
			ctx,
			generator,
			indent_level: 0,
			skip_indent: false,
			out: String::new(),
			line_no: 1,
			debug: false,
			stmt_lines: vec![],
			var_lines: vec![],
			label_index: HashMap::new(),
		}
	}

	fn begin_indent(&mut self) {
		self.indent_level += 1;
	}

	fn end_indent(&mut self) {
		assert!(self.indent_level > 0);
		self.indent_level -= 1;
	}

	fn indent(&mut self) -> String {
		if self.skip_indent {
			self.skip_indent = false;
			return String::new();
		}
		" ".repeat(self.indent_level as usize * INDENT_STEP)
	}

	fn indent_str(&self, level: u32) -> String {
		" ".repeat(level as usize * INDENT_STEP)
	}

	/// Writes raw text, tracking line numbers
	fn write_raw(&mut self, text: &str) {
		self.line_no += text.matches('\n').count() as u32;
		self.out.push_str(text);
	}

	/// Writes one indented line
	fn write_line(&mut self, text: &str) {
		let indent = self.indent();
		self.write_raw(&format!("{}{}\n", indent, text));
	}

	fn record_stmt(&mut self, stmt: StmtId) {
		if self.debug {
			self.stmt_lines.push((stmt, self.line_no));
		}
	}

	fn record_var(&mut self, var: VarId) {
		if self.debug {
			self.var_lines.push((var, self.line_no));
		}
	}

	fn emit_comment(&mut self, comment: &Option<String>) {
		if let Some(comment) = comment {
			for line in comment.lines() {
				self.write_line(&format!("// {}", line));
			}
		}
	}

	/// Emits the module for the configured generator
	pub fn emit_module(mut self) -> Result<EmittedModule, CodegenError> {
		let handle = self.ctx.clone();
		let core = handle.read().unwrap();
		let gen = core
			.get_generator(self.generator)
			.ok_or(CodegenError::InvalidGeneratorId(self.generator))?;
		let name = gen.name.clone();
		self.debug = gen.debug;
		debug!("emitting module {}", name);

		for (label, stmt) in &gen.named_blocks {
			self.label_index.insert(*stmt, label.clone());
		}

		if let Some(header) = &gen.header_include {
			self.write_raw(&format!("`include \"{}\"\n\n", header));
		}
		if let Some(package) = &gen.package_import {
			self.write_raw(&format!("import {}::*;\n", package));
		}

		self.emit_comment(&gen.comment.clone());
		self.write_raw(&format!("module {} ", name));
		self.emit_parameters(&core)?;
		self.write_raw("(\n");
		self.emit_ports(&core)?;
		self.write_raw(");\n\n");

		if core.get_generator(self.generator).unwrap().is_stub {
			self.emit_stub_body(&core)?;
		}
		else {
			self.emit_enums(&core)?;
			self.emit_variables(&core)?;
			self.emit_interfaces(&core)?;
			self.emit_functions(&core)?;

			let stmts = core.get_generator(self.generator).unwrap().stmts().clone();
			for stmt in stmts {
				self.dispatch(&core, stmt)?;
			}
		}

		self.write_raw(&format!("endmodule   // {}\n", name));

		Ok(EmittedModule {
			name,
			text: self.out,
			stmt_lines: self.stmt_lines,
			var_lines: self.var_lines,
		})
	}

	fn emit_parameters(&mut self, core: &ContextCore) -> Result<(), CodegenError> {
		let gen = core.get_generator(self.generator).unwrap();
		if gen.params().is_empty() {
			return Ok(());
		}
		let mut names: Vec<&String> = gen.params().keys().collect();
		names.sort();
		let decls: Vec<String> = names
			.iter()
			.map(|n| {
				let value = core.get_var(*gen.params().get(*n).unwrap()).unwrap().const_value();
				format!("{} = {}", n, value.unwrap_or(0))
			})
			.collect();
		self.write_raw(&format!("#(parameter {})\n", decls.join(", ")));
		Ok(())
	}

	fn port_decl_str(&self, port: &Var) -> String {
		let mut parts = vec![port.port_direction().unwrap().to_str().to_string(), "logic".into()];
		if port.is_signed {
			parts.push("signed".into());
		}
		if port.width > 1 {
			parts.push(format!("[{}:0]", port.width - 1));
		}
		parts.push(port.name.clone());
		if port.size.len() > 1 || port.size.first() != Some(&1) {
			let mut array = String::new();
			for s in &port.size {
				array.push_str(&format!("[{}:0]", s - 1));
			}
			parts.push(array);
		}
		parts.join(" ")
	}

	fn emit_ports(&mut self, core: &ContextCore) -> Result<(), CodegenError> {
		self.begin_indent();
		let gen = core.get_generator(self.generator).unwrap();
		let mut names = gen.port_names().clone();
		names.sort();
		let count = names.len();
		for (index, port_name) in names.iter().enumerate() {
			let port_id = *gen.vars().get(port_name).unwrap();
			let port = core.get_var(port_id).unwrap();
			self.emit_comment(&port.comment.clone());
			self.record_var(port_id);
			let end = if index + 1 == count { "" } else { "," };
			let decl = self.port_decl_str(port);
			self.write_line(&format!("{}{}", decl, end));
		}
		self.end_indent();
		Ok(())
	}

	fn emit_stub_body(&mut self, core: &ContextCore) -> Result<(), CodegenError> {
		let gen = core.get_generator(self.generator).unwrap();
		let mut names = gen.port_names().clone();
		names.sort();
		for port_name in names {
			let port = core.get_var(*gen.vars().get(&port_name).unwrap()).unwrap();
			if port.port_direction() == Some(PortDirection::Out) {
				self.write_line(&format!("assign {} = '0;", port_name));
			}
		}
		self.write_raw("\n");
		Ok(())
	}

	fn emit_enums(&mut self, core: &ContextCore) -> Result<(), CodegenError> {
		let gen = core.get_generator(self.generator).unwrap();
		for def in gen.enums().values() {
			let logic_str = if def.width == 1 {
				String::new()
			}
			else {
				format!("[{}:0]", def.width - 1)
			};
			self.write_line(&format!("typedef enum logic{} {{", logic_str));

			let mut members: Vec<(&String, &i64)> = def.values.iter().collect();
			members.sort_by_key(|(_, v)| **v);
			let count = members.len();
			for (index, (member, value)) in members.into_iter().enumerate() {
				let end = if index + 1 == count { "" } else { "," };
				self.write_raw(&format!("  {} = {}'h{:X}{}\n", member, def.width, value, end));
			}
			self.write_line(&format!("}} {};", def.name));
			self.write_raw("\n");
		}
		Ok(())
	}

	fn var_decl_str(&self, var: &Var) -> String {
		let type_str = match var.kind() {
			VarKind::Enum { def } => def.clone(),
			VarKind::PackedStruct { def } => def.clone(),
			_ => "logic".into(),
		};
		let plain = matches!(var.kind(), VarKind::Base | VarKind::Port { .. });

		let mut parts = vec![type_str];
		if var.is_signed {
			parts.push("signed".into());
		}
		if var.width > 1 && plain {
			parts.push(format!("[{}:0]", var.width - 1));
		}
		parts.push(var.name.clone());
		if var.size.len() > 1 || var.size.first() != Some(&1) {
			let mut array = String::new();
			for s in &var.size {
				array.push_str(&format!("[{}:0]", s - 1));
			}
			parts.push(array);
		}
		parts.join(" ")
	}

	fn emit_variables(&mut self, core: &ContextCore) -> Result<(), CodegenError> {
		let gen = core.get_generator(self.generator).unwrap();
		let mut names: Vec<&String> = gen.vars().keys().collect();
		names.sort();
		let mut emitted_any = false;
		for name in names {
			let var_id = *gen.vars().get(name).unwrap();
			let var = core.get_var(var_id).unwrap();
			if !matches!(
				var.kind(),
				VarKind::Base | VarKind::Enum { .. } | VarKind::PackedStruct { .. }
			) {
				continue;
			}
			self.emit_comment(&var.comment.clone());
			self.record_var(var_id);
			let public = if var.verilator_public { " /*verilator public*/" } else { "" };
			let decl = self.var_decl_str(var);
			self.write_line(&format!("{}{};", decl, public));
			emitted_any = true;
		}
		if emitted_any {
			self.write_raw("\n");
		}
		Ok(())
	}

	fn emit_interfaces(&mut self, core: &ContextCore) -> Result<(), CodegenError> {
		let gen = core.get_generator(self.generator).unwrap();
		for iface in gen.interfaces.values() {
			self.write_line(&format!("{} {} ();", iface.def.def_name, iface.inst_name));
		}
		if !gen.interfaces.is_empty() {
			self.write_raw("\n");
		}
		Ok(())
	}

	fn emit_functions(&mut self, core: &ContextCore) -> Result<(), CodegenError> {
		let funcs: Vec<StmtId> = core
			.get_generator(self.generator)
			.unwrap()
			.functions()
			.values()
			.copied()
			.collect();
		for func in funcs {
			self.dispatch(core, func)?;
		}
		Ok(())
	}

	fn block_label(&self, stmt: StmtId) -> String {
		match self.label_index.get(&stmt) {
			Some(label) => format!(" :{}", label),
			None => String::new(),
		}
	}

	fn dispatch(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		match core.get_stmt(id).unwrap().kind() {
			StmtKind::Assign { .. } => self.stmt_assign(core, id),
			StmtKind::Block { .. } => self.stmt_block(core, id),
			StmtKind::If { .. } => self.stmt_if(core, id),
			StmtKind::Switch { .. } => self.stmt_switch(core, id),
			StmtKind::ModuleInstantiation { .. } => self.stmt_module_instantiation(core, id),
			StmtKind::InterfaceInstantiation { .. } => Ok(()),
			StmtKind::FunctionCall { .. } => self.stmt_function_call(core, id),
			StmtKind::Return { .. } => self.stmt_return(core, id),
			StmtKind::Assert { .. } => self.stmt_assert(core, id),
			StmtKind::Comment { .. } => self.stmt_comment(core, id),
			StmtKind::RawString { .. } => self.stmt_raw(core, id),
		}
	}

	fn stmt_assign(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let stmt = core.get_stmt(id).unwrap();
		let (left, right, assign_type) = match stmt.kind() {
			StmtKind::Assign {
				left,
				right,
				assign_type,
			} => (*left, *right, *assign_type),
			_ => unreachable!(),
		};

		// an input port must never be driven from inside its own module
		let left_var = core.get_var(left).unwrap();
		if left_var.port_direction() == Some(PortDirection::In) && left_var.generator == self.generator {
			return Err(CodegenError::InputDrivenFromInside { stmt: id });
		}

		self.emit_comment(&stmt.comment.clone());
		self.record_stmt(id);

		let left_str = core.var_to_string(left);
		let right_str = core.var_to_string(right);
		let top_level = matches!(stmt.parent(), StmtParent::Generator(_));

		let (prefix, eq) = if top_level {
			if assign_type != AssignmentType::Blocking {
				return Err(CodegenError::IllegalAssignForm { stmt: id });
			}
			("assign ".to_string(), "=")
		}
		else {
			let eq = match assign_type {
				AssignmentType::Blocking => "=",
				AssignmentType::NonBlocking => "<=",
				AssignmentType::Undefined => return Err(CodegenError::IllegalAssignForm { stmt: id }),
			};
			if assign_type == AssignmentType::NonBlocking
				&& matches!(
					core.enclosing_process(id),
					Some(BlockType::Combinational) | Some(BlockType::Function) | Some(BlockType::Initial)
				) {
				return Err(CodegenError::IllegalAssignForm { stmt: id });
			}
			(String::new(), eq)
		};

		let indent = self.indent();
		let continuation = self.indent_str(self.indent_level + 1);
		let wrapped = line_wrap(&right_str, LINE_BUDGET);
		let mut text = format!("{}{}{} {} {}", indent, prefix, left_str, eq, wrapped[0]);
		for chunk in wrapped.iter().skip(1) {
			text.push_str(&format!("\n{}{}", continuation, chunk));
		}
		text.push_str(";\n");
		self.write_raw(&text);
		Ok(())
	}

	fn stmt_block(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let stmt = core.get_stmt(id).unwrap();
		let (kind, children) = match stmt.kind() {
			StmtKind::Block { kind, children, .. } => (kind.clone(), children.clone()),
			_ => unreachable!(),
		};
		let label = self.block_label(id);

		match &kind {
			BlockKind::Sequential { sensitivity } => {
				self.emit_comment(&stmt.comment.clone());
				self.record_stmt(id);
				let conditions: Vec<String> = sensitivity
					.iter()
					.map(|(edge, var)| format!("{} {}", edge.to_str(), core.var_to_string(*var)))
					.collect();
				self.write_raw("\n");
				let indent = self.indent();
				self.write_raw(&format!(
					"{}always_ff @({}) begin{}\n",
					indent,
					conditions.join(", "),
					label
				));
				self.emit_block_children(core, &children)?;
				let indent = self.indent();
				self.write_raw(&format!("{}end{}\n", indent, label));
			},
			BlockKind::Combinational => {
				self.emit_comment(&stmt.comment.clone());
				self.record_stmt(id);
				self.write_raw("\n");
				let indent = self.indent();
				self.write_raw(&format!("{}always_comb begin{}\n", indent, label));
				self.emit_block_children(core, &children)?;
				let indent = self.indent();
				self.write_raw(&format!("{}end{}\n", indent, label));
			},
			BlockKind::Initial => {
				self.emit_comment(&stmt.comment.clone());
				self.record_stmt(id);
				self.write_raw("\n");
				let indent = self.indent();
				self.write_raw(&format!("{}initial begin{}\n", indent, label));
				self.emit_block_children(core, &children)?;
				let indent = self.indent();
				self.write_raw(&format!("{}end{}\n", indent, label));
			},
			BlockKind::Scope => {
				// scoped blocks continue the construct on the current line
				self.record_stmt(id);
				self.write_raw(&format!("begin{}\n", label));
				self.emit_block_children(core, &children)?;
				let indent = self.indent();
				self.write_raw(&format!("{}end{}\n", indent, label));
			},
			BlockKind::Function {
				name,
				ports,
				has_return,
			} => {
				self.record_stmt(id);
				let return_str = if *has_return { "" } else { "void " };
				if ports.is_empty() {
					self.write_line(&format!("function {}{}();", return_str, name));
				}
				else {
					self.write_line(&format!("function {}{}(", return_str, name));
					self.begin_indent();
					let count = ports.len();
					for (index, port_id) in ports.iter().enumerate() {
						let port = core.get_var(*port_id).unwrap();
						self.record_var(*port_id);
						let decl = self.port_decl_str(port);
						if index + 1 == count {
							self.write_line(&decl);
						}
						else {
							self.write_line(&format!("{},", decl));
						}
					}
					self.end_indent();
					self.write_line(");");
				}
				self.write_line("begin");
				self.emit_block_children(core, &children)?;
				self.write_line("end");
				self.write_line("endfunction");
			},
		}
		Ok(())
	}

	fn emit_block_children(&mut self, core: &ContextCore, children: &[StmtId]) -> Result<(), CodegenError> {
		self.begin_indent();
		for child in children {
			self.dispatch(core, *child)?;
		}
		self.end_indent();
		Ok(())
	}

	fn stmt_if(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let (predicate, then_body, else_body) = match core.get_stmt(id).unwrap().kind() {
			StmtKind::If {
				predicate,
				then_body,
				else_body,
			} => (*predicate, *then_body, *else_body),
			_ => unreachable!(),
		};
		self.record_stmt(id);
		self.record_var(predicate);

		let indent = self.indent();
		self.write_raw(&format!("{}if ({}) ", indent, core.var_to_string(predicate)));
		self.dispatch(core, then_body)?;

		let else_children = core.get_stmt(else_body).unwrap().block_children().unwrap().clone();
		if else_children.is_empty() {
			return Ok(());
		}
		if else_children.len() == 1 {
			// collapse else-if chains onto one line
			let indent = self.indent();
			self.write_raw(&format!("{}else ", indent));
			self.skip_indent = true;
			self.dispatch(core, else_children[0])?;
		}
		else {
			let indent = self.indent();
			self.write_raw(&format!("{}else ", indent));
			self.dispatch(core, else_body)?;
		}
		Ok(())
	}

	fn stmt_switch(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let (target, cases) = match core.get_stmt(id).unwrap().kind() {
			StmtKind::Switch { target, cases } => (*target, cases.clone()),
			_ => unreachable!(),
		};
		self.record_stmt(id);

		let indent = self.indent();
		self.write_raw(&format!("{}unique case ({})\n", indent, core.var_to_string(target)));
		self.begin_indent();

		// cases sorted by constant value, default last
		let mut sorted = cases.clone();
		sorted.sort_by_key(|case| match case.cond {
			Some(c) => (false, core.get_var(c).unwrap().const_value().unwrap_or(0)),
			None => (true, 0),
		});

		for case in sorted {
			let cond_str = match case.cond {
				Some(c) => core.var_to_string(c),
				None => "default".into(),
			};
			let body_children = core.get_stmt(case.body).unwrap().block_children().unwrap().clone();
			let indent = self.indent();
			self.write_raw(&format!("{}{}: ", indent, cond_str));

			if body_children.is_empty() {
				if case.cond.is_some() {
					return Err(CodegenError::EmptyCase(cond_str));
				}
				self.write_raw("begin end\n");
			}
			else if body_children.len() == 1 && !self.label_index.contains_key(&case.body) {
				self.skip_indent = true;
				self.dispatch(core, body_children[0])?;
			}
			else {
				self.begin_indent();
				self.dispatch(core, case.body)?;
				self.end_indent();
			}
		}

		self.end_indent();
		let indent = self.indent();
		self.write_raw(&format!("{}endcase\n", indent));
		Ok(())
	}

	fn stmt_module_instantiation(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let stmt = core.get_stmt(id).unwrap();
		let (target, port_mapping) = match stmt.kind() {
			StmtKind::ModuleInstantiation { target, port_mapping } => (*target, port_mapping.clone()),
			_ => unreachable!(),
		};
		self.emit_comment(&stmt.comment.clone());
		self.record_stmt(id);

		let child = core.get_generator(target).unwrap();
		let indent = self.indent();
		self.write_raw(&format!("{}{}", indent, child.name));

		if !child.params().is_empty() {
			let mut names: Vec<&String> = child.params().keys().collect();
			names.sort();
			self.write_raw(" #(\n");
			self.begin_indent();
			let count = names.len();
			for (index, name) in names.iter().enumerate() {
				let value = core
					.get_var(*child.params().get(*name).unwrap())
					.unwrap()
					.const_value()
					.unwrap_or(0);
				let end = if index + 1 == count { "" } else { "," };
				self.write_line(&format!(".{}({}){}", name, value, end));
			}
			self.end_indent();
			let indent = self.indent();
			self.write_raw(&format!("{})", indent));
		}

		self.write_raw(&format!(" {}", child.instance_name));
		if port_mapping.is_empty() {
			self.write_raw(" ();\n\n");
			return Ok(());
		}

		self.write_raw(" (\n");
		self.begin_indent();
		let mut bindings: Vec<(String, String)> = port_mapping
			.iter()
			.map(|(port, external)| {
				(
					core.get_var(*port).unwrap().name.clone(),
					core.var_to_string(*external),
				)
			})
			.collect();
		bindings.sort();
		let count = bindings.len();
		for (index, (port_name, external)) in bindings.into_iter().enumerate() {
			let end = if index + 1 == count { "" } else { "," };
			self.write_line(&format!(".{}({}){}", port_name, external, end));
		}
		self.end_indent();
		let indent = self.indent();
		self.write_raw(&format!("{});\n\n", indent));
		Ok(())
	}

	fn stmt_function_call(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let (function, args) = match core.get_stmt(id).unwrap().kind() {
			StmtKind::FunctionCall { function, args } => (function.clone(), args.clone()),
			_ => unreachable!(),
		};
		self.record_stmt(id);
		let arg_strs: Vec<String> = args.iter().map(|a| core.var_to_string(*a)).collect();
		self.write_line(&format!("{} ({});", function, arg_strs.join(", ")));
		Ok(())
	}

	fn stmt_return(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let value = match core.get_stmt(id).unwrap().kind() {
			StmtKind::Return { value } => *value,
			_ => unreachable!(),
		};
		self.record_stmt(id);
		self.write_line(&format!("return {};", core.var_to_string(value)));
		Ok(())
	}

	fn stmt_assert(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let (value, else_stmt) = match core.get_stmt(id).unwrap().kind() {
			StmtKind::Assert { value, else_stmt } => (*value, *else_stmt),
			_ => unreachable!(),
		};
		self.record_stmt(id);
		match else_stmt {
			Some(else_id) => {
				let indent = self.indent();
				self.write_raw(&format!("{}assert ({}) else ", indent, core.var_to_string(value)));
				self.skip_indent = true;
				self.dispatch(core, else_id)?;
			},
			None => {
				self.write_line(&format!("assert ({});", core.var_to_string(value)));
			},
		}
		Ok(())
	}

	fn stmt_comment(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let lines = match core.get_stmt(id).unwrap().kind() {
			StmtKind::Comment { lines } => lines.clone(),
			_ => unreachable!(),
		};
		for line in lines {
			self.write_line(&format!("// {}", line));
		}
		Ok(())
	}

	fn stmt_raw(&mut self, core: &ContextCore, id: StmtId) -> Result<(), CodegenError> {
		let lines = match core.get_stmt(id).unwrap().kind() {
			StmtKind::RawString { lines } => lines.clone(),
			_ => unreachable!(),
		};
		for line in lines {
			self.write_line(&line);
		}
		Ok(())
	}
}
