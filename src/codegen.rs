pub mod sv;

pub use sv::{EmittedModule, SystemVerilogCodegen};

use crate::design::{DesignError, GeneratorHandle, GeneratorId, InterfaceDef, PortDirection, StmtId};
use crate::passes::get_num_cpus;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum CodegenError {
	#[error("invalid generator id")]
	InvalidGeneratorId(GeneratorId),

	#[error("top-level assignment must be blocking")]
	IllegalAssignForm { stmt: StmtId },

	#[error("cannot drive a module's input from itself")]
	InputDrivenFromInside { stmt: StmtId },

	#[error("switch case '{0}' is empty")]
	EmptyCase(String),

	#[error("interface '{0}' referenced with a different shape")]
	InterfaceMismatch(String),

	#[error(transparent)]
	Design(#[from] DesignError),
}

/// Wraps a string at the column budget, breaking at token boundaries
pub(crate) fn line_wrap(text: &str, budget: usize) -> Vec<String> {
	let mut lines = vec![];
	let mut current = String::new();
	for token in text.split(' ') {
		if current.is_empty() {
			current = token.to_string();
		}
		else if current.len() + 1 + token.len() <= budget {
			current.push(' ');
			current.push_str(token);
		}
		else {
			lines.push(current);
			current = token.to_string();
		}
	}
	lines.push(current);
	lines
}

/// Emits every distinct module reachable from `top` as SystemVerilog.
/// Modules are emitted on the worker pool, one per generator; the
/// result maps emitted module names to source text, interface
/// definitions included.
pub fn generate_verilog(top: &GeneratorHandle) -> Result<BTreeMap<String, String>, CodegenError> {
	let handle = top.ctx();

	// one module per distinct emitted name, in tree pre-order
	let order: Vec<GeneratorId> = {
		let core = handle.read().unwrap();
		let mut seen = HashSet::new();
		let mut list = vec![];
		for id in core.generator_tree(top.id()) {
			let gen = core.get_generator(id).unwrap();
			if gen.external {
				continue;
			}
			if seen.insert(gen.name.clone()) {
				list.push(id);
			}
		}
		list
	};

	let pool = rayon::ThreadPoolBuilder::new()
		.num_threads(get_num_cpus())
		.build()
		.map_err(|e| CodegenError::Design(DesignError::Internal(e.to_string())))?;

	let emitted: Vec<Result<EmittedModule, CodegenError>> = pool.install(|| {
		order
			.par_iter()
			.map(|id| SystemVerilogCodegen::new(handle.clone(), *id).emit_module())
			.collect()
	});

	let mut result = BTreeMap::new();
	{
		let mut core = handle.write().unwrap();
		for module in emitted {
			let module = module?;
			for (stmt, line) in &module.stmt_lines {
				core.get_stmt_mut(*stmt).unwrap().verilog_ln = *line;
			}
			for (var, line) in &module.var_lines {
				core.get_var_mut(*var).unwrap().verilog_ln = *line;
			}
			result.insert(module.name, module.text);
		}
	}

	for (name, text) in extract_interface_info(top)? {
		result.insert(name, text);
	}
	Ok(result)
}

/// Collects every interface definition in the project and emits each
/// exactly once. Two references to the same definition name must be
/// structurally equal.
pub fn extract_interface_info(top: &GeneratorHandle) -> Result<BTreeMap<String, String>, CodegenError> {
	let handle = top.ctx();
	let core = handle.read().unwrap();

	let mut defs: BTreeMap<String, InterfaceDef> = BTreeMap::new();
	for gen_id in core.generator_tree(top.id()) {
		let gen = core.get_generator(gen_id).unwrap();
		for iface in gen.interfaces.values() {
			match defs.get(&iface.def.def_name) {
				Some(existing) => {
					if *existing != iface.def {
						return Err(CodegenError::InterfaceMismatch(iface.def.def_name.clone()));
					}
				},
				None => {
					defs.insert(iface.def.def_name.clone(), iface.def.clone());
				},
			}
		}
	}

	let mut result = BTreeMap::new();
	for (name, def) in defs {
		let mut text = String::new();
		text.push_str(&format!("interface {}", name));
		if def.ports.is_empty() {
			text.push_str(";\n");
		}
		else {
			text.push_str("(\n");
			for (index, port) in def.ports.iter().enumerate() {
				let width_str = if port.width > 1 {
					format!(" [{}:0]", port.width - 1)
				}
				else {
					String::new()
				};
				text.push_str(&format!(
					"  {} logic{} {}{}\n",
					match port.direction {
						PortDirection::In => "input",
						PortDirection::Out => "output",
						PortDirection::InOut => "inout",
					},
					width_str,
					port.name,
					if index + 1 == def.ports.len() { "" } else { "," }
				));
			}
			text.push_str(");\n");
		}
		for (var_name, width) in &def.vars {
			let width_str = if *width > 1 {
				format!(" [{}:0]", width - 1)
			}
			else {
				String::new()
			};
			text.push_str(&format!("  logic{} {};\n", width_str, var_name));
		}
		text.push_str("endinterface\n");
		result.insert(name, text);
	}
	Ok(result)
}

/// Emits a port-compatible stub for the given generator: ports plus
/// zero-drives of its outputs, no body.
pub fn create_stub(top: &GeneratorHandle) -> Result<String, CodegenError> {
	let handle = top.ctx();
	let was_stub = {
		let mut core = handle.write().unwrap();
		let gen = core
			.get_generator_mut(top.id())
			.ok_or(CodegenError::InvalidGeneratorId(top.id()))?;
		let was = gen.is_stub;
		gen.is_stub = true;
		was
	};

	let result = SystemVerilogCodegen::new(handle.clone(), top.id()).emit_module();
	handle.write().unwrap().get_generator_mut(top.id()).unwrap().is_stub = was_stub;
	Ok(result?.text)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::design::{Context, DesignError, PortType};

	#[test]
	fn test_stub_emission() -> Result<(), DesignError> {
		let mut c = Context::new();
		let mut m = c.new_generator("black_box")?;
		m.port("req", 1, PortDirection::In, PortType::Data, false)?;
		m.port("ack", 1, PortDirection::Out, PortType::Data, false)?;
		m.port("payload", 32, PortDirection::Out, PortType::Data, false)?;

		let stub = create_stub(&m).unwrap();
		assert!(stub.contains("module black_box (\n"));
		assert!(stub.contains("assign ack = '0;\n"));
		assert!(stub.contains("assign payload = '0;\n"));
		assert!(!stub.contains("assign req"));

		// the stub flag is restored afterwards
		let handle = m.ctx();
		assert!(!handle.read().unwrap().get_generator(m.id()).unwrap().is_stub);
		Ok(())
	}

	#[test]
	fn test_external_modules_are_not_emitted() -> Result<(), DesignError> {
		let mut c = Context::new();
		let ext = c.external_module(
			"vendor_ip",
			vec![("d".to_string(), 8, PortDirection::In, PortType::Data, false)],
		)?;
		let mut top = c.new_generator("wrapper")?;
		top.port("d", 8, PortDirection::In, PortType::Data, false)?;
		top.add_child("u_ip", &ext)?;

		let sources = generate_verilog(&top).unwrap();
		assert!(sources.contains_key("wrapper"));
		assert!(!sources.contains_key("vendor_ip"));
		Ok(())
	}

	#[test]
	fn test_interface_emitted_once() -> Result<(), DesignError> {
		use crate::design::InterfaceDef;

		let def = InterfaceDef::new("axi_lite")
			.port("valid", PortDirection::In, 1)
			.var("data", 32);

		let mut c = Context::new();
		let mut child = c.new_generator("consumer")?;
		child.add_interface(def.clone(), "bus")?;
		let mut top = c.new_generator("producer")?;
		top.add_interface(def, "bus")?;
		top.add_child("u0", &child)?;

		let interfaces = extract_interface_info(&top).unwrap();
		assert_eq!(interfaces.len(), 1);
		let text = interfaces.get("axi_lite").unwrap();
		assert!(text.contains("interface axi_lite(\n"));
		assert!(text.contains("input logic valid\n"));
		assert!(text.contains("logic [31:0] data;\n"));
		assert!(text.ends_with("endinterface\n"));
		Ok(())
	}

	#[test]
	fn test_interface_mismatch() -> Result<(), DesignError> {
		use crate::design::InterfaceDef;

		let mut c = Context::new();
		let mut child = c.new_generator("consumer")?;
		child.add_interface(InterfaceDef::new("bus_if").var("data", 32), "bus")?;
		let mut top = c.new_generator("producer")?;
		top.add_interface(InterfaceDef::new("bus_if").var("data", 16), "bus")?;
		top.add_child("u0", &child)?;

		let result = extract_interface_info(&top);
		assert!(matches!(result, Err(CodegenError::InterfaceMismatch(..))));
		Ok(())
	}

	#[test]
	fn test_line_wrap() {
		let wrapped = line_wrap("a + b + c", 80);
		assert_eq!(wrapped, vec!["a + b + c"]);

		let long = "x1 + x2 + x3 + x4";
		let wrapped = line_wrap(long, 9);
		assert_eq!(wrapped, vec!["x1 + x2 +", "x3 + x4"]);

		// tokens longer than the budget stay intact
		let wrapped = line_wrap("aaaaaaaaaaaa bb", 4);
		assert_eq!(wrapped, vec!["aaaaaaaaaaaa", "bb"]);
	}
}
