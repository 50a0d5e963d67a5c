use silica::design::{Context, EdgeKind, GeneratorHandle, PortDirection, PortType};
use silica::{compile, set_num_cpus, CompileOptions, DesignError};

/// A 16-bit register with asynchronous reset and a combinational
/// output stage
fn build_register(c: &mut Context) -> Result<GeneratorHandle, DesignError> {
	let mut m = c.new_generator("register")?;
	let clk = m.port("clk", 1, PortDirection::In, PortType::Clock, false)?;
	let rst = m.port("rst", 1, PortDirection::In, PortType::AsyncReset, false)?;
	let din = m.port("in_data", 16, PortDirection::In, PortType::Data, false)?;
	let dout = m.port("out_data", 16, PortDirection::Out, PortType::Data, false)?;
	let val = m.var("val", 16, false)?;
	let zero = m.constant(0, 16, false)?;

	let seq = m.seq_block(vec![(EdgeKind::Posedge, clk.id()), (EdgeKind::Posedge, rst.id())])?;
	let not_rst = rst.invert()?;
	let iff = seq.if_stmt(&not_rst)?;
	iff.then_block().assign(&val, &zero)?;
	iff.else_block().assign(&val, &din)?;

	let comb = m.comb_block()?;
	comb.assign(&dout, &val)?;
	Ok(m)
}

#[test]
fn register_module() -> Result<(), DesignError> {
	let mut c = Context::new();
	let m = build_register(&mut c)?;

	let output = compile(&m, CompileOptions::default()).unwrap();
	assert!(!output.report.has_errors());
	let src = output.sources.get("register").expect("register module missing");

	assert!(src.contains("module register (\n"));
	assert!(src.contains("always_ff @(posedge clk, posedge rst) begin\n"));
	// sequential assignments are non-blocking, combinational are blocking
	assert!(src.contains("val <= 16'h0;"));
	assert!(src.contains("else val <= in_data;"));
	assert!(src.contains("always_comb begin\n"));
	assert!(src.contains("out_data = val;"));
	assert!(src.ends_with("endmodule   // register\n"));
	Ok(())
}

#[test]
fn mux_module() -> Result<(), DesignError> {
	let mut c = Context::new();
	let mut m = c.new_generator("mux")?;
	let i0 = m.port("I0", 16, PortDirection::In, PortType::Data, false)?;
	let i1 = m.port("I1", 16, PortDirection::In, PortType::Data, false)?;
	let i2 = m.port("I2", 16, PortDirection::In, PortType::Data, false)?;
	let o = m.port("O", 16, PortDirection::Out, PortType::Data, false)?;
	let s = m.port("S", 2, PortDirection::In, PortType::Data, false)?;

	let comb = m.comb_block()?;
	let sw = comb.switch(&s)?;
	// add the arms out of order; emission sorts them
	let k2 = m.constant(2, 2, false)?;
	sw.case(Some(&k2))?.assign(&o, &i2)?;
	let k0 = m.constant(0, 2, false)?;
	sw.case(Some(&k0))?.assign(&o, &i0)?;
	let k1 = m.constant(1, 2, false)?;
	sw.case(Some(&k1))?.assign(&o, &i1)?;
	let zero = m.constant(0, 16, false)?;
	sw.case(None)?.assign(&o, &zero)?;

	let output = compile(&m, CompileOptions::default()).unwrap();
	assert!(!output.report.has_errors());
	let src = output.sources.get("mux").expect("mux module missing");

	assert!(src.contains("unique case (S)\n"));
	let c0 = src.find("2'h0: O = I0;").unwrap();
	let c1 = src.find("2'h1: O = I1;").unwrap();
	let c2 = src.find("2'h2: O = I2;").unwrap();
	let cd = src.find("default: O = 16'h0;").unwrap();
	assert!(c0 < c1 && c1 < c2 && c2 < cd);
	Ok(())
}

#[test]
fn verilator_public_vars_via_compile() -> Result<(), DesignError> {
	let mut c = Context::new();
	let m = build_register(&mut c)?;
	let val = m.get_var("val")?;

	let output = compile(
		&m,
		CompileOptions {
			verilator_public_vars: vec![val.id()],
			..Default::default()
		},
	)
	.unwrap();
	assert!(!output.report.has_errors());
	let src = output.sources.get("register").unwrap();
	assert!(src.contains("logic [15:0] val /*verilator public*/;"));
	Ok(())
}

#[test]
fn emission_is_deterministic() -> Result<(), DesignError> {
	let build = || -> Result<_, DesignError> {
		let mut c = Context::new();
		let m = build_register(&mut c)?;
		Ok((c, m))
	};

	set_num_cpus(1);
	let (_c1, m1) = build()?;
	let first = compile(&m1, CompileOptions::default()).unwrap().sources;

	set_num_cpus(4);
	let (_c2, m2) = build()?;
	let second = compile(&m2, CompileOptions::default()).unwrap().sources;

	assert_eq!(first, second);
	Ok(())
}

/// Parses "(input|output|inout) logic [signed] [[msb:0]] name" lines of
/// an emitted module header
fn parse_port_list(src: &str) -> Vec<(String, String, u32, bool)> {
	let mut ports = vec![];
	let header_end = src.find(");").unwrap();
	for line in src[..header_end].lines() {
		let line = line.trim().trim_end_matches(',');
		let tokens: Vec<&str> = line.split_whitespace().collect();
		if tokens.len() < 3 || !matches!(tokens[0], "input" | "output" | "inout") {
			continue;
		}
		let direction = tokens[0].to_string();
		let is_signed = tokens.contains(&"signed");
		let width = tokens
			.iter()
			.find(|t| t.starts_with('['))
			.map(|t| {
				let msb: u32 = t.trim_start_matches('[').split(':').next().unwrap().parse().unwrap();
				msb + 1
			})
			.unwrap_or(1);
		let name = tokens.last().unwrap().to_string();
		ports.push((name, direction, width, is_signed));
	}
	ports
}

#[test]
fn port_list_round_trip() -> Result<(), DesignError> {
	let mut c = Context::new();
	let mut m = c.new_generator("roundtrip")?;
	m.port("a_in", 12, PortDirection::In, PortType::Data, false)?;
	m.port("b_out", 1, PortDirection::Out, PortType::Data, false)?;
	m.port("c_io", 7, PortDirection::InOut, PortType::Data, true)?;
	let dummy = m.var("keep", 1, false)?;
	let b = m.get_var("b_out")?;
	let stmt = b.assign(&dummy)?;
	m.add_stmt(stmt)?;
	let c_drive = m.get_var("c_io")?;
	let k = m.constant(3, 7, true)?;
	let stmt2 = c_drive.assign(&k)?;
	m.add_stmt(stmt2)?;
	let one = m.constant(1, 1, false)?;
	let stmt3 = dummy.assign(&one)?;
	m.add_stmt(stmt3)?;

	let output = compile(&m, CompileOptions::default()).unwrap();
	assert!(!output.report.has_errors());
	let src = output.sources.get("roundtrip").unwrap();

	let mut ports = parse_port_list(src);
	ports.sort();
	assert_eq!(
		ports,
		vec![
			("a_in".to_string(), "input".to_string(), 12, false),
			("b_out".to_string(), "output".to_string(), 1, false),
			("c_io".to_string(), "inout".to_string(), 7, true),
		]
	);
	Ok(())
}

#[test]
fn hierarchy_with_debug_database() -> Result<(), DesignError> {
	let mut c = Context::new();
	let mut child = c.new_generator("adder")?;
	let a = child.port("a", 8, PortDirection::In, PortType::Data, false)?;
	let b = child.port("b", 8, PortDirection::In, PortType::Data, false)?;
	let sum = child.port("sum", 8, PortDirection::Out, PortType::Data, false)?;
	let comb = child.comb_block()?;
	let expr = a.add(&b)?;
	comb.assign(&sum, &expr)?;

	let mut top = c.new_generator("soc")?;
	let x = top.port("x", 8, PortDirection::In, PortType::Data, false)?;
	let y = top.port("y", 8, PortDirection::In, PortType::Data, false)?;
	let z = top.port("z", 8, PortDirection::Out, PortType::Data, false)?;
	top.add_child("u_add", &child)?;
	let w1 = a.assign(&x)?;
	top.add_stmt(w1)?;
	let w2 = b.assign(&y)?;
	top.add_stmt(w2)?;
	let w3 = z.assign(&sum)?;
	top.add_stmt(w3)?;

	let output = compile(
		&top,
		CompileOptions {
			debug: true,
			..Default::default()
		},
	)
	.unwrap();
	assert!(!output.report.has_errors(), "{:?}", output.report.messages());

	let top_src = output.sources.get("soc").expect("top module missing");
	assert!(output.sources.contains_key("adder"));
	// the child is instantiated with decoupled intermediate wires
	assert!(top_src.contains("adder u_add (\n"));
	assert!(top_src.contains(".a(u_add_a)"));
	assert!(top_src.contains(".sum(u_add_sum)"));

	let db = output.debug_db.expect("debug database missing");
	let snapshot = db.snapshot();
	assert!(snapshot
		.hierarchy
		.iter()
		.any(|h| h.parent_handle == "soc" && h.child_handle == "soc.u_add"));
	assert!(snapshot.connections.len() >= 3);
	// the child's combinational assignment got a breakpoint with a line
	assert!(!snapshot.break_points.is_empty());
	assert!(snapshot.break_points.iter().all(|bp| bp.line_num > 0));
	Ok(())
}

#[test]
fn identical_children_collapse_in_output() -> Result<(), DesignError> {
	let mut c = Context::new();

	let mut make_leaf = |c: &mut Context| -> Result<GeneratorHandle, DesignError> {
		let mut g = c.new_generator("leaf")?;
		let i = g.port("i", 4, PortDirection::In, PortType::Data, false)?;
		let o = g.port("o", 4, PortDirection::Out, PortType::Data, false)?;
		let s = o.assign(&i)?;
		g.add_stmt(s)?;
		Ok(g)
	};

	let l0 = make_leaf(&mut c)?;
	let l1 = make_leaf(&mut c)?;

	let mut wide = c.new_generator("leaf")?;
	let i = wide.port("i", 9, PortDirection::In, PortType::Data, false)?;
	let o = wide.port("o", 9, PortDirection::Out, PortType::Data, false)?;
	let s = o.assign(&i)?;
	wide.add_stmt(s)?;

	let mut top = c.new_generator("top")?;
	let pi = top.port("pi", 4, PortDirection::In, PortType::Data, false)?;
	let po = top.port("po", 4, PortDirection::Out, PortType::Data, false)?;
	let qi = top.port("qi", 9, PortDirection::In, PortType::Data, false)?;
	let qo = top.port("qo", 9, PortDirection::Out, PortType::Data, false)?;
	top.add_child("u0", &l0)?;
	top.add_child("u1", &l1)?;
	top.add_child("u2", &wide)?;

	for (child, input, output_port) in [(&l0, &pi, &po), (&l1, &pi, &po)] {
		let ci = child.get_var("i")?;
		let co = child.get_var("o")?;
		let w = ci.assign(input)?;
		top.add_stmt(w)?;
		let w = output_port.assign(&co)?;
		top.add_stmt(w)?;
	}
	let wi = wide.get_var("i")?;
	let wo = wide.get_var("o")?;
	let w = wi.assign(&qi)?;
	top.add_stmt(w)?;
	let w = qo.assign(&wo)?;
	top.add_stmt(w)?;

	let output = compile(&top, CompileOptions::default()).unwrap();
	assert!(!output.report.has_errors(), "{:?}", output.report.messages());

	// two distinct bodies named "leaf": one keeps the name, the other is
	// suffixed; identical bodies share one emitted module
	assert!(output.sources.contains_key("leaf"));
	let renamed: Vec<&String> = output.sources.keys().filter(|k| k.starts_with("leaf_unq")).collect();
	assert_eq!(renamed.len(), 1);
	assert_eq!(output.sources.len(), 3);
	Ok(())
}
