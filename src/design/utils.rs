use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
	static ref IDENT_REGEX: Regex = Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_]*$").unwrap();

	// names that would collide with keywords in the emitted RTL
	static ref RESERVED_WORDS: HashSet<&'static str> = [
		"always", "always_comb", "always_ff", "always_latch", "assert", "assign",
		"automatic", "begin", "bit", "byte", "case", "casex", "casez", "const",
		"default", "do", "else", "end", "endcase", "endfunction", "endgenerate",
		"endinterface", "endmodule", "endpackage", "endtask", "enum", "for",
		"forever", "function", "generate", "genvar", "if", "import", "initial",
		"inout", "input", "int", "integer", "interface", "localparam", "logic",
		"longint", "modport", "module", "negedge", "output", "package", "packed",
		"parameter", "posedge", "real", "reg", "repeat", "return", "shortint",
		"signed", "static", "struct", "task", "time", "typedef", "union",
		"unique", "unsigned", "void", "while", "wire",
	]
	.into_iter()
	.collect();
}

/// Checks that a name can be declared in the emitted RTL: identifier
/// syntax, and not a SystemVerilog reserved word
pub(super) fn is_name_valid(name: &str) -> bool {
	IDENT_REGEX.is_match(name) && !RESERVED_WORDS.contains(name)
}
