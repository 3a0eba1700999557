//! Console input surface and banner printing.
//!
//! Plain blocking stdin — the session loop is strictly sequential, so
//! there's nothing to overlap with while waiting for the user.

use std::io::{self, BufRead, Write};

/// Line-oriented console prompt.
pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }

    /// Read one line of input. Returns `None` at end-of-input, which the
    /// session treats identically to the literal `exit`.
    pub fn prompt(&self) -> Option<String> {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end().to_string()),
            Err(_) => None,
        }
    }

    /// Startup banner: connected providers and catalog size.
    pub fn banner(&self, model: &str, providers: &[String], tool_count: usize) {
        println!("tether {} — {model}", env!("CARGO_PKG_VERSION"));
        if providers.is_empty() {
            println!("  no providers connected");
        } else {
            println!("  providers: {}", providers.join(", "));
        }
        println!("  {tool_count} tool(s) available — type 'exit' to quit");
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
