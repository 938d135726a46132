//! Synthesizes `$funcN`/`$labelN`-style names for the printer when the
//! disassembly names table has nothing recorded for a given index. A plain
//! per-printer-call counter is enough here: unlike the parser (which runs
//! once per source file on one thread), there is no cross-module identifier
//! namespace to keep distinct.

extern crate alloc;

use alloc::string::String;
use core::cell::Cell;

pub struct Gensym {
    next: Cell<u32>,
}

impl Gensym {
    pub fn new() -> Self {
        Self { next: Cell::new(0) }
    }

    pub fn next(&self, prefix: &str) -> String {
        let n = self.next.get();
        self.next.set(n + 1);
        alloc::format!("${prefix}{n}")
    }
}

impl Default for Gensym {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_up_per_prefix_call() {
        let g = Gensym::new();
        assert_eq!(g.next("func"), "$func0");
        assert_eq!(g.next("func"), "$func1");
    }
}
