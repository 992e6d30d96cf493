//! Canonical op assembly
//!
//! Every algebra operation funnels its output through [`OpAssembler`], so two
//! changesets with the same effect have the same op list:
//!
//! - zero-length ops are dropped
//! - adjacent ops of the same kind and attributes are merged
//! - between two keeps, all deletes come before all inserts
//! - a trailing keep without attributes is dropped (it is implied)

use super::op::{Op, OpKind};

#[derive(Debug, Default)]
pub(crate) struct OpAssembler {
    ops: Vec<Op>,
    deletes: Vec<Op>,
    inserts: Vec<Op>,
}

impl OpAssembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, op: Op) {
        if op.len == 0 {
            return;
        }
        match op.kind {
            OpKind::Delete => push_merging(&mut self.deletes, op),
            OpKind::Insert => push_merging(&mut self.inserts, op),
            OpKind::Keep => {
                self.flush_run();
                push_merging(&mut self.ops, op);
            }
        }
    }

    fn flush_run(&mut self) {
        for op in self.deletes.drain(..).chain(self.inserts.drain(..)) {
            push_merging(&mut self.ops, op);
        }
    }

    pub(crate) fn finish(mut self) -> Vec<Op> {
        self.flush_run();
        if matches!(self.ops.last(), Some(op) if op.is_keep() && op.attribs.is_empty()) {
            self.ops.pop();
        }
        self.ops
    }
}

fn push_merging(ops: &mut Vec<Op>, op: Op) {
    match ops.last_mut() {
        Some(last) if last.kind == op.kind && last.attribs == op.attribs => last.len += op.len,
        _ => ops.push(op),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(ops: Vec<Op>) -> Vec<Op> {
        let mut assem = OpAssembler::new();
        for op in ops {
            assem.push(op);
        }
        assem.finish()
    }

    #[test]
    fn test_merges_adjacent_runs() {
        let ops = assemble(vec![Op::keep(2), Op::keep(3), Op::insert(1, vec![]), Op::insert(2, vec![])]);
        assert_eq!(ops, vec![Op::keep(5), Op::insert(3, vec![])]);
    }

    #[test]
    fn test_deletes_before_inserts() {
        let ops = assemble(vec![
            Op::keep(1),
            Op::insert(1, vec![]),
            Op::delete(2),
            Op::insert(1, vec![]),
            Op::keep(1),
        ]);
        assert_eq!(ops, vec![Op::keep(1), Op::delete(2), Op::insert(2, vec![])]);
    }

    #[test]
    fn test_trailing_keep_with_attribs_survives() {
        let ops = assemble(vec![Op::new(OpKind::Keep, 2, vec![0]), Op::keep(4)]);
        assert_eq!(ops, vec![Op::new(OpKind::Keep, 2, vec![0])]);
    }

    #[test]
    fn test_drops_empty_ops() {
        let ops = assemble(vec![Op::keep(0), Op::delete(0), Op::insert(0, vec![1])]);
        assert!(ops.is_empty());
    }
}
