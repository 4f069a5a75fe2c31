//! The fixed set of well-known class pointers the root scan marks directly
//! (spec.md §4.5), independent of whether any live instance currently
//! references them.

use crate::value::ObjRef;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinClasses {
    pub object: Option<ObjRef>,
    pub class: Option<ObjRef>,
    pub module: Option<ObjRef>,
    pub proc_: Option<ObjRef>,
    pub string: Option<ObjRef>,
    pub array: Option<ObjRef>,
    pub hash: Option<ObjRef>,
    pub range: Option<ObjRef>,
    pub integer: Option<ObjRef>,
    pub float: Option<ObjRef>,
    pub true_class: Option<ObjRef>,
    pub false_class: Option<ObjRef>,
    pub nil_class: Option<ObjRef>,
    pub symbol: Option<ObjRef>,
    pub kernel: Option<ObjRef>,
    pub exception: Option<ObjRef>,
    pub standard_error: Option<ObjRef>,
}

impl BuiltinClasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every slot, in a fixed order, for the root scan to mark.
    pub fn iter(&self) -> impl Iterator<Item = ObjRef> + '_ {
        [
            self.object,
            self.class,
            self.module,
            self.proc_,
            self.string,
            self.array,
            self.hash,
            self.range,
            self.integer,
            self.float,
            self.true_class,
            self.false_class,
            self.nil_class,
            self.symbol,
            self.kernel,
            self.exception,
            self.standard_error,
        ]
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_classes_yield_no_roots() {
        let builtins = BuiltinClasses::new();
        assert_eq!(builtins.iter().count(), 0);
    }
}
