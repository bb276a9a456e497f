pub(crate) mod macros;
pub(crate) mod spin;

pub(crate) use spin::SpinLock;
