mod cpu;
mod ops;

pub use cpu::CpuOps;
pub use ops::Ops;
