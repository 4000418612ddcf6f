// Agentwatch Infrastructure - OS Adapters
// Implements: GitProbe (git subprocess), ProcessProbe (sysinfo + /proc)

pub mod git_cli;
pub mod procfs;
pub mod sysinfo_probe;

pub use git_cli::GitCliProbe;
pub use sysinfo_probe::SysinfoProcessProbe;
