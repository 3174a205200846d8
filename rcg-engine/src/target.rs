//! Process-wide target selection
//!
//! The target is chosen once per process. Repeating the call with the same
//! architecture is harmless; asking for a different one is an error.

use log::{debug, info};
use once_cell::sync::OnceCell;
use rcg_common::{CodegenError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported target architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    AArch64,
    Mips,
    PowerPc,
    Sparc,
    RiscV,
}

impl Arch {
    pub const ALL: [Arch; 8] = [
        Arch::X86, Arch::X86_64, Arch::Arm, Arch::AArch64,
        Arch::Mips, Arch::PowerPc, Arch::Sparc, Arch::RiscV,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86-64",
            Arch::Arm => "arm",
            Arch::AArch64 => "aarch64",
            Arch::Mips => "mips",
            Arch::PowerPc => "powerpc",
            Arch::Sparc => "sparc",
            Arch::RiscV => "riscv",
        }
    }

    /// Width of a native pointer in bits
    pub fn pointer_bits(self) -> u32 {
        match self {
            Arch::X86 | Arch::Arm | Arch::Mips | Arch::PowerPc | Arch::Sparc => 32,
            Arch::X86_64 | Arch::AArch64 | Arch::RiscV => 64,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Arch {
    type Err = CodegenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase().replace('_', "-");
        Arch::ALL
            .into_iter()
            .find(|arch| arch.name() == wanted)
            .ok_or_else(|| CodegenError::argument(format!("unsupported target architecture '{s}'")))
    }
}

static TARGET: OnceCell<Arch> = OnceCell::new();

/// Select the target for this process
pub fn init(arch: Arch) -> Result<()> {
    let chosen = *TARGET.get_or_init(|| {
        info!("Initializing target {arch}");
        arch
    });
    if chosen == arch {
        debug!("Target {arch} ready");
        Ok(())
    } else {
        Err(CodegenError::argument(format!(
            "target already initialized as {chosen}, cannot switch to {arch}"
        )))
    }
}

/// Parse `name` and select it
pub fn init_named(name: &str) -> Result<()> {
    init(name.parse()?)
}

/// The selected target, if any
pub fn initialized() -> Option<Arch> {
    TARGET.get().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rcg_common::ErrorKind;

    #[test]
    fn test_parse_arch() {
        assert_eq!("x86-64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("X86_64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::AArch64);
        assert_eq!("foo".parse::<Arch>().unwrap_err().kind(), ErrorKind::Argument);
    }

    #[test]
    fn test_unknown_name_leaves_target_alone() {
        let before = initialized();
        assert_eq!(init_named("foo").unwrap_err().kind(), ErrorKind::Argument);
        assert_eq!(initialized(), before);
    }

    #[test]
    fn test_init_is_idempotent_and_exclusive() {
        init(Arch::X86_64).unwrap();
        init(Arch::X86_64).unwrap();
        assert_eq!(initialized(), Some(Arch::X86_64));
        assert_eq!(init(Arch::Arm).unwrap_err().kind(), ErrorKind::Argument);
    }
}
