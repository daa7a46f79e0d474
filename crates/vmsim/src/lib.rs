//! Access scripts replayed by the simulator.
//!
//! A script is plain text with one access per line:
//!
//! ```text
//! # comments run to the end of the line
//! write 0x12345 42
//! read  0x12345
//! ```
//!
//! Numbers are decimal or `0x`-prefixed hexadecimal.

use std::fmt;

use vmm::{AddressSpace, MmuError, PhysicalMemory, VirtualAddress, Word};

/// One scripted memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(VirtualAddress),
    Write(VirtualAddress, Word),
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read(address) => write!(f, "read {}", address),
            Access::Write(address, value) => write!(f, "write {} {}", address, value),
        }
    }
}

/// A script line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// A scripted access that the address space rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessError {
    pub line: usize,
    pub access: Access,
    pub error: MmuError,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}: {}", self.line, self.access, self.error)
    }
}

impl std::error::Error for AccessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Parses a whole script into `(line number, access)` pairs.
pub fn parse_script(text: &str) -> Result<Vec<(usize, Access)>, ParseError> {
    let mut accesses = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = match raw.find('#') {
            Some(start) => &raw[..start],
            None => raw,
        };

        let mut words = content.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let operands: Vec<&str> = words.collect();
        let error = |message: String| ParseError { line, message };

        let access = match (command, operands.as_slice()) {
            ("read", [address]) => {
                Access::Read(VirtualAddress::new(parse_number(address).map_err(error)? as usize))
            }
            ("write", [address, value]) => {
                let address = parse_number(address).map_err(error)? as usize;
                let value = parse_number(value).map_err(error)?;
                Access::Write(VirtualAddress::new(address), value)
            }
            ("read", _) => return Err(error("expected `read <address>`".into())),
            ("write", _) => return Err(error("expected `write <address> <value>`".into())),
            (other, _) => return Err(error(format!("unknown command `{}`", other))),
        };
        accesses.push((line, access));
    }

    Ok(accesses)
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number `{}`: {}", text, e))
}

/// What a replayed script produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Replay {
    /// Every read with the value it returned, in script order.
    pub reads: Vec<(VirtualAddress, Word)>,
    pub writes: usize,
}

/// Runs `accesses` against `space`, stopping at the first failed access.
pub fn replay<M: PhysicalMemory>(
    space: &mut AddressSpace<M>,
    accesses: &[(usize, Access)],
) -> Result<Replay, AccessError> {
    let mut result = Replay::default();

    for &(line, access) in accesses {
        let fail = |error| AccessError {
            line,
            access,
            error,
        };
        match access {
            Access::Read(address) => {
                let value = space.read(address).map_err(fail)?;
                log::trace!("line {}: read {} -> {}", line, address, value);
                result.reads.push((address, value));
            }
            Access::Write(address, value) => {
                space.write(address, value).map_err(fail)?;
                log::trace!("line {}: write {} <- {}", line, address, value);
                result.writes += 1;
            }
        }
    }

    Ok(result)
}
