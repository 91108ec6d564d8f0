//! ALU operations and their wire codes.
//!
//! The code occupies the low 6 bits of the opcode byte; the top two bits are
//! always zero on the wire.

use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// Mask for the 6-bit opcode field.
pub const OPCODE_MASK: u8 = 0b0011_1111;

/// An operation the ALU can execute.
///
/// The discriminant is the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Add = 0b100000,
    Sub = 0b100010,
    And = 0b100100,
    Or = 0b100101,
    Xor = 0b100110,
    Sra = 0b000011,
    Srl = 0b000010,
    Nor = 0b100111,
}

impl Opcode {
    /// Every opcode, in the order the device documentation lists them.
    pub const ALL: [Opcode; 8] = [
        Opcode::Add,
        Opcode::Sub,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Sra,
        Opcode::Srl,
        Opcode::Nor,
    ];

    /// The 6-bit wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up an opcode by wire code.
    pub fn from_code(code: u8) -> Result<Self, FrameError> {
        Self::ALL
            .into_iter()
            .find(|op| op.code() == code)
            .ok_or(FrameError::InvalidOpcode(code))
    }

    /// Upper-case mnemonic.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Sra => "SRA",
            Opcode::Srl => "SRL",
            Opcode::Nor => "NOR",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Opcode {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FrameError::UnknownOpcode(s.to_string()))
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_device_table() {
        assert_eq!(Opcode::Add.code(), 0b100000);
        assert_eq!(Opcode::Sub.code(), 0b100010);
        assert_eq!(Opcode::And.code(), 0b100100);
        assert_eq!(Opcode::Or.code(), 0b100101);
        assert_eq!(Opcode::Xor.code(), 0b100110);
        assert_eq!(Opcode::Sra.code(), 0b000011);
        assert_eq!(Opcode::Srl.code(), 0b000010);
        assert_eq!(Opcode::Nor.code(), 0b100111);
    }

    #[test]
    fn codes_fit_in_six_bits_and_are_unique() {
        for (i, a) in Opcode::ALL.iter().enumerate() {
            assert_eq!(a.code() & !OPCODE_MASK, 0, "{a} uses the top bits");
            for b in &Opcode::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn from_code_roundtrip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_code(op.code()).unwrap(), op);
            assert_eq!(Opcode::try_from(u8::from(op)).unwrap(), op);
        }
    }

    #[test]
    fn unknown_code_rejected() {
        let err = Opcode::from_code(0b000001).unwrap_err();
        assert!(matches!(err, FrameError::InvalidOpcode(0b000001)));

        assert!(Opcode::from_code(0xFF).is_err());
    }

    #[test]
    fn parse_names_case_insensitively() {
        assert_eq!("add".parse::<Opcode>().unwrap(), Opcode::Add);
        assert_eq!("Nor".parse::<Opcode>().unwrap(), Opcode::Nor);
        assert_eq!(" SRA ".parse::<Opcode>().unwrap(), Opcode::Sra);

        let err = "MUL".parse::<Opcode>().unwrap_err();
        assert!(matches!(err, FrameError::UnknownOpcode(name) if name == "MUL"));
    }

    #[test]
    fn display_uses_mnemonic() {
        assert_eq!(Opcode::Xor.to_string(), "XOR");
    }
}
